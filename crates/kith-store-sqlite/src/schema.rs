//! SQL schema for the Kith SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Interned. `data_set` is '' rather than NULL so the UNIQUE constraint holds.
CREATE TABLE IF NOT EXISTS accounts (
    account_id   INTEGER PRIMARY KEY,
    account_type TEXT NOT NULL,
    account_name TEXT NOT NULL,
    data_set     TEXT NOT NULL DEFAULT '',
    UNIQUE (account_type, account_name, data_set)
);

-- Interned.
CREATE TABLE IF NOT EXISTS mimetypes (
    mimetype_id INTEGER PRIMARY KEY,
    mimetype    TEXT NOT NULL UNIQUE
);

-- Every column except the id is derived from the members.
-- AUTOINCREMENT: ids of deleted aggregates are never handed out again.
CREATE TABLE IF NOT EXISTS aggregates (
    aggregate_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name        TEXT,
    display_name_source TEXT NOT NULL DEFAULT 'undefined',
    starred             INTEGER NOT NULL DEFAULT 0,
    send_to_voicemail   INTEGER NOT NULL DEFAULT 0,
    custom_ringtone     TEXT,
    lookup_key          TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS raw_contacts (
    raw_contact_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    aggregate_id      INTEGER REFERENCES aggregates(aggregate_id),
    account_id        INTEGER REFERENCES accounts(account_id),
    source_id         TEXT,
    deleted           INTEGER NOT NULL DEFAULT 0,
    name_json         TEXT NOT NULL,   -- JSON-encoded StructuredName
    display_name      TEXT,
    starred           INTEGER NOT NULL DEFAULT 0,
    send_to_voicemail INTEGER,         -- NULL when never set
    custom_ringtone   TEXT,
    dirty             INTEGER NOT NULL DEFAULT 1,
    version           INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

-- Generic (raw contact, mimetype) -> value rows.
CREATE TABLE IF NOT EXISTS data (
    data_id        INTEGER PRIMARY KEY,
    raw_contact_id INTEGER NOT NULL REFERENCES raw_contacts(raw_contact_id) ON DELETE CASCADE,
    mimetype_id    INTEGER NOT NULL REFERENCES mimetypes(mimetype_id),
    value          TEXT NOT NULL
);

-- Rewritten by the aggregation engine on every resolution.
CREATE TABLE IF NOT EXISTS match_keys (
    raw_contact_id INTEGER NOT NULL REFERENCES raw_contacts(raw_contact_id) ON DELETE CASCADE,
    kind           TEXT NOT NULL,
    key            TEXT NOT NULL,
    PRIMARY KEY (raw_contact_id, kind, key)
);

-- One row per unordered pair, stored as (min, max).
CREATE TABLE IF NOT EXISTS aggregation_exceptions (
    raw_contact_id1 INTEGER NOT NULL REFERENCES raw_contacts(raw_contact_id) ON DELETE CASCADE,
    raw_contact_id2 INTEGER NOT NULL REFERENCES raw_contacts(raw_contact_id) ON DELETE CASCADE,
    type            TEXT NOT NULL,   -- 'keep_in' | 'keep_out' | 'keep_separate'
    PRIMARY KEY (raw_contact_id1, raw_contact_id2),
    CHECK  (raw_contact_id1 < raw_contact_id2)
);

CREATE INDEX IF NOT EXISTS raw_contacts_aggregate_idx ON raw_contacts(aggregate_id);
CREATE INDEX IF NOT EXISTS raw_contacts_source_idx    ON raw_contacts(source_id);
CREATE INDEX IF NOT EXISTS data_raw_contact_idx       ON data(raw_contact_id);
CREATE INDEX IF NOT EXISTS match_keys_lookup_idx      ON match_keys(kind, key);
CREATE INDEX IF NOT EXISTS exceptions_second_idx      ON aggregation_exceptions(raw_contact_id2);
CREATE INDEX IF NOT EXISTS aggregates_lookup_key_idx  ON aggregates(lookup_key);

PRAGMA user_version = 1;
";
