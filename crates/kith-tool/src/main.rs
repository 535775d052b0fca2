//! `kith` — maintenance tool for a Kith contact store.
//!
//! Reads `kith.toml` (or the path given with `--config`), opens the SQLite
//! store it names, and runs one aggregation command against it. Results are
//! printed to stdout as JSON.
//!
//! # Usage
//!
//! ```
//! kith import contacts.json
//! kith show-raw 12
//! kith except keep-out 12 15
//! kith resolve 0i1.0n3B4537432F4531
//! kith sweep
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use kith_core::{
  contact::{AggregateId, NewRawContact, RawContactId},
  exception::ExceptionType,
  store::ContactStore,
};
use kith_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ToolConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kith", author, version, about = "Kith contact aggregation tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "kith.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Insert raw contacts from a JSON array and aggregate each one.
  Import {
    /// File holding `[{"name": {...}, "contact_points": [...]}, ...]`.
    file: PathBuf,
  },
  /// Print a raw contact, its contact points, and its directives.
  ShowRaw { id: i64 },
  /// Print an aggregate and its members.
  Show { id: i64 },
  /// Resolve a lookup key to the aggregate that now represents it.
  Resolve { lookup_key: String },
  /// Write an aggregation directive between two raw contacts.
  Except {
    #[arg(value_enum)]
    kind: ExceptionArg,
    first: i64,
    second: i64,
  },
  /// List aggregates that look like the given one.
  Suggest { id: i64 },
  /// Delete a raw contact. Without `--purge` the row is only flagged.
  Delete {
    id: i64,
    #[arg(long)]
    purge: bool,
  },
  /// Re-aggregate every live raw contact.
  Sweep,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExceptionArg {
  Automatic,
  KeepIn,
  KeepOut,
  KeepSeparate,
}

impl From<ExceptionArg> for ExceptionType {
  fn from(arg: ExceptionArg) -> Self {
    match arg {
      ExceptionArg::Automatic => Self::Automatic,
      ExceptionArg::KeepIn => Self::KeepIn,
      ExceptionArg::KeepOut => Self::KeepOut,
      ExceptionArg::KeepSeparate => Self::KeepSeparate,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so stdout stays machine-readable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ToolConfig::load(&cli.config)?;

  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&cfg.store_path, cfg.aggregation.clone())
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  run(&store, cli.command).await
}

async fn run(store: &SqliteStore, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Import { file } => {
      let text = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
      let inputs: Vec<NewRawContact> =
        serde_json::from_str(&text).context("failed to parse raw contacts")?;
      let mut imported = Vec::with_capacity(inputs.len());
      for input in inputs {
        imported.push(store.insert_raw_contact(input).await?);
      }
      tracing::info!(count = imported.len(), "imported raw contacts");
      print_json(&imported)
    }
    Command::ShowRaw { id } => {
      let id = RawContactId(id);
      let raw = store
        .get_raw_contact(id)
        .await?
        .with_context(|| format!("no raw contact {id}"))?;
      let points = store.contact_points(id).await?;
      let directives = store.directives(id).await?;
      print_json(&serde_json::json!({
        "raw_contact": raw,
        "contact_points": points,
        "directives": directives,
      }))
    }
    Command::Show { id } => {
      let id = AggregateId(id);
      let contact = store
        .get_aggregate(id)
        .await?
        .with_context(|| format!("no aggregate {id}"))?;
      print_json(&contact)
    }
    Command::Resolve { lookup_key } => {
      let id = store.resolve_lookup_key(&lookup_key).await?;
      print_json(&store.get_aggregate(id).await?)
    }
    Command::Except { kind, first, second } => {
      let (first, second) = (RawContactId(first), RawContactId(second));
      store.set_exception(kind.into(), first, second).await?;
      print_json(&serde_json::json!({
        "first": store.aggregate_for_raw_contact(first).await?,
        "second": store.aggregate_for_raw_contact(second).await?,
      }))
    }
    Command::Suggest { id } => print_json(&store.suggestions(AggregateId(id)).await?),
    Command::Delete { id, purge } => {
      let id = RawContactId(id);
      if purge {
        store.purge_raw_contact(id).await?;
      } else {
        store.delete_raw_contact(id).await?;
      }
      Ok(())
    }
    Command::Sweep => print_json(&store.reaggregate_all().await?),
  }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
