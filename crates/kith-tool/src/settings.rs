//! Tool configuration, layered from an optional TOML file and `KITH_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use kith_aggregator::AggregatorConfig;
use serde::Deserialize;

/// Runtime configuration, deserialised from `kith.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  #[serde(default)]
  pub aggregation: AggregatorConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/kith/contacts.db") }

impl ToolConfig {
  /// Read `path` if it exists, then apply overrides such as
  /// `KITH_STORE_PATH` or `KITH_AGGREGATION__SUGGESTION_LIMIT`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("KITH")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;
    Self::from_settings(settings)
  }

  fn from_settings(settings: config::Config) -> anyhow::Result<Self> {
    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ToolConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
