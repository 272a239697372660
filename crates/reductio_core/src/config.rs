//! Vault configuration and time source.
//!
//! # Responsibility
//! - Provide tunables with stable defaults.
//! - Load optional per-vault overrides from `reductio.toml`.
//! - Abstract "now" so age-based rules are testable.
//!
//! # Invariants
//! - A missing override file yields defaults; a malformed one is an error,
//!   never silently ignored.

use crate::error::{GraphError, GraphResult};
use crate::model::tags::StaticTagVocabulary;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Override file name looked up at the vault root.
pub const CONFIG_FILE_NAME: &str = "reductio.toml";

/// Engine tunables for one vault.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Tentative non-bedrock nodes older than this are stale.
    pub stale_after_days: i64,
    /// Absolute ceiling for proof-chain recursion.
    pub max_chain_depth: usize,
    /// Default hop bound for connectivity search.
    pub related_max_hops: usize,
    /// Default result limit for connectivity search.
    pub related_limit: usize,
    /// Holding area for merged members, vault-relative.
    pub holding_dir: PathBuf,
    /// Holding area for undone canonical nodes, vault-relative.
    pub undone_dir: PathBuf,
    /// Controlled tag vocabulary. `None` means no vocabulary is configured.
    pub tags: Option<Vec<String>>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 14,
            max_chain_depth: 100,
            related_max_hops: 3,
            related_limit: 10,
            holding_dir: PathBuf::from(".merged"),
            undone_dir: PathBuf::from(".merged").join("undone"),
            tags: None,
        }
    }
}

impl VaultConfig {
    /// Loads `<vault>/reductio.toml` over the defaults.
    ///
    /// # Errors
    /// - `MalformedRecord` when the file exists but does not parse.
    /// - `StoreUnavailable` when the file exists but cannot be read.
    pub fn load(vault_root: &Path) -> GraphResult<Self> {
        let path = vault_root.join(CONFIG_FILE_NAME);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(GraphError::StoreUnavailable {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })
            }
        };
        Self::from_toml_str(&text).map_err(|message| GraphError::MalformedRecord {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parses override text. Unspecified keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|err| err.to_string())?;
        if config.stale_after_days < 0 {
            return Err("`stale_after_days` must not be negative".to_string());
        }
        if config.max_chain_depth == 0 {
            return Err("`max_chain_depth` must be at least 1".to_string());
        }
        Ok(config)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::days(self.stale_after_days)
    }

    /// Vocabulary built from the configured tag list, if any.
    pub fn vocabulary(&self) -> Option<StaticTagVocabulary> {
        self.tags
            .as_ref()
            .map(|tags| StaticTagVocabulary::new(tags.iter().cloned()))
    }
}

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
