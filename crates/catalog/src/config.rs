//! Catalog configuration.
//!
//! [`CatalogConfig`] is deserializable (for embedding in a service config
//! file), buildable with `bon`, and loadable from the process environment.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use xdb_common_catalog::CatalogConfig;
//!
//! let config = CatalogConfig::builder()
//!     .root("/srv/xdb/catalog")
//!     .master_issuer("xdb-master")
//!     .token_leeway(Duration::from_secs(30))
//!     .build();
//! assert!(config.pubkeys_path().ends_with("PUBKEYS.json"));
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xdb_common_authn::DEFAULT_TOKEN_LEEWAY;
use xdb_common_storage::PUBKEYS_FILENAME;

use crate::meter::DEFAULT_METER_LOG_INTERVAL;

/// Catalog root directory.
pub const ENV_CATALOG_ROOT: &str = "XDB_CATALOG_ROOT";
/// Master issuer identifier.
pub const ENV_MASTER_ISSUER: &str = "MASTER_ISSUER";
/// Token `exp` leeway, humantime format (`30s`, `2m`).
pub const ENV_TOKEN_LEEWAY: &str = "XDB_TOKEN_LEEWAY";
/// Calls between usage log lines.
pub const ENV_METER_LOG_INTERVAL: &str = "XDB_METER_LOG_INTERVAL";

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required variable is unset.
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure.
        message: String,
    },
}

/// Configuration for [`Catalog`](crate::Catalog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Catalog root directory. The issuer key file lives here.
    #[builder(into)]
    pub root: PathBuf,

    /// Issuer whose tokens get full read access and may sign commands.
    #[serde(default)]
    #[builder(into)]
    pub master_issuer: Option<String>,

    /// Issuer key file name, relative to `root`.
    #[serde(default = "default_pubkeys_file")]
    #[builder(into, default = default_pubkeys_file())]
    pub pubkeys_file: String,

    /// Allowed clock skew for token expiry.
    #[serde(with = "humantime_serde", default = "default_token_leeway")]
    #[builder(default = DEFAULT_TOKEN_LEEWAY)]
    pub token_leeway: Duration,

    /// Calls between usage log lines per counter; `0` disables them.
    #[serde(default = "default_meter_log_interval")]
    #[builder(default = DEFAULT_METER_LOG_INTERVAL)]
    pub meter_log_interval: u64,
}

fn default_pubkeys_file() -> String {
    PUBKEYS_FILENAME.to_owned()
}

fn default_token_leeway() -> Duration {
    DEFAULT_TOKEN_LEEWAY
}

fn default_meter_log_interval() -> u64 {
    DEFAULT_METER_LOG_INTERVAL
}

impl CatalogConfig {
    /// Full path of the issuer key file.
    #[must_use]
    pub fn pubkeys_path(&self) -> PathBuf {
        self.root.join(&self.pubkeys_file)
    }

    /// Catalog root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `XDB_CATALOG_ROOT` is unset and
    /// [`ConfigError::Invalid`] for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    ///
    /// # Errors
    ///
    /// As for [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let root = lookup(ENV_CATALOG_ROOT)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(ENV_CATALOG_ROOT))?;

        let master_issuer = lookup(ENV_MASTER_ISSUER).filter(|v| !v.is_empty());

        let token_leeway = match lookup(ENV_TOKEN_LEEWAY) {
            Some(raw) => humantime_serde::re::humantime::parse_duration(&raw).map_err(|e| {
                ConfigError::Invalid { name: ENV_TOKEN_LEEWAY, message: e.to_string() }
            })?,
            None => DEFAULT_TOKEN_LEEWAY,
        };

        let meter_log_interval = match lookup(ENV_METER_LOG_INTERVAL) {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: ENV_METER_LOG_INTERVAL,
                message: e.to_string(),
            })?,
            None => DEFAULT_METER_LOG_INTERVAL,
        };

        Ok(Self::builder()
            .root(root)
            .maybe_master_issuer(master_issuer)
            .token_leeway(token_leeway)
            .meter_log_interval(meter_log_interval)
            .build())
    }
}
