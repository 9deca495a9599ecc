use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nsc_schemas::FlagPolicy;

pub const DEFAULT_DB_URL_ENV: &str = "NSC_DATABASE_URL";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Typed collector configuration. Missing sections and keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub collector: CollectorSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub flag_policy: FlagPolicy,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flag_policy: FlagPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Name of the env var holding the connection URL.
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url_env: default_url_env(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_url_env() -> String {
    DEFAULT_DB_URL_ENV.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl CollectorConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: CollectorConfig =
            serde_json::from_value(v.clone()).context("invalid collector config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collector.batch_size == 0 {
            bail!("CONFIG_INVALID collector.batch_size must be > 0");
        }
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be > 0");
        }
        let name = self.database.url_env.trim();
        if name.is_empty() {
            bail!("CONFIG_INVALID database.url_env must name an env var");
        }
        if name.contains("://") {
            bail!("CONFIG_INVALID database.url_env must be an env var name, not a URL");
        }
        Ok(())
    }
}
