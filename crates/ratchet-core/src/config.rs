use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Floor applied to every lease duration, in seconds. A shorter lease risks
/// duplicate execution when a pass runs long.
pub const MIN_LEASE_SECS: u32 = 60;

/// Name of the global advisory lock that serialises collection passes.
pub const COLLECTOR_LOCK: &str = "jobs-collector";

/// Top-level config (ratchet.toml + RATCHET__* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatchetConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub locks: LockConfig,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            worker: WorkerConfig::default(),
            prune: PruneConfig::default(),
            locks: LockConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum idle sleep between empty collection passes, in seconds.
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
    /// Maximum executions per collection pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sleep_secs: default_sleep_secs(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Job rows unseen for this many days are eligible for removal.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self { retention_days: default_retention_days() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Expiry applied to named advisory locks so a crashed holder self-heals.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { ttl_secs: default_lock_ttl_secs() }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ratchet/ratchet.db", home)
}
fn default_sleep_secs() -> u64 {
    60
}
fn default_batch_size() -> usize {
    25
}
fn default_retention_days() -> u32 {
    30
}
fn default_lock_ttl_secs() -> u64 {
    900
}

impl RatchetConfig {
    /// Load config from a TOML file with RATCHET__* env var overrides
    /// (double underscore separates nesting: RATCHET__WORKER__SLEEP_SECS).
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.ratchet/ratchet.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RatchetConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RATCHET__").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.ratchet/ratchet.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let config = RatchetConfig::load(Some("/nonexistent/ratchet.toml")).unwrap();
        assert_eq!(config.worker.sleep_secs, 60);
        assert_eq!(config.worker.batch_size, 25);
        assert_eq!(config.prune.retention_days, 30);
        assert_eq!(config.locks.ttl_secs, 900);
    }
}
