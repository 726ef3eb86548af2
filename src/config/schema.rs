use crate::error::Result;
use crate::layer::RemovePolicy;
use serde::{Deserialize, Serialize};

const MIN_RECLAIM_INTERVAL_MS: u64 = 10;
const MAX_RECLAIM_INTERVAL_MS: u64 = 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub remove_policy: RemovePolicy,
    /// Period of the background reclamation sweep. Zero or unset disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_interval_ms: Option<u64>,
}

impl EngineConfig {
    pub fn get_reclaim_interval_ms(&self) -> u64 {
        self.reclaim_interval_ms
            .unwrap_or_else(super::default_reclaim_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl LogConfig {
    pub fn get_filter(&self) -> String {
        self.filter.clone().unwrap_or_else(super::default_log_filter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

pub fn validate_config(config: &Config) -> Result<()> {
    let interval_ms = config.engine.get_reclaim_interval_ms();

    if interval_ms != 0 && interval_ms < MIN_RECLAIM_INTERVAL_MS {
        eprintln!(
            "Warning: reclaim_interval_ms ({}) is below recommended minimum of {}ms. \
             Sweeps will contend with lookups constantly.",
            interval_ms, MIN_RECLAIM_INTERVAL_MS
        );
    }

    if interval_ms > MAX_RECLAIM_INTERVAL_MS {
        eprintln!(
            "Warning: reclaim_interval_ms ({}) is above recommended maximum of {}ms. \
             Deleted inodes will be held for a long time.",
            interval_ms, MAX_RECLAIM_INTERVAL_MS
        );
    }

    Ok(())
}
