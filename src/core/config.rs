//! Configuration - Type-safe, validated config

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Exchange connection
    pub exchange: ExchangeConfig,

    /// Trading settings
    pub trading: TradingConfig,

    /// Pending-order reconciliation
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run mode: paper or live
    pub mode: RunMode,

    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// API key (loaded from env if not provided)
    pub api_key: Option<String>,

    /// API secret (loaded from env if not provided)
    pub api_secret: Option<String>,

    /// Use testnet
    pub testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Settlement worker count
    pub workers: usize,

    /// Dispatch queue capacity (0 = unbounded)
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Enable the resting-order reconciler
    pub enabled: bool,

    /// Poll interval in seconds
    pub interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                mode: RunMode::Paper,
                log_level: "info".to_string(),
            },
            exchange: ExchangeConfig {
                api_key: None,
                api_secret: None,
                testnet: true,
            },
            trading: TradingConfig {
                workers: 4,
                queue_capacity: 1024,
            },
            reconcile: ReconcileConfig {
                enabled: true,
                interval_secs: 30,
            },
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &PathBuf) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::core::Error::Config(format!("failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::core::Error::Config(format!("failed to parse config: {}", e)))
    }
}
