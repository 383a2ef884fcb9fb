//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NodeError, Result};
use crate::gossip::GossipConfig;
use crate::network::TransportConfig;
use crate::types::ids::DEFAULT_EPOCH_MS;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "GOSSIP_NODE_CONFIG";

/// Full node configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Gossip delivery configuration
    pub gossip: GossipConfig,

    /// Id generation configuration
    pub ids: IdConfig,

    /// Transport configuration
    pub transport: TransportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Id generation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdConfig {
    /// Epoch that generated timestamps count from (ms since Unix epoch)
    pub epoch_ms: i64,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            epoch_ms: DEFAULT_EPOCH_MS,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| NodeError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the file named by `GOSSIP_NODE_CONFIG`, if set.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)).map(Some),
            None => Ok(None),
        }
    }
}
