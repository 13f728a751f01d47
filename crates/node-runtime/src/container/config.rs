//! # Node Configuration
//!
//! Loaded from a TOML file; every section and field is optional and falls
//! back to its default.
//!
//! ```toml
//! [simulation]
//! nodes = 4
//! large_payload_bytes = 20480
//! run_for_secs = 10
//!
//! [logging]
//! filter = "info,wl_05_protocol_engine=debug"
//!
//! [peer.engine.chunking]
//! threshold = 8192
//! ```
//!
//! `WAVELINK_NODES` and `WAVELINK_RUN_FOR_SECS` override the file.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use wl_06_peer_service::PeerServiceConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Settings shared by every simulated peer.
    pub peer: PeerServiceConfig,
    /// Shape of the simulated mesh and its workload.
    pub simulation: SimulationConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WAVELINK_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(nodes) = lookup("WAVELINK_NODES") {
            self.simulation.nodes = nodes
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("WAVELINK_NODES={nodes}")))?;
        }
        if let Some(secs) = lookup("WAVELINK_RUN_FOR_SECS") {
            self.simulation.run_for_secs = secs
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("WAVELINK_RUN_FOR_SECS={secs}")))?;
        }
        self.validate()
    }

    /// Reject settings the mesh cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.nodes < 2 {
            return Err(ConfigError::Invalid(
                "simulation.nodes must be at least 2".into(),
            ));
        }
        if self.peer.engine.chunking.threshold == 0 {
            return Err(ConfigError::Invalid(
                "peer.engine.chunking.threshold must be positive".into(),
            ));
        }
        if self.peer.dht.k == 0 || self.peer.dht.alpha == 0 {
            return Err(ConfigError::Invalid("peer.dht.k and alpha must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// File is not valid TOML for this structure.
    #[error("Invalid config file: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Simulated mesh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of peers; the first is the bootstrap seed.
    pub nodes: usize,
    /// Size of the payload sent in chunks to the second peer.
    pub large_payload_bytes: usize,
    /// Stop after this many seconds; zero waits for Ctrl+C.
    pub run_for_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 4,
            large_payload_bytes: 20 * 1024,
            run_for_secs: 0,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.simulation.nodes, 4);
        assert_eq!(config.simulation.large_payload_bytes, 20 * 1024);
        assert_eq!(config.logging.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = NodeConfig::parse(
            r#"
            [simulation]
            nodes = 6

            [peer]
            maintenance_tick = 250

            [peer.dht]
            k = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.nodes, 6);
        assert_eq!(config.simulation.run_for_secs, 0);
        assert_eq!(config.peer.maintenance_tick, Duration::from_millis(250));
        assert_eq!(config.peer.dht.k, 8);
        assert_eq!(config.peer.dht.alpha, 3);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_single_node_mesh_rejected() {
        let err = NodeConfig::parse("[simulation]\nnodes = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let err = NodeConfig::parse("[simulation\nnodes = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_reported() {
        let err = NodeConfig::load("/nonexistent/wavelink.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("WAVELINK_NODES", "3"), ("WAVELINK_RUN_FOR_SECS", "5")]);
        let mut config = NodeConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.simulation.nodes, 3);
        assert_eq!(config.simulation.run_for_secs, 5);

        let mut config = NodeConfig::default();
        let err = config
            .apply_overrides(|name| (name == "WAVELINK_NODES").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
