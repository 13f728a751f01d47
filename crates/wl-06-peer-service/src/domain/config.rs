//! Peer service configuration.

use serde::Deserialize;
use shared_types::{duration_millis, duration_secs};
use std::time::Duration;
use wl_01_dht::DhtConfig;
use wl_05_protocol_engine::EngineConfig;

/// Engine and DHT settings plus the glue between them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeerServiceConfig {
    /// Session protocol engine
    pub engine: EngineConfig,
    /// Discovery
    pub dht: DhtConfig,
    /// Period of the background maintenance loops (default: 1000 ms)
    #[serde(with = "duration_millis")]
    pub maintenance_tick: Duration,
    /// How long a resolved peer address is trusted before asking the DHT
    /// again (default: 300 s)
    #[serde(with = "duration_secs")]
    pub address_cache_ttl: Duration,
}

impl Default for PeerServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            dht: DhtConfig::default(),
            maintenance_tick: Duration::from_millis(1_000),
            address_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl PeerServiceConfig {
    /// Short timers for tests.
    pub fn for_testing() -> Self {
        Self {
            engine: EngineConfig::for_testing(),
            dht: DhtConfig::for_testing(),
            maintenance_tick: Duration::from_millis(50),
            address_cache_ttl: Duration::from_secs(5),
        }
    }
}
