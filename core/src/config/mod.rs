pub mod settings;

use serde::{Deserialize, Serialize};

use crate::protocol::TopicId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    /// Slots per topic ring buffer.
    pub ring_capacity: usize,
    /// How long a publisher waits on a full ring before the publish fails.
    pub publish_timeout_ms: u64,
    /// Number of ack timeout buckets; an unacked range is scheduled for
    /// redelivery after `timeout_buckets` ticks.
    pub timeout_buckets: u16,
    /// Interval between timeout ticks.
    pub tick_interval_ms: u64,
    /// How long the fan-out loop lingers for more messages before flushing
    /// a partial batch.
    pub flush_linger_ms: u64,
    /// Server heartbeat interval on idle connections.
    pub heartbeat_interval_ms: u64,
    pub max_connections: usize,
    /// Topics created at startup. Clients may still subscribe to topics
    /// registered later.
    pub topics: Vec<TopicId>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9155,
            ring_capacity: 65536,
            publish_timeout_ms: 5000,
            timeout_buckets: 6,
            tick_interval_ms: 1000,
            flush_linger_ms: 5,
            heartbeat_interval_ms: 1000,
            max_connections: 1000,
            topics: vec![0],
        }
    }
}

impl BusConfig {
    /// Validate configuration bounds before the server starts.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.ring_capacity == 0 {
            return Err("ring_capacity must be > 0".to_string());
        }
        if self.timeout_buckets < 2 {
            return Err("timeout_buckets must be >= 2".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be > 0".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        Ok(())
    }
}
