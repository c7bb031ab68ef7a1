//! Configuration types for the RelayMQ client

use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bus address, `host:port`
    pub addr: String,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// How often the ack coalescer flushes pending acknowledgements
    pub ack_flush_interval: Duration,
    /// Pending ack count that forces an early coalescer flush
    pub ack_flush_threshold: usize,
    /// Client heartbeat interval
    pub heartbeat_interval: Duration,
    /// Per-subscription delivery queue depth
    pub subscription_queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:9155".to_string(),
            connection_timeout: Duration::from_secs(30),
            ack_flush_interval: Duration::from_secs(1),
            ack_flush_threshold: 1024,
            heartbeat_interval: Duration::from_secs(1),
            subscription_queue_depth: 1024,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), crate::BusClientError> {
        if self.addr.is_empty() {
            return Err(crate::BusClientError::invalid_config("addr must not be empty"));
        }
        if self.ack_flush_threshold == 0 {
            return Err(crate::BusClientError::invalid_config(
                "ack_flush_threshold must be > 0",
            ));
        }
        if self.subscription_queue_depth == 0 {
            return Err(crate::BusClientError::invalid_config(
                "subscription_queue_depth must be > 0",
            ));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the bus address
    pub fn addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the ack coalescer flush interval
    pub fn ack_flush_interval(mut self, interval: Duration) -> Self {
        self.config.ack_flush_interval = interval;
        self
    }

    /// Set the pending ack count that forces an early flush
    pub fn ack_flush_threshold(mut self, threshold: usize) -> Self {
        self.config.ack_flush_threshold = threshold;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the per-subscription delivery queue depth
    pub fn subscription_queue_depth(mut self, depth: usize) -> Self {
        self.config.subscription_queue_depth = depth;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = ClientConfig::builder()
            .addr("bus.internal:7000")
            .ack_flush_interval(Duration::from_millis(250))
            .ack_flush_threshold(64)
            .build();

        assert_eq!(config.addr, "bus.internal:7000");
        assert_eq!(config.ack_flush_interval, Duration::from_millis(250));
        assert_eq!(config.ack_flush_threshold, 64);
        // Untouched fields keep their defaults.
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_addr_rejected() {
        let config = ClientConfig::builder().addr("").build();
        assert!(config.validate().is_err());
    }
}
