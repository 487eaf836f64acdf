use std::time::Duration;

use langbridge_common::transport::ConnectionConfig;

/// Default listen address (all interfaces, port 8000)
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Configuration for a broker server.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to listen on
    ///
    /// Use port 0 to let the OS pick one.
    /// Default: 0.0.0.0:8000
    pub bind_addr: String,
    /// How long a dispatched call may wait for its Return
    ///
    /// Older calls are failed with `Timeout` and their ids reused.
    /// Default: None (wait until the executor answers or disconnects)
    pub call_expiry: Option<Duration>,
    /// Per-connection queue and frame limits
    pub connection: ConnectionConfig,
}

impl BrokerConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    /// Sets the outbound queue capacity of every connection.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.connection.outbound_capacity = capacity;
        self
    }

    pub fn with_call_expiry(mut self, expiry: Duration) -> Self {
        self.call_expiry = Some(expiry);
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            call_expiry: None,
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use langbridge_common::transport::DEFAULT_OUTBOUND_CAPACITY;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.connection.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert!(config.call_expiry.is_none());
    }

    #[test]
    fn test_builder() {
        let config = BrokerConfig::new("127.0.0.1:0")
            .with_outbound_capacity(8)
            .with_call_expiry(Duration::from_secs(30));
        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.connection.outbound_capacity, 8);
        assert_eq!(config.call_expiry, Some(Duration::from_secs(30)));
    }
}
