//! Broker configuration with protocol-sensible defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the TCP listener binds to.
    pub listen_host: String,
    pub listen_port: u16,

    /// Upper bound on a packet's Remaining Length; anything larger closes
    /// the connection.
    pub max_packet_size: usize,

    /// A connection is considered dead after `keepalive * multiplier`
    /// seconds without traffic.
    pub keepalive_grace_multiplier: f32,

    /// Interval between `$SYS/broker/...` publications.
    pub stats_publish_interval_secs: u32,

    /// Per-connection outbound queue high-water mark in bytes. Beyond it,
    /// QoS 0 deliveries are dropped and QoS 1/2 deliveries wait for drain.
    pub outbound_highwater_bytes: usize,

    /// Accept CONNECT packets that carry no username.
    pub allow_anonymous: bool,

    /// Capacity of each connection's delivery channel, in messages.
    pub client_channel_capacity: usize,

    /// How long a fresh connection may sit silent before its CONNECT is due.
    pub connect_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 1883,
            max_packet_size: 2 * 1024 * 1024,
            keepalive_grace_multiplier: 1.5,
            stats_publish_interval_secs: 10,
            outbound_highwater_bytes: 16 * 1024 * 1024,
            allow_anonymous: true,
            client_channel_capacity: 10_000,
            connect_timeout_secs: 10,
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:1883");
        assert_eq!(config.max_packet_size, 2 * 1024 * 1024);
        assert!((config.keepalive_grace_multiplier - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.stats_publish_interval_secs, 10);
        assert_eq!(config.outbound_highwater_bytes, 16 * 1024 * 1024);
        assert!(config.allow_anonymous);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: BrokerConfig =
            serde_json::from_str(r#"{"listen_port": 2883, "allow_anonymous": false}"#).unwrap();
        assert_eq!(config.listen_port, 2883);
        assert!(!config.allow_anonymous);
        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.client_channel_capacity, 10_000);
    }
}
