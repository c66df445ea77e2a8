//! MQTT v3.1.1 broker.
//!
//! Accepts TCP connections, maintains per-client session state keyed by
//! client identifier, routes PUBLISH messages through a wildcard-aware topic
//! trie and enforces the per-message `QoS` delivery contracts, including
//! retained messages, Last Will and Testament, keepalive supervision and
//! session takeover.
//!
//! ```rust,no_run
//! use mqtt3::broker::{BrokerConfig, MqttBroker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> mqtt3::Result<()> {
//!     let broker = MqttBroker::bind(BrokerConfig::default()).await?;
//!     broker.run().await
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::module_name_repetitions)]

pub mod broker;

pub use broker::{BrokerConfig, CloseReason, MqttBroker};
pub use mqtt3_protocol::{packet, topic, MqttError, PacketIdAllocator, QoS, Result};
