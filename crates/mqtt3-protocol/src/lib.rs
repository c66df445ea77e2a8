//! Sans-I/O MQTT v3.1.1 wire codec.
//!
//! This crate contains everything needed to turn bytes into control packets
//! and back, with no opinion about how those bytes arrive: the fixed-header
//! and Remaining Length framing, the per-packet-type variable-header and
//! payload grammar, topic name/filter validation and matching, and the
//! packet-identifier allocator used by `QoS` 1/2 flows.
//!
//! All decoding is all-or-nothing: a malformed packet yields an error and no
//! partially built value escapes.

#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_lossless)]

pub mod encoding;
pub mod error;
pub mod packet;
pub mod packet_id;
pub mod qos;
pub mod topic;

pub use error::{MqttError, Result};
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use packet_id::PacketIdAllocator;
pub use qos::QoS;
pub use topic::{topic_matches_filter, validate_topic_filter, validate_topic_name};
