//! Packet identifier allocation for `QoS` 1/2 outbound flows.

use crate::error::{MqttError, Result};

/// Hands out 16-bit nonzero packet identifiers, advancing monotonically and
/// wrapping past 65535 while skipping ids still held by an in-flight
/// message.
#[derive(Debug, Clone)]
pub struct PacketIdAllocator {
    next: u16,
}

impl PacketIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next free identifier, where `in_flight` reports whether a
    /// candidate is currently taken. Fails with `InflightExhausted` once all
    /// 65535 ids are in use.
    pub fn allocate<F: Fn(u16) -> bool>(&mut self, in_flight: F) -> Result<u16> {
        for _ in 0..u16::MAX {
            let candidate = self.next;
            self.next = if self.next == u16::MAX { 1 } else { self.next + 1 };
            if !in_flight(candidate) {
                return Ok(candidate);
            }
        }
        Err(MqttError::InflightExhausted)
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
