//! The five acknowledgment packets whose body is a bare packet identifier.

use crate::encoding::read_u16;
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

macro_rules! define_ack_packet {
    ($(#[$meta:meta])* $name:ident, $packet_type:expr, $flags:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }
        }

        impl MqttPacket for $name {
            fn packet_type(&self) -> PacketType {
                $packet_type
            }

            fn flags(&self) -> u8 {
                $flags
            }

            fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
                buf.put_u16(self.packet_id);
                Ok(())
            }

            fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
                if fixed_header.flags != $flags {
                    return Err(MqttError::ProtocolViolation(format!(
                        "invalid {:?} flags: expected 0x{:02X}, got 0x{:02X}",
                        $packet_type, $flags, fixed_header.flags
                    )));
                }
                if fixed_header.remaining_length != 2 {
                    return Err(MqttError::ProtocolViolation(format!(
                        "{:?} remaining length must be 2, got {}",
                        $packet_type, fixed_header.remaining_length
                    )));
                }
                let packet_id = read_u16(buf)?;
                if packet_id == 0 {
                    return Err(MqttError::ProtocolViolation(format!(
                        "{:?} packet identifier must be nonzero",
                        $packet_type
                    )));
                }
                Ok(Self { packet_id })
            }
        }
    };
}

define_ack_packet! {
    /// QoS 1 publish acknowledgment.
    PubAckPacket, PacketType::PubAck, 0x00
}

define_ack_packet! {
    /// First receiver-side step of the QoS 2 dialogue.
    PubRecPacket, PacketType::PubRec, 0x00
}

define_ack_packet! {
    /// QoS 2 release; the only ack with mandated 0b0010 flags.
    PubRelPacket, PacketType::PubRel, 0x02
}

define_ack_packet! {
    /// Final step of the QoS 2 dialogue.
    PubCompPacket, PacketType::PubComp, 0x00
}

define_ack_packet! {
    /// UNSUBSCRIBE acknowledgment.
    UnsubAckPacket, PacketType::UnsubAck, 0x00
}
