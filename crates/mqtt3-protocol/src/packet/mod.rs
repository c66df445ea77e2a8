//! Control packet framing and the tagged `Packet` variant.
//!
//! The first byte of every packet carries the type in its high nibble and
//! the type-specific flags in the low nibble; a Remaining Length varint
//! follows, then the variable header and payload. Unknown or reserved type
//! nibbles decode to a typed error rather than being dispatched blindly.

mod ack;
mod connack;
mod connect;
mod publish;
mod suback;
mod subscribe;
mod unsubscribe;

pub use ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket};
pub use connack::{ConnAckPacket, ConnectReturnCode};
pub use connect::{ConnectPacket, LastWill, PROTOCOL_LEVEL};
pub use publish::PublishPacket;
pub use suback::{SubAckPacket, SubAckReturnCode};
pub use subscribe::{SubscribePacket, TopicFilter};
pub use unsubscribe::UnsubscribePacket;

use crate::encoding::{decode_remaining_length, encode_remaining_length, read_u8};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// MQTT v3.1.1 control packet types, identified by the high nibble of the
/// first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            other => Err(MqttError::UnknownPacketType(other)),
        }
    }
}

/// Decoded fixed header: type nibble, raw flag nibble, Remaining Length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let byte = read_u8(buf)?;
        let packet_type = PacketType::try_from(byte >> 4)?;
        let flags = byte & 0x0F;
        let remaining_length = decode_remaining_length(buf)?;
        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }
}

/// Common shape of the per-type packet codecs: each encodes its body and the
/// trait assembles the fixed header around it.
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        0
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        let len = u32::try_from(body.len()).map_err(|_| MqttError::LengthTooLarge)?;
        buf.put_u8(((self.packet_type() as u8) << 4) | self.flags());
        encode_remaining_length(buf, len)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// A fully decoded control packet. Every variant carries only the fields
/// that are valid for its type.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Decodes one complete packet from `buf`. The caller must have the
    /// whole frame buffered; a body shorter than the Remaining Length
    /// announces fails with `ShortBuffer`.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Packet> {
        let header = FixedHeader::decode(buf)?;
        let body_len = header.remaining_length as usize;
        if buf.remaining() < body_len {
            return Err(MqttError::ShortBuffer);
        }
        let mut body = buf.copy_to_bytes(body_len);

        let packet = match header.packet_type {
            PacketType::Connect => {
                Packet::Connect(ConnectPacket::decode_body(&mut body, &header)?)
            }
            PacketType::ConnAck => {
                Packet::ConnAck(ConnAckPacket::decode_body(&mut body, &header)?)
            }
            PacketType::Publish => {
                Packet::Publish(PublishPacket::decode_body(&mut body, &header)?)
            }
            PacketType::PubAck => Packet::PubAck(PubAckPacket::decode_body(&mut body, &header)?),
            PacketType::PubRec => Packet::PubRec(PubRecPacket::decode_body(&mut body, &header)?),
            PacketType::PubRel => Packet::PubRel(PubRelPacket::decode_body(&mut body, &header)?),
            PacketType::PubComp => {
                Packet::PubComp(PubCompPacket::decode_body(&mut body, &header)?)
            }
            PacketType::Subscribe => {
                Packet::Subscribe(SubscribePacket::decode_body(&mut body, &header)?)
            }
            PacketType::SubAck => Packet::SubAck(SubAckPacket::decode_body(&mut body, &header)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(UnsubscribePacket::decode_body(&mut body, &header)?)
            }
            PacketType::UnsubAck => {
                Packet::UnsubAck(UnsubAckPacket::decode_body(&mut body, &header)?)
            }
            PacketType::PingReq => {
                Self::expect_empty(&header)?;
                Packet::PingReq
            }
            PacketType::PingResp => {
                Self::expect_empty(&header)?;
                Packet::PingResp
            }
            PacketType::Disconnect => {
                Self::expect_empty(&header)?;
                Packet::Disconnect
            }
        };

        if body.has_remaining() {
            return Err(MqttError::ProtocolViolation(format!(
                "{} bytes of trailing garbage after {:?} body",
                body.remaining(),
                header.packet_type
            )));
        }
        Ok(packet)
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::ConnAck(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::PubAck(p) => p.encode(buf),
            Packet::PubRec(p) => p.encode(buf),
            Packet::PubRel(p) => p.encode(buf),
            Packet::PubComp(p) => p.encode(buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::SubAck(p) => p.encode(buf),
            Packet::Unsubscribe(p) => p.encode(buf),
            Packet::UnsubAck(p) => p.encode(buf),
            Packet::PingReq => {
                buf.put_u8(0xC0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::PingResp => {
                buf.put_u8(0xD0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::Disconnect => {
                buf.put_u8(0xE0);
                buf.put_u8(0x00);
                Ok(())
            }
        }
    }

    fn expect_empty(header: &FixedHeader) -> Result<()> {
        if header.remaining_length != 0 {
            return Err(MqttError::ProtocolViolation(format!(
                "{:?} must have a zero remaining length, got {}",
                header.packet_type, header.remaining_length
            )));
        }
        if header.flags != 0 {
            return Err(MqttError::ProtocolViolation(format!(
                "{:?} must have zero flags, got 0x{:X}",
                header.packet_type, header.flags
            )));
        }
        Ok(())
    }
}

/// Tries to slice one complete frame off the front of `buf` and decode it.
/// Returns `Ok(None)` while the frame is still incomplete; `buf` is only
/// consumed once a whole packet is available. `consumed` is the frame size
/// in bytes.
pub fn try_read_frame(
    buf: &mut BytesMut,
    max_packet_size: usize,
) -> Result<Option<(Packet, usize)>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    // Peek the Remaining Length varint at offset 1 without consuming, so a
    // partial frame stays buffered untouched.
    let mut remaining: u32 = 0;
    let mut multiplier: u32 = 1;
    let mut width = 0usize;
    loop {
        let Some(&byte) = buf.get(1 + width) else {
            return Ok(None);
        };
        width += 1;
        remaining += u32::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            break;
        }
        if width == 4 {
            return Err(MqttError::MalformedVarint);
        }
        multiplier *= 128;
    }

    let body_len = remaining as usize;
    if body_len > max_packet_size {
        return Err(MqttError::PacketTooLarge {
            size: body_len,
            max: max_packet_size,
        });
    }
    let total = 1 + width + body_len;
    if buf.len() < total {
        return Ok(None);
    }

    let mut frame = buf.split_to(total).freeze();
    let packet = Packet::decode(&mut frame)?;
    Ok(Some((packet, total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QoS;
    use bytes::Bytes;

    fn roundtrip(packet: Packet) {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let mut cursor = buf.freeze();
        let decoded = Packet::decode(&mut cursor).unwrap();
        assert!(!cursor.has_remaining());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_every_packet_type_roundtrips() {
        let mut connect = ConnectPacket::new("bench-client");
        connect.keep_alive = 30;
        connect.username = Some("user".to_string());
        connect.password = Some(b"pass".to_vec());
        connect.will = Some(LastWill {
            topic: "down/bench-client".to_string(),
            payload: Bytes::from_static(b"bye"),
            qos: QoS::AtLeastOnce,
            retain: false,
        });
        roundtrip(Packet::Connect(connect));

        roundtrip(Packet::ConnAck(ConnAckPacket::new(
            true,
            ConnectReturnCode::Accepted,
        )));

        let mut publish = PublishPacket::new("a/b", Bytes::from_static(b"hi"), QoS::AtLeastOnce);
        publish.packet_id = Some(42);
        publish.retain = true;
        roundtrip(Packet::Publish(publish));

        roundtrip(Packet::PubAck(PubAckPacket::new(7)));
        roundtrip(Packet::PubRec(PubRecPacket::new(7)));
        roundtrip(Packet::PubRel(PubRelPacket::new(7)));
        roundtrip(Packet::PubComp(PubCompPacket::new(7)));

        let subscribe = SubscribePacket::new(1)
            .add_filter("a/+/c", QoS::AtLeastOnce)
            .add_filter("b/#", QoS::ExactlyOnce);
        roundtrip(Packet::Subscribe(subscribe));

        let mut suback = SubAckPacket::new(1);
        suback.return_codes = vec![
            SubAckReturnCode::SuccessQos1,
            SubAckReturnCode::Failure,
        ];
        roundtrip(Packet::SubAck(suback));

        let unsubscribe = UnsubscribePacket::new(2).add_filter("a/+/c");
        roundtrip(Packet::Unsubscribe(unsubscribe));
        roundtrip(Packet::UnsubAck(UnsubAckPacket::new(2)));

        roundtrip(Packet::PingReq);
        roundtrip(Packet::PingResp);
        roundtrip(Packet::Disconnect);
    }

    #[test]
    fn test_reserved_packet_types_rejected() {
        for first_byte in [0x00u8, 0xF0] {
            let mut cursor = &[first_byte, 0x00][..];
            assert!(matches!(
                Packet::decode(&mut cursor),
                Err(MqttError::UnknownPacketType(_))
            ));
        }
    }

    #[test]
    fn test_nonzero_length_pingreq_rejected() {
        let mut cursor = &[0xC0, 0x01, 0x00][..];
        assert!(matches!(
            Packet::decode(&mut cursor),
            Err(MqttError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_try_read_frame_partial_then_complete() {
        let mut wire = BytesMut::new();
        Packet::PingReq.encode(&mut wire).unwrap();
        let mut publish_bytes = BytesMut::new();
        Packet::Publish(PublishPacket::new(
            "a/b",
            Bytes::from_static(b"payload"),
            QoS::AtMostOnce,
        ))
        .encode(&mut publish_bytes)
        .unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire);
        buf.extend_from_slice(&publish_bytes[..3]);

        let (packet, consumed) = try_read_frame(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(packet, Packet::PingReq);
        assert_eq!(consumed, 2);

        // The PUBLISH is still incomplete; nothing more is consumed.
        assert!(try_read_frame(&mut buf, 1024).unwrap().is_none());
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&publish_bytes[3..]);
        let (packet, _) = try_read_frame(&mut buf, 1024).unwrap().unwrap();
        assert!(matches!(packet, Packet::Publish(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_try_read_frame_enforces_max_packet_size() {
        let mut buf = BytesMut::new();
        // PUBLISH announcing a 2 MiB body.
        buf.extend_from_slice(&[0x30, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(
            try_read_frame(&mut buf, 1024),
            Err(MqttError::PacketTooLarge { .. })
        ));
    }
}
