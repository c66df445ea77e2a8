use crate::encoding::{decode_string, encode_string, read_u16, remaining_length_width};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::qos::QoS;
use crate::topic::validate_topic_name;
use bytes::{Buf, BufMut, Bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    /// Nonzero and present exactly when `qos > 0`.
    pub packet_id: Option<u16>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
        }
    }

    /// Size of the full encoded frame. Stable across packet-id assignment:
    /// a `QoS` > 0 packet is counted with its two id bytes whether or not
    /// the id has been chosen yet.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let mut body = 2 + self.topic_name.len() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            body += 2;
        }
        1 + remaining_length_width(body as u32) + body
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        (u8::from(self.dup) << 3) | ((self.qos as u8) << 1) | u8::from(self.retain)
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic_name)?;
        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                MqttError::ProtocolViolation(
                    "PUBLISH with QoS > 0 requires a packet identifier".to_string(),
                )
            })?;
            buf.put_u16(packet_id);
        }
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let dup = fixed_header.flags & 0x08 != 0;
        let qos = QoS::try_from_u8((fixed_header.flags >> 1) & 0x03)?;
        let retain = fixed_header.flags & 0x01 != 0;
        if dup && qos == QoS::AtMostOnce {
            return Err(MqttError::ProtocolViolation(
                "DUP flag set on a QoS 0 PUBLISH".to_string(),
            ));
        }

        let topic_name = decode_string(buf)?;
        validate_topic_name(&topic_name)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let id = read_u16(buf)?;
            if id == 0 {
                return Err(MqttError::ProtocolViolation(
                    "PUBLISH packet identifier must be nonzero".to_string(),
                ));
            }
            Some(id)
        };

        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Self {
            topic_name,
            packet_id,
            payload,
            qos,
            retain,
            dup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use bytes::BytesMut;

    #[test]
    fn test_qos0_publish_bytes() {
        let publish = PublishPacket::new("a/x/c", Bytes::from_static(b"hi"), QoS::AtMostOnce);
        let mut buf = BytesMut::new();
        publish.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x30, 0x09, 0x00, 0x05, b'a', b'/', b'x', b'/', b'c', b'h', b'i']
        );
        assert_eq!(publish.encoded_len(), buf.len());
    }

    #[test]
    fn test_qos1_roundtrip() {
        let mut publish = PublishPacket::new("sensor/temp", Bytes::from_static(b"23"), QoS::AtLeastOnce);
        publish.packet_id = Some(42);
        publish.dup = true;

        let mut buf = BytesMut::new();
        publish.encode(&mut buf).unwrap();
        assert_eq!(publish.encoded_len(), buf.len());

        let mut cursor = buf.freeze();
        let Packet::Publish(decoded) = Packet::decode(&mut cursor).unwrap() else {
            panic!("expected PUBLISH");
        };
        assert_eq!(decoded, publish);
    }

    #[test]
    fn test_qos_without_packet_id_fails_encode() {
        let publish = PublishPacket::new("a", Bytes::new(), QoS::AtLeastOnce);
        let mut buf = BytesMut::new();
        assert!(publish.encode(&mut buf).is_err());
    }

    #[test]
    fn test_invalid_qos3_rejected() {
        // Flags 0b0110 = QoS 3.
        let mut cursor = &[0x36, 0x05, 0x00, 0x01, b'a', 0x00, 0x01][..];
        assert!(Packet::decode(&mut cursor).is_err());
    }

    #[test]
    fn test_zero_packet_id_rejected() {
        let mut cursor = &[0x32, 0x05, 0x00, 0x01, b'a', 0x00, 0x00][..];
        assert!(matches!(
            Packet::decode(&mut cursor),
            Err(MqttError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        let mut buf = BytesMut::new();
        PublishPacket::new("a/+/c", Bytes::new(), QoS::AtMostOnce)
            .encode(&mut buf)
            .unwrap();
        let mut cursor = buf.freeze();
        assert!(matches!(
            Packet::decode(&mut cursor),
            Err(MqttError::InvalidTopicName(_))
        ));
    }

    #[test]
    fn test_empty_payload_allowed() {
        let publish = PublishPacket::new("retract/me", Bytes::new(), QoS::AtMostOnce);
        let mut buf = BytesMut::new();
        publish.encode(&mut buf).unwrap();
        let mut cursor = buf.freeze();
        let Packet::Publish(decoded) = Packet::decode(&mut cursor).unwrap() else {
            panic!("expected PUBLISH");
        };
        assert!(decoded.payload.is_empty());
    }
}
