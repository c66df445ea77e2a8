use crate::encoding::{decode_string, encode_string, read_u16};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::topic::validate_topic_filter;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl UnsubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }
}

impl MqttPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::ProtocolViolation(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for filter in &self.filters {
            encode_string(buf, filter)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.flags != 0x02 {
            return Err(MqttError::ProtocolViolation(format!(
                "invalid UNSUBSCRIBE flags: expected 0x02, got 0x{:02X}",
                fixed_header.flags
            )));
        }
        let packet_id = read_u16(buf)?;
        if packet_id == 0 {
            return Err(MqttError::ProtocolViolation(
                "UNSUBSCRIBE packet identifier must be nonzero".to_string(),
            ));
        }
        if !buf.has_remaining() {
            return Err(MqttError::ProtocolViolation(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            validate_topic_filter(&filter)?;
            filters.push(filter);
        }
        Ok(Self { packet_id, filters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use bytes::BytesMut;

    #[test]
    fn test_unsubscribe_roundtrip() {
        let unsubscribe = UnsubscribePacket::new(5)
            .add_filter("a/+/c")
            .add_filter("b/#");
        let mut buf = BytesMut::new();
        unsubscribe.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0xA2);

        let mut cursor = buf.freeze();
        let Packet::Unsubscribe(decoded) = Packet::decode(&mut cursor).unwrap() else {
            panic!("expected UNSUBSCRIBE");
        };
        assert_eq!(decoded, unsubscribe);
    }

    #[test]
    fn test_empty_filter_list_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(5);
        let header = FixedHeader {
            packet_type: PacketType::Unsubscribe,
            flags: 0x02,
            remaining_length: 2,
        };
        let mut cursor = buf.freeze();
        assert!(UnsubscribePacket::decode_body(&mut cursor, &header).is_err());
    }
}
