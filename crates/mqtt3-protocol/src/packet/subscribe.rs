use crate::encoding::{decode_string, encode_string, read_u16, read_u8};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::qos::QoS;
use crate::topic::validate_topic_filter;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub filter: String,
    pub qos: QoS,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters.push(TopicFilter {
            filter: filter.into(),
            qos,
        });
        self
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::ProtocolViolation(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for entry in &self.filters {
            encode_string(buf, &entry.filter)?;
            buf.put_u8(entry.qos as u8);
        }
        Ok(())
    }

    /// All-or-nothing: any bad tuple discards the whole packet.
    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.flags != 0x02 {
            return Err(MqttError::ProtocolViolation(format!(
                "invalid SUBSCRIBE flags: expected 0x02, got 0x{:02X}",
                fixed_header.flags
            )));
        }
        let packet_id = read_u16(buf)?;
        if packet_id == 0 {
            return Err(MqttError::ProtocolViolation(
                "SUBSCRIBE packet identifier must be nonzero".to_string(),
            ));
        }

        if !buf.has_remaining() {
            return Err(MqttError::ProtocolViolation(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            validate_topic_filter(&filter)?;
            let qos = QoS::try_from_u8(read_u8(buf)?)?;
            filters.push(TopicFilter { filter, qos });
        }

        Ok(Self { packet_id, filters })
    }
}
