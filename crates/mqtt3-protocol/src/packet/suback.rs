use crate::encoding::{read_u16, read_u8};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::qos::QoS;
use bytes::{Buf, BufMut};

/// Per-filter outcome carried in a SUBACK: the granted `QoS` or 0x80.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubAckReturnCode {
    SuccessQos0 = 0x00,
    SuccessQos1 = 0x01,
    SuccessQos2 = 0x02,
    Failure = 0x80,
}

impl SubAckReturnCode {
    #[must_use]
    pub fn from_qos(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::SuccessQos0,
            QoS::AtLeastOnce => Self::SuccessQos1,
            QoS::ExactlyOnce => Self::SuccessQos2,
        }
    }
}

impl TryFrom<u8> for SubAckReturnCode {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::SuccessQos0),
            0x01 => Ok(Self::SuccessQos1),
            0x02 => Ok(Self::SuccessQos2),
            0x80 => Ok(Self::Failure),
            other => Err(MqttError::ProtocolViolation(format!(
                "invalid SUBACK return code: 0x{other:02X}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubAckReturnCode>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            return_codes: Vec::new(),
        }
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.return_codes.is_empty() {
            return Err(MqttError::ProtocolViolation(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for code in &self.return_codes {
            buf.put_u8(*code as u8);
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let packet_id = read_u16(buf)?;
        if !buf.has_remaining() {
            return Err(MqttError::ProtocolViolation(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }
        let mut return_codes = Vec::new();
        while buf.has_remaining() {
            return_codes.push(SubAckReturnCode::try_from(read_u8(buf)?)?);
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use bytes::BytesMut;

    #[test]
    fn test_suback_bytes() {
        let mut suback = SubAckPacket::new(1);
        suback.return_codes = vec![SubAckReturnCode::SuccessQos0];
        let mut buf = BytesMut::new();
        suback.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x90, 0x03, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_suback_with_failure_roundtrip() {
        let mut suback = SubAckPacket::new(9);
        suback.return_codes = vec![SubAckReturnCode::SuccessQos2, SubAckReturnCode::Failure];
        let mut buf = BytesMut::new();
        suback.encode(&mut buf).unwrap();
        let mut cursor = buf.freeze();
        let Packet::SubAck(decoded) = Packet::decode(&mut cursor).unwrap() else {
            panic!("expected SUBACK");
        };
        assert_eq!(decoded, suback);
    }

    #[test]
    fn test_invalid_return_code_rejected() {
        let mut cursor = &[0x90, 0x03, 0x00, 0x01, 0x03][..];
        assert!(matches!(
            Packet::decode(&mut cursor),
            Err(MqttError::ProtocolViolation(_))
        ));
    }
}
