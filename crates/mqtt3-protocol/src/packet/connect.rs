use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string, read_u16, read_u8};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::qos::QoS;
use crate::topic::validate_topic_name;
use bytes::{Buf, BufMut, Bytes};

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_NAME_LEGACY: &str = "MQIsdp";

/// v3.1.1 protocol level carried in the CONNECT variable header.
pub const PROTOCOL_LEVEL: u8 = 4;

/// Message the broker publishes on the client's behalf when the connection
/// ends ungracefully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_name: String,
    pub protocol_level: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<LastWill>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_level: PROTOCOL_LEVEL,
            clean_session: true,
            keep_alive: 60,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(ref will) = self.will {
            flags |= 0x04;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.protocol_name)?;
        buf.put_u8(self.protocol_level);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        encode_string(buf, &self.client_id)?;
        if let Some(ref will) = self.will {
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }
        if let Some(ref username) = self.username {
            encode_string(buf, username)?;
        }
        if let Some(ref password) = self.password {
            encode_binary(buf, password)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != PROTOCOL_NAME && protocol_name != PROTOCOL_NAME_LEGACY {
            return Err(MqttError::ProtocolViolation(format!(
                "unknown protocol name: {protocol_name:?}"
            )));
        }
        // The level is carried as data; the connection layer judges it so a
        // mismatch can still be answered with CONNACK 0x01.
        let protocol_level = read_u8(buf)?;

        let flags = read_u8(buf)?;
        if flags & 0x01 != 0 {
            return Err(MqttError::ProtocolViolation(
                "CONNECT reserved flag bit must be zero".to_string(),
            ));
        }
        let clean_session = flags & 0x02 != 0;
        let will_flag = flags & 0x04 != 0;
        let will_qos = (flags >> 3) & 0x03;
        let will_retain = flags & 0x20 != 0;
        let password_flag = flags & 0x40 != 0;
        let username_flag = flags & 0x80 != 0;

        if !will_flag && (will_qos != 0 || will_retain) {
            return Err(MqttError::ProtocolViolation(
                "will QoS/retain set without will flag".to_string(),
            ));
        }
        if password_flag && !username_flag {
            return Err(MqttError::ProtocolViolation(
                "password flag set without username flag".to_string(),
            ));
        }

        let keep_alive = read_u16(buf)?;
        let client_id = decode_string(buf)?;

        let will = if will_flag {
            let topic = decode_string(buf)?;
            validate_topic_name(&topic)?;
            let payload = Bytes::from(decode_binary(buf)?);
            Some(LastWill {
                topic,
                payload,
                qos: QoS::try_from_u8(will_qos)?,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if username_flag {
            Some(decode_string(buf)?)
        } else {
            None
        };
        let password = if password_flag {
            Some(decode_binary(buf)?)
        } else {
            None
        };

        Ok(Self {
            protocol_name,
            protocol_level,
            clean_session,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }
}
