use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqttError {
    #[error("buffer too short")]
    ShortBuffer,

    #[error("malformed remaining length varint")]
    MalformedVarint,

    #[error("remaining length exceeds the four-byte encoding limit")]
    LengthTooLarge,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("all 65535 packet identifiers are in flight")]
    InflightExhausted,

    #[error("packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("authentication failed")]
    AuthFailed,

    #[error("invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("keep alive timeout")]
    KeepAliveTimeout,

    #[error("client closed connection")]
    ClientClosed,

    #[error("connection closed by peer")]
    ConnectionClosedByPeer,

    #[error("session taken over by a newer connection")]
    TakenOver,

    #[error("timeout")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MqttError {
    /// True for the error kinds that represent an orderly end of a
    /// connection rather than a fault.
    #[must_use]
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, Self::ClientClosed | Self::ConnectionClosedByPeer)
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MqttError::PacketTooLarge {
            size: 5_000_000,
            max: 2_097_152,
        };
        assert_eq!(
            err.to_string(),
            "packet too large: size 5000000 exceeds maximum 2097152"
        );

        let err = MqttError::UnknownPacketType(15);
        assert_eq!(err.to_string(), "unknown packet type: 15");
    }

    #[test]
    fn test_normal_disconnect_classification() {
        assert!(MqttError::ClientClosed.is_normal_disconnect());
        assert!(MqttError::ConnectionClosedByPeer.is_normal_disconnect());
        assert!(!MqttError::KeepAliveTimeout.is_normal_disconnect());
        assert!(!MqttError::MalformedVarint.is_normal_disconnect());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: MqttError = io_err.into();
        match err {
            MqttError::Io(msg) => assert!(msg.contains("refused")),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
