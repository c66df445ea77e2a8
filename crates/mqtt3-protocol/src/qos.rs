use crate::error::{MqttError, Result};

/// Quality of Service level of a PUBLISH delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once (fire and forget).
    #[default]
    AtMostOnce = 0,
    /// At least once (PUBACK acknowledged).
    AtLeastOnce = 1,
    /// Exactly once (PUBREC/PUBREL/PUBCOMP dialogue).
    ExactlyOnce = 2,
}

impl QoS {
    pub fn try_from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::ProtocolViolation(format!(
                "invalid QoS value: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(QoS::try_from_u8(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(QoS::try_from_u8(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(QoS::try_from_u8(2).unwrap(), QoS::ExactlyOnce);
        assert!(QoS::try_from_u8(3).is_err());
    }

    #[test]
    fn test_qos_ordering() {
        // Effective delivery QoS is min(publish, granted); Ord makes that a
        // one-liner at the call sites.
        assert_eq!(QoS::ExactlyOnce.min(QoS::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(QoS::AtMostOnce.min(QoS::ExactlyOnce), QoS::AtMostOnce);
    }
}
