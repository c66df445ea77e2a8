//! Connection lifecycle odds and ends: ping, graceful disconnect, and the
//! mapping from a loop outcome to a close reason.

use crate::broker::session::CloseReason;
use crate::packet::Packet;
use crate::{MqttError, Result};
use tracing::{debug, trace};

use super::ClientHandler;

impl ClientHandler {
    pub(super) async fn handle_pingreq(&mut self) -> Result<()> {
        trace!("PINGREQ");
        self.write_packet(&Packet::PingResp).await
    }

    /// DISCONNECT retires the will before the connection winds down.
    pub(super) fn handle_disconnect(&mut self, client_id: &str) -> Result<()> {
        debug!(client_id, "graceful DISCONNECT");
        self.sessions.update(client_id, |session| {
            session.will = None;
        });
        Err(MqttError::ClientClosed)
    }
}

/// Collapses the connected-loop outcome into the close reason that decides
/// will firing and session retention.
pub(super) fn close_reason(result: &Result<()>) -> CloseReason {
    match result {
        Ok(()) | Err(MqttError::ClientClosed) => CloseReason::Graceful,
        Err(MqttError::TakenOver) => CloseReason::TakeOver,
        Err(MqttError::KeepAliveTimeout) => CloseReason::KeepaliveTimeout,
        Err(MqttError::ConnectionClosedByPeer) => CloseReason::PeerClosed,
        Err(MqttError::PacketTooLarge { .. }) => CloseReason::MaxRequestSize,
        Err(MqttError::AuthFailed) => CloseReason::AuthFailed,
        Err(MqttError::Io(_) | MqttError::Timeout) => CloseReason::IoError,
        Err(_) => CloseReason::ProtocolError,
    }
}
