//! CONNECT gating: protocol level, client id rules, the authentication
//! hook, session open and the CONNACK verdict.

use crate::broker::auth::AuthDecision;
use crate::packet::{ConnAckPacket, ConnectPacket, ConnectReturnCode, Packet, PROTOCOL_LEVEL};
use crate::{MqttError, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::ClientHandler;

impl ClientHandler {
    /// Only a CONNECT is acceptable as the first packet; anything else
    /// closes the connection without a response.
    pub(super) async fn wait_for_connect(&mut self) -> Result<String> {
        let (packet, consumed) = crate::broker::packet_io::read_packet(
            &mut self.stream,
            &mut self.read_buffer,
            self.config.max_packet_size,
        )
        .await?;
        self.stats.bytes_received(consumed);

        match packet {
            Packet::Connect(connect) => self.handle_connect(connect).await,
            other => Err(MqttError::ProtocolViolation(format!(
                "expected CONNECT, got {:?}",
                other.packet_type()
            ))),
        }
    }

    async fn handle_connect(&mut self, mut connect: ConnectPacket) -> Result<String> {
        debug!(
            client_id = %connect.client_id,
            addr = %self.client_addr,
            clean_session = connect.clean_session,
            keep_alive = connect.keep_alive,
            "processing CONNECT"
        );

        if connect.protocol_level != PROTOCOL_LEVEL {
            info!(
                level = connect.protocol_level,
                addr = %self.client_addr,
                "rejecting unsupported protocol level"
            );
            self.write_packet(&Packet::ConnAck(ConnAckPacket::new(
                false,
                ConnectReturnCode::UnacceptableProtocolVersion,
            )))
            .await?;
            return Err(MqttError::ProtocolViolation(format!(
                "unsupported protocol level {}",
                connect.protocol_level
            )));
        }

        if connect.client_id.is_empty() {
            if !connect.clean_session {
                self.write_packet(&Packet::ConnAck(ConnAckPacket::new(
                    false,
                    ConnectReturnCode::IdentifierRejected,
                )))
                .await?;
                return Err(MqttError::ProtocolViolation(
                    "zero-length client id requires clean session".to_string(),
                ));
            }
            static COUNTER: AtomicU32 = AtomicU32::new(0);
            let generated = format!("auto-{}", COUNTER.fetch_add(1, Ordering::SeqCst));
            debug!(generated = %generated, "assigned client id for anonymous client");
            connect.client_id = generated;
        }

        let decision = self
            .auth_provider
            .authenticate(
                &connect.client_id,
                connect.username.as_deref(),
                connect.password.as_deref(),
            )
            .await;
        let refusal = match decision {
            AuthDecision::Accept => None,
            AuthDecision::BadUserOrPass => Some(ConnectReturnCode::BadUserOrPassword),
            AuthDecision::NotAuthorized => Some(ConnectReturnCode::NotAuthorized),
        };
        if let Some(return_code) = refusal {
            info!(
                client_id = %connect.client_id,
                return_code = ?return_code,
                "authentication refused"
            );
            self.write_packet(&Packet::ConnAck(ConnAckPacket::new(false, return_code)))
                .await?;
            return Err(MqttError::AuthFailed);
        }

        self.keep_alive = Duration::from_secs(u64::from(connect.keep_alive));
        self.clean_session = connect.clean_session;
        let present = self.sessions.open(
            &connect.client_id,
            connect.clean_session,
            connect.keep_alive,
            connect.will.clone(),
        );

        self.write_packet(&Packet::ConnAck(ConnAckPacket::new(
            present,
            ConnectReturnCode::Accepted,
        )))
        .await?;
        debug!(
            client_id = %connect.client_id,
            session_present = present,
            "sent CONNACK"
        );

        Ok(connect.client_id)
    }
}
