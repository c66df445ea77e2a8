//! PUBLISH handling in both directions and the QoS 1/2 acknowledgment
//! dialogues.

use crate::broker::session::{InflightMessage, InflightPhase};
use crate::packet::{
    Packet, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket,
};
use crate::{MqttError, QoS, Result};
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

use super::ClientHandler;

impl ClientHandler {
    pub(super) async fn handle_publish(
        &mut self,
        client_id: &str,
        publish: PublishPacket,
    ) -> Result<()> {
        self.stats.message_received();
        trace!(
            client_id,
            topic = %publish.topic_name,
            qos = ?publish.qos,
            retain = publish.retain,
            "inbound PUBLISH"
        );

        match publish.qos {
            QoS::AtMostOnce => {
                self.router.route(&publish);
                Ok(())
            }
            QoS::AtLeastOnce => {
                let packet_id = required_packet_id(&publish)?;
                self.router.route(&publish);
                self.write_packet(&Packet::PubAck(PubAckPacket::new(packet_id)))
                    .await
            }
            QoS::ExactlyOnce => {
                let packet_id = required_packet_id(&publish)?;
                // Route only the first delivery of this id; a DUP resend
                // before PUBREL must not reach subscribers again.
                let first_delivery = self
                    .sessions
                    .update(client_id, |session| {
                        session.inbound_inflight.insert(packet_id)
                    })
                    .unwrap_or(false);
                if first_delivery {
                    self.router.route(&publish);
                } else {
                    debug!(client_id, packet_id, "suppressing QoS 2 redelivery");
                }
                self.write_packet(&Packet::PubRec(PubRecPacket::new(packet_id)))
                    .await
            }
        }
    }

    pub(super) async fn handle_puback(&mut self, client_id: &str, packet_id: u16) -> Result<()> {
        let released = self
            .sessions
            .update(client_id, |session| {
                let awaiting = matches!(
                    session.outbound_inflight.get(&packet_id),
                    Some(message) if message.phase == InflightPhase::AwaitingPuback
                );
                if awaiting {
                    session.outbound_inflight.remove(&packet_id);
                }
                awaiting
            })
            .unwrap_or(false);

        if released {
            trace!(client_id, packet_id, "QoS 1 delivery acknowledged");
            self.drain_parked(client_id).await?;
        } else {
            debug!(client_id, packet_id, "PUBACK for unknown packet id");
        }
        Ok(())
    }

    pub(super) async fn handle_pubrec(&mut self, client_id: &str, packet_id: u16) -> Result<()> {
        self.sessions.update(client_id, |session| {
            if let Some(message) = session.outbound_inflight.get_mut(&packet_id) {
                message.phase = InflightPhase::AwaitingPubcomp;
            }
        });
        self.write_packet(&Packet::PubRel(PubRelPacket::new(packet_id)))
            .await
    }

    pub(super) async fn handle_pubrel(&mut self, client_id: &str, packet_id: u16) -> Result<()> {
        let known = self
            .sessions
            .update(client_id, |session| {
                session.inbound_inflight.remove(&packet_id)
            })
            .unwrap_or(false);
        if !known {
            debug!(client_id, packet_id, "PUBREL for unknown packet id");
        }
        // PUBCOMP goes out either way.
        self.write_packet(&Packet::PubComp(PubCompPacket::new(packet_id)))
            .await
    }

    pub(super) async fn handle_pubcomp(&mut self, client_id: &str, packet_id: u16) -> Result<()> {
        let released = self
            .sessions
            .update(client_id, |session| {
                session.outbound_inflight.remove(&packet_id).is_some()
            })
            .unwrap_or(false);
        if released {
            trace!(client_id, packet_id, "QoS 2 delivery completed");
            self.drain_parked(client_id).await?;
        } else {
            debug!(client_id, packet_id, "PUBCOMP for unknown packet id");
        }
        Ok(())
    }

    /// Writes one outbound PUBLISH; QoS 1/2 get a packet id and an
    /// in-flight record first.
    pub(super) async fn send_publish(
        &mut self,
        client_id: &str,
        mut publish: PublishPacket,
    ) -> Result<()> {
        if publish.qos != QoS::AtMostOnce {
            let phase = if publish.qos == QoS::AtLeastOnce {
                InflightPhase::AwaitingPuback
            } else {
                InflightPhase::AwaitingPubrec
            };
            let allocated = self.sessions.update(client_id, |session| {
                let packet_id = session.allocate_packet_id()?;
                session.outbound_inflight.insert(
                    packet_id,
                    InflightMessage {
                        phase,
                        publish: publish.clone(),
                    },
                );
                Ok::<u16, MqttError>(packet_id)
            });
            match allocated {
                Some(Ok(packet_id)) => publish.packet_id = Some(packet_id),
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(MqttError::Io(format!(
                        "session for {client_id} vanished mid-delivery"
                    )))
                }
            }
        }

        trace!(
            client_id,
            topic = %publish.topic_name,
            qos = ?publish.qos,
            packet_id = ?publish.packet_id,
            "outbound PUBLISH"
        );
        self.write_packet(&Packet::Publish(publish)).await?;
        self.stats.message_sent();
        Ok(())
    }

    /// Retransmits the persisted in-flight window after a reconnect.
    pub(super) async fn resend_inflight(&mut self, client_id: &str) -> Result<()> {
        for (packet_id, inflight) in self.sessions.resend_list(client_id) {
            match inflight.phase {
                InflightPhase::AwaitingPuback | InflightPhase::AwaitingPubrec => {
                    let mut publish = inflight.publish;
                    publish.packet_id = Some(packet_id);
                    publish.dup = true;
                    debug!(client_id, packet_id, "retransmitting in-flight PUBLISH");
                    self.write_packet(&Packet::Publish(publish)).await?;
                    self.stats.message_sent();
                }
                InflightPhase::AwaitingPubcomp => {
                    debug!(client_id, packet_id, "retransmitting PUBREL");
                    self.write_packet(&Packet::PubRel(PubRelPacket::new(packet_id)))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Sends deliveries parked in the session queue (offline spillover or
    /// high-water backpressure).
    pub(super) async fn drain_parked(&mut self, client_id: &str) -> Result<()> {
        loop {
            let next = self
                .sessions
                .update(client_id, |session| session.queued.pop_front())
                .flatten();
            let Some(publish) = next else { break };
            self.send_publish(client_id, publish).await?;
        }
        Ok(())
    }

    pub(super) fn release_outbound(&self, publish: &PublishPacket) {
        self.outbound_bytes
            .fetch_sub(publish.encoded_len(), Ordering::Relaxed);
    }
}

fn required_packet_id(publish: &PublishPacket) -> Result<u16> {
    publish.packet_id.ok_or_else(|| {
        MqttError::ProtocolViolation("QoS > 0 PUBLISH without packet identifier".to_string())
    })
}
