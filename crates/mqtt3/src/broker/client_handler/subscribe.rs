//! SUBSCRIBE and UNSUBSCRIBE handling.

use crate::packet::{
    Packet, SubAckPacket, SubAckReturnCode, SubscribePacket, UnsubAckPacket, UnsubscribePacket,
};
use crate::Result;
use tracing::debug;

use super::ClientHandler;

impl ClientHandler {
    pub(super) async fn handle_subscribe(
        &mut self,
        client_id: &str,
        subscribe: SubscribePacket,
    ) -> Result<()> {
        let mut return_codes = Vec::with_capacity(subscribe.filters.len());
        let mut retained = Vec::new();

        for entry in &subscribe.filters {
            // Requested QoS is granted as-is; no downgrade policy in play.
            let granted = entry.qos;
            self.router.subscribe(client_id, &entry.filter, granted);
            self.sessions.update(client_id, |session| {
                session.subscriptions.insert(entry.filter.clone(), granted);
            });
            debug!(client_id, filter = %entry.filter, qos = ?granted, "subscribed");

            for mut message in self.router.retained_for_filter(&entry.filter) {
                message.qos = message.qos.min(granted);
                message.retain = true;
                message.packet_id = None;
                message.dup = false;
                retained.push(message);
            }

            return_codes.push(SubAckReturnCode::from_qos(granted));
        }

        let mut suback = SubAckPacket::new(subscribe.packet_id);
        suback.return_codes = return_codes;
        self.write_packet(&Packet::SubAck(suback)).await?;

        // Retained replays follow the SUBACK on the wire.
        for message in retained {
            self.send_publish(client_id, message).await?;
        }
        Ok(())
    }

    pub(super) async fn handle_unsubscribe(
        &mut self,
        client_id: &str,
        unsubscribe: UnsubscribePacket,
    ) -> Result<()> {
        for filter in &unsubscribe.filters {
            let removed = self.router.unsubscribe(client_id, filter);
            if removed {
                self.sessions.update(client_id, |session| {
                    session.subscriptions.remove(filter);
                });
            }
            debug!(client_id, filter = %filter, removed, "unsubscribed");
        }
        self.write_packet(&Packet::UnsubAck(UnsubAckPacket::new(
            unsubscribe.packet_id,
        )))
        .await
    }
}
