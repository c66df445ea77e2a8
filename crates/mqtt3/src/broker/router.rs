//! Message routing between clients.
//!
//! The router owns the subscription/retained trie and the registry of
//! connected clients. A PUBLISH is matched against the trie, collapsed to
//! one delivery per client at the highest granted `QoS` among its matching
//! filters, downgraded to `min(publish, granted)` and handed to the
//! target's delivery channel. Offline persistent sessions get their QoS 1/2
//! traffic parked in the session store instead.

use crate::broker::session::SessionStore;
use crate::broker::sys_topics::BrokerStats;
use crate::broker::trie::TopicTrie;
use crate::packet::PublishPacket;
use crate::QoS;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// A connected client as the router sees it.
struct ClientInfo {
    sender: flume::Sender<PublishPacket>,
    /// Signalled when a newer connection takes the client id over.
    disconnect_tx: oneshot::Sender<()>,
    /// Bytes sitting in the delivery channel, not yet written to the socket.
    outbound_bytes: Arc<AtomicUsize>,
}

pub struct MessageRouter {
    trie: RwLock<TopicTrie>,
    clients: RwLock<HashMap<String, ClientInfo>>,
    sessions: Arc<SessionStore>,
    stats: Arc<BrokerStats>,
    outbound_highwater_bytes: usize,
}

impl MessageRouter {
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        stats: Arc<BrokerStats>,
        outbound_highwater_bytes: usize,
    ) -> Self {
        Self {
            trie: RwLock::new(TopicTrie::new()),
            clients: RwLock::new(HashMap::new()),
            sessions,
            stats,
            outbound_highwater_bytes,
        }
    }

    /// Registers a connection; a live connection under the same client id
    /// is told to disconnect first. Returns whether a takeover happened.
    pub fn register_client(
        &self,
        client_id: &str,
        sender: flume::Sender<PublishPacket>,
        disconnect_tx: oneshot::Sender<()>,
        outbound_bytes: Arc<AtomicUsize>,
    ) -> bool {
        let mut clients = self.clients.write();
        let took_over = match clients.remove(client_id) {
            Some(old) => {
                info!(client_id, "client id takeover");
                let _ = old.disconnect_tx.send(());
                true
            }
            None => false,
        };
        clients.insert(
            client_id.to_string(),
            ClientInfo {
                sender,
                disconnect_tx,
                outbound_bytes,
            },
        );
        debug!(client_id, "registered client");
        took_over
    }

    /// Drops the connection but keeps subscriptions (persistent session).
    pub fn disconnect_client(&self, client_id: &str) {
        self.clients.write().remove(client_id);
        debug!(client_id, "disconnected client, subscriptions kept");
    }

    /// Drops the connection and every subscription (clean session).
    pub fn unregister_client(&self, client_id: &str) {
        self.clients.write().remove(client_id);
        self.trie.write().remove_client(client_id);
        debug!(client_id, "unregistered client");
    }

    /// Returns true when the subscription is new rather than a QoS update.
    pub fn subscribe(&self, client_id: &str, filter: &str, qos: QoS) -> bool {
        self.trie.write().subscribe(filter, client_id, qos)
    }

    pub fn unsubscribe(&self, client_id: &str, filter: &str) -> bool {
        self.trie.write().unsubscribe(filter, client_id)
    }

    /// Retained messages a fresh subscription to `filter` should receive.
    #[must_use]
    pub fn retained_for_filter(&self, filter: &str) -> Vec<PublishPacket> {
        self.trie.read().retained_matching(filter)
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Routes one PUBLISH: updates the retained store when asked to, then
    /// delivers to every matching subscriber exactly once.
    pub fn route(&self, publish: &PublishPacket) {
        trace!(topic = %publish.topic_name, qos = ?publish.qos, "routing message");

        if publish.retain {
            let mut trie = self.trie.write();
            if publish.payload.is_empty() {
                trie.set_retained(&publish.topic_name, None);
                debug!(topic = %publish.topic_name, "cleared retained message");
            } else {
                let mut stored = publish.clone();
                stored.packet_id = None;
                stored.dup = false;
                trie.set_retained(&publish.topic_name, Some(stored));
                debug!(topic = %publish.topic_name, "stored retained message");
            }
        }

        let matched = self.trie.read().matches(&publish.topic_name);
        if matched.is_empty() {
            return;
        }

        // A client matching through several filters is delivered to once,
        // at the highest granted QoS among them.
        let mut granted: HashMap<String, QoS> = HashMap::new();
        for subscriber in matched {
            granted
                .entry(subscriber.client_id)
                .and_modify(|qos| *qos = (*qos).max(subscriber.qos))
                .or_insert(subscriber.qos);
        }

        let clients = self.clients.read();
        for (client_id, sub_qos) in granted {
            let mut message = publish.clone();
            message.qos = publish.qos.min(sub_qos);
            // Live routing clears the flag; only the subscribe-time replay
            // of the retained store keeps it set.
            message.retain = false;
            message.dup = false;
            message.packet_id = None;
            self.deliver(&clients, &client_id, message);
        }
    }

    fn deliver(
        &self,
        clients: &HashMap<String, ClientInfo>,
        client_id: &str,
        message: PublishPacket,
    ) {
        let Some(info) = clients.get(client_id) else {
            // Offline. Persistent sessions keep QoS 1/2 for later, clean
            // sessions (no stored entry) silently lose the message.
            if message.qos != QoS::AtMostOnce && self.sessions.queue_message(client_id, message) {
                debug!(client_id, "queued message for offline client");
            }
            return;
        };

        let size = message.encoded_len();
        let queued_bytes = info.outbound_bytes.load(Ordering::Relaxed);
        if queued_bytes + size > self.outbound_highwater_bytes {
            if message.qos == QoS::AtMostOnce {
                self.stats.publish_dropped();
                warn!(
                    client_id,
                    queued_bytes, "over high-water mark, dropping QoS 0 delivery"
                );
            } else {
                // QoS 1/2 waits for the window to drain.
                self.sessions.queue_message(client_id, message);
            }
            return;
        }

        info.outbound_bytes.fetch_add(size, Ordering::Relaxed);
        if let Err(err) = info.sender.try_send(message) {
            info.outbound_bytes.fetch_sub(size, Ordering::Relaxed);
            let message = err.into_inner();
            if message.qos == QoS::AtMostOnce {
                self.stats.publish_dropped();
                warn!(client_id, "delivery channel full, dropping QoS 0 message");
            } else {
                self.sessions.queue_message(client_id, message);
            }
        }
    }
}
