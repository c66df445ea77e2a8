//! Per-client session state and the store that owns it.
//!
//! The store is the sole owner of every session; connections refer to
//! sessions by client id and reach in through [`SessionStore::update`].
//! A clean session lives exactly as long as its connection, a persistent
//! one survives across reconnects carrying subscriptions, the in-flight
//! window and messages queued while offline.

use crate::packet::{LastWill, PublishPacket};
use crate::{PacketIdAllocator, QoS, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Why a connection ended. Only `Graceful` and `TakeOver` suppress the will.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Graceful,
    ProtocolError,
    KeepaliveTimeout,
    MaxRequestSize,
    TakeOver,
    AuthFailed,
    PeerClosed,
    IoError,
}

impl CloseReason {
    #[must_use]
    pub fn fires_will(self) -> bool {
        !matches!(self, CloseReason::Graceful | CloseReason::TakeOver)
    }
}

/// Where an outbound QoS 1/2 message stands in its acknowledgment dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflightPhase {
    /// QoS 1, waiting for PUBACK.
    AwaitingPuback,
    /// QoS 2, waiting for PUBREC.
    AwaitingPubrec,
    /// QoS 2, PUBREL sent, waiting for PUBCOMP.
    AwaitingPubcomp,
}

#[derive(Debug, Clone)]
pub struct InflightMessage {
    pub phase: InflightPhase,
    pub publish: PublishPacket,
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    pub client_id: String,
    pub clean_session: bool,
    pub keepalive_secs: u16,
    pub will: Option<LastWill>,
    /// filter -> granted QoS.
    pub subscriptions: HashMap<String, QoS>,
    pub outbound_inflight: BTreeMap<u16, InflightMessage>,
    /// QoS 2 publishes received and routed, awaiting PUBREL.
    pub inbound_inflight: HashSet<u16>,
    /// Deliveries parked while the client is offline or its connection is
    /// over the high-water mark.
    pub queued: VecDeque<PublishPacket>,
    packet_ids: PacketIdAllocator,
}

impl ClientSession {
    fn new(client_id: &str, clean_session: bool) -> Self {
        Self {
            client_id: client_id.to_string(),
            clean_session,
            keepalive_secs: 0,
            will: None,
            subscriptions: HashMap::new(),
            outbound_inflight: BTreeMap::new(),
            inbound_inflight: HashSet::new(),
            queued: VecDeque::new(),
            packet_ids: PacketIdAllocator::new(),
        }
    }

    /// Next packet id not colliding with the outbound in-flight window.
    pub fn allocate_packet_id(&mut self) -> Result<u16> {
        let outbound = &self.outbound_inflight;
        self.packet_ids.allocate(|id| outbound.contains_key(&id))
    }
}

/// All sessions, keyed by client id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, ClientSession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or revives) the session for a connecting client. A clean
    /// start discards whatever was stored. Returns the `session_present`
    /// flag for the CONNACK.
    pub fn open(
        &self,
        client_id: &str,
        clean_session: bool,
        keepalive_secs: u16,
        will: Option<LastWill>,
    ) -> bool {
        let mut sessions = self.sessions.lock();
        let present = !clean_session && sessions.contains_key(client_id);
        let session = sessions
            .entry(client_id.to_string())
            .and_modify(|existing| {
                if clean_session {
                    *existing = ClientSession::new(client_id, clean_session);
                }
            })
            .or_insert_with(|| ClientSession::new(client_id, clean_session));
        session.clean_session = clean_session;
        session.keepalive_secs = keepalive_secs;
        session.will = will;
        present
    }

    /// Runs `f` against the named session, if it exists.
    pub fn update<R>(&self, client_id: &str, f: impl FnOnce(&mut ClientSession) -> R) -> Option<R> {
        self.sessions.lock().get_mut(client_id).map(f)
    }

    /// Ends a connection's hold on its session. Clean sessions are erased,
    /// persistent ones survive minus their will. Returns the will to
    /// publish when the close reason fires it. A takeover touches nothing:
    /// the superseding connection already owns the entry.
    pub fn close(&self, client_id: &str, reason: CloseReason) -> Option<LastWill> {
        if reason == CloseReason::TakeOver {
            return None;
        }
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(client_id)?;
        let will = if reason.fires_will() {
            session.will.take()
        } else {
            None
        };
        session.will = None;
        let clean = session.clean_session;
        if clean {
            sessions.remove(client_id);
        }
        will
    }

    /// Parks a delivery for later; no-op (returning false) when no session
    /// exists, which is exactly the clean-session-offline drop case.
    pub fn queue_message(&self, client_id: &str, publish: PublishPacket) -> bool {
        self.update(client_id, |session| session.queued.push_back(publish))
            .is_some()
    }

    pub fn take_queued(&self, client_id: &str) -> Vec<PublishPacket> {
        self.update(client_id, |session| session.queued.drain(..).collect())
            .unwrap_or_default()
    }

    /// The outbound in-flight window, for retransmission after reconnect.
    pub fn resend_list(&self, client_id: &str) -> Vec<(u16, InflightMessage)> {
        self.update(client_id, |session| {
            session
                .outbound_inflight
                .iter()
                .map(|(id, message)| (*id, message.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.lock().contains_key(client_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Clone of a session for inspection; mainly for tests.
    #[must_use]
    pub fn snapshot(&self, client_id: &str) -> Option<ClientSession> {
        self.sessions.lock().get(client_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn will(topic: &str) -> LastWill {
        LastWill {
            topic: topic.to_string(),
            payload: Bytes::from_static(b"bye"),
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    #[test]
    fn test_open_fresh_session() {
        let store = SessionStore::new();
        assert!(!store.open("c1", true, 60, None));
        assert!(store.contains("c1"));
    }

    #[test]
    fn test_persistent_session_survives_close() {
        let store = SessionStore::new();
        store.open("c1", false, 60, None);
        store.update("c1", |s| {
            s.subscriptions.insert("a/+".to_string(), QoS::AtLeastOnce);
        });

        store.close("c1", CloseReason::PeerClosed);
        assert!(store.contains("c1"));

        let present = store.open("c1", false, 60, None);
        assert!(present);
        let session = store.snapshot("c1").unwrap();
        assert_eq!(session.subscriptions.get("a/+"), Some(&QoS::AtLeastOnce));
    }

    #[test]
    fn test_clean_session_erased_on_close() {
        let store = SessionStore::new();
        store.open("c1", true, 60, None);
        store.close("c1", CloseReason::Graceful);
        assert!(!store.contains("c1"));
    }

    #[test]
    fn test_clean_start_discards_persisted_state() {
        let store = SessionStore::new();
        store.open("c1", false, 60, None);
        store.update("c1", |s| {
            s.subscriptions.insert("a/+".to_string(), QoS::AtLeastOnce);
        });
        store.close("c1", CloseReason::PeerClosed);

        let present = store.open("c1", true, 60, None);
        assert!(!present);
        assert!(store.snapshot("c1").unwrap().subscriptions.is_empty());
    }

    #[test]
    fn test_will_fired_only_for_ungraceful_reasons() {
        let store = SessionStore::new();

        store.open("c1", true, 60, Some(will("down/c1")));
        assert!(store.close("c1", CloseReason::Graceful).is_none());

        store.open("c1", true, 60, Some(will("down/c1")));
        let fired = store.close("c1", CloseReason::KeepaliveTimeout);
        assert_eq!(fired.unwrap().topic, "down/c1");

        store.open("c1", true, 60, Some(will("down/c1")));
        assert!(store.close("c1", CloseReason::TakeOver).is_none());
    }

    #[test]
    fn test_takeover_close_preserves_entry() {
        let store = SessionStore::new();
        store.open("c1", true, 60, None);
        store.close("c1", CloseReason::TakeOver);
        // The superseding connection still owns a live entry.
        assert!(store.contains("c1"));
    }

    #[test]
    fn test_packet_id_allocation_skips_window() {
        let store = SessionStore::new();
        store.open("c1", false, 60, None);
        let first = store
            .update("c1", ClientSession::allocate_packet_id)
            .unwrap()
            .unwrap();
        assert_eq!(first, 1);

        store.update("c1", |s| {
            let publish = PublishPacket::new("a", Bytes::new(), QoS::AtLeastOnce);
            s.outbound_inflight.insert(
                2,
                InflightMessage {
                    phase: InflightPhase::AwaitingPuback,
                    publish,
                },
            );
        });
        let next = store
            .update("c1", ClientSession::allocate_packet_id)
            .unwrap()
            .unwrap();
        assert_eq!(next, 3);
    }

    #[test]
    fn test_queue_message_requires_session() {
        let store = SessionStore::new();
        let publish = PublishPacket::new("a", Bytes::new(), QoS::AtLeastOnce);
        assert!(!store.queue_message("ghost", publish.clone()));

        store.open("c1", false, 60, None);
        assert!(store.queue_message("c1", publish));
        assert_eq!(store.take_queued("c1").len(), 1);
        assert!(store.take_queued("c1").is_empty());
    }
}
