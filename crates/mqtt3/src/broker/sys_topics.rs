//! Broker-wide counters and the periodic `$SYS` topic publisher.

use crate::broker::router::MessageRouter;
use crate::packet::PublishPacket;
use crate::QoS;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::trace;

/// Monotonic counters plus the connected-clients gauge.
#[derive(Debug)]
pub struct BrokerStats {
    start: Instant,
    clients_connected: AtomicUsize,
    clients_total: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    publish_dropped: AtomicU64,
}

impl BrokerStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            clients_connected: AtomicUsize::new(0),
            clients_total: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            publish_dropped: AtomicU64::new(0),
        }
    }

    pub fn client_connected(&self) {
        self.clients_connected.fetch_add(1, Ordering::Relaxed);
        self.clients_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        self.clients_connected.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A QoS 0 delivery discarded because the connection was over its
    /// high-water mark.
    pub fn publish_dropped(&self) {
        self.publish_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.clients_connected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.clients_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_received_count(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_sent_count(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_received_count(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_sent_count(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.publish_dropped.load(Ordering::Relaxed)
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically publishes the counters as retained `$SYS/broker/...` topics
/// with decimal string payloads.
pub struct SysTopicsProvider {
    router: Arc<MessageRouter>,
    stats: Arc<BrokerStats>,
    interval: std::time::Duration,
}

impl SysTopicsProvider {
    #[must_use]
    pub fn new(
        router: Arc<MessageRouter>,
        stats: Arc<BrokerStats>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            router,
            stats,
            interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.publish_all(),
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    fn publish_all(&self) {
        let stats = &self.stats;
        let values: [(&str, u64); 7] = [
            ("$SYS/broker/uptime", stats.uptime_secs()),
            (
                "$SYS/broker/clients/connected",
                stats.connected_count() as u64,
            ),
            ("$SYS/broker/clients/total", stats.total_count()),
            ("$SYS/broker/bytes/received", stats.bytes_received_count()),
            ("$SYS/broker/bytes/sent", stats.bytes_sent_count()),
            (
                "$SYS/broker/messages/received",
                stats.messages_received_count(),
            ),
            ("$SYS/broker/messages/sent", stats.messages_sent_count()),
        ];
        trace!("publishing $SYS statistics");
        for (topic, value) in values {
            let mut publish =
                PublishPacket::new(topic, Bytes::from(value.to_string()), QoS::AtMostOnce);
            publish.retain = true;
            self.router.route(&publish);
        }
    }
}
