//! Per-connection protocol state machine.
//!
//! A connection moves through three states: awaiting CONNECT, connected,
//! closing. The connected phase is a single select loop multiplexing socket
//! readability, the delivery channel, the keepalive timer, the takeover
//! signal and server shutdown; callbacks never block on I/O beyond their
//! own socket writes.

mod connect;
mod lifecycle;
mod publish;
mod subscribe;

use crate::broker::auth::AuthProvider;
use crate::broker::config::BrokerConfig;
use crate::broker::packet_io;
use crate::broker::router::MessageRouter;
use crate::broker::session::{CloseReason, SessionStore};
use crate::broker::sys_topics::BrokerStats;
use crate::packet::{Packet, PublishPacket};
use crate::{MqttError, Result};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{interval, timeout, Instant};
use tracing::{debug, info, trace, warn};

use self::lifecycle::close_reason;

pub struct ClientHandler {
    stream: TcpStream,
    client_addr: SocketAddr,
    config: Arc<BrokerConfig>,
    router: Arc<MessageRouter>,
    sessions: Arc<SessionStore>,
    auth_provider: Arc<dyn AuthProvider>,
    stats: Arc<BrokerStats>,
    shutdown_rx: broadcast::Receiver<()>,
    clean_session: bool,
    keep_alive: Duration,
    publish_rx: flume::Receiver<PublishPacket>,
    publish_tx: flume::Sender<PublishPacket>,
    outbound_bytes: Arc<AtomicUsize>,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl ClientHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: TcpStream,
        client_addr: SocketAddr,
        config: Arc<BrokerConfig>,
        router: Arc<MessageRouter>,
        sessions: Arc<SessionStore>,
        auth_provider: Arc<dyn AuthProvider>,
        stats: Arc<BrokerStats>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (publish_tx, publish_rx) = flume::bounded(config.client_channel_capacity);
        Self {
            stream,
            client_addr,
            config,
            router,
            sessions,
            auth_provider,
            stats,
            shutdown_rx,
            clean_session: true,
            keep_alive: Duration::ZERO,
            publish_rx,
            publish_tx,
            outbound_bytes: Arc::new(AtomicUsize::new(0)),
            read_buffer: BytesMut::with_capacity(4096),
            write_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Drives the connection until it closes, then settles the session:
    /// unregister, persist or erase, and fire the will when the close
    /// reason calls for it.
    pub async fn run(mut self) -> Result<()> {
        trace!(addr = %self.client_addr, "client handler started");

        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let client_id = match timeout(connect_timeout, self.wait_for_connect()).await {
            Ok(Ok(client_id)) => client_id,
            Ok(Err(err)) => {
                if err.is_normal_disconnect() {
                    debug!(addr = %self.client_addr, "peer left during connect phase");
                } else {
                    warn!(addr = %self.client_addr, error = %err, "connect failed");
                }
                return Err(err);
            }
            Err(_) => {
                warn!(addr = %self.client_addr, "timed out waiting for CONNECT");
                return Err(MqttError::Timeout);
            }
        };

        let (disconnect_tx, mut disconnect_rx) = oneshot::channel();
        self.router.register_client(
            &client_id,
            self.publish_tx.clone(),
            disconnect_tx,
            Arc::clone(&self.outbound_bytes),
        );
        self.stats.client_connected();
        info!(client_id = %client_id, addr = %self.client_addr, "client connected");

        let result = self.connected_loop(&client_id, &mut disconnect_rx).await;
        let reason = close_reason(&result);

        if reason == CloseReason::TakeOver {
            debug!(client_id = %client_id, "skipping unregister, session taken over");
        } else if self.clean_session {
            self.router.unregister_client(&client_id);
        } else {
            self.router.disconnect_client(&client_id);
        }

        if let Some(will) = self.sessions.close(&client_id, reason) {
            info!(client_id = %client_id, topic = %will.topic, "publishing will");
            let mut publish = PublishPacket::new(will.topic, will.payload, will.qos);
            publish.retain = will.retain;
            self.router.route(&publish);
        }

        self.stats.client_disconnected();
        info!(client_id = %client_id, reason = ?reason, "client disconnected");

        match result {
            Err(err) if err.is_normal_disconnect() => Ok(()),
            other => other,
        }
    }

    async fn connected_loop(
        &mut self,
        client_id: &str,
        disconnect_rx: &mut oneshot::Receiver<()>,
    ) -> Result<()> {
        // A revived session first gets its in-flight window retransmitted
        // and its offline queue drained.
        self.resend_inflight(client_id).await?;
        self.drain_parked(client_id).await?;

        let keepalive_enabled = !self.keep_alive.is_zero();
        let grace = if keepalive_enabled {
            self.keep_alive
                .mul_f32(self.config.keepalive_grace_multiplier)
        } else {
            Duration::MAX
        };
        let mut ticker = interval(if keepalive_enabled {
            self.keep_alive
        } else {
            Duration::from_secs(3600)
        });
        ticker.reset();
        let mut last_packet = Instant::now();

        loop {
            tokio::select! {
                read_result = packet_io::read_packet(
                    &mut self.stream,
                    &mut self.read_buffer,
                    self.config.max_packet_size,
                ) => {
                    let (packet, consumed) = read_result?;
                    self.stats.bytes_received(consumed);
                    last_packet = Instant::now();
                    self.handle_packet(client_id, packet).await?;
                }

                delivery = self.publish_rx.recv_async() => {
                    let Ok(publish) = delivery else {
                        return Err(MqttError::Io("delivery channel closed".to_string()));
                    };
                    self.release_outbound(&publish);
                    self.send_publish(client_id, publish).await?;
                    while let Ok(more) = self.publish_rx.try_recv() {
                        self.release_outbound(&more);
                        self.send_publish(client_id, more).await?;
                    }
                    self.drain_parked(client_id).await?;
                }

                _ = ticker.tick(), if keepalive_enabled => {
                    if last_packet.elapsed() > grace {
                        warn!(client_id, "keepalive expired");
                        return Err(MqttError::KeepAliveTimeout);
                    }
                }

                _ = &mut *disconnect_rx => {
                    return Err(MqttError::TakenOver);
                }

                _ = self.shutdown_rx.recv() => {
                    debug!(client_id, "server shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_packet(&mut self, client_id: &str, packet: Packet) -> Result<()> {
        match packet {
            Packet::Connect(_) => Err(MqttError::ProtocolViolation(
                "duplicate CONNECT".to_string(),
            )),
            Packet::Publish(publish) => self.handle_publish(client_id, publish).await,
            Packet::PubAck(ack) => self.handle_puback(client_id, ack.packet_id).await,
            Packet::PubRec(ack) => self.handle_pubrec(client_id, ack.packet_id).await,
            Packet::PubRel(ack) => self.handle_pubrel(client_id, ack.packet_id).await,
            Packet::PubComp(ack) => self.handle_pubcomp(client_id, ack.packet_id).await,
            Packet::Subscribe(subscribe) => self.handle_subscribe(client_id, subscribe).await,
            Packet::Unsubscribe(unsubscribe) => {
                self.handle_unsubscribe(client_id, unsubscribe).await
            }
            Packet::PingReq => self.handle_pingreq().await,
            Packet::Disconnect => self.handle_disconnect(client_id),
            Packet::ConnAck(_) | Packet::SubAck(_) | Packet::UnsubAck(_) | Packet::PingResp => {
                Err(MqttError::ProtocolViolation(format!(
                    "client sent server-side packet {:?}",
                    packet.packet_type()
                )))
            }
        }
    }

    pub(super) async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let written =
            packet_io::write_packet(&mut self.stream, &mut self.write_buffer, packet).await?;
        self.stats.bytes_sent(written);
        Ok(())
    }
}
