//! Shared plumbing for wire-level broker tests: an in-process broker on an
//! ephemeral port and a raw packet-speaking TCP client.

#![allow(dead_code)]

use bytes::BytesMut;
use mqtt3::broker::{BrokerConfig, MqttBroker};
use mqtt3::packet::{
    try_read_frame, ConnAckPacket, ConnectPacket, LastWill, Packet, PublishPacket,
    SubAckPacket, SubscribePacket,
};
use mqtt3::{MqttError, QoS, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestBroker {
    pub addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

pub async fn start_broker() -> TestBroker {
    start_broker_with(test_config()).await
}

pub async fn start_broker_with(config: BrokerConfig) -> TestBroker {
    let broker = MqttBroker::bind(config).await.expect("bind broker");
    let addr = broker.local_addr().expect("local addr");
    let shutdown = broker.shutdown_handle();
    tokio::spawn(broker.run());
    TestBroker { addr, shutdown }
}

pub fn test_config() -> BrokerConfig {
    BrokerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: 0,
        // Keep the periodic $SYS chatter out of short tests.
        stats_publish_interval_secs: 3600,
        ..BrokerConfig::default()
    }
}

/// Minimal packet-speaking client over a plain TCP stream.
pub struct RawClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl RawClient {
    pub async fn open(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        stream.set_nodelay(true).expect("nodelay");
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub async fn send(&mut self, packet: &Packet) {
        let mut out = BytesMut::new();
        packet.encode(&mut out).expect("encode");
        self.stream.write_all(&out).await.expect("write");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write raw");
    }

    /// Reads exactly `n` raw bytes, for byte-exact assertions.
    pub async fn read_raw(&mut self, n: usize) -> Vec<u8> {
        while self.buf.len() < n {
            let read = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("read timed out")
                .expect("read");
            assert!(read > 0, "connection closed while awaiting raw bytes");
        }
        self.buf.split_to(n).to_vec()
    }

    pub async fn try_read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some((packet, _)) = try_read_frame(&mut self.buf, 1024 * 1024)? {
                return Ok(packet);
            }
            let read = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .map_err(|_| MqttError::Timeout)??;
            if read == 0 {
                return Err(MqttError::ConnectionClosedByPeer);
            }
        }
    }

    pub async fn read_packet(&mut self) -> Packet {
        self.try_read_packet().await.expect("read packet")
    }

    /// True when the broker closes the connection without sending anything
    /// further.
    pub async fn expect_closed(&mut self) -> bool {
        matches!(
            self.try_read_packet().await,
            Err(MqttError::ConnectionClosedByPeer)
        )
    }

    pub async fn connect(&mut self, client_id: &str, clean_session: bool) -> ConnAckPacket {
        self.connect_full(client_id, clean_session, 60, None).await
    }

    pub async fn connect_full(
        &mut self,
        client_id: &str,
        clean_session: bool,
        keep_alive: u16,
        will: Option<LastWill>,
    ) -> ConnAckPacket {
        let mut connect = ConnectPacket::new(client_id);
        connect.clean_session = clean_session;
        connect.keep_alive = keep_alive;
        connect.will = will;
        self.send(&Packet::Connect(connect)).await;
        match self.read_packet().await {
            Packet::ConnAck(connack) => connack,
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    pub async fn subscribe(&mut self, packet_id: u16, filter: &str, qos: QoS) -> SubAckPacket {
        self.send(&Packet::Subscribe(
            SubscribePacket::new(packet_id).add_filter(filter, qos),
        ))
        .await;
        match self.read_packet().await {
            Packet::SubAck(suback) => suback,
            other => panic!("expected SUBACK, got {other:?}"),
        }
    }

    pub async fn expect_publish(&mut self) -> PublishPacket {
        match self.read_packet().await {
            Packet::Publish(publish) => publish,
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    /// Asserts nothing arrives within a short quiet window.
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = timeout(window, self.stream.read_buf(&mut self.buf)).await;
        match result {
            Err(_) => {}
            Ok(Ok(0)) => {}
            Ok(read) => panic!("expected silence, got {read:?} more bytes"),
        }
        assert!(
            self.buf.is_empty(),
            "expected silence, buffered {:?}",
            &self.buf[..]
        );
    }
}
