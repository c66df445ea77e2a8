//! Subscription management and `$SYS` visibility over the wire.

mod common;

use bytes::Bytes;
use common::{start_broker, start_broker_with, test_config, RawClient};
use mqtt3::broker::BrokerConfig;
use mqtt3::packet::{Packet, PublishPacket, UnsubscribePacket};
use mqtt3::QoS;
use std::time::Duration;

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let broker = start_broker().await;

    let mut subscriber = RawClient::open(broker.addr).await;
    subscriber.connect("fickle", true).await;
    subscriber.subscribe(1, "t/+", QoS::AtMostOnce).await;

    subscriber
        .send(&Packet::Unsubscribe(
            UnsubscribePacket::new(2).add_filter("t/+"),
        ))
        .await;
    match subscriber.read_packet().await {
        Packet::UnsubAck(unsuback) => assert_eq!(unsuback.packet_id, 2),
        other => panic!("expected UNSUBACK, got {other:?}"),
    }

    let mut publisher = RawClient::open(broker.addr).await;
    publisher.connect("pub", true).await;
    publisher
        .send(&Packet::Publish(PublishPacket::new(
            "t/x",
            Bytes::from_static(b"nope"),
            QoS::AtMostOnce,
        )))
        .await;

    subscriber.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn unsubscribe_unknown_filter_still_acked() {
    let broker = start_broker().await;
    let mut client = RawClient::open(broker.addr).await;
    client.connect("c", true).await;

    client
        .send(&Packet::Unsubscribe(
            UnsubscribePacket::new(9).add_filter("never/was"),
        ))
        .await;
    match client.read_packet().await {
        Packet::UnsubAck(unsuback) => assert_eq!(unsuback.packet_id, 9),
        other => panic!("expected UNSUBACK, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_filters_deliver_once() {
    let broker = start_broker().await;

    let mut subscriber = RawClient::open(broker.addr).await;
    subscriber.connect("greedy", true).await;
    subscriber.subscribe(1, "o/#", QoS::AtMostOnce).await;
    subscriber.subscribe(2, "o/+", QoS::AtMostOnce).await;

    let mut publisher = RawClient::open(broker.addr).await;
    publisher.connect("pub", true).await;
    publisher
        .send(&Packet::Publish(PublishPacket::new(
            "o/x",
            Bytes::from_static(b"one"),
            QoS::AtMostOnce,
        )))
        .await;

    let delivery = subscriber.expect_publish().await;
    assert_eq!(&delivery.payload[..], b"one");
    subscriber.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn sys_topics_published_to_dollar_subscribers_only() {
    let config = BrokerConfig {
        stats_publish_interval_secs: 1,
        ..test_config()
    };
    let broker = start_broker_with(config).await;

    let mut wildcard = RawClient::open(broker.addr).await;
    wildcard.connect("wildcard", true).await;
    wildcard.subscribe(1, "#", QoS::AtMostOnce).await;

    let mut sys_watcher = RawClient::open(broker.addr).await;
    sys_watcher.connect("sys", true).await;
    sys_watcher
        .subscribe(1, "$SYS/broker/clients/connected", QoS::AtMostOnce)
        .await;

    // The retained replay may predate our connections; within a couple of
    // stats cycles the gauge settles at 2.
    let mut connected = 0u64;
    for _ in 0..4 {
        let delivery = sys_watcher.expect_publish().await;
        assert_eq!(delivery.topic_name, "$SYS/broker/clients/connected");
        connected = std::str::from_utf8(&delivery.payload)
            .unwrap()
            .parse()
            .unwrap();
        if connected == 2 {
            break;
        }
    }
    assert_eq!(connected, 2);

    // The bare `#` subscriber never sees `$SYS` traffic.
    wildcard.expect_silence(Duration::from_millis(1500)).await;
}

#[tokio::test]
async fn sys_uptime_is_retained_for_late_subscribers() {
    let config = BrokerConfig {
        stats_publish_interval_secs: 1,
        ..test_config()
    };
    let broker = start_broker_with(config).await;

    // Let at least one stats cycle land.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let mut late = RawClient::open(broker.addr).await;
    late.connect("late", true).await;
    late.subscribe(1, "$SYS/broker/uptime", QoS::AtMostOnce)
        .await;

    let delivery = late.expect_publish().await;
    assert_eq!(delivery.topic_name, "$SYS/broker/uptime");
    assert!(delivery.retain);
    assert!(std::str::from_utf8(&delivery.payload).unwrap().parse::<u64>().is_ok());
}
