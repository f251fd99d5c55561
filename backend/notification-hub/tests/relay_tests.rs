//! Relay routing through the in-memory bus

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use notification_hub::hub::{ChannelConnection, OutboundFrame};
use notification_hub::relay::{InMemoryBus, MessageBus, PayloadStream};
use notification_hub::{HubError, NotificationHub, NotificationPublisher, NotificationRelay};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const CHANNEL: &str = "notifications";

async fn wait_for_subscriber(bus: &InMemoryBus) {
    for _ in 0..100 {
        if bus.subscriber_count(CHANNEL).await >= 1 {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("relay never subscribed");
}

/// Bus whose first subscription fails and whose second ends after one
/// payload; later subscriptions go to an in-memory bus
struct FlakyBus {
    inner: InMemoryBus,
    subscribes: AtomicUsize,
    first_payload: String,
}

impl FlakyBus {
    fn new(first_payload: &str) -> Self {
        Self {
            inner: InMemoryBus::new(),
            subscribes: AtomicUsize::new(0),
            first_payload: first_payload.to_string(),
        }
    }

    fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for FlakyBus {
    async fn publish(&self, channel: &str, payload: String) -> notification_hub::Result<usize> {
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> notification_hub::Result<PayloadStream> {
        match self.subscribes.fetch_add(1, Ordering::SeqCst) {
            0 => Err(HubError::SendFailed("bus unavailable".into())),
            1 => Ok(stream::iter(vec![self.first_payload.clone()]).boxed()),
            _ => self.inner.subscribe(channel).await,
        }
    }
}

/// Bus that never accepts a subscription
#[derive(Default)]
struct DownBus {
    subscribes: AtomicUsize,
}

#[async_trait]
impl MessageBus for DownBus {
    async fn publish(&self, _channel: &str, _payload: String) -> notification_hub::Result<usize> {
        Ok(0)
    }

    async fn subscribe(&self, _channel: &str) -> notification_hub::Result<PayloadStream> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Err(HubError::SendFailed("bus unavailable".into()))
    }
}

async fn recv_text(rx: &mut mpsc::Receiver<OutboundFrame>) -> String {
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(OutboundFrame::Text(text))) => text.to_string(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

async fn recv_json(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
    serde_json::from_str(&recv_text(rx).await).unwrap()
}

async fn connect(hub: &NotificationHub, user_id: i64) -> mpsc::Receiver<OutboundFrame> {
    let (connection, rx) = ChannelConnection::new(16);
    hub.register(user_id, Arc::new(connection)).await;
    rx
}

#[tokio::test]
async fn test_relay_delivers_payload_verbatim() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());
    let mut rx = connect(&hub, 7).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL).spawn();
    wait_for_subscriber(&bus).await;

    bus.publish(CHANNEL, r#"{"user_id":7,"foo":"bar"}"#.to_string())
        .await
        .unwrap();

    assert_eq!(recv_json(&mut rx).await, json!({"user_id": 7, "foo": "bar"}));

    relay.stop().await;
}

#[tokio::test]
async fn test_relay_keeps_payload_text() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());
    let mut rx = connect(&hub, 1).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL).spawn();
    wait_for_subscriber(&bus).await;

    let raw = r#"{"user_id":1,"n":1,"amount":10.50}"#;
    bus.publish(CHANNEL, raw.to_string()).await.unwrap();

    assert_eq!(recv_text(&mut rx).await, raw);

    relay.stop().await;
}

#[tokio::test]
async fn test_relay_routes_integral_float_user_id() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());
    let mut rx = connect(&hub, 7).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL).spawn();
    wait_for_subscriber(&bus).await;

    bus.publish(CHANNEL, r#"{"user_id":7.0,"foo":"bar"}"#.to_string())
        .await
        .unwrap();

    assert_eq!(recv_json(&mut rx).await["foo"], json!("bar"));

    relay.stop().await;
}

#[tokio::test]
async fn test_relay_resubscribes_after_lost_subscription() {
    let hub = NotificationHub::default();
    let bus = Arc::new(FlakyBus::new(r#"{"user_id":1,"n":1}"#));
    let mut rx = connect(&hub, 1).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL)
        .with_reconnect_delay(Duration::from_millis(10))
        .spawn();

    // Delivered from the second subscription, which then ends
    assert_eq!(recv_json(&mut rx).await, json!({"user_id": 1, "n": 1}));

    wait_for_subscriber(&bus.inner).await;
    bus.publish(CHANNEL, r#"{"user_id":1,"n":2}"#.to_string())
        .await
        .unwrap();

    assert_eq!(recv_json(&mut rx).await, json!({"user_id": 1, "n": 2}));
    assert_eq!(bus.subscribe_calls(), 3);
    assert!(!relay.is_finished());

    relay.stop().await;
}

#[tokio::test]
async fn test_stop_interrupts_reconnect_delay() {
    let bus = Arc::new(DownBus::default());
    let relay = NotificationRelay::new(NotificationHub::default(), bus.clone(), CHANNEL)
        .with_reconnect_delay(Duration::from_secs(60))
        .spawn();

    for _ in 0..100 {
        if bus.subscribes.load(Ordering::SeqCst) >= 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(bus.subscribes.load(Ordering::SeqCst), 1);

    timeout(Duration::from_secs(2), relay.stop())
        .await
        .expect("relay did not stop during reconnect delay");
}

#[tokio::test]
async fn test_relay_ignores_unrouted_payloads() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());
    let mut rx = connect(&hub, 7).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL).spawn();
    wait_for_subscriber(&bus).await;

    bus.publish(CHANNEL, r#"{"foo":"bar"}"#.to_string())
        .await
        .unwrap();
    bus.publish(CHANNEL, r#"{"user_id":7,"seq":2}"#.to_string())
        .await
        .unwrap();

    // Only the routed payload arrives
    assert_eq!(recv_json(&mut rx).await, json!({"user_id": 7, "seq": 2}));
    assert!(rx.try_recv().is_err());

    relay.stop().await;
}

#[tokio::test]
async fn test_relay_survives_malformed_payload() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());
    let mut rx = connect(&hub, 12).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL).spawn();
    wait_for_subscriber(&bus).await;

    bus.publish(CHANNEL, "{not json".to_string()).await.unwrap();
    bus.publish(CHANNEL, r#"{"user_id":"12","kind":"deposit"}"#.to_string())
        .await
        .unwrap();

    assert_eq!(
        recv_json(&mut rx).await,
        json!({"user_id": "12", "kind": "deposit"})
    );
    assert!(!relay.is_finished());

    relay.stop().await;
}

#[tokio::test]
async fn test_publisher_feeds_relay() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());
    let mut rx = connect(&hub, 30).await;

    let relay = NotificationRelay::new(hub.clone(), bus.clone(), CHANNEL).spawn();
    wait_for_subscriber(&bus).await;

    let publisher = NotificationPublisher::new(bus.clone());
    let receivers = publisher
        .publish(CHANNEL, &json!({"user_id": 30, "amount": -42.5}))
        .await;
    assert_eq!(receivers, Some(1));

    assert_eq!(
        recv_json(&mut rx).await,
        json!({"user_id": 30, "amount": -42.5})
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_stop_releases_subscription() {
    let hub = NotificationHub::default();
    let bus = Arc::new(InMemoryBus::new());

    let relay = NotificationRelay::new(hub, bus.clone(), CHANNEL)
        .with_reconnect_delay(Duration::from_millis(10))
        .spawn();
    wait_for_subscriber(&bus).await;

    timeout(Duration::from_secs(2), relay.stop())
        .await
        .expect("relay did not stop");

    assert_eq!(bus.subscriber_count(CHANNEL).await, 0);
}
