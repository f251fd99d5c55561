//! Pub/sub relay
//!
//! Bridges an external publish/subscribe channel into the hub's delivery
//! path, so producers outside the request cycle (background fraud scoring,
//! other services) can reach connected clients.
//!
//! Each payload on the channel is parsed as JSON. Objects carrying a
//! `user_id` are delivered to that user as-is; anything else is dropped.
//! The loop runs until its shutdown signal fires and re-subscribes after a
//! delay when the subscription is lost.

pub mod bus;

pub use bus::{InMemoryBus, MessageBus, PayloadStream, RedisBus};

use crate::hub::{DeliveryReport, NotificationHub, UserId};
use crate::metrics::{self, RelayOutcomeLabel};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// What happened to one relayed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered {
        user_id: UserId,
        report: DeliveryReport,
    },
    /// Not valid JSON
    Malformed,
    /// Valid JSON without a usable `user_id`
    Unrouted,
}

/// Read the routing field of a relayed payload
///
/// Accepts an integer, a float with no fractional part, or a string holding
/// an integer.
pub fn extract_user_id(payload: &Value) -> Option<UserId> {
    match payload.get("user_id")? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn relay_label(report: &DeliveryReport) -> RelayOutcomeLabel {
    if report.attempted == 0 {
        RelayOutcomeLabel::Offline
    } else {
        RelayOutcomeLabel::Delivered
    }
}

pub struct NotificationRelay {
    hub: NotificationHub,
    bus: Arc<dyn MessageBus>,
    channel: String,
    reconnect_delay: Duration,
}

impl NotificationRelay {
    pub fn new(hub: NotificationHub, bus: Arc<dyn MessageBus>, channel: impl Into<String>) -> Self {
        Self {
            hub,
            bus,
            channel: channel.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run the relay on a background task
    pub fn spawn(self) -> RelayHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        RelayHandle {
            shutdown_tx,
            handle,
        }
    }

    /// Relay until `shutdown` flips to true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.channel, "Starting notification relay");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscription = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.bus.subscribe(&self.channel) => result,
            };

            match subscription {
                Ok(mut stream) => {
                    info!(channel = %self.channel, "Relay subscribed");

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                info!(channel = %self.channel, "Notification relay stopped");
                                return;
                            }
                            next = stream.next() => match next {
                                Some(payload) => {
                                    self.handle_payload(&payload).await;
                                }
                                None => {
                                    warn!(channel = %self.channel, "Relay subscription closed");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(channel = %self.channel, error = %e, "Relay failed to subscribe");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(self.reconnect_delay) => {}
            }
        }

        info!(channel = %self.channel, "Notification relay stopped");
    }

    /// Route one raw payload into the hub
    pub async fn handle_payload(&self, payload: &str) -> RelayOutcome {
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    channel = %self.channel,
                    error = %e,
                    "Dropping malformed relay payload"
                );
                metrics::record_relay(RelayOutcomeLabel::Malformed);
                return RelayOutcome::Malformed;
            }
        };

        let Some(user_id) = extract_user_id(&value) else {
            debug!(channel = %self.channel, "Relay payload has no user_id, dropping");
            metrics::record_relay(RelayOutcomeLabel::Unrouted);
            return RelayOutcome::Unrouted;
        };

        // Sent byte for byte as published
        let report = self.hub.deliver_text(user_id, Arc::from(payload)).await;
        metrics::record_relay(relay_label(&report));

        RelayOutcome::Delivered { user_id, report }
    }
}

/// Handle to a spawned relay
pub struct RelayHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RelayHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Notification relay task failed");
        }
    }
}

/// Producer side of the bus
#[derive(Clone)]
pub struct NotificationPublisher {
    bus: Arc<dyn MessageBus>,
}

impl NotificationPublisher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Serialize `message` and publish it to `channel`
    ///
    /// Fire-and-forget: failures are logged and reported as `None`.
    pub async fn publish<T>(&self, channel: &str, message: &T) -> Option<usize>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Failed to serialize published message");
                return None;
            }
        };

        match self.bus.publish(channel, payload).await {
            Ok(receivers) => {
                debug!(channel = %channel, receivers, "Published message");
                Some(receivers)
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Failed to publish message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_user_id() {
        assert_eq!(extract_user_id(&json!({"user_id": 7})), Some(7));
        assert_eq!(extract_user_id(&json!({"user_id": "42"})), Some(42));
        assert_eq!(extract_user_id(&json!({"user_id": null})), None);
        assert_eq!(extract_user_id(&json!({"user_id": 7.0})), Some(7));
        assert_eq!(extract_user_id(&json!({"user_id": 1.5})), None);
        assert_eq!(extract_user_id(&json!({"user_id": 1e300})), None);
        assert_eq!(extract_user_id(&json!({"foo": "bar"})), None);
        assert_eq!(extract_user_id(&json!([1, 2, 3])), None);
    }

    #[tokio::test]
    async fn test_handle_payload_outcomes() {
        let hub = NotificationHub::default();
        let relay = NotificationRelay::new(hub, Arc::new(InMemoryBus::new()), "notifications");

        assert_eq!(relay.handle_payload("not json").await, RelayOutcome::Malformed);
        assert_eq!(
            relay.handle_payload(r#"{"foo":"bar"}"#).await,
            RelayOutcome::Unrouted
        );
        assert_eq!(
            relay.handle_payload(r#"{"user_id":7,"foo":"bar"}"#).await,
            RelayOutcome::Delivered {
                user_id: 7,
                report: DeliveryReport::default(),
            }
        );
    }

    #[test]
    fn test_offline_user_is_labelled_separately() {
        assert_eq!(
            relay_label(&DeliveryReport::default()),
            RelayOutcomeLabel::Offline
        );
        assert_eq!(
            relay_label(&DeliveryReport {
                attempted: 2,
                delivered: 1,
                failed: 1,
            }),
            RelayOutcomeLabel::Delivered
        );
    }

    #[tokio::test]
    async fn test_publisher_reports_receivers() {
        let bus = InMemoryBus::new();
        let _stream = bus.subscribe("notifications").await.unwrap();
        let publisher = NotificationPublisher::new(Arc::new(bus));

        let receivers = publisher
            .publish("notifications", &json!({"user_id": 1}))
            .await;
        assert_eq!(receivers, Some(1));
    }

    #[tokio::test]
    async fn test_stop_before_subscription() {
        let relay = NotificationRelay::new(
            NotificationHub::default(),
            Arc::new(InMemoryBus::new()),
            "notifications",
        );
        let handle = relay.spawn();
        handle.stop().await;
    }
}
