//! Notification hub
//!
//! Owns the connection registry and pushes notifications to every open
//! connection of a user.
//!
//! Delivery is best-effort fan-out:
//! 1. Snapshot the user's connections under the registry lock
//! 2. Serialize the message once
//! 3. Send to all connections concurrently, each bounded by `send_timeout`
//! 4. Unregister every connection whose send failed or timed out
//!
//! Nothing here returns an error to the caller.

pub mod connection;
pub mod messages;
pub mod registry;

pub use connection::{
    ChannelConnection, Connection, ConnectionHandle, ConnectionId, OutboundFrame, UserId,
};
pub use messages::{NotificationKind, NotificationMessage};
pub use registry::ConnectionRegistry;

use crate::error::HubError;
use crate::metrics::{self, DeliveryOutcome};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts from one delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationHub {
    registry: ConnectionRegistry,
    send_timeout: Duration,
}

impl NotificationHub {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            send_timeout,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub async fn register(&self, user_id: UserId, connection: ConnectionHandle) {
        self.registry.register(user_id, connection).await;
    }

    pub async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        self.registry.unregister(user_id, connection_id).await
    }

    /// Push `message` as JSON to every connection the user has right now
    ///
    /// A user without connections is not an error.
    pub async fn deliver<T>(&self, user_id: UserId, message: &T) -> DeliveryReport
    where
        T: Serialize + Sync + ?Sized,
    {
        if !self.registry.contains_user(user_id).await {
            debug!(user_id, "No open connections, skipping delivery");
            return DeliveryReport::default();
        }

        match serde_json::to_string(message) {
            Ok(json) => self.deliver_text(user_id, json.into()).await,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to serialize notification");
                DeliveryReport::default()
            }
        }
    }

    /// Push an already serialized payload, byte for byte
    pub async fn deliver_text(&self, user_id: UserId, payload: Arc<str>) -> DeliveryReport {
        let connections = self.registry.snapshot(user_id).await;
        if connections.is_empty() {
            debug!(user_id, "No open connections, skipping delivery");
            return DeliveryReport::default();
        }

        let send_timeout = self.send_timeout;
        let results = join_all(connections.iter().map(|connection| {
            let payload = payload.clone();
            async move {
                let result = match timeout(send_timeout, connection.send_text(payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(HubError::SendTimeout(send_timeout)),
                };
                (connection.id(), result)
            }
        }))
        .await;

        let mut report = DeliveryReport {
            attempted: results.len(),
            ..DeliveryReport::default()
        };

        for (connection_id, result) in results {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::record_delivery(DeliveryOutcome::Delivered);
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::record_delivery(match e {
                        HubError::SendTimeout(_) => DeliveryOutcome::Timeout,
                        _ => DeliveryOutcome::Failed,
                    });
                    warn!(
                        user_id,
                        connection_id = %connection_id,
                        error = %e,
                        "Error sending notification, dropping connection"
                    );
                    self.registry.unregister(user_id, connection_id).await;
                }
            }
        }

        debug!(
            user_id,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Notification delivered"
        );

        report
    }

    pub async fn broadcast_transaction<T>(&self, user_id: UserId, data: &T) -> DeliveryReport
    where
        T: Serialize + Sync + ?Sized,
    {
        self.broadcast(NotificationKind::Transaction, user_id, data).await
    }

    pub async fn broadcast_fraud_alert<T>(&self, user_id: UserId, data: &T) -> DeliveryReport
    where
        T: Serialize + Sync + ?Sized,
    {
        self.broadcast(NotificationKind::FraudAlert, user_id, data).await
    }

    pub async fn broadcast_financial_advice<T>(
        &self,
        user_id: UserId,
        data: &T,
    ) -> DeliveryReport
    where
        T: Serialize + Sync + ?Sized,
    {
        self.broadcast(NotificationKind::FinancialAdvice, user_id, data)
            .await
    }

    /// Wrap `data` in a typed envelope and deliver it
    pub async fn broadcast<T>(
        &self,
        kind: NotificationKind,
        user_id: UserId,
        data: &T,
    ) -> DeliveryReport
    where
        T: Serialize + Sync + ?Sized,
    {
        let data: Value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                warn!(user_id, kind = %kind, error = %e, "Failed to serialize notification data");
                return DeliveryReport::default();
            }
        };

        self.deliver(user_id, &NotificationMessage::typed(kind, data))
            .await
    }

    /// Close every registered connection and empty the registry
    pub async fn shutdown(&self) {
        let drained = self.registry.drain().await;
        let count = drained.len();

        join_all(drained.iter().map(|(_, connection)| connection.close())).await;

        info!(closed_connections = count, "Notification hub shut down");
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}
