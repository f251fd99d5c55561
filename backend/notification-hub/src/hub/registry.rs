//! Connection registry
//!
//! Maps each connected user to the ordered list of their open connections.
//! Supports:
//! - Multiple concurrent connections per user (devices, tabs)
//! - Precise removal by connection ID
//! - Stable snapshots for delivery, so removal never races iteration
//!
//! A user key exists only while that user has at least one connection.

use super::connection::{ConnectionHandle, ConnectionId, UserId};
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // user_id -> connections, in registration order
    inner: Arc<RwLock<HashMap<UserId, Vec<ConnectionHandle>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection to the user's list, creating the entry if absent
    ///
    /// Registering the same handle twice yields two entries.
    pub async fn register(&self, user_id: UserId, connection: ConnectionHandle) {
        let connection_id = connection.id();
        let mut guard = self.inner.write().await;
        let connections = guard.entry(user_id).or_default();
        connections.push(connection);
        metrics::connection_opened();

        tracing::debug!(
            user_id,
            connection_id = %connection_id,
            user_connections = connections.len(),
            "Registered connection"
        );
    }

    /// Remove one connection from the user's list
    ///
    /// Returns whether something was removed. Unknown users or connections
    /// are a no-op, so every failure path may call this unconditionally.
    pub async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut guard = self.inner.write().await;

        let Some(connections) = guard.get_mut(&user_id) else {
            return false;
        };

        let removed = match connections.iter().position(|c| c.id() == connection_id) {
            Some(index) => {
                connections.remove(index);
                metrics::connection_closed(1);
                true
            }
            None => false,
        };

        let remaining = connections.len();
        if remaining == 0 {
            guard.remove(&user_id);
        }

        if removed {
            tracing::debug!(
                user_id,
                connection_id = %connection_id,
                remaining,
                "Unregistered connection"
            );
        }

        removed
    }

    /// Copy of the user's current connections
    ///
    /// The lock is released before the caller touches any connection.
    pub async fn snapshot(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        let guard = self.inner.read().await;
        guard.get(&user_id).cloned().unwrap_or_default()
    }

    /// Remove every entry, returning what was registered
    pub async fn drain(&self) -> Vec<(UserId, ConnectionHandle)> {
        let mut guard = self.inner.write().await;
        let drained: Vec<(UserId, ConnectionHandle)> = guard
            .drain()
            .flat_map(|(user_id, connections)| {
                connections.into_iter().map(move |c| (user_id, c))
            })
            .collect();
        metrics::connection_closed(drained.len());
        drained
    }

    pub async fn contains_user(&self, user_id: UserId) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Number of active connections for a user
    pub async fn connection_count(&self, user_id: UserId) -> usize {
        let guard = self.inner.read().await;
        guard.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        let guard = self.inner.read().await;
        guard.values().map(|v| v.len()).sum()
    }

    pub async fn connected_users_count(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        let guard = self.inner.read().await;
        let mut ids: Vec<UserId> = guard.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
