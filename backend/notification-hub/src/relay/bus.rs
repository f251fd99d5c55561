//! Publish/subscribe bus
//!
//! The relay only needs two things from a bus: publish a payload to a named
//! channel, and stream the payloads arriving on one. [`RedisBus`] is used in
//! production; [`InMemoryBus`] serves tests and single-process setups.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Raw payloads received on one channel
pub type PayloadStream = BoxStream<'static, String>;

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload, returning how many subscribers received it
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;

    /// Subscribe to a channel. The stream ends when the subscription is lost.
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream>;
}

/// Redis pub/sub
///
/// Publishing goes through a shared multiplexed connection manager; every
/// subscription opens its own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        debug!(channel = %channel, "Subscribed to Redis channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "Failed to read pub/sub payload");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}

const IN_MEMORY_CHANNEL_CAPACITY: usize = 1024;

/// Process-local bus built on tokio broadcast channels
#[derive(Clone, Default)]
pub struct InMemoryBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(IN_MEMORY_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Number of live subscriptions on a channel
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.lock().await;
        channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let sender = self.sender(channel).await;
        // send only fails when nobody is listening
        Ok(sender.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream> {
        let receiver = self.sender(channel).await.subscribe();
        let channel = channel.to_string();

        let stream = stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((payload, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "In-memory subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
