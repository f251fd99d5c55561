use crate::auth::TokenVerifier;
use crate::config::WebSocketConfig;
use crate::hub::NotificationHub;
use crate::relay::NotificationPublisher;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub hub: NotificationHub,
    pub publisher: NotificationPublisher,
    pub verifier: Arc<TokenVerifier>,
    pub websocket: WebSocketConfig,
}

impl AppState {
    pub fn new(
        hub: NotificationHub,
        publisher: NotificationPublisher,
        verifier: TokenVerifier,
        websocket: WebSocketConfig,
    ) -> Self {
        Self {
            hub,
            publisher,
            verifier: Arc::new(verifier),
            websocket,
        }
    }
}
