//! Real-time notification hub for the banking platform
//!
//! Holds every open client WebSocket, fans notifications out to all of a
//! user's connections, and relays payloads published on a Redis channel
//! into the same delivery path.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod relay;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{HubError, Result};
pub use hub::{DeliveryReport, NotificationHub, NotificationKind, NotificationMessage};
pub use relay::{NotificationPublisher, NotificationRelay, RelayHandle};
pub use state::AppState;
