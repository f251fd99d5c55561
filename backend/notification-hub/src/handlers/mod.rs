//! HTTP surface
//!
//! The WebSocket upgrade plus internal endpoints that let other services
//! broadcast to a user or publish onto the bus without a Redis client.

pub mod notifications;
pub mod websocket;

use actix_web::web;

pub use notifications::register_routes as register_notifications;
pub use websocket::register_routes as register_websocket;

/// Mount every route on `cfg`
pub fn configure(cfg: &mut web::ServiceConfig) {
    register_websocket(cfg);
    register_notifications(cfg);
}
