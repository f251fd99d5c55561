//! WebSocket transport
//!
//! Each client connection is served by one [`NotificationSession`] actor.
//! The hub only sees the session's channel-backed connection handle.

pub mod session;

pub use session::NotificationSession;
