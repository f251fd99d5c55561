use crate::config::WebSocketConfig;
use crate::hub::{ChannelConnection, Connection, NotificationHub, OutboundFrame, UserId};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use chrono::{DateTime, Utc};
use futures::stream;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One client's WebSocket session
///
/// The session owns the socket. Its [`ChannelConnection`] is registered with
/// the hub before the session starts; frames the hub enqueues are drained
/// here and written to the socket. Stopping the actor, for any reason,
/// unregisters the connection.
pub struct NotificationSession {
    user_id: UserId,
    connection: Arc<ChannelConnection>,
    outbound: Option<mpsc::Receiver<OutboundFrame>>,
    hub: NotificationHub,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    connected_at: DateTime<Utc>,
}

impl NotificationSession {
    pub fn new(
        user_id: UserId,
        connection: Arc<ChannelConnection>,
        outbound: mpsc::Receiver<OutboundFrame>,
        hub: NotificationHub,
        config: &WebSocketConfig,
    ) -> Self {
        Self {
            user_id,
            connection,
            outbound: Some(outbound),
            hub,
            hb: Instant::now(),
            heartbeat_interval: config.heartbeat_interval(),
            client_timeout: config.client_timeout(),
            connected_at: Utc::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                tracing::warn!(
                    user_id = act.user_id,
                    connection_id = %act.connection.id(),
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for NotificationSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = self.user_id,
            connection_id = %self.connection.id(),
            "WebSocket session started"
        );

        self.hb(ctx);

        if let Some(outbound) = self.outbound.take() {
            let frames = stream::unfold(outbound, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            });
            ctx.add_stream(frames);
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let session_secs = (Utc::now() - self.connected_at).num_seconds();
        tracing::info!(
            user_id = self.user_id,
            connection_id = %self.connection.id(),
            session_secs,
            "WebSocket session stopped"
        );

        let hub = self.hub.clone();
        let user_id = self.user_id;
        let connection_id = self.connection.id();

        actix::spawn(async move {
            hub.unregister(user_id, connection_id).await;
        });
    }
}

// Frames queued by the hub
impl StreamHandler<OutboundFrame> for NotificationSession {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        match frame {
            OutboundFrame::Text(text) => ctx.text(&*text),
            OutboundFrame::Close => {
                ctx.close(Some(ws::CloseCode::Away.into()));
                ctx.stop();
            }
        }
    }

    // The session keeps a sender alive, so the queue only ends with the actor.
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

// Frames from the client
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for NotificationSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) => {
                // no inbound protocol; text frames act as keepalives
                self.hb = Instant::now();
                ctx.text(json!({"message": "Received"}).to_string());
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(user_id = self.user_id, "Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(user_id = self.user_id, ?reason, "WebSocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    user_id = self.user_id,
                    connection_id = %self.connection.id(),
                    error = %e,
                    "WebSocket protocol error"
                );
                ctx.stop();
            }
        }
    }
}
