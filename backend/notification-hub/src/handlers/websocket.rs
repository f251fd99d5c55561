//! WebSocket endpoints
//!
//! `/ws/{user_id}` upgrades the connection and hands it to a
//! [`NotificationSession`]; the rest report registry state.

use actix_web::{web, Error, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::bearer_token;
use crate::hub::{ChannelConnection, Connection, UserId};
use crate::state::AppState;
use crate::websocket::NotificationSession;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Upgrade to a notification stream for one user
///
/// Endpoint: GET /ws/{user_id}
///
/// The token comes from `?token=` (browsers cannot set headers on an
/// upgrade) or `Authorization: Bearer`.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<UserId>,
    query: web::Query<ConnectQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let user_id = path.into_inner();

    let token = query.into_inner().token.or_else(|| bearer_token(&req));
    state.verifier.authorize_user(token.as_deref(), user_id)?;

    let mut response = ws::handshake(&req)?;

    let (connection, outbound) = ChannelConnection::new(state.websocket.outbound_buffer);
    let connection = Arc::new(connection);
    state.hub.register(user_id, connection.clone()).await;

    tracing::info!(
        user_id,
        connection_id = %connection.id(),
        "WebSocket connection accepted"
    );

    let session = NotificationSession::new(
        user_id,
        connection,
        outbound,
        state.hub.clone(),
        &state.websocket,
    );

    Ok(response.streaming(ws::WebsocketContext::create(session, stream)))
}

/// Get WebSocket connection status for a user
///
/// Endpoint: GET /api/v1/ws/status/{user_id}
pub async fn ws_status(
    path: web::Path<UserId>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let connection_count = state.hub.registry().connection_count(user_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "connected": connection_count > 0,
        "connection_count": connection_count
    })))
}

/// Endpoint: GET /api/v1/ws/stats
pub async fn ws_stats(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let registry = state.hub.registry();
    let total_connections = registry.total_connections().await;
    let user_ids = registry.connected_user_ids().await;
    let connected_users = user_ids.len();

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "average_connections_per_user": if connected_users > 0 {
            total_connections as f64 / connected_users as f64
        } else {
            0.0
        },
        "users": user_ids
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws/{user_id}", web::get().to(ws_connect))
        .service(
            web::scope("/api/v1/ws")
                .route("/status/{user_id}", web::get().to(ws_status))
                .route("/stats", web::get().to(ws_stats)),
        );
}
