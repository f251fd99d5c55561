//! Internal broadcast and publish endpoints

use crate::hub::{DeliveryReport, NotificationKind, UserId};
use crate::state::AppState;
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Serialize;
use serde_json::{json, Value};

/// Result of a direct broadcast
#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(flatten)]
    pub report: DeliveryReport,
}

impl BroadcastResponse {
    fn new(user_id: UserId, kind: NotificationKind, report: DeliveryReport) -> Self {
        Self {
            success: true,
            user_id,
            kind,
            report,
        }
    }
}

async fn broadcast_kind(
    state: &AppState,
    kind: NotificationKind,
    user_id: UserId,
    data: &Value,
) -> HttpResponse {
    let report = match kind {
        NotificationKind::Transaction => state.hub.broadcast_transaction(user_id, data).await,
        NotificationKind::FraudAlert => state.hub.broadcast_fraud_alert(user_id, data).await,
        NotificationKind::FinancialAdvice => {
            state.hub.broadcast_financial_advice(user_id, data).await
        }
    };

    HttpResponse::Ok().json(BroadcastResponse::new(user_id, kind, report))
}

/// POST /api/v1/notifications/{user_id}/transaction
pub async fn broadcast_transaction(
    path: web::Path<UserId>,
    body: web::Json<Value>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(broadcast_kind(&state, NotificationKind::Transaction, path.into_inner(), &body).await)
}

/// POST /api/v1/notifications/{user_id}/fraud-alert
pub async fn broadcast_fraud_alert(
    path: web::Path<UserId>,
    body: web::Json<Value>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(broadcast_kind(&state, NotificationKind::FraudAlert, path.into_inner(), &body).await)
}

/// POST /api/v1/notifications/{user_id}/financial-advice
pub async fn broadcast_financial_advice(
    path: web::Path<UserId>,
    body: web::Json<Value>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(broadcast_kind(
        &state,
        NotificationKind::FinancialAdvice,
        path.into_inner(),
        &body,
    )
    .await)
}

/// Publish a JSON body onto a bus channel
///
/// POST /api/v1/publish/{channel}
///
/// The relay only routes payloads carrying `user_id`, but any JSON is
/// accepted here since other subscribers may share the channel.
pub async fn publish(
    path: web::Path<String>,
    body: web::Json<Value>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let channel = path.into_inner();

    match state.publisher.publish(&channel, &*body).await {
        Some(receivers) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "channel": channel,
            "receivers": receivers
        }))),
        None => Ok(HttpResponse::ServiceUnavailable().json(json!({
            "success": false,
            "channel": channel,
            "error": "publish failed"
        }))),
    }
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications/{user_id}")
            .route("/transaction", web::post().to(broadcast_transaction))
            .route("/fraud-alert", web::post().to(broadcast_fraud_alert))
            .route("/financial-advice", web::post().to(broadcast_financial_advice)),
    )
    .route("/api/v1/publish/{channel}", web::post().to(publish));
}
