use actix_web::{web, HttpResponse, Responder};

use crate::actors::GetRelayStatus;
use crate::api::AppState;

pub async fn metrics(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Store reachability plus the relay's last drain, when the relay runs.
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    let store = state.executor.store().ping().await;

    let relay = match &state.relay {
        Some(addr) => match addr.send(GetRelayStatus).await {
            Ok(status) => serde_json::json!({
                "drains": status.drains,
                "last_drain_at": status.last_drain_at,
                "last_published": status.last_report.as_ref().map(|r| r.published),
                "last_dead_lettered": status.last_report.as_ref().map(|r| r.dead_lettered),
                "last_error": status.last_error,
            }),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        },
        None => serde_json::Value::Null,
    };

    match store {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "service": "clinic-ledger",
            "store": "up",
            "relay": relay,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed to reach the store");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "clinic-ledger",
                "store": e.to_string(),
                "relay": relay,
            }))
        }
    }
}
