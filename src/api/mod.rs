// ============================================================================
// HTTP API
// ============================================================================
//
// Thin actix-web layer over the command handlers. Handlers return
// `LedgerResult<HttpResponse>`; `LedgerError` renders itself as an error
// envelope (see `error`).
//
// ============================================================================

pub mod error;
pub mod extractors;
pub mod handlers;

use std::sync::Arc;

use actix::Addr;
use actix_web::web;

use crate::actors::OutboxRelayActor;
use crate::domain::order::OrderCommandHandler;
use crate::domain::payment::PaymentCommandHandler;
use crate::ledger::LedgerExecutor;
use crate::metrics::Metrics;
use handlers::{orders, payments, system};

pub struct AppState {
    pub orders: OrderCommandHandler,
    pub payments: PaymentCommandHandler,
    pub executor: Arc<LedgerExecutor>,
    pub metrics: Arc<Metrics>,
    pub relay: Option<Addr<OutboxRelayActor>>,
}

impl AppState {
    pub fn new(executor: Arc<LedgerExecutor>, metrics: Arc<Metrics>) -> Self {
        Self {
            orders: OrderCommandHandler::new(executor.clone()),
            payments: PaymentCommandHandler::new(executor.clone()),
            executor,
            metrics,
            relay: None,
        }
    }

    pub fn with_relay(mut self, relay: Addr<OutboxRelayActor>) -> Self {
        self.relay = Some(relay);
        self
    }
}

/// Register every route. Literal segments are registered before `{id}`
/// so they are not captured as ids.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(error::json_error_handler))
        .app_data(web::PathConfig::default().error_handler(error::path_error_handler))
        .app_data(web::QueryConfig::default().error_handler(error::query_error_handler))
        .route("/metrics", web::get().to(system::metrics))
        .route("/health", web::get().to(system::health))
        .service(
            web::scope("/order")
                .service(
                    web::resource("")
                        .route(web::post().to(orders::create))
                        .route(web::get().to(orders::list)),
                )
                .route("/type/{order_type}", web::get().to(orders::list_by_type))
                .route("/status/{status}", web::get().to(orders::list_by_status))
                .route("/remove/all", web::delete().to(orders::deactivate_all))
                .route("/reactivate/all", web::patch().to(orders::reactivate_all))
                .service(
                    web::resource("/{id}")
                        .route(web::get().to(orders::get))
                        .route(web::patch().to(orders::update)),
                )
                .route("/{id}/submit-draft", web::post().to(orders::submit_draft))
                .route("/{id}/cancel", web::post().to(orders::cancel))
                .route("/{id}/refund", web::post().to(orders::refund)),
        )
        .service(
            web::scope("/payment")
                .service(
                    web::resource("")
                        .route(web::post().to(payments::create))
                        .route(web::get().to(payments::list)),
                )
                .route("/statistics", web::get().to(payments::statistics))
                .route("/order/{order_id}", web::get().to(payments::list_by_order))
                .route("/remove/all", web::delete().to(payments::deactivate_all))
                .route("/reactivate/all", web::patch().to(payments::reactivate_all))
                .route("/{id}", web::get().to(payments::get))
                .route("/{id}/process", web::post().to(payments::process))
                .route("/{id}/verify", web::post().to(payments::verify))
                .route("/{id}/reject", web::post().to(payments::reject))
                .route("/{id}/cancel", web::post().to(payments::cancel))
                .route("/{id}/refund", web::post().to(payments::refund)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::extractors::PERFORMED_BY_HEADER;
    use crate::ledger::MemoryLedgerStore;
    use crate::messaging::RecordingPublisher;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn state() -> (web::Data<AppState>, Arc<RecordingPublisher>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = Arc::new(RecordingPublisher::new());
        let executor = Arc::new(LedgerExecutor::new(
            Arc::new(MemoryLedgerStore::new()),
            publisher.clone(),
            metrics.clone(),
        ));
        (web::Data::new(AppState::new(executor, metrics)), publisher)
    }

    fn user() -> (&'static str, String) {
        (PERFORMED_BY_HEADER, Uuid::new_v4().to_string())
    }

    macro_rules! call_json {
        ($app:expr, $req:expr) => {{
            let response = test::call_service(&$app, $req.to_request()).await;
            let status = response.status();
            let body: Value = test::read_body_json(response).await;
            (status, body)
        }};
    }

    #[actix_web::test]
    async fn test_consultation_paid_end_to_end() {
        let (state, publisher) = state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let (status, body) = call_json!(
            app,
            test::TestRequest::post().uri("/order").insert_header(user()).set_json(json!({
                "code": "ORD-HTTP-1",
                "order_type": "CONSULTATION",
                "currency": "PEN",
                "subtotal": "84.75",
                "tax": "15.25"
            }))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "DRAFT");
        let order_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call_json!(
            app,
            test::TestRequest::post()
                .uri(&format!("/order/{}/submit-draft", order_id))
                .insert_header(user())
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["order"]["status"], "PENDING");
        let payment_id = body["data"]["payments"][0]["id"].as_str().unwrap().to_string();

        let (status, _) = call_json!(
            app,
            test::TestRequest::post()
                .uri(&format!("/payment/{}/process", payment_id))
                .insert_header(user())
                .set_json(json!({"amount": "100.00", "payment_method": "CASH"}))
        );
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call_json!(
            app,
            test::TestRequest::post()
                .uri(&format!("/payment/{}/verify", payment_id))
                .insert_header(user())
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["payment"]["status"], "COMPLETED");
        assert_eq!(body["data"]["order"]["status"], "COMPLETED");

        assert_eq!(publisher.channels().await, vec!["consultation.completed".to_string()]);

        let (status, body) = call_json!(
            app,
            test::TestRequest::get().uri(&format!("/payment/statistics?order_id={}", order_id))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["payment_count"], 1);
    }

    #[actix_web::test]
    async fn test_mutation_without_performer_is_rejected() {
        let (state, _) = state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let (status, body) = call_json!(
            app,
            test::TestRequest::post().uri("/order").set_json(json!({
                "code": "ORD-HTTP-2",
                "order_type": "PRODUCT_SALE",
                "currency": "PEN",
                "subtotal": "10"
            }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let (state, _) = state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let (status, body) = call_json!(
            app,
            test::TestRequest::get().uri(&format!("/order/{}", Uuid::new_v4()))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["kind"], "not_found");

        let (status, body) = call_json!(app, test::TestRequest::get().uri("/order/not-a-uuid"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = call_json!(app, test::TestRequest::get().uri("/order/type/grooming"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["kind"], "invalid_data");

        let (status, body) = call_json!(
            app,
            test::TestRequest::post().uri("/order").insert_header(user()).set_json(json!({
                "code": "",
                "order_type": "PRODUCT_SALE",
                "currency": "soles",
                "subtotal": "10"
            }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["kind"], "validation");
        assert_eq!(body["data"]["errors"].as_array().unwrap().len(), 2);

        let (status, body) = call_json!(
            app,
            test::TestRequest::delete()
                .uri("/order/remove/all")
                .insert_header(user())
                .set_json(json!({"ids": []}))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["kind"], "invalid_data");
    }

    #[actix_web::test]
    async fn test_cancel_with_and_without_body() {
        let (state, publisher) = state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let (_, body) = call_json!(
            app,
            test::TestRequest::post().uri("/order").insert_header(user()).set_json(json!({
                "code": "ORD-HTTP-3",
                "order_type": "PRESCRIPTION",
                "currency": "PEN",
                "subtotal": "40",
                "status": "PENDING"
            }))
        );
        let order_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call_json!(
            app,
            test::TestRequest::post()
                .uri(&format!("/order/{}/cancel", order_id))
                .insert_header(user())
                .set_json(json!({"reason": "client left"}))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["order"]["status"], "CANCELLED");

        // Second cancel without a body is an idempotent success.
        let (status, body) = call_json!(
            app,
            test::TestRequest::post()
                .uri(&format!("/order/{}/cancel", order_id))
                .insert_header(user())
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Order is already cancelled");
        assert_eq!(publisher.channels().await, vec!["order.cancelled".to_string()]);

        let (status, body) = call_json!(app, test::TestRequest::get().uri("/order/status/cancelled"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_health_and_metrics() {
        let (state, _) = state();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let (status, body) = call_json!(app, test::TestRequest::get().uri("/health"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let response = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
