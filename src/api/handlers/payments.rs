use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::orders::ListQuery;
use crate::api::extractors::{optional_body, Actor};
use crate::api::AppState;
use crate::domain::order::BulkIds;
use crate::domain::payment::{CancelPayment, CreatePayment, ProcessPayment, RefundPayment, RejectPayment, VerifyPayment};
use crate::domain::LedgerResult;
use crate::ledger::PaymentFilter;

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

pub async fn create(state: web::Data<AppState>, Actor(ctx): Actor, body: web::Json<CreatePayment>) -> LedgerResult<HttpResponse> {
    let envelope = state.payments.create(body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Created().json(envelope))
}

pub async fn get(state: web::Data<AppState>, id: web::Path<Uuid>) -> LedgerResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.payments.get(id.into_inner()).await?))
}

pub async fn list(state: web::Data<AppState>, query: web::Query<ListQuery>) -> LedgerResult<HttpResponse> {
    let filter = PaymentFilter {
        order_id: None,
        include_inactive: query.include_inactive,
    };
    Ok(HttpResponse::Ok().json(state.payments.list(filter).await?))
}

pub async fn list_by_order(
    state: web::Data<AppState>,
    order_id: web::Path<Uuid>,
    query: web::Query<ListQuery>,
) -> LedgerResult<HttpResponse> {
    let filter = PaymentFilter {
        order_id: Some(order_id.into_inner()),
        include_inactive: query.include_inactive,
    };
    Ok(HttpResponse::Ok().json(state.payments.list(filter).await?))
}

pub async fn statistics(state: web::Data<AppState>, query: web::Query<StatisticsQuery>) -> LedgerResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.payments.statistics(query.order_id).await?))
}

pub async fn process(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Json<ProcessPayment>,
) -> LedgerResult<HttpResponse> {
    let envelope = state.payments.process(id.into_inner(), body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn verify(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Bytes,
) -> LedgerResult<HttpResponse> {
    let command: VerifyPayment = optional_body(&body)?;
    let envelope = state.payments.verify(id.into_inner(), command, &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn reject(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Bytes,
) -> LedgerResult<HttpResponse> {
    let command: RejectPayment = optional_body(&body)?;
    let envelope = state.payments.reject(id.into_inner(), command, &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn cancel(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Bytes,
) -> LedgerResult<HttpResponse> {
    let command: CancelPayment = optional_body(&body)?;
    let envelope = state.payments.cancel(id.into_inner(), command, &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn refund(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Json<RefundPayment>,
) -> LedgerResult<HttpResponse> {
    let envelope = state.payments.refund(id.into_inner(), body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn deactivate_all(state: web::Data<AppState>, Actor(ctx): Actor, body: web::Json<BulkIds>) -> LedgerResult<HttpResponse> {
    let envelope = state.payments.deactivate_all(body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn reactivate_all(state: web::Data<AppState>, Actor(ctx): Actor, body: web::Json<BulkIds>) -> LedgerResult<HttpResponse> {
    let envelope = state.payments.reactivate_all(body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}
