use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::extractors::{optional_body, Actor};
use crate::api::AppState;
use crate::domain::order::{BulkIds, CancelOrder, CreateOrder, OrderStatus, OrderType, RefundOrder, SubmitDraft, UpdateOrder};
use crate::domain::{LedgerError, LedgerResult};
use crate::ledger::OrderFilter;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn create(state: web::Data<AppState>, Actor(ctx): Actor, body: web::Json<CreateOrder>) -> LedgerResult<HttpResponse> {
    let envelope = state.orders.create(body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Created().json(envelope))
}

pub async fn get(state: web::Data<AppState>, id: web::Path<Uuid>) -> LedgerResult<HttpResponse> {
    let envelope = state.orders.get(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn list(state: web::Data<AppState>, query: web::Query<ListQuery>) -> LedgerResult<HttpResponse> {
    let filter = OrderFilter {
        include_inactive: query.include_inactive,
        ..Default::default()
    };
    Ok(HttpResponse::Ok().json(state.orders.list(filter).await?))
}

pub async fn list_by_type(
    state: web::Data<AppState>,
    order_type: web::Path<String>,
    query: web::Query<ListQuery>,
) -> LedgerResult<HttpResponse> {
    let order_type: OrderType = order_type.parse().map_err(LedgerError::InvalidData)?;
    let filter = OrderFilter {
        order_type: Some(order_type),
        include_inactive: query.include_inactive,
        ..Default::default()
    };
    Ok(HttpResponse::Ok().json(state.orders.list(filter).await?))
}

pub async fn list_by_status(
    state: web::Data<AppState>,
    status: web::Path<String>,
    query: web::Query<ListQuery>,
) -> LedgerResult<HttpResponse> {
    let status: OrderStatus = status.parse().map_err(LedgerError::InvalidData)?;
    let filter = OrderFilter {
        status: Some(status),
        include_inactive: query.include_inactive,
        ..Default::default()
    };
    Ok(HttpResponse::Ok().json(state.orders.list(filter).await?))
}

pub async fn update(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Json<UpdateOrder>,
) -> LedgerResult<HttpResponse> {
    let envelope = state.orders.update(id.into_inner(), body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn submit_draft(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Bytes,
) -> LedgerResult<HttpResponse> {
    let command: SubmitDraft = optional_body(&body)?;
    let envelope = state.orders.submit_draft(id.into_inner(), command, &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn cancel(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Bytes,
) -> LedgerResult<HttpResponse> {
    let command: CancelOrder = optional_body(&body)?;
    let envelope = state.orders.cancel(id.into_inner(), command, &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn refund(
    state: web::Data<AppState>,
    Actor(ctx): Actor,
    id: web::Path<Uuid>,
    body: web::Bytes,
) -> LedgerResult<HttpResponse> {
    let command: RefundOrder = optional_body(&body)?;
    let envelope = state.orders.refund(id.into_inner(), command, &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn deactivate_all(state: web::Data<AppState>, Actor(ctx): Actor, body: web::Json<BulkIds>) -> LedgerResult<HttpResponse> {
    let envelope = state.orders.deactivate_all(body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

pub async fn reactivate_all(state: web::Data<AppState>, Actor(ctx): Actor, body: web::Json<BulkIds>) -> LedgerResult<HttpResponse> {
    let envelope = state.orders.reactivate_all(body.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(envelope))
}
