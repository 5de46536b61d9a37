use async_trait::async_trait;
use uuid::Uuid;

use super::change_set::ChangeSet;
use super::outbox::OutboxMessage;
use crate::domain::audit::{AuditEntry, EntityType};
use crate::domain::order::{Order, OrderStatus, OrderType};
use crate::domain::payment::Payment;

// ============================================================================
// Ledger Store - narrow data-access ports per aggregate
// ============================================================================
//
// Reads go through the per-aggregate repositories. Writes only ever happen
// through `LedgerStore::commit`, which applies a whole ChangeSet or nothing.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: EntityType, id: Uuid },

    #[error("Payment references missing order {0}")]
    MissingOrder(Uuid),

    #[error("Duplicate order code: {0}")]
    DuplicateCode(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters for listing orders. `None` fields don't constrain.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub order_type: Option<OrderType>,
    pub status: Option<OrderStatus>,
    pub include_inactive: bool,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.order_type.map_or(true, |t| order.order_type == t)
            && self.status.map_or(true, |s| order.status == s)
            && (self.include_inactive || order.is_active)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub order_id: Option<Uuid>,
    pub include_inactive: bool,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.order_id.map_or(true, |id| payment.order_id == id)
            && (self.include_inactive || payment.is_active)
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn load_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Orders matching the filter, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn load_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    /// Every payment of an order, active or not, oldest first.
    async fn payments_for_order(&self, order_id: Uuid) -> StoreResult<Vec<Payment>>;

    /// Payments matching the filter, newest first.
    async fn list_payments(&self, filter: &PaymentFilter) -> StoreResult<Vec<Payment>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn audit_trail(&self, entity_id: Uuid) -> StoreResult<Vec<AuditEntry>>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Undelivered messages, oldest first.
    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>>;

    async fn mark_published(&self, id: Uuid) -> StoreResult<()>;

    /// Count a failed delivery. Dead-lettered messages are never picked up again.
    async fn record_delivery_failure(&self, id: Uuid, error: &str, dead_letter: bool) -> StoreResult<()>;
}

#[async_trait]
pub trait LedgerStore: OrderRepository + PaymentRepository + AuditLog + OutboxRepository {
    /// Apply every write in the set atomically, or none of them.
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::CommandContext;
    use crate::domain::order::CreateOrder;
    use rust_decimal::Decimal;

    #[test]
    fn test_order_filter_matching() {
        let ctx = CommandContext::new(Uuid::new_v4());
        let mut order = Order::new(
            &CreateOrder {
                code: "ORD-F".to_string(),
                order_type: OrderType::Prescription,
                reference_id: None,
                currency: "PEN".to_string(),
                subtotal: Decimal::ONE,
                tax: Decimal::ZERO,
                metadata: None,
                status: None,
                note: None,
            },
            &ctx,
        )
        .unwrap();

        assert!(OrderFilter::default().matches(&order));
        assert!(OrderFilter {
            order_type: Some(OrderType::Prescription),
            status: Some(OrderStatus::Draft),
            ..Default::default()
        }
        .matches(&order));
        assert!(!OrderFilter {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        }
        .matches(&order));

        order.is_active = false;
        assert!(!OrderFilter::default().matches(&order));
        assert!(OrderFilter {
            include_inactive: true,
            ..Default::default()
        }
        .matches(&order));
    }
}
