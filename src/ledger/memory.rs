use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::change_set::{ChangeSet, RowWrite};
use super::outbox::{OutboxMessage, OutboxStatus};
use super::store::{
    AuditLog, LedgerStore, OrderFilter, OrderRepository, OutboxRepository, PaymentFilter,
    PaymentRepository, StoreError, StoreResult,
};
use crate::domain::audit::{AuditEntry, EntityType};
use crate::domain::order::Order;
use crate::domain::payment::Payment;

// ============================================================================
// In-Memory Ledger Store
// ============================================================================
//
// Every commit validates the whole ChangeSet under one lock before applying
// any of it, which gives the same all-or-nothing and version-check behaviour
// as the PostgreSQL store. Used by tests and `storage = "memory"` runs.
//
// ============================================================================

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    audit: Vec<AuditEntry>,
    outbox: Vec<OutboxMessage>,
    fail_next_commit: Option<String>,
    /// Reads to let through, then the failure reason.
    read_failure: Option<(usize, String)>,
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `Unavailable` without writing anything.
    pub async fn fail_next_commit(&self, reason: impl Into<String>) {
        self.state.lock().await.fail_next_commit = Some(reason.into());
    }

    /// Make the next order or payment read fail with `Unavailable`.
    pub async fn fail_next_read(&self, reason: impl Into<String>) {
        self.fail_read_after(0, reason).await;
    }

    /// Let `skip` reads succeed, then fail one with `Unavailable`.
    pub async fn fail_read_after(&self, skip: usize, reason: impl Into<String>) {
        self.state.lock().await.read_failure = Some((skip, reason.into()));
    }

    pub async fn audit_len(&self) -> usize {
        self.state.lock().await.audit.len()
    }

    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }
}

impl State {
    fn read_guard(&mut self) -> StoreResult<()> {
        match self.read_failure.take() {
            Some((0, reason)) => Err(StoreError::Unavailable(reason)),
            Some((skip, reason)) => {
                self.read_failure = Some((skip - 1, reason));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn validate(&self, changes: &ChangeSet) -> StoreResult<()> {
        let mut codes: HashSet<&str> = self.orders.values().map(|o| o.code.as_str()).collect();
        let mut new_orders: HashSet<Uuid> = HashSet::new();

        for write in &changes.orders {
            match write {
                RowWrite::Insert(order) => {
                    if self.orders.contains_key(&order.id) {
                        return Err(StoreError::Conflict {
                            entity: EntityType::Order,
                            id: order.id,
                        });
                    }
                    if !codes.insert(order.code.as_str()) {
                        return Err(StoreError::DuplicateCode(order.code.clone()));
                    }
                    new_orders.insert(order.id);
                }
                RowWrite::Update { row, expected_version } => {
                    let current = self.orders.get(&row.id).map(|o| o.version);
                    if current != Some(*expected_version) {
                        return Err(StoreError::Conflict {
                            entity: EntityType::Order,
                            id: row.id,
                        });
                    }
                }
            }
        }

        for write in &changes.payments {
            match write {
                RowWrite::Insert(payment) => {
                    if self.payments.contains_key(&payment.id) {
                        return Err(StoreError::Conflict {
                            entity: EntityType::Payment,
                            id: payment.id,
                        });
                    }
                    if !self.orders.contains_key(&payment.order_id) && !new_orders.contains(&payment.order_id) {
                        return Err(StoreError::MissingOrder(payment.order_id));
                    }
                }
                RowWrite::Update { row, expected_version } => {
                    let current = self.payments.get(&row.id).map(|p| p.version);
                    if current != Some(*expected_version) {
                        return Err(StoreError::Conflict {
                            entity: EntityType::Payment,
                            id: row.id,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for write in changes.orders {
            let order = match write {
                RowWrite::Insert(row) | RowWrite::Update { row, .. } => row,
            };
            self.orders.insert(order.id, order);
        }
        for write in changes.payments {
            let payment = match write {
                RowWrite::Insert(row) | RowWrite::Update { row, .. } => row,
            };
            self.payments.insert(payment.id, payment);
        }
        self.audit.extend(changes.audit);
        self.outbox.extend(changes.outbox);
    }
}

fn newest_first<T>(rows: &mut [T], created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait]
impl OrderRepository for MemoryLedgerStore {
    async fn load_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut state = self.state.lock().await;
        state.read_guard()?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut state = self.state.lock().await;
        state.read_guard()?;
        let mut orders: Vec<Order> = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        newest_first(&mut orders, |o| o.created_at);
        Ok(orders)
    }
}

#[async_trait]
impl PaymentRepository for MemoryLedgerStore {
    async fn load_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let mut state = self.state.lock().await;
        state.read_guard()?;
        Ok(state.payments.get(&id).cloned())
    }

    async fn payments_for_order(&self, order_id: Uuid) -> StoreResult<Vec<Payment>> {
        let mut state = self.state.lock().await;
        state.read_guard()?;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> StoreResult<Vec<Payment>> {
        let mut state = self.state.lock().await;
        state.read_guard()?;
        let mut payments: Vec<Payment> = state.payments.values().filter(|p| filter.matches(p)).cloned().collect();
        newest_first(&mut payments, |p| p.created_at);
        Ok(payments)
    }
}

#[async_trait]
impl AuditLog for MemoryLedgerStore {
    async fn audit_trail(&self, entity_id: Uuid) -> StoreResult<Vec<AuditEntry>> {
        let state = self.state.lock().await;
        Ok(state.audit.iter().filter(|a| a.entity_id == entity_id).cloned().collect())
    }
}

#[async_trait]
impl OutboxRepository for MemoryLedgerStore {
    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.outbox.iter_mut().find(|m| m.id() == id) {
            message.status = OutboxStatus::Published;
            message.attempts += 1;
            message.last_error = None;
        }
        Ok(())
    }

    async fn record_delivery_failure(&self, id: Uuid, error: &str, dead_letter: bool) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.outbox.iter_mut().find(|m| m.id() == id) {
            message.attempts += 1;
            message.last_error = Some(error.to_string());
            if dead_letter {
                message.status = OutboxStatus::DeadLettered;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        if let Some(reason) = state.fail_next_commit.take() {
            return Err(StoreError::Unavailable(reason));
        }

        state.validate(&changes)?;
        state.apply(changes);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditAction;
    use crate::domain::context::CommandContext;
    use crate::domain::order::{CreateOrder, OrderType};
    use rust_decimal::Decimal;

    fn ctx() -> CommandContext {
        CommandContext::new(Uuid::new_v4())
    }

    fn test_order(code: &str) -> Order {
        Order::new(
            &CreateOrder {
                code: code.to_string(),
                order_type: OrderType::ProductSale,
                reference_id: None,
                currency: "PEN".to_string(),
                subtotal: Decimal::new(30, 0),
                tax: Decimal::ZERO,
                metadata: None,
                status: None,
                note: None,
            },
            &ctx(),
        )
        .unwrap()
    }

    async fn seeded(store: &MemoryLedgerStore, order: &Order) {
        let mut changes = ChangeSet::new(&ctx());
        changes.insert_order(order.clone());
        store.commit(changes).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_and_load() {
        let store = MemoryLedgerStore::new();
        let order = test_order("ORD-1");
        seeded(&store, &order).await;

        let loaded = store.load_order(order.id).await.unwrap().unwrap();
        assert_eq!(loaded, order);
        assert_eq!(store.audit_trail(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_rejects_whole_set() {
        let store = MemoryLedgerStore::new();
        let order = test_order("ORD-2");
        seeded(&store, &order).await;

        let mut first = ChangeSet::new(&ctx());
        first.update_order(&mut order.clone(), AuditAction::Update);
        store.commit(first).await.unwrap();

        // Second writer still holds version 1.
        let mut stale = ChangeSet::new(&ctx());
        stale.insert_payment(Payment::for_submitted_order(&order, &ctx()));
        stale.update_order(&mut order.clone(), AuditAction::Update);
        let result = store.commit(stale).await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert!(store.payments_for_order(order.id).await.unwrap().is_empty());
        assert_eq!(store.audit_len().await, 2);
    }

    #[tokio::test]
    async fn test_payment_requires_existing_order() {
        let store = MemoryLedgerStore::new();
        let order = test_order("ORD-3");

        let mut changes = ChangeSet::new(&ctx());
        changes.insert_payment(Payment::for_submitted_order(&order, &ctx()));

        assert!(matches!(store.commit(changes).await, Err(StoreError::MissingOrder(_))));
    }

    #[tokio::test]
    async fn test_order_and_payment_in_one_set() {
        let store = MemoryLedgerStore::new();
        let order = test_order("ORD-4");

        let mut changes = ChangeSet::new(&ctx());
        changes.insert_order(order.clone());
        changes.insert_payment(Payment::for_submitted_order(&order, &ctx()));
        store.commit(changes).await.unwrap();

        assert_eq!(store.payments_for_order(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = MemoryLedgerStore::new();
        seeded(&store, &test_order("ORD-5")).await;

        let mut changes = ChangeSet::new(&ctx());
        changes.insert_order(test_order("ORD-5"));
        assert!(matches!(store.commit(changes).await, Err(StoreError::DuplicateCode(_))));
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        let store = MemoryLedgerStore::new();
        store.fail_next_commit("disk full").await;

        let mut changes = ChangeSet::new(&ctx());
        changes.insert_order(test_order("ORD-6"));
        assert!(matches!(store.commit(changes).await, Err(StoreError::Unavailable(_))));
        assert_eq!(store.audit_len().await, 0);

        // Only the next commit fails.
        let mut retry = ChangeSet::new(&ctx());
        retry.insert_order(test_order("ORD-6"));
        assert!(store.commit(retry).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_read_failure_hits_one_read() {
        let store = MemoryLedgerStore::new();
        let order = test_order("ORD-8");
        seeded(&store, &order).await;

        store.fail_next_read("replica lag").await;
        assert!(matches!(
            store.payments_for_order(order.id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.load_order(order.id).await.unwrap().is_some());

        store.fail_read_after(1, "replica lag").await;
        assert!(store.load_order(order.id).await.is_ok());
        assert!(store.list_orders(&OrderFilter::default()).await.is_err());
        assert!(store.list_orders(&OrderFilter::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_outbox_delivery_bookkeeping() {
        use crate::domain::order::{OrderEvent, OrderFailed};

        let store = MemoryLedgerStore::new();
        let order = test_order("ORD-7");
        let mut changes = ChangeSet::new(&ctx());
        changes.insert_order(order.clone());
        changes.emit(OrderEvent::Failed(OrderFailed {
            order_id: order.id,
            operation: "test".to_string(),
            error: "x".to_string(),
            failed_at: chrono::Utc::now(),
        }));
        store.commit(changes).await.unwrap();

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        store.record_delivery_failure(pending[0].id(), "broker down", false).await.unwrap();
        let retried = store.pending_outbox(10).await.unwrap();
        assert_eq!(retried[0].attempts, 1);

        store.record_delivery_failure(pending[0].id(), "broker down", true).await.unwrap();
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
        assert_eq!(store.outbox_messages().await[0].status, OutboxStatus::DeadLettered);
    }
}
