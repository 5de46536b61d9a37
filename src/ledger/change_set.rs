use uuid::Uuid;

use super::outbox::{EventEnvelope, OutboxMessage};
use crate::domain::audit::{AuditAction, AuditEntry, EntityType};
use crate::domain::context::CommandContext;
use crate::domain::order::{Order, OrderEvent};
use crate::domain::payment::Payment;

// ============================================================================
// Change Set - everything one command writes, committed atomically
// ============================================================================
//
// Every row write records its audit entry at the same time, so a row can't
// be committed without one. Updates carry the version that was loaded; the
// store rejects the whole set if any stored version moved on since.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite<T> {
    Insert(T),
    Update { row: T, expected_version: i64 },
}

impl<T> RowWrite<T> {
    pub fn row(&self) -> &T {
        match self {
            RowWrite::Insert(row) => row,
            RowWrite::Update { row, .. } => row,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeSet {
    ctx: CommandContext,
    pub orders: Vec<RowWrite<Order>>,
    pub payments: Vec<RowWrite<Payment>>,
    pub audit: Vec<AuditEntry>,
    pub outbox: Vec<OutboxMessage>,
}

impl ChangeSet {
    pub fn new(ctx: &CommandContext) -> Self {
        Self {
            ctx: *ctx,
            orders: Vec::new(),
            payments: Vec::new(),
            audit: Vec::new(),
            outbox: Vec::new(),
        }
    }

    fn record(&mut self, entity_id: Uuid, entity_type: EntityType, action: AuditAction) {
        self.audit.push(AuditEntry::new(
            entity_id,
            entity_type,
            action,
            self.ctx.performed_by,
            self.ctx.now,
        ));
    }

    pub fn insert_order(&mut self, order: Order) {
        self.record(order.id, EntityType::Order, AuditAction::Create);
        self.orders.push(RowWrite::Insert(order));
    }

    /// Queue an update of a loaded order. Bumps the caller's copy to the
    /// version it will have once committed.
    pub fn update_order(&mut self, order: &mut Order, action: AuditAction) {
        let expected_version = order.version;
        order.version += 1;
        self.record(order.id, EntityType::Order, action);
        self.orders.push(RowWrite::Update {
            row: order.clone(),
            expected_version,
        });
    }

    pub fn insert_payment(&mut self, payment: Payment) {
        self.record(payment.id, EntityType::Payment, AuditAction::Create);
        self.payments.push(RowWrite::Insert(payment));
    }

    /// Queue an update of a loaded payment. Bumps the caller's copy.
    pub fn update_payment(&mut self, payment: &mut Payment, action: AuditAction) {
        let expected_version = payment.version;
        payment.version += 1;
        self.record(payment.id, EntityType::Payment, action);
        self.payments.push(RowWrite::Update {
            row: payment.clone(),
            expected_version,
        });
    }

    pub fn emit(&mut self, event: OrderEvent) {
        self.outbox
            .push(OutboxMessage::pending(EventEnvelope::new(event, &self.ctx)));
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.payments.is_empty() && self.outbox.is_empty()
    }

    /// Number of order and payment rows written by this set.
    pub fn row_count(&self) -> usize {
        self.orders.len() + self.payments.len()
    }
}
