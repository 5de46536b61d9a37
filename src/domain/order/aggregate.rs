use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{CreateOrder, UpdateOrder};
use super::value_objects::{OrderStatus, OrderType};
use crate::domain::annotation::{annotate, Annotation, AnnotationKind};
use crate::domain::context::CommandContext;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::validation::amount_fits;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Transitions:
//   DRAFT -> PENDING -> COMPLETED -> REFUNDED
//   DRAFT | PENDING | COMPLETED -> CANCELLED
//
// CANCELLED and REFUNDED are terminal. Cancel and refund are idempotent on
// their own terminal status. Cascades onto payments take the loaded payment
// rows by `&mut` and report which ones changed, so the caller can put
// exactly those rows into the same change set.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub code: String,
    pub order_type: OrderType,
    pub reference_id: Option<Uuid>,

    // Current State
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub annotations: Vec<Annotation>,
    pub metadata: serde_json::Value,
    pub is_active: bool,

    // Concurrency & Audit
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a transition that may already have happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyApplied,
}

/// Outcome of an order transition that cascades onto its payments.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub outcome: TransitionOutcome,
    pub changed_payments: Vec<Uuid>,
}

impl Cascade {
    fn unchanged() -> Self {
        Self {
            outcome: TransitionOutcome::AlreadyApplied,
            changed_payments: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.outcome == TransitionOutcome::AlreadyApplied
    }
}

/// Subtotal plus tax, when the sum is a storable amount.
fn checked_total(subtotal: Decimal, tax: Decimal) -> LedgerResult<Decimal> {
    subtotal
        .checked_add(tax)
        .filter(|total| amount_fits(*total))
        .ok_or_else(|| {
            LedgerError::InvalidData(format!(
                "Order total of subtotal {} and tax {} is out of range",
                subtotal, tax
            ))
        })
}

impl Order {
    pub fn new(command: &CreateOrder, ctx: &CommandContext) -> LedgerResult<Self> {
        let total = checked_total(command.subtotal, command.tax)?;
        let mut annotations = Vec::new();
        annotate(&mut annotations, AnnotationKind::Note, ctx.performed_by, ctx.now, command.note.as_deref());

        Ok(Self {
            id: Uuid::new_v4(),
            code: command.code.trim().to_string(),
            order_type: command.order_type,
            reference_id: command.reference_id,
            status: command.status.unwrap_or(OrderStatus::Draft),
            currency: command.currency.clone(),
            subtotal: command.subtotal,
            tax: command.tax,
            total,
            annotations,
            metadata: command
                .metadata
                .clone()
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            is_active: true,
            version: 1,
            created_at: ctx.now,
            updated_at: ctx.now,
        })
    }

    fn ensure_active(&self) -> LedgerResult<()> {
        if self.is_active {
            Ok(())
        } else {
            Err(LedgerError::InvalidOperation(format!(
                "Order {} is deactivated",
                self.code
            )))
        }
    }

    fn touch(&mut self, ctx: &CommandContext) {
        self.updated_at = ctx.now;
    }

    /// Apply draft edits. Totals are recomputed from subtotal and tax.
    pub fn apply_update(&mut self, changes: &UpdateOrder, ctx: &CommandContext) -> LedgerResult<()> {
        self.ensure_active()?;
        if self.status != OrderStatus::Draft {
            return Err(LedgerError::InvalidState(format!(
                "Only draft orders can be edited, order is {}",
                self.status
            )));
        }

        let subtotal = changes.subtotal.unwrap_or(self.subtotal);
        let tax = changes.tax.unwrap_or(self.tax);
        self.total = checked_total(subtotal, tax)?;
        self.subtotal = subtotal;
        self.tax = tax;

        if let Some(reference_id) = changes.reference_id {
            self.reference_id = Some(reference_id);
        }
        if let Some(currency) = &changes.currency {
            self.currency = currency.clone();
        }
        if let Some(metadata) = &changes.metadata {
            self.metadata = metadata.clone();
        }
        annotate(&mut self.annotations, AnnotationKind::Note, ctx.performed_by, ctx.now, changes.note.as_deref());
        self.touch(ctx);
        Ok(())
    }

    /// DRAFT -> PENDING. Returns the pending REGULAR payment for the total.
    pub fn submit_draft(&mut self, ctx: &CommandContext, note: Option<&str>) -> LedgerResult<Payment> {
        self.ensure_active()?;
        if self.status != OrderStatus::Draft {
            return Err(LedgerError::InvalidState(format!(
                "Only draft orders can be submitted, order is {}",
                self.status
            )));
        }

        self.status = OrderStatus::Pending;
        annotate(&mut self.annotations, AnnotationKind::Submitted, ctx.performed_by, ctx.now, note);
        self.touch(ctx);

        Ok(Payment::for_submitted_order(self, ctx))
    }

    /// DRAFT | PENDING -> COMPLETED, driven by payment verification.
    pub fn complete(&mut self, ctx: &CommandContext, note: Option<&str>) -> LedgerResult<()> {
        self.ensure_active()?;
        match self.status {
            OrderStatus::Draft | OrderStatus::Pending => {}
            other => {
                return Err(LedgerError::InvalidState(format!(
                    "Order cannot be completed from {}",
                    other
                )))
            }
        }

        self.status = OrderStatus::Completed;
        annotate(&mut self.annotations, AnnotationKind::Completed, ctx.performed_by, ctx.now, note);
        self.touch(ctx);
        Ok(())
    }

    /// Cancel the order and every payment still PENDING or PROCESSING.
    pub fn cancel(
        &mut self,
        payments: &mut [Payment],
        ctx: &CommandContext,
        reason: Option<&str>,
    ) -> LedgerResult<Cascade> {
        match self.status {
            OrderStatus::Cancelled => return Ok(Cascade::unchanged()),
            OrderStatus::Refunded => {
                return Err(LedgerError::InvalidState(
                    "Refunded orders cannot be cancelled".to_string(),
                ))
            }
            OrderStatus::Draft | OrderStatus::Pending | OrderStatus::Completed => {}
        }
        self.ensure_active()?;

        self.status = OrderStatus::Cancelled;
        annotate(&mut self.annotations, AnnotationKind::Cancelled, ctx.performed_by, ctx.now, reason);
        self.touch(ctx);

        let mut changed_payments = Vec::new();
        for payment in payments.iter_mut().filter(|p| p.order_id == self.id) {
            if payment.status.is_open() {
                payment.cancel_with_order(ctx, reason);
                changed_payments.push(payment.id);
            }
        }

        Ok(Cascade {
            outcome: TransitionOutcome::Applied,
            changed_payments,
        })
    }

    /// COMPLETED -> REFUNDED on the order alone. Idempotent on REFUNDED.
    pub fn mark_refunded(&mut self, ctx: &CommandContext, reason: Option<&str>) -> LedgerResult<TransitionOutcome> {
        match self.status {
            OrderStatus::Refunded => return Ok(TransitionOutcome::AlreadyApplied),
            OrderStatus::Completed => {}
            _ => {
                return Err(LedgerError::InvalidState(
                    "Only completed orders can be refunded".to_string(),
                ))
            }
        }
        self.ensure_active()?;

        self.status = OrderStatus::Refunded;
        annotate(&mut self.annotations, AnnotationKind::Refunded, ctx.performed_by, ctx.now, reason);
        self.touch(ctx);
        Ok(TransitionOutcome::Applied)
    }

    /// Refund the order and flip every COMPLETED payment to REFUNDED.
    pub fn refund(
        &mut self,
        payments: &mut [Payment],
        ctx: &CommandContext,
        reason: Option<&str>,
    ) -> LedgerResult<Cascade> {
        if self.status == OrderStatus::Refunded {
            return Ok(Cascade::unchanged());
        }
        if self.status != OrderStatus::Completed {
            return Err(LedgerError::InvalidState(
                "Only completed orders can be refunded".to_string(),
            ));
        }
        let has_completed = payments
            .iter()
            .any(|p| p.order_id == self.id && p.status == PaymentStatus::Completed);
        if !has_completed {
            return Err(LedgerError::InvalidOperation(format!(
                "Order {} has no completed payments to refund",
                self.code
            )));
        }

        self.mark_refunded(ctx, reason)?;

        let mut changed_payments = Vec::new();
        for payment in payments.iter_mut().filter(|p| p.order_id == self.id) {
            if payment.status == PaymentStatus::Completed {
                payment.refund_with_order(ctx, reason);
                changed_payments.push(payment.id);
            }
        }

        Ok(Cascade {
            outcome: TransitionOutcome::Applied,
            changed_payments,
        })
    }

    /// Soft delete. Returns false when already inactive.
    pub fn set_active(&mut self, active: bool, ctx: &CommandContext) -> bool {
        if self.is_active == active {
            return false;
        }
        self.is_active = active;
        self.touch(ctx);
        true
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
