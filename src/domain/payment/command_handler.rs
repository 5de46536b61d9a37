use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::aggregate::Payment;
use super::commands::{CancelPayment, CreatePayment, ProcessPayment, RefundPayment, RejectPayment, VerifyPayment};
use super::value_objects::PaymentStatus;
use crate::domain::audit::AuditAction;
use crate::domain::context::{CommandContext, Envelope};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::order::command_handler::{distinct_ids, stage_changed_payments};
use crate::domain::order::{
    BulkIds, BulkOutcome, Order, OrderCancelled, OrderCompleted, OrderEvent, OrderRefunded, OrderStatus,
    PaymentRejection, TransitionOutcome,
};
use crate::domain::statistics::{summarize, PaymentStatistics};
use crate::ledger::{ChangeSet, LedgerExecutor, OrderRepository, PaymentFilter, PaymentRepository};

// ============================================================================
// Payment Command Handler
// ============================================================================
//
// Payment transitions cascade onto the parent order inside the same commit:
//   verify  → order COMPLETED (completion event)
//   reject  → order CANCELLED, sibling open payments cancelled
//   cancel  → order CANCELLED, sibling open payments cancelled
//   refund  → REFUND payment created, order REFUNDED
//
// Once the payment is loaded its order is known, and ledger failures from
// there on publish `order.failed` for that order.
//
// ============================================================================

/// A payment after a transition, with its order and any other payment the
/// command created or changed.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentTransition {
    pub payment: Payment,
    pub order: Order,
    pub related: Vec<Payment>,
}

pub struct PaymentCommandHandler {
    executor: Arc<LedgerExecutor>,
}

impl PaymentCommandHandler {
    pub fn new(executor: Arc<LedgerExecutor>) -> Self {
        Self { executor }
    }

    async fn load_order(&self, id: Uuid) -> LedgerResult<Order> {
        self.executor
            .store()
            .load_order(id)
            .await?
            .ok_or_else(|| LedgerError::order_not_found(id))
    }

    async fn load_payment(&self, id: Uuid) -> LedgerResult<Payment> {
        self.executor
            .store()
            .load_payment(id)
            .await?
            .ok_or_else(|| LedgerError::payment_not_found(id))
    }

    /// The payment's order and every payment of that order. The given
    /// payment sits at the returned index.
    async fn load_family(&self, payment: &Payment) -> LedgerResult<(Order, Vec<Payment>, usize)> {
        let order = self.load_order(payment.order_id).await?;
        let payments = self.executor.store().payments_for_order(order.id).await?;
        let index = payments
            .iter()
            .position(|p| p.id == payment.id)
            .ok_or_else(|| LedgerError::payment_not_found(payment.id))?;
        Ok((order, payments, index))
    }

    /// Load a payment, then run `step` on it with ledger failures reported
    /// against its order.
    async fn with_payment<T, F, Fut>(&self, operation: &'static str, id: Uuid, ctx: &CommandContext, step: F) -> LedgerResult<T>
    where
        F: FnOnce(Payment) -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let payment = self.load_payment(id).await?;
        let order_id = payment.order_id;
        self.executor.report_failures(operation, order_id, ctx, step(payment)).await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get(&self, id: Uuid) -> LedgerResult<Envelope<Payment>> {
        let payment = self.load_payment(id).await?;
        Ok(Envelope::ok("Payment retrieved successfully", payment))
    }

    pub async fn list(&self, filter: PaymentFilter) -> LedgerResult<Envelope<Vec<Payment>>> {
        if let Some(order_id) = filter.order_id {
            self.load_order(order_id).await?;
        }
        let payments = self.executor.store().list_payments(&filter).await?;
        Ok(Envelope::ok(
            format!("{} payments retrieved successfully", payments.len()),
            payments,
        ))
    }

    /// Statistics over active, non-cancelled payments, optionally of one order.
    pub async fn statistics(&self, order_id: Option<Uuid>) -> LedgerResult<Envelope<PaymentStatistics>> {
        if let Some(order_id) = order_id {
            self.load_order(order_id).await?;
        }
        let filter = PaymentFilter {
            order_id,
            include_inactive: false,
        };
        let payments: Vec<Payment> = self
            .executor
            .store()
            .list_payments(&filter)
            .await?
            .into_iter()
            .filter(|p| p.status != PaymentStatus::Cancelled)
            .collect();

        Ok(Envelope::ok("Payment statistics computed successfully", summarize(&payments)?))
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub async fn create(&self, command: CreatePayment, ctx: &CommandContext) -> LedgerResult<Envelope<Payment>> {
        let order_id = command.order_id;
        self.executor
            .instrumented_for_order("create_payment", order_id, ctx, self.create_payment(command, ctx))
            .await
    }

    async fn create_payment(&self, command: CreatePayment, ctx: &CommandContext) -> LedgerResult<Envelope<Payment>> {
        command.validate()?;
        let order = self.load_order(command.order_id).await?;
        let payment = Payment::new(&command, &order, ctx)?;

        let mut changes = ChangeSet::new(ctx);
        changes.insert_payment(payment.clone());
        self.executor.commit("create_payment", Some(order.id), changes).await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            payment_type = %payment.payment_type,
            amount = %payment.amount,
            "Payment created"
        );
        Ok(Envelope::ok("Payment created successfully", payment))
    }

    pub async fn process(&self, id: Uuid, command: ProcessPayment, ctx: &CommandContext) -> LedgerResult<Envelope<Payment>> {
        let step = move |payment| self.process_payment(payment, command, ctx);
        self.executor
            .instrumented("process_payment", self.with_payment("process_payment", id, ctx, step))
            .await
    }

    async fn process_payment(&self, mut payment: Payment, command: ProcessPayment, ctx: &CommandContext) -> LedgerResult<Envelope<Payment>> {
        command.validate()?;
        let order = self.load_order(payment.order_id).await?;
        payment.process(&command, &order, ctx)?;

        let mut changes = ChangeSet::new(ctx);
        changes.update_payment(&mut payment, AuditAction::Update);
        self.executor.commit("process_payment", Some(order.id), changes).await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            method = ?payment.payment_method,
            "Payment processing"
        );
        Ok(Envelope::ok("Payment processed successfully", payment))
    }

    pub async fn verify(&self, id: Uuid, command: VerifyPayment, ctx: &CommandContext) -> LedgerResult<Envelope<PaymentTransition>> {
        let step = move |payment| self.verify_payment(payment, command, ctx);
        self.executor
            .instrumented("verify_payment", self.with_payment("verify_payment", id, ctx, step))
            .await
    }

    async fn verify_payment(
        &self,
        mut payment: Payment,
        command: VerifyPayment,
        ctx: &CommandContext,
    ) -> LedgerResult<Envelope<PaymentTransition>> {
        let mut order = self.load_order(payment.order_id).await?;
        payment.verify(ctx, command.note.as_deref())?;

        let mut changes = ChangeSet::new(ctx);
        changes.update_payment(&mut payment, AuditAction::Update);

        // A later payment on an already completed order leaves the order as is.
        if order.status != OrderStatus::Completed {
            order.complete(ctx, command.note.as_deref())?;
            changes.update_order(&mut order, AuditAction::Update);
            changes.emit(OrderEvent::Completed(OrderCompleted::new(&order, payment.id)));
        }
        self.executor.commit("verify_payment", Some(order.id), changes).await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            verified_by = %ctx.performed_by,
            order_status = %order.status,
            "Payment verified"
        );
        Ok(Envelope::ok(
            "Payment verified successfully",
            PaymentTransition {
                payment,
                order,
                related: Vec::new(),
            },
        ))
    }

    pub async fn reject(&self, id: Uuid, command: RejectPayment, ctx: &CommandContext) -> LedgerResult<Envelope<PaymentTransition>> {
        let step = move |payment| self.close_payment(payment, command.reason, true, ctx);
        self.executor
            .instrumented("reject_payment", self.with_payment("reject_payment", id, ctx, step))
            .await
    }

    pub async fn cancel(&self, id: Uuid, command: CancelPayment, ctx: &CommandContext) -> LedgerResult<Envelope<PaymentTransition>> {
        let step = move |payment| self.close_payment(payment, command.reason, false, ctx);
        self.executor
            .instrumented("cancel_payment", self.with_payment("cancel_payment", id, ctx, step))
            .await
    }

    /// Reject (PROCESSING) or cancel (PENDING) a payment and cancel its
    /// order with every other open payment.
    async fn close_payment(
        &self,
        payment: Payment,
        reason: Option<String>,
        rejected: bool,
        ctx: &CommandContext,
    ) -> LedgerResult<Envelope<PaymentTransition>> {
        let operation = if rejected { "reject_payment" } else { "cancel_payment" };
        let id = payment.id;
        let (mut order, mut payments, index) = self.load_family(&payment).await?;
        let reason_ref = reason.as_deref();

        if rejected {
            payments[index].reject(ctx, reason_ref)?;
        } else {
            payments[index].cancel(ctx, reason_ref)?;
        }
        let cascade = order.cancel(&mut payments, ctx, reason_ref)?;

        let mut changes = ChangeSet::new(ctx);
        changes.update_payment(&mut payments[index], AuditAction::Update);
        let siblings = stage_changed_payments(&mut changes, &mut payments, &cascade.changed_payments);

        if !cascade.is_noop() {
            changes.update_order(&mut order, AuditAction::Update);
            let mut cancelled_payment_ids = vec![id];
            cancelled_payment_ids.extend(cascade.changed_payments.iter().copied());
            changes.emit(OrderEvent::Cancelled(OrderCancelled {
                order_id: order.id,
                reference_id: order.reference_id,
                reason: reason.clone(),
                cancelled_payment_ids,
                rejection: rejected.then(|| PaymentRejection {
                    payment_id: id,
                    reason: reason.clone(),
                }),
                cancelled_at: ctx.now,
            }));
        }
        self.executor.commit(operation, Some(order.id), changes).await?;

        let payment = payments[index].clone();
        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            rejected,
            cancelled_siblings = siblings.len(),
            "Payment closed, order cancelled"
        );
        let message = if rejected {
            "Payment rejected successfully"
        } else {
            "Payment cancelled successfully"
        };
        Ok(Envelope::ok(
            message,
            PaymentTransition {
                payment,
                order,
                related: siblings,
            },
        ))
    }

    pub async fn refund(&self, id: Uuid, command: RefundPayment, ctx: &CommandContext) -> LedgerResult<Envelope<PaymentTransition>> {
        let step = move |payment| self.refund_payment(payment, command, ctx);
        self.executor
            .instrumented("refund_payment", self.with_payment("refund_payment", id, ctx, step))
            .await
    }

    async fn refund_payment(
        &self,
        mut payment: Payment,
        command: RefundPayment,
        ctx: &CommandContext,
    ) -> LedgerResult<Envelope<PaymentTransition>> {
        command.validate()?;
        let mut order = self.load_order(payment.order_id).await?;

        let refund = payment.refund(&command, ctx)?;
        let outcome = order.mark_refunded(ctx, command.reason.as_deref())?;

        let mut changes = ChangeSet::new(ctx);
        changes.update_payment(&mut payment, AuditAction::Update);
        if outcome == TransitionOutcome::Applied {
            changes.update_order(&mut order, AuditAction::Update);
        }
        changes.insert_payment(refund.clone());
        changes.emit(OrderEvent::Refunded(OrderRefunded {
            order_id: order.id,
            reference_id: order.reference_id,
            refunded_payment_ids: vec![payment.id],
            refund_payment_id: Some(refund.id),
            amount: command.amount,
            reason: command.reason.clone(),
            refunded_at: ctx.now,
        }));
        self.executor.commit("refund_payment", Some(order.id), changes).await?;

        tracing::info!(
            payment_id = %payment.id,
            refund_payment_id = %refund.id,
            order_id = %order.id,
            amount = %command.amount,
            "Payment refunded"
        );
        Ok(Envelope::ok(
            "Payment refunded successfully",
            PaymentTransition {
                payment,
                order,
                related: vec![refund],
            },
        ))
    }

    pub async fn deactivate_all(&self, command: BulkIds, ctx: &CommandContext) -> LedgerResult<Envelope<BulkOutcome>> {
        self.executor
            .instrumented("deactivate_payments", self.set_active_many(command, false, ctx))
            .await
    }

    pub async fn reactivate_all(&self, command: BulkIds, ctx: &CommandContext) -> LedgerResult<Envelope<BulkOutcome>> {
        self.executor
            .instrumented("reactivate_payments", self.set_active_many(command, true, ctx))
            .await
    }

    async fn set_active_many(&self, command: BulkIds, active: bool, ctx: &CommandContext) -> LedgerResult<Envelope<BulkOutcome>> {
        command
            .validate()
            .map_err(|e| LedgerError::InvalidData(e.to_string()))?;
        let ids = distinct_ids(&command.ids);

        let mut payments = Vec::with_capacity(ids.len());
        for id in &ids {
            payments.push(self.load_payment(*id).await?);
        }

        let action = if active { AuditAction::Update } else { AuditAction::Delete };
        let mut changes = ChangeSet::new(ctx);
        let mut affected = Vec::new();
        for payment in payments.iter_mut() {
            if payment.set_active(active, ctx) {
                changes.update_payment(payment, action);
                affected.push(payment.id);
            }
        }

        let operation = if active { "reactivate_payments" } else { "deactivate_payments" };
        if !changes.is_empty() {
            self.executor.commit(operation, None, changes).await?;
        }

        tracing::info!(operation, requested = ids.len(), affected = affected.len(), "Bulk payment update");
        let verb = if active { "reactivated" } else { "deactivated" };
        Ok(Envelope::ok(
            format!("{} payments {} successfully", affected.len(), verb),
            BulkOutcome {
                requested: ids.len(),
                affected,
            },
        ))
    }
}
