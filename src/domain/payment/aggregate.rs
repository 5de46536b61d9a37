use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{normalized_voucher, CreatePayment, ProcessPayment, RefundPayment};
use super::value_objects::{PaymentMethod, PaymentStatus, PaymentType};
use crate::domain::annotation::{annotate, Annotation, AnnotationKind};
use crate::domain::context::CommandContext;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::order::Order;

// ============================================================================
// Payment Aggregate - Domain Logic
// ============================================================================
//
// Transitions:
//   PENDING -> PROCESSING -> COMPLETED -> REFUNDED
//   PENDING -> CANCELLED      (cancel)
//   PROCESSING -> CANCELLED   (reject)
//
// The aggregate only changes its own row. Cascading the parent order is the
// command handler's job, inside the same change set.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    // Identity
    pub id: Uuid,
    pub order_id: Uuid,

    // Current State
    pub date: DateTime<Utc>,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub voucher_number: Option<String>,
    pub original_payment_id: Option<Uuid>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub annotations: Vec<Annotation>,
    pub is_active: bool,

    // Concurrency & Audit
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    fn blank(order_id: Uuid, payment_type: PaymentType, amount: Decimal, ctx: &CommandContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            date: ctx.now,
            status: PaymentStatus::Pending,
            payment_type,
            amount,
            description: None,
            payment_method: None,
            voucher_number: None,
            original_payment_id: None,
            verified_by: None,
            verified_at: None,
            annotations: Vec::new(),
            is_active: true,
            version: 1,
            created_at: ctx.now,
            updated_at: ctx.now,
        }
    }

    /// The REGULAR payment opened when a draft order is submitted.
    pub fn for_submitted_order(order: &Order, ctx: &CommandContext) -> Self {
        let mut payment = Self::blank(order.id, PaymentType::Regular, order.total, ctx);
        payment.description = Some(format!("Payment for order {}", order.code));
        payment
    }

    /// A payment registered directly against an existing order.
    pub fn new(command: &CreatePayment, order: &Order, ctx: &CommandContext) -> LedgerResult<Self> {
        if command.payment_type == PaymentType::Refund {
            return Err(LedgerError::InvalidOperation(
                "Refund payments are created by refunding a completed payment".to_string(),
            ));
        }
        if order.status.is_terminal() {
            return Err(LedgerError::InvalidState(format!(
                "Cannot add payments to a {} order",
                order.status
            )));
        }

        let amount = if command.payment_type.is_outflow() {
            -command.amount
        } else {
            command.amount
        };

        let mut payment = Self::blank(order.id, command.payment_type, amount, ctx);
        payment.date = command.date.unwrap_or(ctx.now);
        payment.description = command.description.clone();
        payment.payment_method = command.payment_method;
        payment.voucher_number = normalized_voucher(command.voucher_number.as_deref());
        Ok(payment)
    }

    fn ensure_active(&self) -> LedgerResult<()> {
        if self.is_active {
            Ok(())
        } else {
            Err(LedgerError::InvalidOperation(format!(
                "Payment {} is deactivated",
                self.id
            )))
        }
    }

    fn require_status(&self, expected: PaymentStatus, action: &str) -> LedgerResult<()> {
        self.ensure_active()?;
        if self.status == expected {
            Ok(())
        } else {
            Err(LedgerError::InvalidState(format!(
                "Only {} payments can be {}, payment is {}",
                expected.as_str().to_lowercase(),
                action,
                self.status
            )))
        }
    }

    fn touch(&mut self, ctx: &CommandContext) {
        self.updated_at = ctx.now;
    }

    /// PENDING -> PROCESSING. The amount must match the order total and a
    /// voucher is required for every method except cash.
    pub fn process(&mut self, command: &ProcessPayment, order: &Order, ctx: &CommandContext) -> LedgerResult<()> {
        self.require_status(PaymentStatus::Pending, "processed")?;

        if command.amount != order.total {
            return Err(LedgerError::InvalidData(format!(
                "Payment amount {} does not match order total {}",
                command.amount, order.total
            )));
        }

        let voucher = normalized_voucher(command.voucher_number.as_deref());
        if command.payment_method.requires_voucher() && voucher.is_none() {
            return Err(LedgerError::InvalidData(format!(
                "A voucher number is required for {} payments",
                command.payment_method.as_str()
            )));
        }

        self.status = PaymentStatus::Processing;
        self.amount = command.amount;
        self.payment_method = Some(command.payment_method);
        self.voucher_number = voucher;
        self.date = command.date.unwrap_or(ctx.now);
        if let Some(description) = &command.description {
            self.description = Some(description.clone());
        }
        self.annotations.push(Annotation::new(
            AnnotationKind::Processed,
            ctx.performed_by,
            ctx.now,
            format!("Processed via {}", command.payment_method.as_str()),
        ));
        self.touch(ctx);
        Ok(())
    }

    /// PROCESSING -> COMPLETED, stamped with the verifying user.
    pub fn verify(&mut self, ctx: &CommandContext, note: Option<&str>) -> LedgerResult<()> {
        self.require_status(PaymentStatus::Processing, "verified")?;

        self.status = PaymentStatus::Completed;
        self.verified_by = Some(ctx.performed_by);
        self.verified_at = Some(ctx.now);
        self.annotations.push(Annotation::new(
            AnnotationKind::Verified,
            ctx.performed_by,
            ctx.now,
            note.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("Payment verified"),
        ));
        self.touch(ctx);
        Ok(())
    }

    /// PROCESSING -> CANCELLED.
    pub fn reject(&mut self, ctx: &CommandContext, reason: Option<&str>) -> LedgerResult<()> {
        self.require_status(PaymentStatus::Processing, "rejected")?;

        self.status = PaymentStatus::Cancelled;
        annotate(&mut self.annotations, AnnotationKind::Rejected, ctx.performed_by, ctx.now, reason);
        self.touch(ctx);
        Ok(())
    }

    /// PENDING -> CANCELLED.
    pub fn cancel(&mut self, ctx: &CommandContext, reason: Option<&str>) -> LedgerResult<()> {
        self.require_status(PaymentStatus::Pending, "cancelled")?;

        self.status = PaymentStatus::Cancelled;
        annotate(&mut self.annotations, AnnotationKind::Cancelled, ctx.performed_by, ctx.now, reason);
        self.touch(ctx);
        Ok(())
    }

    /// COMPLETED -> REFUNDED. Returns the compensating REFUND payment.
    pub fn refund(&mut self, command: &RefundPayment, ctx: &CommandContext) -> LedgerResult<Payment> {
        self.require_status(PaymentStatus::Completed, "refunded")?;

        if command.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidData(
                "Refund amount must be greater than zero".to_string(),
            ));
        }
        if command.amount > self.amount {
            return Err(LedgerError::InvalidData(format!(
                "Refund amount {} exceeds original payment amount {}",
                command.amount, self.amount
            )));
        }

        self.status = PaymentStatus::Refunded;
        annotate(
            &mut self.annotations,
            AnnotationKind::Refunded,
            ctx.performed_by,
            ctx.now,
            command.reason.as_deref(),
        );
        self.touch(ctx);

        let mut refund = Self::blank(self.order_id, PaymentType::Refund, -command.amount, ctx);
        refund.status = PaymentStatus::Completed;
        refund.payment_method = self.payment_method;
        refund.original_payment_id = Some(self.id);
        refund.description = Some(match command.reason.as_deref().map(str::trim) {
            Some(reason) if !reason.is_empty() => format!("Refund of payment {}: {}", self.id, reason),
            _ => format!("Refund of payment {}", self.id),
        });
        Ok(refund)
    }

    /// Cascade target when the parent order is cancelled.
    pub(crate) fn cancel_with_order(&mut self, ctx: &CommandContext, reason: Option<&str>) {
        self.status = PaymentStatus::Cancelled;
        self.annotations.push(Annotation::new(
            AnnotationKind::Cancelled,
            ctx.performed_by,
            ctx.now,
            reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or("Order cancelled"),
        ));
        self.touch(ctx);
    }

    /// Cascade target when the parent order is refunded.
    pub(crate) fn refund_with_order(&mut self, ctx: &CommandContext, reason: Option<&str>) {
        self.status = PaymentStatus::Refunded;
        self.annotations.push(Annotation::new(
            AnnotationKind::Refunded,
            ctx.performed_by,
            ctx.now,
            reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or("Order refunded"),
        ));
        self.touch(ctx);
    }

    /// Soft delete. Returns false when already in the requested state.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CreateOrder, OrderStatus, OrderType};

    fn ctx() -> CommandContext {
        CommandContext::new(Uuid::new_v4())
    }

    fn create_test_order() -> Order {
        let command = CreateOrder {
            code: "ORD-200".to_string(),
            order_type: OrderType::ProductSale,
            reference_id: None,
            currency: "PEN".to_string(),
            subtotal: Decimal::new(100, 0),
            tax: Decimal::ZERO,
            metadata: None,
            status: Some(OrderStatus::Pending),
            note: None,
        };
        Order::new(&command, &ctx()).unwrap()
    }

    fn process_command(amount: i64, method: PaymentMethod, voucher: Option<&str>) -> ProcessPayment {
        ProcessPayment {
            amount: Decimal::new(amount, 0),
            payment_method: method,
            voucher_number: voucher.map(str::to_string),
            date: None,
            description: None,
        }
    }

    fn payment_with_status(order: &Order, status: PaymentStatus) -> Payment {
        let mut payment = Payment::for_submitted_order(order, &ctx());
        payment.status = status;
        payment
    }

    #[test]
    fn test_process_cash_without_voucher() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Pending);

        payment.process(&process_command(100, PaymentMethod::Cash, None), &order, &ctx()).unwrap();

        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.payment_method, Some(PaymentMethod::Cash));
        assert!(payment.voucher_number.is_none());
    }

    #[test]
    fn test_process_amount_mismatch_fails() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Pending);

        let result = payment.process(&process_command(90, PaymentMethod::Cash, None), &order, &ctx());

        assert!(matches!(result, Err(LedgerError::InvalidData(_))));
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_process_transfer_requires_voucher() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Pending);

        let missing = payment.process(&process_command(100, PaymentMethod::BankTransfer, Some(" ")), &order, &ctx());
        assert!(matches!(missing, Err(LedgerError::InvalidData(_))));

        payment
            .process(&process_command(100, PaymentMethod::BankTransfer, Some("OP-7781")), &order, &ctx())
            .unwrap();
        assert_eq!(payment.voucher_number.as_deref(), Some("OP-7781"));
    }

    #[test]
    fn test_process_requires_pending() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Processing);
        let result = payment.process(&process_command(100, PaymentMethod::Cash, None), &order, &ctx());
        assert!(matches!(result, Err(LedgerError::InvalidState(_))));
    }

    #[test]
    fn test_verify_stamps_verifier() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Processing);
        let context = ctx();

        payment.verify(&context, None).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.verified_by, Some(context.performed_by));
        assert_eq!(payment.verified_at, Some(context.now));
        assert_eq!(payment.annotations.last().unwrap().kind, AnnotationKind::Verified);
    }

    #[test]
    fn test_verify_requires_processing() {
        let order = create_test_order();
        for status in [PaymentStatus::Pending, PaymentStatus::Completed, PaymentStatus::Cancelled] {
            let mut payment = payment_with_status(&order, status);
            assert!(matches!(payment.verify(&ctx(), None), Err(LedgerError::InvalidState(_))));
            assert!(payment.verified_at.is_none());
        }
    }

    #[test]
    fn test_reject_and_cancel_guards() {
        let order = create_test_order();

        let mut processing = payment_with_status(&order, PaymentStatus::Processing);
        assert!(processing.cancel(&ctx(), None).is_err());
        processing.reject(&ctx(), Some("voucher not found")).unwrap();
        assert_eq!(processing.status, PaymentStatus::Cancelled);
        assert_eq!(processing.annotations.last().unwrap().text, "voucher not found");

        let mut pending = payment_with_status(&order, PaymentStatus::Pending);
        assert!(pending.reject(&ctx(), None).is_err());
        pending.cancel(&ctx(), None).unwrap();
        assert_eq!(pending.status, PaymentStatus::Cancelled);
    }

    #[test]
    fn test_refund_exceeding_original_fails() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Completed);
        let before = payment.clone();

        let result = payment.refund(
            &RefundPayment {
                amount: Decimal::new(150, 0),
                reason: None,
            },
            &ctx(),
        );

        assert!(matches!(result, Err(LedgerError::InvalidData(_))));
        assert_eq!(payment, before);
    }

    #[test]
    fn test_partial_refund_creates_negative_payment() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Completed);

        let refund = payment
            .refund(
                &RefundPayment {
                    amount: Decimal::new(40, 0),
                    reason: Some("returned item".to_string()),
                },
                &ctx(),
            )
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(refund.payment_type, PaymentType::Refund);
        assert_eq!(refund.amount, Decimal::new(-40, 0));
        assert_eq!(refund.status, PaymentStatus::Completed);
        assert_eq!(refund.original_payment_id, Some(payment.id));
        assert_eq!(refund.order_id, order.id);
    }

    #[test]
    fn test_refund_requires_completed() {
        let order = create_test_order();
        let mut payment = payment_with_status(&order, PaymentStatus::Processing);
        let result = payment.refund(
            &RefundPayment {
                amount: Decimal::new(10, 0),
                reason: None,
            },
            &ctx(),
        );
        assert!(matches!(result, Err(LedgerError::InvalidState(_))));
    }

    #[test]
    fn test_deactivated_payment_rejects_every_transition() {
        let order = create_test_order();
        let refund = RefundPayment {
            amount: Decimal::new(10, 0),
            reason: None,
        };

        for status in [PaymentStatus::Pending, PaymentStatus::Processing, PaymentStatus::Completed] {
            let mut payment = payment_with_status(&order, status);
            payment.set_active(false, &ctx());
            let before = payment.clone();

            let results = [
                payment.process(&process_command(100, PaymentMethod::Cash, None), &order, &ctx()),
                payment.verify(&ctx(), None),
                payment.reject(&ctx(), None),
                payment.cancel(&ctx(), None),
                payment.refund(&refund, &ctx()).map(|_| ()),
            ];
            for result in results {
                assert!(matches!(result, Err(LedgerError::InvalidOperation(_))));
            }
            assert_eq!(payment, before);
        }
    }

    #[test]
    fn test_new_compensation_is_negative() {
        let order = create_test_order();
        let command = CreatePayment {
            order_id: order.id,
            payment_type: PaymentType::Compensation,
            amount: Decimal::new(15, 0),
            payment_method: Some(PaymentMethod::Cash),
            voucher_number: None,
            description: Some("loyalty discount".to_string()),
            date: None,
        };
        let payment = Payment::new(&command, &order, &ctx()).unwrap();
        assert_eq!(payment.amount, Decimal::new(-15, 0));
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_new_refund_type_is_rejected() {
        let order = create_test_order();
        let command = CreatePayment {
            order_id: order.id,
            payment_type: PaymentType::Refund,
            amount: Decimal::new(15, 0),
            payment_method: None,
            voucher_number: None,
            description: None,
            date: None,
        };
        assert!(matches!(
            Payment::new(&command, &order, &ctx()),
            Err(LedgerError::InvalidOperation(_))
        ));
    }
}
