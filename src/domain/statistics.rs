use rust_decimal::Decimal;
use serde::Serialize;

use super::errors::{LedgerError, LedgerResult};
use super::payment::{Payment, PaymentType};

// ============================================================================
// Payment Statistics - read-only aggregation
// ============================================================================
//
// Totals keep the sign stored on the payment, so refunds and compensations
// come out negative. Percentages compare their absolute value with the
// regular total and are 0 when there is no regular income.
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentStatistics {
    pub payment_count: usize,
    pub total_regular: Decimal,
    pub total_refund: Decimal,
    pub total_partial_payment: Decimal,
    pub total_compensation: Decimal,
    pub net_amount: Decimal,
    pub refund_percentage: Decimal,
    pub discount_percentage: Decimal,
}

fn out_of_range(what: &str) -> LedgerError {
    LedgerError::InvalidData(format!("Payment {} is out of range", what))
}

fn checked_sum<'a>(mut amounts: impl Iterator<Item = &'a Decimal>, what: &str) -> LedgerResult<Decimal> {
    amounts.try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(*amount).ok_or_else(|| out_of_range(what))
    })
}

/// Sum of signed amounts of the given type.
pub fn total_by_type(payments: &[Payment], payment_type: PaymentType) -> LedgerResult<Decimal> {
    checked_sum(
        payments
            .iter()
            .filter(|p| p.payment_type == payment_type)
            .map(|p| &p.amount),
        "total",
    )
}

pub fn net_amount(payments: &[Payment]) -> LedgerResult<Decimal> {
    checked_sum(payments.iter().map(|p| &p.amount), "net amount")
}

/// `part / whole * 100`, rounded to two decimals. 0 when `whole` is 0.
pub fn percentage_of(part: Decimal, whole: Decimal) -> LedgerResult<Decimal> {
    if whole.is_zero() {
        return Ok(Decimal::ZERO);
    }
    part.abs()
        .checked_div(whole.abs())
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|percentage| percentage.round_dp(2))
        .ok_or_else(|| out_of_range("percentage"))
}

pub fn summarize(payments: &[Payment]) -> LedgerResult<PaymentStatistics> {
    let total_regular = total_by_type(payments, PaymentType::Regular)?;
    let total_refund = total_by_type(payments, PaymentType::Refund)?;
    let total_compensation = total_by_type(payments, PaymentType::Compensation)?;

    Ok(PaymentStatistics {
        payment_count: payments.len(),
        total_regular,
        total_refund,
        total_partial_payment: total_by_type(payments, PaymentType::PartialPayment)?,
        total_compensation,
        net_amount: net_amount(payments)?,
        refund_percentage: percentage_of(total_refund, total_regular)?,
        discount_percentage: percentage_of(total_compensation, total_regular)?,
    })
}
