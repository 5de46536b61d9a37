use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::value_objects::{PaymentMethod, PaymentType};
use crate::domain::validation::{check_amount, ValidationErrors};

// ============================================================================
// Payment Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub order_id: Uuid,
    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,
    /// Entered as a positive figure; outflow types are stored negated.
    pub amount: Decimal,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub voucher_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

fn default_payment_type() -> PaymentType {
    PaymentType::Regular
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessPayment {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub voucher_number: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPayment {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectPayment {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelPayment {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundPayment {
    pub amount: Decimal,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Voucher with surrounding whitespace removed, None when blank.
pub(crate) fn normalized_voucher(voucher: Option<&str>) -> Option<String> {
    voucher
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CreatePayment {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.amount <= Decimal::ZERO, "amount", "must be greater than zero");
        check_amount(&mut errors, "amount", self.amount);
        if let Some(voucher) = &self.voucher_number {
            errors.check(voucher.len() > 64, "voucher_number", "must be at most 64 characters");
        }
        errors.into_result()
    }
}

impl ProcessPayment {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.amount <= Decimal::ZERO, "amount", "must be greater than zero");
        check_amount(&mut errors, "amount", self.amount);
        if let Some(voucher) = &self.voucher_number {
            errors.check(voucher.len() > 64, "voucher_number", "must be at most 64 characters");
        }
        errors.into_result()
    }
}

impl RefundPayment {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.amount <= Decimal::ZERO, "amount", "must be greater than zero");
        check_amount(&mut errors, "amount", self.amount);
        if let Some(reason) = &self.reason {
            errors.check(reason.len() > 500, "reason", "must be at most 500 characters");
        }
        errors.into_result()
    }
}
