use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

// ============================================================================
// Request Validation
// ============================================================================
//
// Command payloads are checked by plain functions before a handler touches
// the store. Each check pushes a FieldError; the caller gets all of them at
// once.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Push an error when `failed` holds.
    pub fn check(&mut self, failed: bool, field: &'static str, message: impl Into<String>) {
        if failed {
            self.push(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Largest magnitude a NUMERIC(14,2) column holds.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Largest number of decimal places a stored amount keeps.
pub const AMOUNT_SCALE: u32 = 2;

/// True when `amount` is storable as is: at most two decimals, within bounds.
pub fn amount_fits(amount: Decimal) -> bool {
    amount == amount.round_dp(AMOUNT_SCALE) && amount.abs() <= MAX_AMOUNT
}

/// Push the amount-shape errors shared by every money field.
pub fn check_amount(errors: &mut ValidationErrors, field: &'static str, amount: Decimal) {
    errors.check(
        amount != amount.round_dp(AMOUNT_SCALE),
        field,
        "must have at most 2 decimal places",
    );
    errors.check(
        amount.abs() > MAX_AMOUNT,
        field,
        format!("must not exceed {}", MAX_AMOUNT),
    );
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
