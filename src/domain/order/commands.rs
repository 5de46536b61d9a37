use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::value_objects::{OrderStatus, OrderType};
use crate::domain::validation::{amount_fits, check_amount, ValidationErrors};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub code: String,
    pub order_type: OrderType,
    #[serde(default)]
    pub reference_id: Option<Uuid>,
    pub currency: String,
    pub subtotal: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// DRAFT when omitted. Only DRAFT and PENDING are valid entry points.
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Field changes allowed while an order is still a draft.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrder {
    #[serde(default)]
    pub reference_id: Option<Uuid>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub tax: Option<Decimal>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitDraft {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelOrder {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundOrder {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of the bulk deactivate/reactivate endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkIds {
    pub ids: Vec<Uuid>,
}

// ============================================================================
// Validation
// ============================================================================

fn check_currency(errors: &mut ValidationErrors, currency: &str) {
    errors.check(
        currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()),
        "currency",
        "must be a 3-letter ISO-4217 code",
    );
}

fn check_metadata(errors: &mut ValidationErrors, metadata: Option<&serde_json::Value>) {
    if let Some(value) = metadata {
        errors.check(!value.is_object(), "metadata", "must be a JSON object");
    }
}

impl CreateOrder {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.code.trim().is_empty(), "code", "must not be empty");
        errors.check(self.code.len() > 64, "code", "must be at most 64 characters");
        check_currency(&mut errors, &self.currency);
        errors.check(self.subtotal.is_sign_negative(), "subtotal", "must not be negative");
        check_amount(&mut errors, "subtotal", self.subtotal);
        errors.check(self.tax.is_sign_negative(), "tax", "must not be negative");
        check_amount(&mut errors, "tax", self.tax);
        if amount_fits(self.subtotal) && amount_fits(self.tax) {
            errors.check(
                !self.subtotal.checked_add(self.tax).is_some_and(amount_fits),
                "total",
                "subtotal plus tax is out of range",
            );
        }
        check_metadata(&mut errors, self.metadata.as_ref());
        if let Some(status) = self.status {
            errors.check(
                !matches!(status, OrderStatus::Draft | OrderStatus::Pending),
                "status",
                "orders start as DRAFT or PENDING",
            );
        }
        errors.into_result()
    }
}

impl UpdateOrder {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(currency) = &self.currency {
            check_currency(&mut errors, currency);
        }
        if let Some(subtotal) = self.subtotal {
            errors.check(subtotal.is_sign_negative(), "subtotal", "must not be negative");
            check_amount(&mut errors, "subtotal", subtotal);
        }
        if let Some(tax) = self.tax {
            errors.check(tax.is_sign_negative(), "tax", "must not be negative");
            check_amount(&mut errors, "tax", tax);
        }
        check_metadata(&mut errors, self.metadata.as_ref());
        errors.into_result()
    }
}

impl BulkIds {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.ids.is_empty(), "ids", "must contain at least one id");
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_command() -> CreateOrder {
        CreateOrder {
            code: "ORD-0001".to_string(),
            order_type: OrderType::Consultation,
            reference_id: None,
            currency: "PEN".to_string(),
            subtotal: Decimal::new(8475, 2),
            tax: Decimal::new(1525, 2),
            metadata: None,
            status: None,
            note: None,
        }
    }

    #[test]
    fn test_valid_create_command() {
        assert!(create_command().validate().is_ok());
    }

    #[test]
    fn test_create_command_collects_every_error() {
        let mut command = create_command();
        command.code = "  ".to_string();
        command.currency = "soles".to_string();
        command.tax = Decimal::new(-1, 0);
        command.metadata = Some(serde_json::json!([1, 2]));

        let errors = command.validate().unwrap_err();
        let fields: Vec<_> = errors.errors().iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["code", "currency", "tax", "metadata"]);
    }

    #[test]
    fn test_create_command_rejects_terminal_entry_status() {
        let mut command = create_command();
        command.status = Some(OrderStatus::Completed);
        assert!(command.validate().is_err());

        command.status = Some(OrderStatus::Pending);
        assert!(command.validate().is_ok());
    }

    #[test]
    fn test_create_command_bounds_amounts() {
        let mut command = create_command();
        command.subtotal = Decimal::new(10001, 3);
        let errors = command.validate().unwrap_err();
        assert_eq!(errors.errors()[0].field, "subtotal");

        // Each part fits on its own, the sum does not.
        let mut command = create_command();
        command.subtotal = Decimal::new(90_000_000_000_000, 2);
        command.tax = Decimal::new(10_000_000_000_000, 2);
        let errors = command.validate().unwrap_err();
        let fields: Vec<_> = errors.errors().iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["total"]);

        command.tax = Decimal::MAX;
        let fields: Vec<_> = command
            .validate()
            .unwrap_err()
            .errors()
            .iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["tax"]);
    }

    #[test]
    fn test_update_command_bounds_amounts() {
        let update = UpdateOrder {
            tax: Some(Decimal::new(5, 3)),
            ..Default::default()
        };
        assert_eq!(update.validate().unwrap_err().errors()[0].field, "tax");

        let update = UpdateOrder {
            subtotal: Some(Decimal::new(12345, 2)),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_empty_bulk_ids_fail() {
        assert!(BulkIds { ids: vec![] }.validate().is_err());
        assert!(BulkIds { ids: vec![Uuid::new_v4()] }.validate().is_ok());
    }

    #[test]
    fn test_create_command_deserializes_with_defaults() {
        let command: CreateOrder = serde_json::from_value(serde_json::json!({
            "code": "ORD-9",
            "order_type": "PRODUCT_SALE",
            "currency": "USD",
            "subtotal": "10.00"
        }))
        .unwrap();
        assert_eq!(command.tax, Decimal::ZERO);
        assert!(command.status.is_none());
    }
}
