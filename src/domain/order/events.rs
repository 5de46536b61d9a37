use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::Order;
use super::value_objects::OrderType;

// ============================================================================
// Order Events - Lifecycle outcomes published to downstream consumers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Completed(OrderCompleted),
    Cancelled(OrderCancelled),
    Refunded(OrderRefunded),
    Failed(OrderFailed),
}

impl OrderEvent {
    /// Topic the event is published on. Completion branches on order type.
    pub fn channel(&self) -> &'static str {
        match self {
            OrderEvent::Completed(e) => e.order_type.completion_channel(),
            OrderEvent::Cancelled(_) => "order.cancelled",
            OrderEvent::Refunded(_) => "order.refunded",
            OrderEvent::Failed(_) => "order.failed",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Completed(e) => e.order_id,
            OrderEvent::Cancelled(e) => e.order_id,
            OrderEvent::Refunded(e) => e.order_id,
            OrderEvent::Failed(e) => e.order_id,
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Completed - a payment was verified and the order is settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub order_id: Uuid,
    pub order_type: OrderType,
    pub reference_id: Option<Uuid>,
    pub payment_id: Uuid,
    pub total: Decimal,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
}

impl OrderCompleted {
    pub fn new(order: &Order, payment_id: Uuid) -> Self {
        Self {
            order_id: order.id,
            order_type: order.order_type,
            reference_id: order.reference_id,
            payment_id,
            total: order.total,
            currency: order.currency.clone(),
            completed_at: order.updated_at,
        }
    }
}

/// Payment rejection details carried on a cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRejection {
    pub payment_id: Uuid,
    pub reason: Option<String>,
}

/// Order Cancelled - order and its open payments were cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: Uuid,
    pub reference_id: Option<Uuid>,
    pub reason: Option<String>,
    pub cancelled_payment_ids: Vec<Uuid>,
    pub rejection: Option<PaymentRejection>,
    pub cancelled_at: DateTime<Utc>,
}

/// Order Refunded - money was returned on a completed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRefunded {
    pub order_id: Uuid,
    pub reference_id: Option<Uuid>,
    pub refunded_payment_ids: Vec<Uuid>,
    pub refund_payment_id: Option<Uuid>,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub refunded_at: DateTime<Utc>,
}

/// Order Failed - a command touching the order aborted while committing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailed {
    pub order_id: Uuid,
    pub operation: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        let failed = OrderEvent::Failed(OrderFailed {
            order_id: Uuid::nil(),
            operation: "verify_payment".to_string(),
            error: "boom".to_string(),
            failed_at: Utc::now(),
        });
        assert_eq!(failed.channel(), "order.failed");
        assert_eq!(failed.order_id(), Uuid::nil());

        let completed = OrderEvent::Completed(OrderCompleted {
            order_id: Uuid::nil(),
            order_type: OrderType::Consultation,
            reference_id: None,
            payment_id: Uuid::nil(),
            total: Decimal::new(100, 0),
            currency: "PEN".to_string(),
            completed_at: Utc::now(),
        });
        assert_eq!(completed.channel(), "consultation.completed");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OrderEvent::Refunded(OrderRefunded {
            order_id: Uuid::nil(),
            reference_id: None,
            refunded_payment_ids: vec![],
            refund_payment_id: None,
            amount: Decimal::new(40, 0),
            reason: None,
            refunded_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Refunded");
        assert_eq!(json["data"]["amount"], "40");
    }
}
