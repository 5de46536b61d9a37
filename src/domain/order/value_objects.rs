use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(OrderStatus::Draft),
            "PENDING" => Ok(OrderStatus::Pending),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// What the order bills for. Drives the completion event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Consultation,
    Prescription,
    ProductSale,
    ProductPurchase,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Consultation => "CONSULTATION",
            OrderType::Prescription => "PRESCRIPTION",
            OrderType::ProductSale => "PRODUCT_SALE",
            OrderType::ProductPurchase => "PRODUCT_PURCHASE",
        }
    }

    pub fn completion_channel(&self) -> &'static str {
        match self {
            OrderType::Consultation => "consultation.completed",
            OrderType::Prescription => "prescription.completed",
            OrderType::ProductSale | OrderType::ProductPurchase => "order.completed",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "CONSULTATION" => Ok(OrderType::Consultation),
            "PRESCRIPTION" => Ok(OrderType::Prescription),
            "PRODUCT_SALE" => Ok(OrderType::ProductSale),
            "PRODUCT_PURCHASE" => Ok(OrderType::ProductPurchase),
            other => Err(format!("unknown order type: {}", other)),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
