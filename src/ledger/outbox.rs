use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::context::CommandContext;
use crate::domain::order::OrderEvent;

// ============================================================================
// Event Envelope & Outbox Rows
// ============================================================================
//
// Events are written to the outbox in the same commit as the rows they
// describe. After commit the handler publishes them straight away; rows it
// could not deliver stay PENDING for the relay.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub channel: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: OrderEvent,

    // Correlation & Actor
    pub correlation_id: Uuid,
    pub performed_by: Option<Uuid>,

    // Timing
    pub timestamp: DateTime<Utc>,

    // Additional Metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EventEnvelope {
    pub fn new(event: OrderEvent, ctx: &CommandContext) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: event.order_id(),
            channel: event.channel().to_string(),
            event_version: 1,
            event_data: event,
            correlation_id: ctx.correlation_id,
            performed_by: Some(ctx.performed_by),
            timestamp: ctx.now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Partition key for the message broker.
    pub fn key(&self) -> String {
        self.aggregate_id.to_string()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    DeadLettered,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::DeadLettered => "DEAD_LETTERED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "DEAD_LETTERED" => Ok(OutboxStatus::DeadLettered),
            other => Err(format!("unknown outbox status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub envelope: EventEnvelope,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn pending(envelope: EventEnvelope) -> Self {
        let created_at = envelope.timestamp;
        Self {
            envelope,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.envelope.event_id
    }
}
