use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// Command Context & Result Envelope
// ============================================================================

/// Who issued a command and when. `now` is captured once so every row,
/// audit entry and event of one command shares the same timestamp.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub performed_by: Uuid,
    pub correlation_id: Uuid,
    pub now: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(performed_by: Uuid) -> Self {
        Self {
            performed_by,
            correlation_id: Uuid::new_v4(),
            now: Utc::now(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Uniform response body: `{success, message, data}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            message: self.message,
            data: f(self.data),
        }
    }
}

impl Envelope<Option<serde_json::Value>> {
    pub fn failure(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: details,
        }
    }
}
