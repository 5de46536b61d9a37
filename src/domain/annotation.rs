use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Annotations - typed history notes on orders and payments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationKind {
    Note,
    Submitted,
    Processed,
    Verified,
    Completed,
    Rejected,
    Cancelled,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub at: DateTime<Utc>,
    pub actor: Uuid,
    pub kind: AnnotationKind,
    pub text: String,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, actor: Uuid, at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            at,
            actor,
            kind,
            text: text.into(),
        }
    }
}

/// Append an annotation unless `text` is absent or blank.
pub fn annotate(
    annotations: &mut Vec<Annotation>,
    kind: AnnotationKind,
    actor: Uuid,
    at: DateTime<Utc>,
    text: Option<&str>,
) {
    if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
        annotations.push(Annotation::new(kind, actor, at, text));
    }
}
