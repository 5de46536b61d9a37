use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ledger::EventEnvelope;
use crate::utils::IsTransient;

// ============================================================================
// Event Publisher - outbound port for committed events
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Circuit breaker open, broker unavailable")]
    CircuitOpen,

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        !matches!(self, PublishError::Serialization(_))
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver one envelope on its channel, keyed by order id.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError>;
}

/// Writes events to the log instead of a broker. Used when no brokers are
/// configured.
#[derive(Debug, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl EventPublisher for LoggingPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let payload = envelope.to_json()?;
        tracing::info!(
            channel = %envelope.channel,
            key = %envelope.key(),
            event_id = %envelope.event_id,
            payload = %payload,
            "Event published"
        );
        Ok(())
    }
}

/// Keeps every delivered envelope in memory. Failures can be injected to
/// exercise retry and dead-letter paths.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    delivered: Mutex<Vec<EventEnvelope>>,
    failures_remaining: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` deliveries fail with a broker error.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub async fn delivered(&self) -> Vec<EventEnvelope> {
        self.delivered.lock().await.clone()
    }

    pub async fn channels(&self) -> Vec<String> {
        self.delivered
            .lock()
            .await
            .iter()
            .map(|e| e.channel.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PublishError::Broker("injected failure".to_string()));
        }

        self.delivered.lock().await.push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::CommandContext;
    use crate::domain::order::{OrderEvent, OrderFailed};
    use chrono::Utc;
    use uuid::Uuid;

    fn envelope() -> EventEnvelope {
        let event = OrderEvent::Failed(OrderFailed {
            order_id: Uuid::new_v4(),
            operation: "verify_payment".to_string(),
            error: "conflict".to_string(),
            failed_at: Utc::now(),
        });
        EventEnvelope::new(event, &CommandContext::new(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_recording_publisher_injected_failures() {
        let publisher = RecordingPublisher::new();
        publisher.fail_next(1);

        let first = publisher.publish(&envelope()).await;
        assert!(matches!(first, Err(PublishError::Broker(_))));

        publisher.publish(&envelope()).await.unwrap();
        assert_eq!(publisher.channels().await, vec!["order.failed".to_string()]);
    }

    #[tokio::test]
    async fn test_logging_publisher_accepts_everything() {
        assert!(LoggingPublisher.publish(&envelope()).await.is_ok());
    }

    #[test]
    fn test_serialization_errors_are_permanent() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(!PublishError::Serialization(err).is_transient());
        assert!(PublishError::CircuitOpen.is_transient());
    }
}
