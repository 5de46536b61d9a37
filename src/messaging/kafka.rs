use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use super::publisher::{EventPublisher, PublishError};
use crate::ledger::EventEnvelope;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// Kafka / Redpanda Publisher
// ============================================================================
//
// Topic = event channel, key = order id. Sends go through a circuit breaker
// so a dead broker fails fast instead of stalling every command.
//
// ============================================================================

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl KafkaEventPublisher {
    pub fn new(
        brokers: &str,
        send_timeout: Duration,
        breaker: CircuitBreakerConfig,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .set("enable.idempotence", "true")
            .create()
            .context("Failed to create Kafka producer")?;

        tracing::info!(brokers = %brokers, "Kafka event publisher ready");

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(breaker),
            send_timeout,
            metrics,
        })
    }

    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, rdkafka::util::Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| PublishError::Broker(e.to_string()))
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let payload = envelope.to_json()?;
        let key = envelope.key();
        let topic = envelope.channel.as_str();

        let before = self.circuit_breaker.state().await;
        let result = self
            .circuit_breaker
            .call(self.send(topic, &key, &payload))
            .await;
        self.metrics
            .observe_circuit_state(before, self.circuit_breaker.state().await);

        match result {
            Ok(()) => {
                tracing::debug!(topic = %topic, key = %key, event_id = %envelope.event_id, "Published to Kafka");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(topic = %topic, "Circuit breaker open - broker unavailable");
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Kafka");
                Err(e)
            }
        }
    }
}
