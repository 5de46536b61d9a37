use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::publisher::EventPublisher;
use crate::ledger::{LedgerStore, StoreResult};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Outbox Relay
// ============================================================================
//
// Delivers outbox rows the command handlers could not publish right after
// commit. Each drain:
// 1. Loads up to `batch_size` PENDING rows, oldest first
// 2. Publishes each with exponential backoff
// 3. Marks delivered rows PUBLISHED
// 4. Counts failures; rows reaching `max_attempts` (or failing permanently)
//    are DEAD_LETTERED and never picked up again
//
// A drain requested while another one runs is skipped.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub batch_size: usize,
    /// Failed drains a row survives before it is dead-lettered
    pub max_attempts: i32,
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 5,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Another drain was already running
    pub skipped: bool,
}

pub struct OutboxRelay {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    config: RelayConfig,
    draining: AtomicBool,
}

/// Clears the in-progress flag even if a drain unwinds.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            config,
            draining: AtomicBool::new(false),
        }
    }

    pub async fn drain_once(&self) -> StoreResult<DrainReport> {
        if self.draining.swap(true, Ordering::AcqRel) {
            tracing::debug!("Outbox drain already running, skipping");
            return Ok(DrainReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = DrainGuard(&self.draining);

        let pending = self.store.pending_outbox(self.config.batch_size).await?;
        let mut report = DrainReport::default();

        for message in pending {
            let envelope = &message.envelope;
            let publisher = &self.publisher;
            let metrics = &self.metrics;

            let outcome = retry_on_transient(&self.config.retry, move |attempt| {
                metrics.record_relay_attempt(attempt);
                publisher.publish(envelope)
            })
            .await;

            let (error, permanent) = match outcome {
                RetryResult::Success(()) => {
                    self.store.mark_published(message.id()).await?;
                    self.metrics.record_event_published(&envelope.channel);
                    report.published += 1;
                    continue;
                }
                RetryResult::Exhausted { error, .. } => (error, false),
                RetryResult::Permanent(error) => (error, true),
            };

            self.metrics.record_publish_failure(&envelope.channel);
            let attempts = message.attempts + 1;
            let dead_letter = permanent || attempts >= self.config.max_attempts;
            self.store
                .record_delivery_failure(message.id(), &error.to_string(), dead_letter)
                .await?;

            if dead_letter {
                self.metrics.record_dead_letter(&envelope.channel);
                tracing::error!(
                    event_id = %message.id(),
                    channel = %envelope.channel,
                    attempts,
                    error = %error,
                    "Outbox message dead-lettered"
                );
                report.dead_lettered += 1;
            } else {
                tracing::warn!(
                    event_id = %message.id(),
                    channel = %envelope.channel,
                    attempts,
                    error = %error,
                    "Outbox delivery failed, will retry on next drain"
                );
                report.failed += 1;
            }
        }

        if report.published + report.failed + report.dead_lettered > 0 {
            tracing::info!(
                published = report.published,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "Outbox drain finished"
            );
        }
        Ok(report)
    }
}
