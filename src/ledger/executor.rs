use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::change_set::ChangeSet;
use super::outbox::{EventEnvelope, OutboxMessage};
use super::store::LedgerStore;
use crate::domain::context::CommandContext;
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::order::{OrderEvent, OrderFailed};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;

// ============================================================================
// Ledger Executor
// ============================================================================
//
// Orchestrates: ChangeSet → atomic commit → publish committed events
//
// Publishing happens after the commit and never undoes it. Messages that
// could not be delivered stay PENDING in the outbox for the relay. When a
// use-case on a known order fails inside the ledger (a read or the commit),
// an `order.failed` event is published directly since it cannot ride along
// in an aborted commit.
//
// ============================================================================

pub struct LedgerExecutor {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
}

impl LedgerExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, publisher: Arc<dyn EventPublisher>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            publisher,
            metrics,
        }
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Time a command and count its outcome.
    pub async fn instrumented<T, Fut>(&self, command: &'static str, fut: Fut) -> LedgerResult<T>
    where
        Fut: Future<Output = LedgerResult<T>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => {
                if err.is_client_error() {
                    tracing::debug!(command, error = %err, "Command rejected");
                }
                err.kind()
            }
        };
        self.metrics
            .record_command(command, outcome, started.elapsed().as_secs_f64());
        result
    }

    /// `instrumented` for a use-case on an existing order. Ledger failures
    /// anywhere in `fut` are reported as `order.failed`.
    pub async fn instrumented_for_order<T, Fut>(
        &self,
        command: &'static str,
        order_id: Uuid,
        ctx: &CommandContext,
        fut: Fut,
    ) -> LedgerResult<T>
    where
        Fut: Future<Output = LedgerResult<T>>,
    {
        self.instrumented(command, self.report_failures(command, order_id, ctx, fut))
            .await
    }

    /// Await `fut`; a non-client error publishes `order.failed` for `order_id`.
    pub async fn report_failures<T, Fut>(
        &self,
        operation: &'static str,
        order_id: Uuid,
        ctx: &CommandContext,
        fut: Fut,
    ) -> LedgerResult<T>
    where
        Fut: Future<Output = LedgerResult<T>>,
    {
        let result = fut.await;
        if let Err(err) = &result {
            if !err.is_client_error() {
                tracing::error!(
                    operation,
                    order_id = %order_id,
                    correlation_id = %ctx.correlation_id,
                    error = %err,
                    "Use-case failed in the ledger"
                );
                self.publish_failure(operation, order_id, err, ctx).await;
            }
        }
        result
    }

    /// Commit the change set, then publish what it emitted.
    pub async fn commit(&self, operation: &'static str, order_id: Option<Uuid>, changes: ChangeSet) -> LedgerResult<()> {
        let ctx = *changes.context();
        let outbox = changes.outbox.clone();
        let rows = changes.row_count();

        if let Err(err) = self.store.commit(changes).await {
            let err = LedgerError::from(err);
            tracing::error!(
                operation,
                order_id = ?order_id,
                correlation_id = %ctx.correlation_id,
                error = %err,
                "Commit aborted, nothing written"
            );
            return Err(err);
        }

        tracing::debug!(
            operation,
            order_id = ?order_id,
            rows,
            events = outbox.len(),
            "Change set committed"
        );

        for message in &outbox {
            self.publish_committed(message).await;
        }
        Ok(())
    }

    async fn publish_committed(&self, message: &OutboxMessage) {
        let envelope = &message.envelope;
        match self.publisher.publish(envelope).await {
            Ok(()) => {
                self.metrics.record_event_published(&envelope.channel);
                if let Err(e) = self.store.mark_published(message.id()).await {
                    tracing::warn!(
                        event_id = %message.id(),
                        error = %e,
                        "Event delivered but outbox row not updated, relay may deliver it again"
                    );
                }
            }
            Err(e) => {
                self.metrics.record_publish_failure(&envelope.channel);
                tracing::warn!(
                    event_id = %message.id(),
                    channel = %envelope.channel,
                    error = %e,
                    "Publish after commit failed, left pending for relay"
                );
            }
        }
    }

    async fn publish_failure(&self, operation: &str, order_id: Uuid, err: &LedgerError, ctx: &CommandContext) {
        let event = OrderEvent::Failed(OrderFailed {
            order_id,
            operation: operation.to_string(),
            error: err.to_string(),
            failed_at: ctx.now,
        });
        let envelope = EventEnvelope::new(event, ctx).with_metadata("error_kind", err.kind());

        match self.publisher.publish(&envelope).await {
            Ok(()) => self.metrics.record_event_published(&envelope.channel),
            Err(e) => {
                self.metrics.record_publish_failure(&envelope.channel);
                tracing::warn!(order_id = %order_id, error = %e, "Could not publish order.failed");
            }
        }
    }
}
