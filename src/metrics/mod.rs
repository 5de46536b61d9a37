use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::utils::CircuitState;

// ============================================================================
// Metrics - Prometheus metrics for the ledger service
// ============================================================================
//
// - Command outcomes and latency, per command
// - Event delivery (published, failed, dead-lettered), per channel
// - Relay retry attempts
// - Broker circuit breaker state
//
// Served as text on GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Commands
    pub commands_total: IntCounterVec,
    pub command_duration: HistogramVec,

    // Event Delivery
    pub events_published: IntCounterVec,
    pub event_publish_failures: IntCounterVec,
    pub outbox_dead_letters: IntCounterVec,
    pub relay_retry_attempts: IntCounterVec,

    // Circuit Breaker
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let commands_total = IntCounterVec::new(
            Opts::new("ledger_commands_total", "Ledger commands handled, by outcome"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new("ledger_command_duration_seconds", "Ledger command duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("ledger_events_published_total", "Events delivered to the broker"),
            &["channel"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let event_publish_failures = IntCounterVec::new(
            Opts::new("ledger_event_publish_failures_total", "Failed event deliveries"),
            &["channel"],
        )?;
        registry.register(Box::new(event_publish_failures.clone()))?;

        let outbox_dead_letters = IntCounterVec::new(
            Opts::new("ledger_outbox_dead_letters_total", "Outbox messages that exhausted their attempts"),
            &["channel"],
        )?;
        registry.register(Box::new(outbox_dead_letters.clone()))?;

        let relay_retry_attempts = IntCounterVec::new(
            Opts::new("ledger_relay_retry_attempts_total", "Delivery attempts made by the outbox relay"),
            &["attempt"],
        )?;
        registry.register(Box::new(relay_retry_attempts.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            commands_total,
            command_duration,
            events_published,
            event_publish_failures,
            outbox_dead_letters,
            relay_retry_attempts,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_command(&self, command: &str, outcome: &str, duration_secs: f64) {
        self.commands_total.with_label_values(&[command, outcome]).inc();
        self.command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    pub fn record_event_published(&self, channel: &str) {
        self.events_published.with_label_values(&[channel]).inc();
    }

    pub fn record_publish_failure(&self, channel: &str) {
        self.event_publish_failures.with_label_values(&[channel]).inc();
    }

    pub fn record_dead_letter(&self, channel: &str) {
        self.outbox_dead_letters.with_label_values(&[channel]).inc();
    }

    pub fn record_relay_attempt(&self, attempt: u32) {
        self.relay_retry_attempts.with_label_values(&[&attempt.to_string()]).inc();
    }

    /// Update the gauge, counting a transition when the state changed.
    pub fn observe_circuit_state(&self, previous: CircuitState, current: CircuitState) {
        self.circuit_breaker_state.set(current.as_gauge());
        if previous != current {
            self.circuit_breaker_transitions
                .with_label_values(&[previous.as_str(), current.as_str()])
                .inc();
        }
    }
}
