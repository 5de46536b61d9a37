use actix::prelude::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::ledger::StoreResult;
use crate::messaging::{DrainReport, OutboxRelay};

// ============================================================================
// Outbox Relay Actor - drains the outbox on a fixed interval
// ============================================================================
//
// The command path publishes right after commit. Anything that did not go
// out then (broker down, circuit open, process crash) is still PENDING in
// the outbox and is picked up here.
//
// The drain itself runs on the arbiter as a detached future; the actor only
// keeps a small status record that `/health` can read.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RelayStatus {
    pub drains: u64,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub last_report: Option<DrainReport>,
    pub last_error: Option<String>,
}

// ============================================================================
// Messages
// ============================================================================

/// Run a drain immediately, outside the schedule.
#[derive(Message)]
#[rtype(result = "StoreResult<DrainReport>")]
pub struct DrainNow;

#[derive(Message)]
#[rtype(result = "RelayStatus")]
pub struct GetRelayStatus;

#[derive(Message)]
#[rtype(result = "()")]
struct DrainFinished {
    outcome: Result<DrainReport, String>,
}

// ============================================================================
// Actor
// ============================================================================

pub struct OutboxRelayActor {
    relay: Arc<OutboxRelay>,
    interval: Duration,
    status: RelayStatus,
}

impl OutboxRelayActor {
    pub fn new(relay: Arc<OutboxRelay>, interval: Duration) -> Self {
        Self {
            relay,
            interval,
            status: RelayStatus::default(),
        }
    }
}

impl Actor for OutboxRelayActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "OutboxRelayActor started");

        let addr = ctx.address();
        ctx.run_interval(self.interval, move |act, _ctx| {
            let relay = act.relay.clone();
            let addr = addr.clone();

            actix::spawn(async move {
                let outcome = relay.drain_once().await.map_err(|e| e.to_string());
                addr.do_send(DrainFinished { outcome });
            });
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(drains = self.status.drains, "OutboxRelayActor stopped");
    }
}

impl Handler<DrainFinished> for OutboxRelayActor {
    type Result = ();

    fn handle(&mut self, msg: DrainFinished, _: &mut Self::Context) {
        match msg.outcome {
            // Skipped drains did no work; they do not count.
            Ok(report) if report.skipped => {}
            Ok(report) => {
                self.status.drains += 1;
                self.status.last_drain_at = Some(Utc::now());
                self.status.last_report = Some(report);
                self.status.last_error = None;
            }
            Err(error) => {
                tracing::error!(error = %error, "Outbox drain failed");
                self.status.drains += 1;
                self.status.last_drain_at = Some(Utc::now());
                self.status.last_error = Some(error);
            }
        }
    }
}

impl Handler<DrainNow> for OutboxRelayActor {
    type Result = ResponseFuture<StoreResult<DrainReport>>;

    fn handle(&mut self, _msg: DrainNow, _: &mut Self::Context) -> Self::Result {
        let relay = self.relay.clone();
        Box::pin(async move { relay.drain_once().await })
    }
}

impl Handler<GetRelayStatus> for OutboxRelayActor {
    type Result = MessageResult<GetRelayStatus>;

    fn handle(&mut self, _msg: GetRelayStatus, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.status.clone())
    }
}
