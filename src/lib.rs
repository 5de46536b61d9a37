//! Order and payment transaction lifecycle for a clinic back office.
//!
//! Commands run through the command handlers in [`domain`], commit one
//! atomic change set (rows, audit entries, outbox messages) through
//! [`ledger`], and publish lifecycle events via [`messaging`]. Events that
//! cannot be delivered right away are drained later by the relay actor.

pub mod actors;
pub mod api;
pub mod config;
pub mod domain;
pub mod ledger;
pub mod messaging;
pub mod metrics;
pub mod utils;
