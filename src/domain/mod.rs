// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Order and Payment aggregates, their commands and command handlers, plus
// the pieces both share: annotations, audit entries, the command context,
// the error taxonomy and validation. Persistence lives in `crate::ledger`.
//
// ============================================================================

pub mod annotation;
pub mod audit;
pub mod context;
pub mod errors;
pub mod order;
pub mod payment;
pub mod statistics;
pub mod validation;

pub use context::{CommandContext, Envelope};
pub use errors::{LedgerError, LedgerResult};
