// ============================================================================
// Ledger Layer - atomic persistence of orders, payments, audit and outbox
// ============================================================================

pub mod change_set;
pub mod executor;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use change_set::{ChangeSet, RowWrite};
pub use executor::LedgerExecutor;
pub use memory::MemoryLedgerStore;
pub use outbox::{EventEnvelope, OutboxMessage, OutboxStatus};
pub use postgres::PgLedgerStore;
pub use store::{
    AuditLog, LedgerStore, OrderFilter, OrderRepository, OutboxRepository, PaymentFilter,
    PaymentRepository, StoreError, StoreResult,
};
