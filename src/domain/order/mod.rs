// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (OrderStatus, OrderType)
// - Events (OrderCompleted, OrderCancelled, OrderRefunded, OrderFailed)
// - Commands (CreateOrder, UpdateOrder, SubmitDraft, CancelOrder, ...)
// - Aggregate (Order state machine and payment cascades)
// - Command Handler (OrderCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use aggregate::*;
pub use command_handler::{BulkOutcome, OrderCommandHandler, OrderSnapshot};
