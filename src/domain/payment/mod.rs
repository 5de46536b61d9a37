// ============================================================================
// Payment Domain - Business Logic for the Payment Aggregate
// ============================================================================
//
// - Value objects (PaymentStatus, PaymentType, PaymentMethod)
// - Commands (CreatePayment, ProcessPayment, VerifyPayment, ...)
// - Aggregate (Payment state machine and amount rules)
// - Command Handler (PaymentCommandHandler, cascades onto the order)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use commands::*;
pub use aggregate::*;
pub use command_handler::{PaymentCommandHandler, PaymentTransition};
