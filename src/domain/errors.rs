use uuid::Uuid;

use super::audit::EntityType;
use super::validation::ValidationErrors;
use crate::ledger::StoreError;

// ============================================================================
// Ledger Business Rule Errors
// ============================================================================
//
// Shared by both aggregates and the command handlers. The first four
// variants are the client-facing taxonomy; Conflict and Store come from the
// commit path.
//
// ============================================================================

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityType, id: Uuid },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidData(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: EntityType, id: Uuid },

    #[error("Ledger store error: {0}")]
    Store(#[source] StoreError),
}

impl LedgerError {
    pub fn order_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: EntityType::Order, id }
    }

    pub fn payment_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: EntityType::Payment, id }
    }

    /// Errors raised by the caller's input or the current state, as opposed
    /// to failures of the commit itself.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Conflict { .. } | Self::Store(_))
    }

    /// Stable short code, used as a metrics label and in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidData(_) => "invalid_data",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::Store(_) => "store",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { entity, id } => Self::Conflict { entity, id },
            StoreError::MissingOrder(id) => Self::order_not_found(id),
            StoreError::DuplicateCode(code) => {
                Self::InvalidData(format!("Order code already exists: {}", code))
            }
            other => Self::Store(other),
        }
    }
}

impl From<ValidationErrors> for LedgerError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
