//! Error taxonomy for the reservation engine
//!
//! Every variant except `Internal` is an expected, recoverable outcome
//! returned to the immediate caller. `Internal` marks an invariant
//! violation (e.g. counter underflow) that must never occur when the
//! engine's locking discipline is followed.

use crate::types::{HoldId, HoldState, ProductId};
use thiserror::Error;

/// Result alias used across the engine
pub type ReserveResult<T> = Result<T, ReserveError>;

/// Engine errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReserveError {
    /// Non-positive quantity or otherwise malformed request
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("hold not found: {0}")]
    HoldNotFound(HoldId),

    /// Re-registration of an existing product
    #[error("product already exists: {0}")]
    ProductAlreadyExists(ProductId),

    /// Reused hold id (idempotency guard)
    #[error("duplicate hold: {0}")]
    DuplicateHold(HoldId),

    /// Not enough available units to cover the request
    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u64,
    },

    /// The hold already reached a terminal state - covers confirm-after-expiry
    /// and double cancel. Callers should check the hold, not retry blindly.
    #[error("hold {hold_id} already terminal: {state}")]
    AlreadyTerminal { hold_id: HoldId, state: HoldState },

    /// Invariant violation. Never expected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReserveError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for outcomes the caller can act on (everything but `Internal`)
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
