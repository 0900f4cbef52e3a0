//! Shared types for the reservation engine
//!
//! Common types used across the engine and its callers: identifiers,
//! hold lifecycle states, stock/hold snapshots, lifecycle events and
//! the error taxonomy.

pub mod error;
pub mod event;
pub mod types;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ReserveError, ReserveResult};
pub use event::HoldEvent;
pub use types::{HoldId, HoldSnapshot, HoldState, ProductId, StockLevels};
