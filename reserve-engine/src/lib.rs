//! Reservation (hold) engine
//!
//! Manages finite, shared inventory counts against concurrent demand.
//! A reservation temporarily removes units from availability; it must
//! be confirmed (consuming the units) or it expires and the units
//! return to the available pool.
//!
//! # Architecture
//!
//! ```text
//! ReservationEngine (reserve / confirm / cancel / inspect)
//!     ├─ StockLedger     - per-product counters, atomic transitions
//!     ├─ HoldRegistry    - hold records, terminal compare-and-set
//!     └─ ExpiryReaper    - deadline min-heap + background loop
//! ```
//!
//! The ledger and registry are independently lockable; engine
//! operations that need both acquire hold-state first, then
//! stock-state. The one exception is `reserve`, which commits the
//! ledger first and compensates with a release if the registry
//! rejects the hold id.

pub mod config;
pub mod engine;
pub mod ledger;
pub mod reaper;
pub mod registry;

pub use config::EngineConfig;
pub use engine::ReservationEngine;
pub use ledger::StockLedger;
pub use reaper::{ExpiryReaper, ExpirySchedule};
pub use registry::HoldRegistry;

// Re-export the shared domain surface so callers need one import
pub use shared::{HoldEvent, HoldId, HoldSnapshot, HoldState, ProductId, ReserveError,
    ReserveResult, StockLevels};
