//! Core identifier and snapshot types for the reservation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Product identifier (opaque, supplied by the catalog collaborator)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hold identifier - the order identity used as idempotency key.
///
/// Supplied by the order collaborator; must be globally unique per
/// reservation attempt. `generate()` is a convenience for callers that
/// have no identity of their own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldId(pub String);

impl HoldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random hold id
    pub fn generate() -> Self {
        Self(format!("hold:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HoldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HoldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Hold State
// ============================================================================

/// Hold lifecycle state
///
/// 持有状态机：`Active` 是唯一的非终态，三个终态互斥，
/// 由注册表的 compare-and-set 保证只有一个赢家。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldState {
    /// Units are blocked, awaiting confirm/cancel/expiry
    Active,
    /// Units permanently consumed by a confirmed order
    Confirmed,
    /// Explicitly released by the caller (payment declined, user abort)
    Cancelled,
    /// Released by the reaper after the deadline passed
    Expired,
}

impl HoldState {
    /// Terminal states absorb: no transition leaves them
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldState::Active)
    }
}

impl std::fmt::Display for HoldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HoldState::Active => "ACTIVE",
            HoldState::Confirmed => "CONFIRMED",
            HoldState::Cancelled => "CANCELLED",
            HoldState::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Point-in-time view of one hold, as returned by queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldSnapshot {
    /// Hold ID (order identity)
    pub hold_id: HoldId,
    /// Product the hold reserves against
    pub product_id: ProductId,
    /// Units removed from availability
    pub quantity: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Deadline after which the reaper expires the hold
    pub deadline: DateTime<Utc>,
    /// Current lifecycle state
    pub state: HoldState,
}

/// Point-in-time view of one product's stock counters
///
/// Invariant: `held + consumed <= total`, `available = total - held - consumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    /// Total units ever added (monotonic via restock)
    pub total: u64,
    /// Units under active holds
    pub held: u64,
    /// Units permanently consumed
    pub consumed: u64,
    /// Units eligible for new holds
    pub available: u64,
}
