//! Hold Registry - hold records and the terminal compare-and-set
//!
//! Owns the mapping from hold identity to lifecycle state. The
//! `transition` compare-and-set under the entry lock is what makes
//! confirm, cancel and expiry mutually exclusive: exactly one actor
//! wins the race to terminate a given hold.
//!
//! Terminal holds stay queryable for a retention window (idempotent
//! re-query by callers that lost a race), then the reaper's periodic
//! sweep evicts them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::{HoldId, HoldSnapshot, HoldState, ProductId, ReserveError, ReserveResult};
use std::time::Duration;

/// One hold record, exclusively owned by the registry
#[derive(Debug, Clone)]
struct HoldRecord {
    product_id: ProductId,
    quantity: u32,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    state: HoldState,
    /// Set exactly once, when the hold reaches a terminal state
    finalized_at: Option<DateTime<Utc>>,
}

impl HoldRecord {
    fn snapshot(&self, hold_id: &HoldId) -> HoldSnapshot {
        HoldSnapshot {
            hold_id: hold_id.clone(),
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            created_at: self.created_at,
            deadline: self.deadline,
            state: self.state,
        }
    }
}

/// Registry of all holds, active and recently finalized
#[derive(Debug, Default)]
pub struct HoldRegistry {
    holds: DashMap<HoldId, HoldRecord>,
}

impl HoldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `Active` hold
    ///
    /// `DuplicateHold` guards against reused order identities.
    pub fn create(
        &self,
        hold_id: &HoldId,
        product_id: &ProductId,
        quantity: u32,
        created_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> ReserveResult<HoldSnapshot> {
        match self.holds.entry(hold_id.clone()) {
            Entry::Occupied(_) => Err(ReserveError::DuplicateHold(hold_id.clone())),
            Entry::Vacant(slot) => {
                let record = slot.insert(HoldRecord {
                    product_id: product_id.clone(),
                    quantity,
                    created_at,
                    deadline,
                    state: HoldState::Active,
                    finalized_at: None,
                });
                Ok(record.snapshot(hold_id))
            }
        }
    }

    /// Compare-and-set `Active -> terminal` under the entry lock
    ///
    /// Returns the hold's product and quantity so the winner can drive
    /// the Stock Ledger. Losers observe `AlreadyTerminal` with the
    /// state that won.
    pub fn transition(
        &self,
        hold_id: &HoldId,
        target: HoldState,
    ) -> ReserveResult<(ProductId, u32)> {
        debug_assert!(target.is_terminal(), "transition target must be terminal");
        let mut record = self
            .holds
            .get_mut(hold_id)
            .ok_or_else(|| ReserveError::HoldNotFound(hold_id.clone()))?;
        if record.state.is_terminal() {
            return Err(ReserveError::AlreadyTerminal {
                hold_id: hold_id.clone(),
                state: record.state,
            });
        }
        record.state = target;
        record.finalized_at = Some(Utc::now());
        Ok((record.product_id.clone(), record.quantity))
    }

    /// Snapshot of one hold
    pub fn get(&self, hold_id: &HoldId) -> ReserveResult<HoldSnapshot> {
        self.holds
            .get(hold_id)
            .map(|record| record.snapshot(hold_id))
            .ok_or_else(|| ReserveError::HoldNotFound(hold_id.clone()))
    }

    /// Evict terminal holds finalized before the retention window
    ///
    /// Returns the number of evicted records.
    pub fn sweep_terminal(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now() - retention;
        let before = self.holds.len();
        self.holds.retain(|_, record| {
            !(record.state.is_terminal()
                && record.finalized_at.is_some_and(|at| at < cutoff))
        });
        let evicted = before - self.holds.len();
        if evicted > 0 {
            tracing::debug!(count = evicted, "Terminal holds evicted");
        }
        evicted
    }

    /// Number of holds currently in `Active` state
    pub fn active_count(&self) -> usize {
        self.holds
            .iter()
            .filter(|entry| entry.state == HoldState::Active)
            .count()
    }

    pub fn len(&self) -> usize {
        self.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }
}
