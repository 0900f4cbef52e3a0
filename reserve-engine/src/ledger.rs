//! Stock Ledger - per-product counters with atomic transitions
//!
//! Each product carries `{ total, held, consumed }` with
//! `available = total - held - consumed`. The dashmap entry lock is the
//! per-product critical section: mutations on the same product are
//! serialized, different products never contend.
//!
//! The ledger knows nothing about orders or time; "this quantity was
//! actually held" is the Hold Registry's responsibility.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::{ProductId, ReserveError, ReserveResult, StockLevels};

/// Counters for one product
#[derive(Debug, Clone, Copy, Default)]
struct StockEntry {
    total: u64,
    held: u64,
    consumed: u64,
}

impl StockEntry {
    fn available(&self) -> u64 {
        // held + consumed <= total is maintained by every mutation below
        self.total - self.held - self.consumed
    }

    fn levels(&self) -> StockLevels {
        StockLevels {
            total: self.total,
            held: self.held,
            consumed: self.consumed,
            available: self.available(),
        }
    }
}

/// Per-product stock counters with linearizable per-product mutations
#[derive(Debug, Default)]
pub struct StockLedger {
    products: DashMap<ProductId, StockEntry>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new product with its initial stock
    pub fn register(&self, product_id: &ProductId, initial_count: u64) -> ReserveResult<()> {
        match self.products.entry(product_id.clone()) {
            Entry::Occupied(_) => Err(ReserveError::ProductAlreadyExists(product_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(StockEntry {
                    total: initial_count,
                    held: 0,
                    consumed: 0,
                });
                tracing::info!(product_id = %product_id, total = initial_count, "Product registered");
                Ok(())
            }
        }
    }

    /// Add units to an existing product (`total` is monotonic)
    pub fn restock(&self, product_id: &ProductId, delta: u64) -> ReserveResult<u64> {
        if delta == 0 {
            return Err(ReserveError::invalid("restock delta must be positive"));
        }
        let mut entry = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| ReserveError::ProductNotFound(product_id.clone()))?;
        entry.total += delta;
        tracing::info!(product_id = %product_id, delta, total = entry.total, "Product restocked");
        Ok(entry.total)
    }

    /// Atomically move units from available to held
    ///
    /// Check and mutation happen under the same entry lock, so two
    /// concurrent calls can never both succeed past availability.
    pub fn try_hold(&self, product_id: &ProductId, quantity: u32) -> ReserveResult<()> {
        if quantity == 0 {
            return Err(ReserveError::invalid("hold quantity must be positive"));
        }
        let mut entry = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| ReserveError::ProductNotFound(product_id.clone()))?;
        let available = entry.available();
        if available < u64::from(quantity) {
            return Err(ReserveError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available,
            });
        }
        entry.held += u64::from(quantity);
        tracing::debug!(product_id = %product_id, quantity, held = entry.held, "Units held");
        Ok(())
    }

    /// Move units from held to consumed (confirmed order)
    pub fn confirm(&self, product_id: &ProductId, quantity: u32) -> ReserveResult<()> {
        let mut entry = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| ReserveError::ProductNotFound(product_id.clone()))?;
        let quantity = u64::from(quantity);
        if entry.held < quantity {
            // Only reachable if the engine's hold accounting is broken
            return Err(ReserveError::internal(format!(
                "confirm underflow on {product_id}: held={} quantity={quantity}",
                entry.held
            )));
        }
        entry.held -= quantity;
        entry.consumed += quantity;
        tracing::debug!(product_id = %product_id, quantity, consumed = entry.consumed, "Units consumed");
        Ok(())
    }

    /// Return held units to the available pool (cancel or expiry)
    pub fn release(&self, product_id: &ProductId, quantity: u32) -> ReserveResult<()> {
        let mut entry = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| ReserveError::ProductNotFound(product_id.clone()))?;
        let quantity = u64::from(quantity);
        if entry.held < quantity {
            return Err(ReserveError::internal(format!(
                "release underflow on {product_id}: held={} quantity={quantity}",
                entry.held
            )));
        }
        entry.held -= quantity;
        tracing::debug!(product_id = %product_id, quantity, held = entry.held, "Units released");
        Ok(())
    }

    /// Snapshot of one product's counters
    pub fn levels(&self, product_id: &ProductId) -> ReserveResult<StockLevels> {
        self.products
            .get(product_id)
            .map(|entry| entry.levels())
            .ok_or_else(|| ReserveError::ProductNotFound(product_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::from(s)
    }

    #[test]
    fn register_then_duplicate() {
        let ledger = StockLedger::new();
        ledger.register(&pid("p1"), 40).unwrap();
        assert_eq!(
            ledger.register(&pid("p1"), 10),
            Err(ReserveError::ProductAlreadyExists(pid("p1")))
        );
        assert_eq!(ledger.levels(&pid("p1")).unwrap().total, 40);
    }

    #[test]
    fn try_hold_respects_availability() {
        let ledger = StockLedger::new();
        ledger.register(&pid("p1"), 40).unwrap();
        ledger.try_hold(&pid("p1"), 25).unwrap();
        let err = ledger.try_hold(&pid("p1"), 30).unwrap_err();
        assert_eq!(
            err,
            ReserveError::InsufficientStock {
                product_id: pid("p1"),
                requested: 30,
                available: 15,
            }
        );
        // Failed hold must not mutate
        let levels = ledger.levels(&pid("p1")).unwrap();
        assert_eq!(levels.held, 25);
        assert_eq!(levels.available, 15);
    }

    #[test]
    fn zero_quantity_rejected() {
        let ledger = StockLedger::new();
        ledger.register(&pid("p1"), 10).unwrap();
        assert!(matches!(
            ledger.try_hold(&pid("p1"), 0),
            Err(ReserveError::InvalidArgument(_))
        ));
        assert!(matches!(
            ledger.restock(&pid("p1"), 0),
            Err(ReserveError::InvalidArgument(_))
        ));
    }

    #[test]
    fn confirm_moves_held_to_consumed() {
        let ledger = StockLedger::new();
        ledger.register(&pid("p1"), 40).unwrap();
        ledger.try_hold(&pid("p1"), 25).unwrap();
        ledger.confirm(&pid("p1"), 25).unwrap();
        let levels = ledger.levels(&pid("p1")).unwrap();
        assert_eq!(levels.total, 40);
        assert_eq!(levels.held, 0);
        assert_eq!(levels.consumed, 25);
        assert_eq!(levels.available, 15);
    }

    #[test]
    fn release_returns_units() {
        let ledger = StockLedger::new();
        ledger.register(&pid("p1"), 10).unwrap();
        ledger.try_hold(&pid("p1"), 10).unwrap();
        ledger.release(&pid("p1"), 10).unwrap();
        assert_eq!(ledger.levels(&pid("p1")).unwrap().available, 10);
    }

    #[test]
    fn underflow_is_internal_error() {
        let ledger = StockLedger::new();
        ledger.register(&pid("p1"), 10).unwrap();
        assert!(matches!(
            ledger.release(&pid("p1"), 1),
            Err(ReserveError::Internal(_))
        ));
        assert!(matches!(
            ledger.confirm(&pid("p1"), 1),
            Err(ReserveError::Internal(_))
        ));
    }

    #[test]
    fn unknown_product() {
        let ledger = StockLedger::new();
        assert_eq!(
            ledger.try_hold(&pid("nope"), 1),
            Err(ReserveError::ProductNotFound(pid("nope")))
        );
        assert_eq!(
            ledger.restock(&pid("nope"), 1),
            Err(ReserveError::ProductNotFound(pid("nope")))
        );
    }

    #[test]
    fn concurrent_try_hold_never_oversells() {
        use std::sync::Arc;

        let ledger = Arc::new(StockLedger::new());
        ledger.register(&pid("p1"), 100).unwrap();

        // 50 threads each trying to hold 3 units: at most 33 can win
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.try_hold(&pid("p1"), 3).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 33);
        let levels = ledger.levels(&pid("p1")).unwrap();
        assert_eq!(levels.held, 99);
        assert_eq!(levels.available, 1);
        assert_eq!(levels.held + levels.consumed + levels.available, levels.total);
    }
}
