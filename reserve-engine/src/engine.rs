//! ReservationEngine - public contract over ledger, registry and reaper
//!
//! # Reserve Flow
//!
//! ```text
//! reserve(product_id, quantity, hold_id)
//!     ├─ 1. Validate quantity
//!     ├─ 2. StockLedger.try_hold (available -> held, atomic)
//!     ├─ 3. HoldRegistry.create (duplicate guard)
//!     │      └─ on DuplicateHold: compensate with ledger.release
//!     ├─ 4. Schedule deadline with the reaper
//!     ├─ 5. Broadcast HoldCreated
//!     └─ 6. Return hold snapshot
//! ```
//!
//! Confirm/cancel/expiry all win or lose at the registry's terminal
//! compare-and-set before touching stock, so exactly one of them takes
//! effect per hold.

use crate::config::EngineConfig;
use crate::ledger::StockLedger;
use crate::reaper::{ExpiryReaper, ExpirySchedule};
use crate::registry::HoldRegistry;
use chrono::Utc;
use shared::{
    HoldEvent, HoldId, HoldSnapshot, HoldState, ProductId, ReserveError, ReserveResult,
    StockLevels,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Concurrency-safe reservation engine
///
/// Cheap to share: clone the `Arc`s it hands out or wrap the engine
/// itself in an `Arc`. All operations are synchronous bounded critical
/// sections; only the reaper runs as a background task.
pub struct ReservationEngine {
    config: EngineConfig,
    ledger: Arc<StockLedger>,
    registry: Arc<HoldRegistry>,
    schedule: Arc<ExpirySchedule>,
    event_tx: broadcast::Sender<HoldEvent>,
}

impl std::fmt::Debug for ReservationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationEngine")
            .field("config", &self.config)
            .field("active_holds", &self.registry.active_count())
            .field("pending_deadlines", &self.schedule.len())
            .finish()
    }
}

impl ReservationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            config,
            ledger: Arc::new(StockLedger::new()),
            registry: Arc::new(HoldRegistry::new()),
            schedule: Arc::new(ExpirySchedule::new()),
            event_tx,
        }
    }

    /// Start the background expiry reaper
    ///
    /// Cancel the token to stop it; holds already scheduled are
    /// reaped on the next loop iteration after their deadline.
    pub fn spawn_reaper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let reaper = ExpiryReaper::new(
            self.ledger.clone(),
            self.registry.clone(),
            self.schedule.clone(),
            self.event_tx.clone(),
            self.config.sweep_interval,
            self.config.terminal_retention,
        );
        tokio::spawn(reaper.run(shutdown))
    }

    /// Subscribe to hold lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<HoldEvent> {
        self.event_tx.subscribe()
    }

    // ========================================================================
    // Catalog collaborator surface
    // ========================================================================

    /// Register a product before any reservation against it
    pub fn register_product(
        &self,
        product_id: &ProductId,
        initial_count: u64,
    ) -> ReserveResult<()> {
        self.ledger.register(product_id, initial_count)
    }

    /// Add units to an existing product
    pub fn restock(&self, product_id: &ProductId, delta: u64) -> ReserveResult<u64> {
        self.ledger.restock(product_id, delta)
    }

    // ========================================================================
    // Reservation contract
    // ========================================================================

    /// Block `quantity` units of a product for the order identified by
    /// `hold_id`, until confirm, cancel or expiry.
    pub fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        hold_id: &HoldId,
    ) -> ReserveResult<HoldSnapshot> {
        if quantity == 0 {
            return Err(ReserveError::invalid("reserve quantity must be positive"));
        }

        self.ledger.try_hold(product_id, quantity)?;

        let now = Utc::now();
        let deadline = now + self.config.hold_duration_chrono();
        match self
            .registry
            .create(hold_id, product_id, quantity, now, deadline)
        {
            Ok(snapshot) => {
                self.schedule.schedule(hold_id.clone(), deadline);
                tracing::info!(
                    hold_id = %hold_id,
                    product_id = %product_id,
                    quantity,
                    deadline = %deadline,
                    "Hold created"
                );
                let _ = self.event_tx.send(HoldEvent::HoldCreated {
                    hold_id: hold_id.clone(),
                    product_id: product_id.clone(),
                    quantity,
                    deadline,
                });
                Ok(snapshot)
            }
            Err(err) => {
                // The ledger already committed the hold; give the units
                // back before surfacing the duplicate (no stock leak).
                if let Err(release_err) = self.ledger.release(product_id, quantity) {
                    tracing::error!(
                        hold_id = %hold_id,
                        product_id = %product_id,
                        error = %release_err,
                        "Compensating release failed after duplicate hold"
                    );
                }
                tracing::warn!(hold_id = %hold_id, "Reservation rejected: duplicate hold id");
                Err(err)
            }
        }
    }

    /// Consume the held units (payment succeeded)
    pub fn confirm(&self, hold_id: &HoldId) -> ReserveResult<()> {
        let (product_id, quantity) = self.registry.transition(hold_id, HoldState::Confirmed)?;
        self.ledger.confirm(&product_id, quantity)?;
        tracing::info!(hold_id = %hold_id, product_id = %product_id, quantity, "Hold confirmed");
        let _ = self.event_tx.send(HoldEvent::HoldConfirmed {
            hold_id: hold_id.clone(),
            product_id,
            quantity,
        });
        Ok(())
    }

    /// Release the held units (payment declined or user abort)
    pub fn cancel(&self, hold_id: &HoldId) -> ReserveResult<()> {
        let (product_id, quantity) = self.registry.transition(hold_id, HoldState::Cancelled)?;
        self.ledger.release(&product_id, quantity)?;
        tracing::info!(hold_id = %hold_id, product_id = %product_id, quantity, "Hold cancelled");
        let _ = self.event_tx.send(HoldEvent::HoldCancelled {
            hold_id: hold_id.clone(),
            product_id,
            quantity,
        });
        Ok(())
    }

    // ========================================================================
    // Read-only queries
    // ========================================================================

    /// Units eligible for new holds: `total - held - consumed`
    pub fn available(&self, product_id: &ProductId) -> ReserveResult<u64> {
        self.ledger.levels(product_id).map(|levels| levels.available)
    }

    /// Full counter snapshot for one product
    pub fn stock_levels(&self, product_id: &ProductId) -> ReserveResult<StockLevels> {
        self.ledger.levels(product_id)
    }

    /// Snapshot of one hold (terminal holds stay queryable until swept)
    pub fn hold(&self, hold_id: &HoldId) -> ReserveResult<HoldSnapshot> {
        self.registry.get(hold_id)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ReservationEngine {
        ReservationEngine::new(EngineConfig::default())
    }

    fn pid(s: &str) -> ProductId {
        ProductId::from(s)
    }

    fn hid(s: &str) -> HoldId {
        HoldId::from(s)
    }

    #[test]
    fn reserve_confirm_flow() {
        let engine = engine();
        engine.register_product(&pid("1234"), 40).unwrap();

        let snapshot = engine.reserve(&pid("1234"), 25, &hid("order-1")).unwrap();
        assert_eq!(snapshot.state, HoldState::Active);
        assert_eq!(engine.available(&pid("1234")).unwrap(), 15);

        // 30 > 15 remaining
        let err = engine.reserve(&pid("1234"), 30, &hid("order-2")).unwrap_err();
        assert!(matches!(err, ReserveError::InsufficientStock { available: 15, .. }));
        assert_eq!(engine.available(&pid("1234")).unwrap(), 15);

        engine.confirm(&hid("order-1")).unwrap();
        let levels = engine.stock_levels(&pid("1234")).unwrap();
        assert_eq!(levels.total, 40);
        assert_eq!(levels.held, 0);
        assert_eq!(levels.consumed, 25);
        assert_eq!(levels.available, 15);
    }

    #[test]
    fn cancel_returns_units() {
        let engine = engine();
        engine.register_product(&pid("p1"), 10).unwrap();
        engine.reserve(&pid("p1"), 4, &hid("h1")).unwrap();
        assert_eq!(engine.available(&pid("p1")).unwrap(), 6);

        engine.cancel(&hid("h1")).unwrap();
        let levels = engine.stock_levels(&pid("p1")).unwrap();
        assert_eq!(levels.available, 10);
        assert_eq!(levels.consumed, 0);
        assert_eq!(engine.hold(&hid("h1")).unwrap().state, HoldState::Cancelled);
    }

    #[test]
    fn duplicate_hold_does_not_leak_stock() {
        let engine = engine();
        engine.register_product(&pid("p1"), 10).unwrap();
        engine.reserve(&pid("p1"), 3, &hid("h1")).unwrap();

        let err = engine.reserve(&pid("p1"), 5, &hid("h1")).unwrap_err();
        assert_eq!(err, ReserveError::DuplicateHold(hid("h1")));

        // First hold unaffected, second attempt fully compensated
        let levels = engine.stock_levels(&pid("p1")).unwrap();
        assert_eq!(levels.held, 3);
        assert_eq!(levels.available, 7);
        assert_eq!(engine.hold(&hid("h1")).unwrap().quantity, 3);
    }

    #[test]
    fn confirm_then_cancel_is_already_terminal() {
        let engine = engine();
        engine.register_product(&pid("p1"), 10).unwrap();
        engine.reserve(&pid("p1"), 2, &hid("h1")).unwrap();
        engine.confirm(&hid("h1")).unwrap();

        let err = engine.cancel(&hid("h1")).unwrap_err();
        assert_eq!(
            err,
            ReserveError::AlreadyTerminal {
                hold_id: hid("h1"),
                state: HoldState::Confirmed,
            }
        );
        // Stock effect of the confirm stands
        assert_eq!(engine.stock_levels(&pid("p1")).unwrap().consumed, 2);
    }

    #[test]
    fn zero_quantity_rejected_before_ledger() {
        let engine = engine();
        engine.register_product(&pid("p1"), 10).unwrap();
        assert!(matches!(
            engine.reserve(&pid("p1"), 0, &hid("h1")),
            Err(ReserveError::InvalidArgument(_))
        ));
        assert_eq!(engine.hold(&hid("h1")), Err(ReserveError::HoldNotFound(hid("h1"))));
    }

    #[test]
    fn unknown_product_and_hold() {
        let engine = engine();
        assert!(matches!(
            engine.reserve(&pid("nope"), 1, &hid("h1")),
            Err(ReserveError::ProductNotFound(_))
        ));
        assert!(matches!(
            engine.confirm(&hid("h1")),
            Err(ReserveError::HoldNotFound(_))
        ));
    }

    #[test]
    fn restock_raises_availability() {
        let engine = engine();
        engine.register_product(&pid("p1"), 5).unwrap();
        engine.reserve(&pid("p1"), 5, &hid("h1")).unwrap();
        assert_eq!(engine.available(&pid("p1")).unwrap(), 0);

        engine.restock(&pid("p1"), 7).unwrap();
        assert_eq!(engine.available(&pid("p1")).unwrap(), 7);
        let levels = engine.stock_levels(&pid("p1")).unwrap();
        assert_eq!(levels.total, 12);
        assert_eq!(levels.held, 5);
    }

    #[test]
    fn events_follow_the_lifecycle() {
        let engine = engine();
        let mut events = engine.subscribe();
        engine.register_product(&pid("p1"), 10).unwrap();
        engine.reserve(&pid("p1"), 2, &hid("h1")).unwrap();
        engine.confirm(&hid("h1")).unwrap();

        match events.try_recv().unwrap() {
            HoldEvent::HoldCreated { hold_id, quantity, .. } => {
                assert_eq!(hold_id, hid("h1"));
                assert_eq!(quantity, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            events.try_recv().unwrap().terminal_state(),
            Some(HoldState::Confirmed)
        );
    }
}
