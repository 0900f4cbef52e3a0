//! Expiry Reaper - deadline schedule and background expiry loop
//!
//! 到期回收：对每个 `ACTIVE` 持有，一旦 `now >= deadline`，
//! 将其置为 `EXPIRED` 并把数量释放回库存，除非别的参与者先完成了终态转换。
//!
//! The schedule is a deadline min-heap decoupled from hold records:
//! confirm/cancel never remove entries, the reaper re-checks state via
//! the registry compare-and-set before acting, so a stale entry for an
//! already-terminal hold is a harmless no-op.
//!
//! Reap order is fixed: win the registry transition FIRST, release
//! stock second. Releasing first could double-release against a
//! concurrent confirm.

use crate::ledger::StockLedger;
use crate::registry::HoldRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::{HoldEvent, HoldId, HoldState, ReserveError};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

/// One pending deadline
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduleEntry {
    deadline: DateTime<Utc>,
    hold_id: HoldId,
}

/// Deadline-ordered schedule of pending expirations
///
/// Entries are never removed on confirm/cancel; the reaper tolerates
/// stale entries. `schedule` wakes the loop only when the new entry
/// becomes the earliest pending deadline.
#[derive(Debug, Default)]
pub struct ExpirySchedule {
    heap: Mutex<BinaryHeap<Reverse<ScheduleEntry>>>,
    notify: Notify,
}

impl ExpirySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deadline for a hold
    pub fn schedule(&self, hold_id: HoldId, deadline: DateTime<Utc>) {
        let mut heap = self.heap.lock();
        let new_head = heap
            .peek()
            .is_none_or(|Reverse(head)| deadline < head.deadline);
        heap.push(Reverse(ScheduleEntry { deadline, hold_id }));
        drop(heap);
        if new_head {
            // Wake the loop so it re-arms its sleep to the earlier deadline
            self.notify.notify_one();
        }
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.heap.lock().peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Pop every entry whose deadline has passed
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<HoldId> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while heap
            .peek()
            .is_some_and(|Reverse(entry)| entry.deadline <= now)
        {
            let Reverse(entry) = heap.pop().expect("peeked entry present");
            due.push(entry.hold_id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Wait for a schedule change (a permit is stored if nobody waits)
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

/// Background task that expires overdue holds and sweeps terminal records
pub struct ExpiryReaper {
    ledger: Arc<StockLedger>,
    registry: Arc<HoldRegistry>,
    schedule: Arc<ExpirySchedule>,
    event_tx: broadcast::Sender<HoldEvent>,
    sweep_interval: Duration,
    terminal_retention: Duration,
}

impl ExpiryReaper {
    pub fn new(
        ledger: Arc<StockLedger>,
        registry: Arc<HoldRegistry>,
        schedule: Arc<ExpirySchedule>,
        event_tx: broadcast::Sender<HoldEvent>,
        sweep_interval: Duration,
        terminal_retention: Duration,
    ) -> Self {
        Self {
            ledger,
            registry,
            schedule,
            event_tx,
            sweep_interval,
            terminal_retention,
        }
    }

    /// Main loop: sleep until the next deadline, wake on earlier
    /// schedules, GC terminal holds on the interval tick.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Expiry reaper started");

        let mut sweep = tokio::time::interval(self.sweep_interval);
        loop {
            self.reap_due();

            let wait = self.next_wait();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.schedule.changed() => {}
                _ = sweep.tick() => {
                    self.registry.sweep_terminal(self.terminal_retention);
                }
                _ = Self::sleep_until_due(wait) => {}
            }
        }

        tracing::info!("Expiry reaper stopped");
    }

    /// Time until the earliest pending deadline (already-due => zero)
    fn next_wait(&self) -> Option<Duration> {
        self.schedule
            .next_deadline()
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    async fn sleep_until_due(wait: Option<Duration>) {
        match wait {
            Some(wait) => tokio::time::sleep(wait).await,
            // Empty schedule: only a wake-up or shutdown ends the select
            None => std::future::pending::<()>().await,
        }
    }

    /// Expire every overdue entry that is still `Active`
    fn reap_due(&self) {
        for hold_id in self.schedule.pop_due(Utc::now()) {
            match self.registry.transition(&hold_id, HoldState::Expired) {
                Ok((product_id, quantity)) => {
                    if let Err(e) = self.ledger.release(&product_id, quantity) {
                        tracing::error!(
                            hold_id = %hold_id,
                            product_id = %product_id,
                            error = %e,
                            "Failed to release stock for expired hold"
                        );
                        continue;
                    }
                    tracing::info!(
                        hold_id = %hold_id,
                        product_id = %product_id,
                        quantity,
                        "Hold expired, units returned to available"
                    );
                    let _ = self.event_tx.send(HoldEvent::HoldExpired {
                        hold_id,
                        product_id,
                        quantity,
                    });
                }
                Err(ReserveError::AlreadyTerminal { state, .. }) => {
                    // 其他参与者先赢了（confirm/cancel），过期条目作废
                    tracing::debug!(hold_id = %hold_id, winner = %state, "Stale expiry entry, hold already terminal");
                }
                Err(ReserveError::HoldNotFound(_)) => {
                    tracing::debug!(hold_id = %hold_id, "Stale expiry entry, hold already evicted");
                }
                Err(e) => {
                    tracing::error!(hold_id = %hold_id, error = %e, "Unexpected error expiring hold");
                }
            }
        }
    }
}
