//! Hold lifecycle events
//!
//! Broadcast by the engine so observers (transport layer, metrics,
//! audit) can follow hold lifecycles without polling.

use crate::types::{HoldId, HoldState, ProductId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One lifecycle event for one hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldEvent {
    /// Units were blocked for an order
    HoldCreated {
        hold_id: HoldId,
        product_id: ProductId,
        quantity: u32,
        deadline: DateTime<Utc>,
    },
    /// The caller confirmed; units are consumed
    HoldConfirmed {
        hold_id: HoldId,
        product_id: ProductId,
        quantity: u32,
    },
    /// The caller cancelled; units returned to available
    HoldCancelled {
        hold_id: HoldId,
        product_id: ProductId,
        quantity: u32,
    },
    /// The reaper expired the hold; units returned to available
    HoldExpired {
        hold_id: HoldId,
        product_id: ProductId,
        quantity: u32,
    },
}

impl HoldEvent {
    pub fn hold_id(&self) -> &HoldId {
        match self {
            HoldEvent::HoldCreated { hold_id, .. }
            | HoldEvent::HoldConfirmed { hold_id, .. }
            | HoldEvent::HoldCancelled { hold_id, .. }
            | HoldEvent::HoldExpired { hold_id, .. } => hold_id,
        }
    }

    /// Terminal state this event corresponds to, if any
    pub fn terminal_state(&self) -> Option<HoldState> {
        match self {
            HoldEvent::HoldCreated { .. } => None,
            HoldEvent::HoldConfirmed { .. } => Some(HoldState::Confirmed),
            HoldEvent::HoldCancelled { .. } => Some(HoldState::Cancelled),
            HoldEvent::HoldExpired { .. } => Some(HoldState::Expired),
        }
    }
}
