//! Sequential position reconstruction as an explicit fold over trades.

use crate::domain::{sort_chronological, Decimal, Trade};
use crate::error::EngineError;

use super::taint::{is_attributed, TrackedAttribution};
use super::{PositionSnapshot, Reconstruction};

/// Running state carried between trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconstructorState {
    /// Current net size: positive = long, negative = short, zero = flat.
    pub net_size: Decimal,

    /// Average entry price (only meaningful when net_size != 0).
    pub avg_entry_px: Decimal,

    /// Whether the current lifecycle contains a non-attributed trade.
    pub tainted: bool,

    /// Id of the current lifecycle; 0 before the first trade.
    pub lifecycle_id: i64,
}

impl ReconstructorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.net_size.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.net_size.is_positive()
    }

    pub fn is_short(&self) -> bool {
        self.net_size.is_negative()
    }
}

/// Apply one trade to `state`, returning the next state and the emitted snapshot.
///
/// Assumes the trade has a positive size and price; `replay` enforces this.
///
/// # Errors
/// Returns `EngineError::Overflow` if the net size or entry price leaves the
/// decimal range.
pub fn step(
    state: ReconstructorState,
    trade: &Trade,
    tracked: &TrackedAttribution,
) -> Result<(ReconstructorState, PositionSnapshot), EngineError> {
    let mut next = state;

    if state.is_flat() {
        next.lifecycle_id += 1;
        next.tainted = false;
        next.avg_entry_px = Decimal::zero();
    }

    let old_size = state.net_size;
    let signed_qty = trade.signed_size();
    let new_size = old_size
        .checked_add(signed_qty)
        .ok_or(EngineError::Overflow("net size"))?;

    next.avg_entry_px = if old_size.is_zero() {
        trade.price
    } else if old_size.signum() == signed_qty.signum() {
        weighted_entry(old_size, next.avg_entry_px, signed_qty, trade.price, new_size)
            .ok_or(EngineError::Overflow("average entry price"))?
    } else if is_flip(old_size, new_size) {
        trade.price
    } else {
        next.avg_entry_px
    };

    if !is_attributed(trade, tracked) {
        next.tainted = true;
    }

    let snapshot = PositionSnapshot {
        time_ms: trade.time_ms,
        net_size: new_size,
        avg_entry_px: next.avg_entry_px,
        tainted: next.tainted,
        lifecycle_id: next.lifecycle_id,
    };

    next.net_size = new_size.snap_to_zero();
    Ok((next, snapshot))
}

/// `(|old| * avg + |qty| * px) / |new|`
fn weighted_entry(
    old_size: Decimal,
    avg_entry_px: Decimal,
    signed_qty: Decimal,
    price: Decimal,
    new_size: Decimal,
) -> Option<Decimal> {
    let old_value = old_size.abs().checked_mul(avg_entry_px)?;
    let added_value = signed_qty.abs().checked_mul(price)?;
    old_value.checked_add(added_value)?.checked_div(new_size.abs())
}

/// Crossing from long to short or vice versa (landing on flat is not a flip).
fn is_flip(old_size: Decimal, new_size: Decimal) -> bool {
    if old_size.is_zero() || new_size.is_zero() {
        return false;
    }
    old_size.signum() != new_size.signum()
}

fn validate(index: usize, trade: &Trade) -> Result<(), EngineError> {
    if !trade.size.is_positive() {
        return Err(EngineError::InvalidTrade {
            index,
            reason: format!("size must be positive, got {}", trade.size),
        });
    }
    if !trade.price.is_positive() {
        return Err(EngineError::InvalidTrade {
            index,
            reason: format!("price must be positive, got {}", trade.price),
        });
    }
    Ok(())
}

/// Sort a copy of `trades` chronologically and fold them into snapshots.
///
/// # Errors
/// Returns `EngineError::InvalidTrade` for the first trade (in sorted order)
/// with a non-positive size or price, and `EngineError::Overflow` if the
/// running position leaves the decimal range.
pub fn replay(trades: &[Trade], tracked: &TrackedAttribution) -> Result<Reconstruction, EngineError> {
    let sorted = sort_chronological(trades);
    let mut snapshots = Vec::with_capacity(sorted.len());
    let mut state = ReconstructorState::new();

    for (index, trade) in sorted.iter().enumerate() {
        validate(index, trade)?;
        let (next, snapshot) = step(state, trade, tracked)?;
        snapshots.push(snapshot);
        state = next;
    }

    Ok(Reconstruction {
        trades: sorted,
        snapshots,
    })
}

/// One snapshot per trade, in chronological order.
pub fn reconstruct(
    trades: &[Trade],
    tracked: &TrackedAttribution,
) -> Result<Vec<PositionSnapshot>, EngineError> {
    replay(trades, tracked).map(|r| r.snapshots)
}

/// Reconstructor bound to one tracked attribution identity.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    tracked: TrackedAttribution,
}

impl Reconstructor {
    pub fn new(tracked: TrackedAttribution) -> Self {
        Self { tracked }
    }

    pub fn tracked(&self) -> &TrackedAttribution {
        &self.tracked
    }

    pub fn replay(&self, trades: &[Trade]) -> Result<Reconstruction, EngineError> {
        replay(trades, &self.tracked)
    }

    pub fn reconstruct(&self, trades: &[Trade]) -> Result<Vec<PositionSnapshot>, EngineError> {
        reconstruct(trades, &self.tracked)
    }
}
