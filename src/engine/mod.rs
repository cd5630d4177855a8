//! Pure computation engine(s) for position reconstruction, taint and PnL.

use crate::domain::{Decimal, TimeMs, Trade};
use serde::Serialize;
use std::collections::BTreeSet;

pub mod equity;
pub mod pnl;
pub mod reconstructor;
pub mod taint;

pub use equity::EquityResolver;
pub use pnl::{aggregate, CapitalPolicy, PnlAggregator, PnlResult};
pub use reconstructor::{reconstruct, replay, step, Reconstructor, ReconstructorState};
pub use taint::{is_attributed, BuilderOnlyFilter, TaintComputer, TaintInfo, TrackedAttribution};

/// A snapshot of position state after a trade.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub time_ms: TimeMs,
    /// Signed running size: positive = long, negative = short, zero = flat.
    pub net_size: Decimal,
    pub avg_entry_px: Decimal,
    pub tainted: bool,
    pub lifecycle_id: i64,
}

/// A lifecycle from position open to close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub id: i64,
    pub start_time_ms: TimeMs,
    /// None if the position is still open after the last trade.
    pub end_time_ms: Option<TimeMs>,
    pub trade_count: usize,
    pub tainted: bool,
}

/// Chronologically sorted trades paired one-to-one with their snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconstruction {
    pub trades: Vec<Trade>,
    pub snapshots: Vec<PositionSnapshot>,
}

impl Reconstruction {
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Iterate `(trade, snapshot)` pairs in replay order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Trade, &PositionSnapshot)> {
        self.trades.iter().zip(self.snapshots.iter())
    }

    /// Distinct lifecycle ids with at least one tainted snapshot.
    pub fn tainted_lifecycle_ids(&self) -> BTreeSet<i64> {
        self.snapshots
            .iter()
            .filter(|s| s.tainted)
            .map(|s| s.lifecycle_id)
            .collect()
    }

    /// Per-lifecycle summary in order of first appearance.
    pub fn lifecycles(&self) -> Vec<Lifecycle> {
        let mut lifecycles: Vec<Lifecycle> = Vec::new();

        for snapshot in &self.snapshots {
            match lifecycles.last_mut() {
                Some(current) if current.id == snapshot.lifecycle_id => {
                    current.trade_count += 1;
                    current.tainted |= snapshot.tainted;
                }
                _ => lifecycles.push(Lifecycle {
                    id: snapshot.lifecycle_id,
                    start_time_ms: snapshot.time_ms,
                    end_time_ms: None,
                    trade_count: 1,
                    tainted: snapshot.tainted,
                }),
            }

            if snapshot.net_size.snap_to_zero().is_zero() {
                if let Some(current) = lifecycles.last_mut() {
                    current.end_time_ms = Some(snapshot.time_ms);
                }
            }
        }

        lifecycles
    }

    /// Net size carried after the last trade (zero if empty).
    pub fn final_net_size(&self) -> Decimal {
        self.snapshots
            .last()
            .map(|s| s.net_size)
            .unwrap_or_else(Decimal::zero)
    }
}
