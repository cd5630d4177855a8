//! Stable chronological ordering for deterministic replay.

use crate::domain::Trade;

/// Return a copy of `trades` sorted ascending by `time_ms`.
///
/// The sort is stable: trades sharing a timestamp keep their input order.
/// The caller's slice is left untouched.
pub fn sort_chronological(trades: &[Trade]) -> Vec<Trade> {
    let mut sorted = trades.to_vec();
    sorted.sort_by_key(|t| t.time_ms);
    sorted
}
