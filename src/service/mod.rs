//! Services that combine a data source with the engine.
//!
//! - [`LedgerService`]: per-user position history, PnL and deposits
//! - [`LeaderboardRanker`]: concurrent per-user evaluation and dense ranking

pub mod leaderboard;
pub mod ledger;

pub use leaderboard::{
    FairLeaderboardEntry, LeaderboardEntry, LeaderboardMetric, LeaderboardRanker,
    LeaderboardRequest,
};
pub use ledger::{CoinPnl, LedgerService, PortfolioPnl, UserPnl};

use crate::domain::TimeWindow;
use crate::error::EngineError;

pub(crate) fn validate_window(window: &TimeWindow) -> Result<(), EngineError> {
    match (window.from_ms, window.to_ms) {
        (Some(from), Some(to)) if window.is_inverted() => Err(EngineError::InvalidWindow {
            from_ms: from.as_i64(),
            to_ms: to.as_i64(),
        }),
        _ => Ok(()),
    }
}
