//! Domain types for the trade ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, Address, Coin, Side, TimeWindow
//! - Trade and Deposit values as delivered by a data source
//! - Stable chronological ordering for deterministic replay

pub mod decimal;
pub mod deposit;
pub mod ordering;
pub mod primitives;
pub mod trade;

pub use decimal::Decimal;
pub use deposit::{Deposit, DepositSummary};
pub use ordering::sort_chronological;
pub use primitives::{Address, Coin, Side, TimeMs, TimeWindow};
pub use trade::Trade;
