//! Data source abstraction for fetching trades, users, equity and deposits.

use crate::domain::{Address, Coin, Decimal, Deposit, TimeMs, TimeWindow, Trade};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod hyperliquid;
pub mod mock;

pub use hyperliquid::HyperliquidDataSource;
pub use mock::MockDataSource;

/// Upstream venue access consumed by the ledger services.
///
/// Implementations page through upstream history and retry transient failures.
/// Malformed upstream rows are dropped (and logged) here; callers only ever
/// see well-formed values.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch trades for a user, optionally restricted to one coin.
    ///
    /// # Arguments
    /// * `user` - User address
    /// * `coin` - Asset symbol, or None for every coin
    /// * `window` - Inclusive time bounds
    async fn fetch_trades(
        &self,
        user: &Address,
        coin: Option<&Coin>,
        window: TimeWindow,
    ) -> Result<Vec<Trade>, DataSourceError>;

    /// Users that traded `coin` at or after `since`.
    async fn fetch_active_users(
        &self,
        coin: &Coin,
        since: TimeMs,
    ) -> Result<Vec<Address>, DataSourceError>;

    /// User's account equity at a point in time (best-effort).
    ///
    /// # Returns
    /// The equity, or None if the venue cannot answer for that time
    async fn fetch_starting_equity(
        &self,
        user: &Address,
        at_ms: TimeMs,
    ) -> Result<Option<Decimal>, DataSourceError>;

    /// Deposits/withdrawals for a user within a time range, ordered by time.
    async fn fetch_deposits(
        &self,
        user: &Address,
        window: TimeWindow,
    ) -> Result<Vec<Deposit>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error)
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    #[error("Rate limited")]
    RateLimited,
    #[error("Error: {0}")]
    Other(String),
}
