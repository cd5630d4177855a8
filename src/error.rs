use crate::datasource::DataSourceError;
use thiserror::Error;

/// Errors raised by the pure reconstruction engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid trade at position {index}: {reason}")]
    InvalidTrade { index: usize, reason: String },
    #[error("Invalid window: fromMs {from_ms} is after toMs {to_ms}")]
    InvalidWindow { from_ms: i64, to_ms: i64 },
    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// Errors surfaced by the ledger and leaderboard services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}
