pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod service;

pub use config::{Config, ConfigError, PnlMode};
pub use datasource::{DataSource, DataSourceError, HyperliquidDataSource, MockDataSource};
pub use domain::{
    Address, Coin, Decimal, Deposit, DepositSummary, Side, TimeMs, TimeWindow, Trade,
};
pub use engine::{
    aggregate, is_attributed, reconstruct, replay, step, CapitalPolicy, PnlAggregator, PnlResult,
    PositionSnapshot, Reconstruction, Reconstructor, ReconstructorState, TrackedAttribution,
};
pub use error::{EngineError, ServiceError};
pub use service::{
    FairLeaderboardEntry, LeaderboardEntry, LeaderboardMetric, LeaderboardRanker,
    LeaderboardRequest, LedgerService,
};
