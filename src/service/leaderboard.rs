//! Leaderboard ranking across many users.
//!
//! Each candidate user runs an independent pipeline (fetch, reconstruct,
//! filter, aggregate) under a per-user timeout. Pipelines run concurrently
//! up to the fan-out limit. A failing user is logged and left out; it never
//! aborts the batch.

use crate::config::{Config, PnlMode};
use crate::datasource::DataSource;
use crate::domain::{Address, Coin, Decimal, TimeMs, TimeWindow};
use crate::engine::{
    BuilderOnlyFilter, CapitalPolicy, EquityResolver, PnlAggregator, PnlResult, Reconstructor,
    TaintComputer, TrackedAttribution,
};
use crate::error::{EngineError, ServiceError};
use crate::service::validate_window;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_FANOUT_LIMIT: usize = 8;
const DEFAULT_USER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaderboardMetric {
    Pnl,
    Roi,
    Volume,
}

impl FromStr for LeaderboardMetric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pnl" => Ok(LeaderboardMetric::Pnl),
            "roi" | "returnpct" => Ok(LeaderboardMetric::Roi),
            "volume" => Ok(LeaderboardMetric::Volume),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRequest {
    pub coin: Coin,
    pub window: TimeWindow,
    pub metric: LeaderboardMetric,
    pub builder_only: bool,
}

impl LeaderboardRequest {
    pub fn new(coin: Coin, metric: LeaderboardMetric) -> Self {
        Self {
            coin,
            window: TimeWindow::all(),
            metric,
            builder_only: false,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_builder_only(mut self, builder_only: bool) -> Self {
        self.builder_only = builder_only;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based, dense.
    pub rank: usize,
    pub user: Address,
    pub metric_value: Decimal,
    pub trade_count: usize,
    /// No lifecycle of this user was tainted.
    pub is_clean: bool,
}

/// Entry of the deposit-adjusted leaderboard, ranked by return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FairLeaderboardEntry {
    pub rank: usize,
    pub user: Address,
    pub starting_equity: Decimal,
    pub deposits_during_window: Decimal,
    pub effective_capital: Decimal,
    pub had_mid_window_deposits: bool,
    pub pnl: Decimal,
    pub roi: Decimal,
    pub trade_count: usize,
    pub is_clean: bool,
}

/// Outcome of one user's pipeline.
#[derive(Debug, Clone)]
struct UserEvaluation {
    user: Address,
    result: PnlResult,
    is_clean: bool,
    starting_equity: Decimal,
    deposits_during_window: Decimal,
}

#[derive(Clone)]
pub struct LeaderboardRanker {
    datasource: Arc<dyn DataSource>,
    reconstructor: Reconstructor,
    aggregator: PnlAggregator,
    equity: EquityResolver,
    pnl_mode: PnlMode,
    fanout_limit: usize,
    user_timeout: Duration,
    static_users: Vec<Address>,
}

impl LeaderboardRanker {
    pub fn new(
        datasource: Arc<dyn DataSource>,
        reconstructor: Reconstructor,
        aggregator: PnlAggregator,
    ) -> Self {
        let equity = EquityResolver::new(datasource.clone());
        Self {
            datasource,
            reconstructor,
            aggregator,
            equity,
            pnl_mode: PnlMode::Gross,
            fanout_limit: DEFAULT_FANOUT_LIMIT,
            user_timeout: DEFAULT_USER_TIMEOUT,
            static_users: Vec::new(),
        }
    }

    pub fn from_config(datasource: Arc<dyn DataSource>, config: &Config) -> Self {
        Self::new(
            datasource,
            Reconstructor::new(TrackedAttribution::new(config.target_builder.clone())),
            PnlAggregator::new(CapitalPolicy::new(config.capital_ceiling)),
        )
        .with_pnl_mode(config.pnl_mode)
        .with_fanout_limit(config.fanout_limit)
        .with_user_timeout(Duration::from_millis(config.user_timeout_ms))
        .with_static_users(
            config
                .leaderboard_users
                .iter()
                .map(|u| Address::new(u.clone()))
                .collect(),
        )
    }

    pub fn with_pnl_mode(mut self, pnl_mode: PnlMode) -> Self {
        self.pnl_mode = pnl_mode;
        self
    }

    pub fn with_fanout_limit(mut self, fanout_limit: usize) -> Self {
        self.fanout_limit = fanout_limit.max(1);
        self
    }

    pub fn with_user_timeout(mut self, user_timeout: Duration) -> Self {
        self.user_timeout = user_timeout;
        self
    }

    /// Users always considered, in addition to those the data source reports.
    pub fn with_static_users(mut self, users: Vec<Address>) -> Self {
        self.static_users = users;
        self
    }

    /// Active users followed by static users, trimmed, first occurrence wins.
    pub async fn candidate_users(&self, request: &LeaderboardRequest) -> Vec<Address> {
        let active = match self
            .datasource
            .fetch_active_users(&request.coin, request.window.start())
            .await
        {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(coin = %request.coin, error = %e, "Failed to fetch active users");
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        active
            .iter()
            .chain(self.static_users.iter())
            .map(|u| u.as_str().trim())
            .filter(|u| !u.is_empty())
            .filter(|u| seen.insert(u.to_string()))
            .map(|u| Address::new(u.to_string()))
            .collect()
    }

    /// Rank candidate users by the requested metric.
    pub async fn rank(
        &self,
        request: &LeaderboardRequest,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        validate_window(&request.window)?;
        let users = self.candidate_users(request).await;
        let mut evaluations = self.evaluate_all(users, request, false).await;

        evaluations.sort_by(|a, b| {
            self.metric_value(request.metric, &b.result)
                .cmp(&self.metric_value(request.metric, &a.result))
        });

        Ok(evaluations
            .into_iter()
            .enumerate()
            .map(|(idx, e)| LeaderboardEntry {
                rank: idx + 1,
                metric_value: self.metric_value(request.metric, &e.result),
                trade_count: e.result.trade_count,
                is_clean: e.is_clean,
                user: e.user,
            })
            .collect())
    }

    /// Rank by return on starting equity plus deposits made inside the window.
    ///
    /// `request.metric` is ignored; fair ranking is always by return.
    pub async fn rank_fair(
        &self,
        request: &LeaderboardRequest,
    ) -> Result<Vec<FairLeaderboardEntry>, ServiceError> {
        validate_window(&request.window)?;
        let users = self.candidate_users(request).await;
        let mut evaluations = self.evaluate_all(users, request, true).await;

        evaluations.sort_by(|a, b| b.result.return_pct.cmp(&a.result.return_pct));

        Ok(evaluations
            .into_iter()
            .enumerate()
            .map(|(idx, e)| FairLeaderboardEntry {
                rank: idx + 1,
                starting_equity: e.starting_equity,
                deposits_during_window: e.deposits_during_window,
                effective_capital: e.result.effective_capital,
                had_mid_window_deposits: e.deposits_during_window.is_positive(),
                pnl: e.result.net_pnl,
                roi: e.result.return_pct,
                trade_count: e.result.trade_count,
                is_clean: e.is_clean,
                user: e.user,
            })
            .collect())
    }

    fn metric_value(&self, metric: LeaderboardMetric, result: &PnlResult) -> Decimal {
        match metric {
            LeaderboardMetric::Pnl => match self.pnl_mode {
                PnlMode::Gross => result.realized_pnl,
                PnlMode::Net => result.net_pnl,
            },
            LeaderboardMetric::Roi => result.return_pct,
            LeaderboardMetric::Volume => result.volume,
        }
    }

    /// Run every pipeline and return the included users in discovery order.
    async fn evaluate_all(
        &self,
        users: Vec<Address>,
        request: &LeaderboardRequest,
        fair: bool,
    ) -> Vec<UserEvaluation> {
        let candidates = users.len();

        let mut outcomes: Vec<(usize, Address, Result<Option<UserEvaluation>, ServiceError>)> =
            stream::iter(users.into_iter().enumerate())
                .map(|(idx, user)| async move {
                    let outcome = self.evaluate_with_timeout(&user, request, fair).await;
                    (idx, user, outcome)
                })
                .buffer_unordered(self.fanout_limit)
                .collect()
                .await;

        outcomes.sort_by_key(|(idx, _, _)| *idx);

        let mut evaluations = Vec::with_capacity(outcomes.len());
        let mut failed = 0usize;
        for (_, user, outcome) in outcomes {
            match outcome {
                Ok(Some(evaluation)) => evaluations.push(evaluation),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "Excluding user from leaderboard");
                    failed += 1;
                }
            }
        }

        tracing::info!(
            coin = %request.coin,
            candidates,
            ranked = evaluations.len(),
            failed,
            "Leaderboard evaluated"
        );

        evaluations
    }

    async fn evaluate_with_timeout(
        &self,
        user: &Address,
        request: &LeaderboardRequest,
        fair: bool,
    ) -> Result<Option<UserEvaluation>, ServiceError> {
        match tokio::time::timeout(self.user_timeout, self.evaluate(user, request, fair)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceError::Timeout(self.user_timeout.as_millis() as u64)),
        }
    }

    /// `None` when the user has no trades left after filtering.
    async fn evaluate(
        &self,
        user: &Address,
        request: &LeaderboardRequest,
        fair: bool,
    ) -> Result<Option<UserEvaluation>, ServiceError> {
        let trades = self
            .datasource
            .fetch_trades(user, Some(&request.coin), request.window)
            .await?;
        let reconstruction = self.reconstructor.replay(&trades)?;
        if reconstruction.is_empty() {
            return Ok(None);
        }

        let is_clean = reconstruction.tainted_lifecycle_ids().is_empty();
        let kept = if request.builder_only {
            let taints = TaintComputer::new(&reconstruction, self.reconstructor.tracked())
                .compute_all_taints();
            BuilderOnlyFilter::new(&taints).filter_trades(&reconstruction)
        } else {
            reconstruction.trades
        };
        if kept.is_empty() {
            return Ok(None);
        }

        let window_start = request.window.start();
        let starting_equity = self.equity.resolve_equity(user, window_start).await?;

        let deposits_during_window = if fair {
            let during = TimeWindow::new(
                Some(TimeMs::new(window_start.as_i64().saturating_add(1))),
                request.window.to_ms,
            );
            let deposits = self.datasource.fetch_deposits(user, during).await?;
            Decimal::checked_sum(
                deposits
                    .iter()
                    .filter(|d| d.amount.is_positive())
                    .map(|d| d.amount),
            )
            .ok_or(EngineError::Overflow("deposits during window"))?
        } else {
            Decimal::zero()
        };

        let starting_capital = starting_equity
            .checked_add(deposits_during_window)
            .ok_or(EngineError::Overflow("starting capital"))?;
        let result = self.aggregator.aggregate(&kept, starting_capital)?;

        Ok(Some(UserEvaluation {
            user: user.clone(),
            result,
            is_clean,
            starting_equity,
            deposits_during_window,
        }))
    }
}
