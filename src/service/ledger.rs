use crate::datasource::DataSource;
use crate::domain::{Address, Coin, Decimal, DepositSummary, TimeWindow, Trade};
use crate::engine::pnl::return_pct;
use crate::engine::{
    BuilderOnlyFilter, EquityResolver, PnlAggregator, PnlResult, PositionSnapshot,
    Reconstructor, TaintComputer,
};
use crate::error::ServiceError;
use crate::service::validate_window;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Realized PnL for one user on one coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPnl {
    pub user: Address,
    pub coin: Coin,
    #[serde(flatten)]
    pub result: PnlResult,
    pub starting_equity: Decimal,
    /// True when builder-only filtering excluded at least one lifecycle.
    pub tainted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinPnl {
    pub coin: Coin,
    #[serde(flatten)]
    pub result: PnlResult,
    pub tainted: bool,
}

/// Realized PnL across every coin a user traded, measured on one shared capital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPnl {
    pub user: Address,
    pub coins: Vec<CoinPnl>,
    pub total_realized_pnl: Decimal,
    pub total_fees_paid: Decimal,
    pub total_net_pnl: Decimal,
    pub total_trade_count: usize,
    pub total_volume: Decimal,
    pub starting_equity: Decimal,
    pub effective_capital: Decimal,
    pub return_pct: Decimal,
    pub tainted: bool,
}

/// Trades of one coin after optional builder-only filtering.
struct FilteredTrades {
    kept: Vec<Trade>,
    tainted: bool,
}

/// Per-user queries over an injected data source.
#[derive(Clone)]
pub struct LedgerService {
    datasource: Arc<dyn DataSource>,
    reconstructor: Reconstructor,
    aggregator: PnlAggregator,
    equity: EquityResolver,
}

impl LedgerService {
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
        }
    }

    /// One snapshot per trade in chronological order.
    ///
    /// With `builder_only`, snapshots of tainted lifecycles are dropped.
    pub async fn position_history(
        &self,
        user: &Address,
        coin: &Coin,
        window: TimeWindow,
        builder_only: bool,
    ) -> Result<Vec<PositionSnapshot>, ServiceError> {
        validate_window(&window)?;
        let trades = self.datasource.fetch_trades(user, Some(coin), window).await?;
        let reconstruction = self.reconstructor.replay(&trades)?;

        tracing::debug!(
            user = %user,
            coin = %coin,
            trades = reconstruction.trades.len(),
            "Reconstructed position history"
        );

        if !builder_only {
            return Ok(reconstruction.snapshots);
        }

        let taints =
            TaintComputer::new(&reconstruction, self.reconstructor.tracked()).compute_all_taints();
        Ok(BuilderOnlyFilter::new(&taints).filter_snapshots(&reconstruction.snapshots))
    }

    pub async fn pnl(
        &self,
        user: &Address,
        coin: &Coin,
        window: TimeWindow,
        builder_only: bool,
    ) -> Result<UserPnl, ServiceError> {
        validate_window(&window)?;
        let trades = self.datasource.fetch_trades(user, Some(coin), window).await?;
        let filtered = self.filter(&trades, builder_only)?;
        let starting_equity = self.equity.resolve_equity(user, window.start()).await?;
        let result = self.aggregator.aggregate(&filtered.kept, starting_equity)?;

        Ok(UserPnl {
            user: user.clone(),
            coin: coin.clone(),
            result,
            starting_equity,
            tainted: filtered.tainted,
        })
    }

    /// Each coin is reconstructed independently; totals share one capital figure.
    pub async fn portfolio_pnl(
        &self,
        user: &Address,
        window: TimeWindow,
        builder_only: bool,
    ) -> Result<PortfolioPnl, ServiceError> {
        validate_window(&window)?;
        let trades = self.datasource.fetch_trades(user, None, window).await?;
        let starting_equity = self.equity.resolve_equity(user, window.start()).await?;

        let mut by_coin: BTreeMap<Coin, Vec<Trade>> = BTreeMap::new();
        for trade in trades {
            by_coin.entry(trade.coin.clone()).or_default().push(trade);
        }

        let mut coins = Vec::with_capacity(by_coin.len());
        let mut total = PnlResult::default();
        let mut tainted = false;

        for (coin, coin_trades) in by_coin {
            let filtered = self.filter(&coin_trades, builder_only)?;
            let result = self.aggregator.aggregate(&filtered.kept, starting_equity)?;

            total.accumulate(&result)?;
            tainted |= filtered.tainted;

            coins.push(CoinPnl {
                coin,
                result,
                tainted: filtered.tainted,
            });
        }

        let effective_capital = self.aggregator.policy().effective_capital(starting_equity);

        Ok(PortfolioPnl {
            user: user.clone(),
            coins,
            total_realized_pnl: total.realized_pnl,
            total_fees_paid: total.fees_paid,
            total_net_pnl: total.net_pnl,
            total_trade_count: total.trade_count,
            total_volume: total.volume,
            starting_equity,
            effective_capital,
            return_pct: return_pct(total.net_pnl, effective_capital)?,
            tainted,
        })
    }

    pub async fn deposits(
        &self,
        user: &Address,
        window: TimeWindow,
    ) -> Result<DepositSummary, ServiceError> {
        validate_window(&window)?;
        let deposits = self.datasource.fetch_deposits(user, window).await?;
        Ok(DepositSummary::from_deposits(deposits)?)
    }

    fn filter(&self, trades: &[Trade], builder_only: bool) -> Result<FilteredTrades, ServiceError> {
        let reconstruction = self.reconstructor.replay(trades)?;

        if !builder_only {
            return Ok(FilteredTrades {
                kept: reconstruction.trades,
                tainted: false,
            });
        }

        let taints =
            TaintComputer::new(&reconstruction, self.reconstructor.tracked()).compute_all_taints();
        let filter = BuilderOnlyFilter::new(&taints);
        let kept = filter.filter_trades(&reconstruction);
        let lifecycle_ids: Vec<i64> = reconstruction.lifecycles().iter().map(|l| l.id).collect();
        let tainted = filter.had_exclusions(&lifecycle_ids);

        Ok(FilteredTrades { kept, tainted })
    }
}
