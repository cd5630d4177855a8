//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError};
use crate::domain::{Address, Coin, Decimal, Deposit, TimeMs, TimeWindow, Trade};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Mock data source that returns predefined test data.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    trades: HashMap<Address, Vec<Trade>>,
    deposits: Vec<Deposit>,
    equity: HashMap<Address, Decimal>,
    default_equity: Option<Decimal>,
    active_users: Vec<Address>,
    failing_users: HashSet<Address>,
    delays: HashMap<Address, Duration>,
}

impl MockDataSource {
    /// Create a new mock data source with empty data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add multiple trades for `user`.
    pub fn with_trades(mut self, user: &Address, trades: Vec<Trade>) -> Self {
        self.trades.entry(user.clone()).or_default().extend(trades);
        self
    }

    pub fn with_deposit(mut self, deposit: Deposit) -> Self {
        self.deposits.push(deposit);
        self
    }

    /// Equity reported for one user.
    pub fn with_equity(mut self, user: &Address, equity: Decimal) -> Self {
        self.equity.insert(user.clone(), equity);
        self
    }

    /// Equity reported for users without an explicit value.
    pub fn with_default_equity(mut self, equity: Decimal) -> Self {
        self.default_equity = Some(equity);
        self
    }

    /// Users returned by `fetch_active_users`, in this order.
    pub fn with_active_users(mut self, users: Vec<Address>) -> Self {
        self.active_users = users;
        self
    }

    /// Make every trade fetch for `user` fail with a network error.
    pub fn with_failing_user(mut self, user: &Address) -> Self {
        self.failing_users.insert(user.clone());
        self
    }

    /// Delay every trade fetch for `user`.
    pub fn with_delay(mut self, user: &Address, delay: Duration) -> Self {
        self.delays.insert(user.clone(), delay);
        self
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_trades(
        &self,
        user: &Address,
        coin: Option<&Coin>,
        window: TimeWindow,
    ) -> Result<Vec<Trade>, DataSourceError> {
        if let Some(delay) = self.delays.get(user) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_users.contains(user) {
            return Err(DataSourceError::NetworkError(format!(
                "mock failure for {}",
                user
            )));
        }

        Ok(self
            .trades
            .get(user)
            .map(|trades| {
                trades
                    .iter()
                    .filter(|t| coin.map_or(true, |c| &t.coin == c) && window.contains(t.time_ms))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_active_users(
        &self,
        _coin: &Coin,
        _since: TimeMs,
    ) -> Result<Vec<Address>, DataSourceError> {
        Ok(self.active_users.clone())
    }

    async fn fetch_starting_equity(
        &self,
        user: &Address,
        _at_ms: TimeMs,
    ) -> Result<Option<Decimal>, DataSourceError> {
        Ok(self.equity.get(user).copied().or(self.default_equity))
    }

    async fn fetch_deposits(
        &self,
        user: &Address,
        window: TimeWindow,
    ) -> Result<Vec<Deposit>, DataSourceError> {
        let mut deposits: Vec<Deposit> = self
            .deposits
            .iter()
            .filter(|d| &d.user == user && window.contains(d.time_ms))
            .cloned()
            .collect();
        deposits.sort_by_key(|d| d.time_ms);
        Ok(deposits)
    }
}
