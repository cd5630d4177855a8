use crate::datasource::DataSource;
use crate::domain::{Address, Decimal, TimeMs, TimeWindow};
use crate::error::{EngineError, ServiceError};
use std::sync::Arc;

/// Resolves account equity at a timestamp using best-effort upstream data.
#[derive(Clone)]
pub struct EquityResolver {
    datasource: Arc<dyn DataSource>,
}

impl EquityResolver {
    pub fn new(datasource: Arc<dyn DataSource>) -> Self {
        Self { datasource }
    }

    /// Upstream equity if known, else net transfers up to `at_ms`, else zero.
    pub async fn resolve_equity(
        &self,
        user: &Address,
        at_ms: TimeMs,
    ) -> Result<Decimal, ServiceError> {
        if let Some(equity) = self.datasource.fetch_starting_equity(user, at_ms).await? {
            return Ok(equity);
        }

        let deposits = self
            .datasource
            .fetch_deposits(user, TimeWindow::new(None, Some(at_ms)))
            .await?;
        let derived_equity = Decimal::checked_sum(deposits.iter().map(|d| d.amount))
            .ok_or(EngineError::Overflow("net transfers"))?;

        tracing::debug!(
            user = %user,
            at_ms = %at_ms,
            equity = %derived_equity,
            "Derived equity from transfers"
        );

        Ok(derived_equity)
    }
}
