//! Realized PnL aggregation and capital-normalized return.

use crate::domain::{Decimal, Trade};
use crate::error::EngineError;
use serde::Serialize;

/// Rule mapping a starting-capital figure to the capital returns are measured on.
///
/// `effective = min(max(starting, floor), ceiling)`. The floor keeps the
/// division defined for empty or negative accounts; the ceiling stops
/// large accounts from diluting their return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapitalPolicy {
    pub floor: Decimal,
    pub ceiling: Decimal,
}

impl CapitalPolicy {
    pub fn new(ceiling: Decimal) -> Self {
        Self {
            floor: Decimal::one(),
            ceiling,
        }
    }

    pub fn effective_capital(&self, starting_capital: Decimal) -> Decimal {
        starting_capital.max(self.floor).min(self.ceiling)
    }
}

/// Aggregated PnL over a trade set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlResult {
    /// Sum of venue-reported realized PnL, before fees.
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    /// `realized_pnl - fees_paid`.
    pub net_pnl: Decimal,
    pub trade_count: usize,
    /// Sum of traded notional.
    pub volume: Decimal,
    pub effective_capital: Decimal,
    /// Net PnL as a percentage of effective capital.
    pub return_pct: Decimal,
}

/// PnL aggregator bound to one capital policy.
#[derive(Debug, Clone, Copy)]
pub struct PnlAggregator {
    policy: CapitalPolicy,
}

impl PnlAggregator {
    pub fn new(policy: CapitalPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CapitalPolicy {
        self.policy
    }

    /// # Errors
    /// Returns `EngineError::Overflow` if a sum or the return leaves the decimal range.
    pub fn aggregate(
        &self,
        trades: &[Trade],
        starting_capital: Decimal,
    ) -> Result<PnlResult, EngineError> {
        let mut realized_pnl = Decimal::zero();
        let mut fees_paid = Decimal::zero();
        let mut volume = Decimal::zero();

        for trade in trades {
            realized_pnl = realized_pnl
                .checked_add(trade.realized_pnl)
                .ok_or(EngineError::Overflow("realized pnl"))?;
            fees_paid = fees_paid
                .checked_add(trade.fee)
                .ok_or(EngineError::Overflow("fees paid"))?;
            volume = trade
                .notional()
                .and_then(|notional| volume.checked_add(notional))
                .ok_or(EngineError::Overflow("volume"))?;
        }

        let net_pnl = realized_pnl
            .checked_sub(fees_paid)
            .ok_or(EngineError::Overflow("net pnl"))?;
        let effective_capital = self.policy.effective_capital(starting_capital);

        Ok(PnlResult {
            realized_pnl,
            fees_paid,
            net_pnl,
            trade_count: trades.len(),
            volume,
            effective_capital,
            return_pct: return_pct(net_pnl, effective_capital)?,
        })
    }
}

impl PnlResult {
    /// Add another result's sums and trade count into this one.
    ///
    /// Capital and return are left untouched; the caller recomputes them.
    pub fn accumulate(&mut self, other: &PnlResult) -> Result<(), EngineError> {
        self.realized_pnl = self
            .realized_pnl
            .checked_add(other.realized_pnl)
            .ok_or(EngineError::Overflow("realized pnl"))?;
        self.fees_paid = self
            .fees_paid
            .checked_add(other.fees_paid)
            .ok_or(EngineError::Overflow("fees paid"))?;
        self.net_pnl = self
            .net_pnl
            .checked_add(other.net_pnl)
            .ok_or(EngineError::Overflow("net pnl"))?;
        self.volume = self
            .volume
            .checked_add(other.volume)
            .ok_or(EngineError::Overflow("volume"))?;
        self.trade_count += other.trade_count;
        Ok(())
    }
}

/// `net_pnl / capital * 100`, or zero when capital is not positive.
pub fn return_pct(net_pnl: Decimal, capital: Decimal) -> Result<Decimal, EngineError> {
    if !capital.is_positive() {
        return Ok(Decimal::zero());
    }
    net_pnl
        .checked_div(capital)
        .and_then(|ratio| ratio.checked_mul(Decimal::hundred()))
        .ok_or(EngineError::Overflow("return pct"))
}

/// One-shot aggregation with the default capital floor.
pub fn aggregate(
    trades: &[Trade],
    starting_capital: Decimal,
    capital_ceiling: Decimal,
) -> Result<PnlResult, EngineError> {
    PnlAggregator::new(CapitalPolicy::new(capital_ceiling)).aggregate(trades, starting_capital)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coin, Side, TimeMs};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn trade(pnl: &str, fee: &str) -> Trade {
        Trade::new(TimeMs::new(1000), Coin::from("BTC"), Side::Long, d("2"), d("100"))
            .with_fee(d(fee))
            .with_realized_pnl(d(pnl))
    }

    #[test]
    fn test_sums_pnl_fees_and_volume() {
        let trades = [trade("50", "1"), trade("-20", "0.5")];
        let result = aggregate(&trades, d("1000"), d("1000")).unwrap();
        assert_eq!(result.realized_pnl, d("30"));
        assert_eq!(result.fees_paid, d("1.5"));
        assert_eq!(result.net_pnl, d("28.5"));
        assert_eq!(result.trade_count, 2);
        assert_eq!(result.volume, d("400"));
        assert_eq!(result.return_pct, d("2.85"));
    }

    #[test]
    fn test_capital_is_capped_at_ceiling() {
        let result = aggregate(&[trade("100", "0")], d("50000"), d("1000")).unwrap();
        assert_eq!(result.effective_capital, d("1000"));
        assert_eq!(result.return_pct, d("10"));
    }

    #[test]
    fn test_capital_is_floored_at_one() {
        let result = aggregate(&[trade("5", "0")], d("0"), d("1000")).unwrap();
        assert_eq!(result.effective_capital, d("1"));
        assert_eq!(result.return_pct, d("500"));

        let negative = aggregate(&[trade("5", "0")], d("-300"), d("1000")).unwrap();
        assert_eq!(negative.effective_capital, d("1"));
    }

    #[test]
    fn test_non_positive_ceiling_yields_zero_return() {
        let result = aggregate(&[trade("5", "0")], d("100"), d("0")).unwrap();
        assert!(result.return_pct.is_zero());
    }

    #[test]
    fn test_empty_trade_set_is_all_zero() {
        let result = aggregate(&[], d("1000"), d("1000")).unwrap();
        assert_eq!(result.trade_count, 0);
        assert!(result.realized_pnl.is_zero());
        assert!(result.return_pct.is_zero());
    }

    #[test]
    fn test_oversized_notional_is_an_error() {
        let oversized = Trade::new(
            TimeMs::new(1000),
            Coin::from("BTC"),
            Side::Long,
            d("100000000000000"),
            d("1000000000000000"),
        );
        assert_eq!(
            aggregate(&[oversized], d("1000"), d("1000")),
            Err(EngineError::Overflow("volume"))
        );
    }

    #[test]
    fn test_accumulate_sums_results() {
        let mut total = PnlResult::default();
        total
            .accumulate(&aggregate(&[trade("50", "1")], d("1000"), d("1000")).unwrap())
            .unwrap();
        total
            .accumulate(&aggregate(&[trade("-20", "0.5")], d("1000"), d("1000")).unwrap())
            .unwrap();
        assert_eq!(total.net_pnl, d("28.5"));
        assert_eq!(total.volume, d("400"));
        assert_eq!(total.trade_count, 2);
    }

    #[test]
    fn test_policy_keeps_capital_between_bounds() {
        let policy = CapitalPolicy::new(d("1000"));
        assert_eq!(policy.effective_capital(d("400")), d("400"));
        assert_eq!(policy.effective_capital(d("0.5")), d("1"));
        assert_eq!(policy.effective_capital(d("1000.01")), d("1000"));
    }
}
