//! Deposit ledger event and per-user transfer summary.

use crate::domain::{Address, Decimal, TimeMs};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A deposit/withdrawal ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    /// Stable unique identifier for this event.
    pub event_key: String,
    /// User/wallet address.
    pub user: Address,
    /// Time of the event in milliseconds since Unix epoch.
    pub time_ms: TimeMs,
    /// Signed amount (positive deposit, negative withdrawal).
    pub amount: Decimal,
    /// Asset moved, e.g. "USDC".
    pub asset: String,
    /// Transaction reference when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
}

impl Deposit {
    /// Create a new Deposit and compute its `event_key`.
    pub fn new(
        user: Address,
        time_ms: TimeMs,
        amount: Decimal,
        asset: String,
        tx_ref: Option<String>,
    ) -> Self {
        let tx_ref = normalize_tx_ref(tx_ref);
        let event_key =
            Self::compute_event_key(&user, time_ms, &amount, &asset, tx_ref.as_deref());
        Self {
            event_key,
            user,
            time_ms,
            amount,
            asset,
            tx_ref,
        }
    }

    pub fn is_withdrawal(&self) -> bool {
        self.amount.is_negative()
    }

    /// Compute a stable unique key for this event.
    ///
    /// Priority: `tx_ref` (if present) > hash of deterministic fields.
    ///
    /// The fallback truncates a SHA-256 digest to 128 bits, which leaves
    /// roughly 2^64 collision resistance for per-user ledgers.
    pub fn compute_event_key(
        user: &Address,
        time_ms: TimeMs,
        amount: &Decimal,
        asset: &str,
        tx_ref: Option<&str>,
    ) -> String {
        if let Some(tx) = tx_ref.filter(|s| !s.trim().is_empty()) {
            return tx.trim().to_lowercase();
        }

        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, user.as_str());
        hasher.update(time_ms.as_i64().to_le_bytes());
        hash_var(&mut hasher, &amount.to_canonical_string());
        hash_var(&mut hasher, asset);

        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }
}

fn normalize_tx_ref(tx_ref: Option<String>) -> Option<String> {
    tx_ref
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

/// Aggregate view over a user's transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositSummary {
    pub total_deposits: Decimal,
    /// Absolute value of all withdrawals.
    pub total_withdrawals: Decimal,
    pub net_transfers: Decimal,
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub deposits: Vec<Deposit>,
}

impl DepositSummary {
    /// Summarize events; the same `event_key` is only counted once.
    pub fn from_deposits(mut deposits: Vec<Deposit>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        deposits.retain(|d| seen.insert(d.event_key.clone()));
        deposits.sort_by(|a, b| {
            a.time_ms
                .cmp(&b.time_ms)
                .then_with(|| a.event_key.cmp(&b.event_key))
        });

        let mut total_deposits = Decimal::zero();
        let mut total_withdrawals = Decimal::zero();
        let mut deposit_count = 0;
        let mut withdrawal_count = 0;

        for deposit in &deposits {
            if deposit.is_withdrawal() {
                total_withdrawals = total_withdrawals
                    .checked_add(deposit.amount.abs())
                    .ok_or(EngineError::Overflow("total withdrawals"))?;
                withdrawal_count += 1;
            } else if deposit.amount.is_positive() {
                total_deposits = total_deposits
                    .checked_add(deposit.amount)
                    .ok_or(EngineError::Overflow("total deposits"))?;
                deposit_count += 1;
            }
        }

        let net_transfers = total_deposits
            .checked_sub(total_withdrawals)
            .ok_or(EngineError::Overflow("net transfers"))?;

        Ok(Self {
            total_deposits,
            total_withdrawals,
            net_transfers,
            deposit_count,
            withdrawal_count,
            deposits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn deposit(time_ms: i64, amount: &str, tx: Option<&str>) -> Deposit {
        Deposit::new(
            Address::new("0xabc".to_string()),
            TimeMs::new(time_ms),
            Decimal::from_str(amount).unwrap(),
            "USDC".to_string(),
            tx.map(str::to_string),
        )
    }

    #[test]
    fn event_key_prefers_tx_ref() {
        let d = deposit(1000, "1", Some(" 0xDEADBEEF "));
        assert_eq!(d.event_key, "0xdeadbeef");
        assert_eq!(d.tx_ref.as_deref(), Some("0xdeadbeef"));
    }

    #[test]
    fn event_key_falls_back_to_hash() {
        let d1 = deposit(1000, "1.2300", None);
        let d2 = deposit(1000, "1.23", None);
        assert_eq!(d1.event_key, d2.event_key);
        assert!(d1.event_key.starts_with("hash:"));
    }

    #[test]
    fn summary_splits_deposits_and_withdrawals() {
        let summary = DepositSummary::from_deposits(vec![
            deposit(3000, "-250", Some("0x3")),
            deposit(1000, "1000", Some("0x1")),
            deposit(2000, "500", Some("0x2")),
        ])
        .unwrap();

        assert_eq!(summary.total_deposits, Decimal::from(1500));
        assert_eq!(summary.total_withdrawals, Decimal::from(250));
        assert_eq!(summary.net_transfers, Decimal::from(1250));
        assert_eq!(summary.deposit_count, 2);
        assert_eq!(summary.withdrawal_count, 1);
        assert_eq!(summary.deposits[0].time_ms, TimeMs::new(1000));
    }

    #[test]
    fn summary_counts_duplicate_events_once() {
        let summary = DepositSummary::from_deposits(vec![
            deposit(1000, "100", Some("0x1")),
            deposit(1000, "100", Some("0X1")),
        ])
        .unwrap();
        assert_eq!(summary.deposit_count, 1);
        assert_eq!(summary.total_deposits, Decimal::from(100));
    }

    #[test]
    fn summary_of_nothing_is_zero() {
        let summary = DepositSummary::from_deposits(Vec::new()).unwrap();
        assert!(summary.net_transfers.is_zero());
        assert!(summary.deposits.is_empty());
    }

    #[test]
    fn summary_overflow_is_an_error() {
        let huge = "70000000000000000000000000000";
        let result = DepositSummary::from_deposits(vec![
            deposit(1000, huge, Some("0x1")),
            deposit(2000, huge, Some("0x2")),
        ]);
        assert_eq!(result, Err(EngineError::Overflow("total deposits")));
    }
}
