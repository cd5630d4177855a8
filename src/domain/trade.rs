//! Trade type representing a single executed fill.

use crate::domain::{Coin, Decimal, Side, TimeMs};
use serde::{Deserialize, Serialize};

/// A single executed fill for one (user, coin) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Time of the fill in milliseconds since Unix epoch.
    pub time_ms: TimeMs,
    /// Coin/asset being traded.
    pub coin: Coin,
    /// Direction of the fill.
    pub side: Side,
    /// Unsigned size, always positive.
    pub size: Decimal,
    /// Execution price, always positive.
    pub price: Decimal,
    /// Fee paid for this fill.
    pub fee: Decimal,
    /// PnL realized by this fill as reported by the venue.
    pub realized_pnl: Decimal,
    /// Identifier of the builder/integrator that routed the fill, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution_tag: Option<String>,
    /// Venue transaction hash, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Trade {
    /// Create a new Trade with zero fee, zero realized PnL and no tag.
    pub fn new(time_ms: TimeMs, coin: Coin, side: Side, size: Decimal, price: Decimal) -> Self {
        Trade {
            time_ms,
            coin,
            side,
            size,
            price,
            fee: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            attribution_tag: None,
            hash: None,
        }
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_realized_pnl(mut self, realized_pnl: Decimal) -> Self {
        self.realized_pnl = realized_pnl;
        self
    }

    /// Set the attribution tag for this trade.
    pub fn with_attribution(mut self, tag: impl Into<String>) -> Self {
        self.attribution_tag = Some(tag.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// `+size` for Long, `-size` for Short.
    pub fn signed_size(&self) -> Decimal {
        match self.side {
            Side::Long => self.size,
            Side::Short => -self.size,
        }
    }

    /// Traded notional (`price * size`), or None if it does not fit a decimal.
    pub fn notional(&self) -> Option<Decimal> {
        self.price.checked_mul(self.size)
    }

    /// Stable identifier for this trade.
    ///
    /// Priority: venue `hash` (if present) > hash of deterministic fields.
    pub fn trade_key(&self) -> String {
        if let Some(hash) = self.hash.as_deref().filter(|h| !h.trim().is_empty()) {
            return format!("hash:{}", hash.trim().to_lowercase());
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.coin.as_str());
        hasher.update(self.time_ms.as_i64().to_le_bytes());
        hasher.update(if self.side == Side::Long { b"L" } else { b"S" });
        hasher.update(self.price.to_canonical_string());
        hasher.update(self.size.to_canonical_string());
        hasher.update(self.fee.to_canonical_string());
        hasher.update(self.realized_pnl.to_canonical_string());
        if let Some(tag) = &self.attribution_tag {
            hasher.update(tag.as_bytes());
        }
        let digest = hasher.finalize();
        format!("sha:{}", hex::encode(&digest[..16]))
    }
}
