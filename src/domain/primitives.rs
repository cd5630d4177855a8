//! Domain primitives: TimeMs, Address, Coin, Side, TimeWindow.

use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Get the underlying milliseconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet address (hex string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Create an Address from a string.
    pub fn new(addr: String) -> Self {
        Address(addr)
    }

    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

/// Coin/asset symbol (e.g., "BTC", "ETH").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coin(pub String);

impl Coin {
    /// Create a Coin from a string.
    pub fn new(coin: String) -> Self {
        Coin(coin)
    }

    /// Get the coin as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Coin {
    fn from(value: &str) -> Self {
        Coin(value.to_string())
    }
}

/// Trade direction: Long adds to the position, Short subtracts from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}

/// Optional inclusive time range used when fetching history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub from_ms: Option<TimeMs>,
    pub to_ms: Option<TimeMs>,
}

impl TimeWindow {
    /// The unbounded window (all history).
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(from_ms: Option<TimeMs>, to_ms: Option<TimeMs>) -> Self {
        Self { from_ms, to_ms }
    }

    /// True when both bounds are set and `from_ms > to_ms`.
    pub fn is_inverted(&self) -> bool {
        matches!((self.from_ms, self.to_ms), (Some(from), Some(to)) if from > to)
    }

    pub fn contains(&self, time_ms: TimeMs) -> bool {
        self.from_ms.map_or(true, |from| time_ms >= from)
            && self.to_ms.map_or(true, |to| time_ms <= to)
    }

    /// Start of the window, or the epoch if unbounded.
    pub fn start(&self) -> TimeMs {
        self.from_ms.unwrap_or(TimeMs::new(0))
    }
}
