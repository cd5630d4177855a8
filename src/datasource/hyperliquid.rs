//! Hyperliquid API client implementation.

use super::{DataSource, DataSourceError};
use crate::domain::{Address, Coin, Decimal, Deposit, Side, TimeMs, TimeWindow, Trade};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";

/// Most fills `userFillsByTime` returns in one response.
const FILLS_PAGE_LIMIT: usize = 2000;

/// Hyperliquid data source using the public Info API.
#[derive(Debug, Clone)]
pub struct HyperliquidDataSource {
    client: Client,
    base_url: String,
    known_users: Vec<Address>,
}

impl HyperliquidDataSource {
    /// Create a new Hyperliquid data source.
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            known_users: Vec::new(),
        }
    }

    /// Users reported as active; the Info API has no endpoint listing traders.
    pub fn with_known_users(mut self, users: Vec<Address>) -> Self {
        self.known_users = users;
        self
    }

    async fn post_info(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        let url = format!("{}/info", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl DataSource for HyperliquidDataSource {
    async fn fetch_trades(
        &self,
        user: &Address,
        coin: Option<&Coin>,
        window: TimeWindow,
    ) -> Result<Vec<Trade>, DataSourceError> {
        debug!(
            user = %user,
            coin = coin.map(Coin::as_str).unwrap_or("*"),
            from_ms = ?window.from_ms,
            to_ms = ?window.to_ms,
            "Fetching trades"
        );

        let mut trades = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = window.start();

        loop {
            let mut payload = serde_json::json!({
                "type": "userFillsByTime",
                "user": user.as_str(),
                "startTime": cursor.as_i64(),
                "aggregateByTime": false
            });
            if let Some(to) = window.to_ms {
                payload["endTime"] = serde_json::json!(to.as_i64());
            }

            let response = self.post_info(payload).await?;
            let fills_json = response.as_array().ok_or_else(|| {
                DataSourceError::ParseError("Expected array response".to_string())
            })?;

            let page = merge_fill_page(fills_json, user, coin, window, &mut seen, &mut trades);
            debug!(
                user = %user,
                rows = fills_json.len(),
                added = page.added,
                "Fetched fill page"
            );

            if fills_json.len() < FILLS_PAGE_LIMIT || page.added == 0 {
                break;
            }
            // Same-millisecond fills can straddle pages; the cursor stays inclusive.
            match page.latest_ms {
                Some(latest) if latest > cursor => cursor = latest,
                _ => break,
            }
        }

        // Pages may overlap and arrive in any order.
        trades.sort_by_key(|t| t.time_ms);
        Ok(trades)
    }

    async fn fetch_active_users(
        &self,
        coin: &Coin,
        since: TimeMs,
    ) -> Result<Vec<Address>, DataSourceError> {
        debug!(coin = %coin, since = %since, "Listing known users");
        Ok(self.known_users.clone())
    }

    async fn fetch_starting_equity(
        &self,
        user: &Address,
        at_ms: TimeMs,
    ) -> Result<Option<Decimal>, DataSourceError> {
        // Only current account value is available; historical equity needs an archive.
        debug!(user = %user, at_ms = %at_ms, "Fetching equity");

        let payload = serde_json::json!({
            "type": "clearinghouseState",
            "user": user.as_str()
        });

        let response = self.post_info(payload).await?;

        match response
            .get("marginSummary")
            .and_then(|m| m.get("accountValue"))
            .and_then(|v| v.as_str())
        {
            Some(value) => Decimal::from_str_canonical(value)
                .map(Some)
                .map_err(|e| DataSourceError::ParseError(format!("Invalid accountValue: {}", e))),
            None => Ok(None),
        }
    }

    async fn fetch_deposits(
        &self,
        user: &Address,
        window: TimeWindow,
    ) -> Result<Vec<Deposit>, DataSourceError> {
        debug!(
            user = %user,
            from_ms = ?window.from_ms,
            to_ms = ?window.to_ms,
            "Fetching deposits"
        );

        let mut payload = serde_json::json!({
            "type": "userNonFundingLedgerUpdates",
            "user": user.as_str(),
            "startTime": window.start().as_i64()
        });
        if let Some(to) = window.to_ms {
            payload["endTime"] = serde_json::json!(to.as_i64());
        }

        let response = self.post_info(payload).await?;

        let updates_json = response
            .as_array()
            .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))?;

        let mut deposits = Vec::new();
        for update_json in updates_json {
            match parse_deposit(update_json, user) {
                Ok(Some(deposit)) if window.contains(deposit.time_ms) => deposits.push(deposit),
                Ok(_) => {}
                Err(e) => {
                    warn!(user = %user, error = %e, "Skipping malformed ledger update");
                }
            }
        }

        deposits.sort_by_key(|d| d.time_ms);
        Ok(deposits)
    }
}

fn decimal_field(json: &serde_json::Value, field: &str) -> Result<Decimal, DataSourceError> {
    let raw = json
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))?;
    Decimal::from_str_canonical(raw)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", field, e)))
}

/// Outcome of merging one `userFillsByTime` page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FillPage {
    /// Fills not seen on an earlier page.
    added: usize,
    latest_ms: Option<TimeMs>,
}

/// Parse a page of fills into `trades`, skipping rows already in `seen`.
///
/// Every well-formed fill advances the cursor; only those matching `coin`
/// and `window` are kept.
fn merge_fill_page(
    fills_json: &[serde_json::Value],
    user: &Address,
    coin: Option<&Coin>,
    window: TimeWindow,
    seen: &mut HashSet<String>,
    trades: &mut Vec<Trade>,
) -> FillPage {
    let mut page = FillPage {
        added: 0,
        latest_ms: None,
    };

    for fill_json in fills_json {
        let trade = match parse_trade(fill_json) {
            Ok(trade) => trade,
            Err(e) => {
                warn!(user = %user, error = %e, "Skipping malformed fill");
                continue;
            }
        };

        page.latest_ms = page.latest_ms.max(Some(trade.time_ms));
        if !seen.insert(fill_identity(fill_json)) {
            continue;
        }
        page.added += 1;

        if coin.map_or(true, |c| &trade.coin == c) && window.contains(trade.time_ms) {
            trades.push(trade);
        }
    }

    page
}

/// Fills of one order share a hash, so pages are deduplicated on `tid`.
fn fill_identity(fill_json: &serde_json::Value) -> String {
    match fill_json.get("tid") {
        Some(tid) => format!("tid:{}", tid),
        None => fill_json.to_string(),
    }
}

fn parse_trade(fill_json: &serde_json::Value) -> Result<Trade, DataSourceError> {
    let time_ms = fill_json
        .get("time")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DataSourceError::ParseError("Missing time field".to_string()))?;

    let coin = fill_json
        .get("coin")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError("Missing coin field".to_string()))?;

    let side_str = fill_json
        .get("side")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError("Missing side field".to_string()))?;

    let side = match side_str {
        "B" => Side::Long,
        "A" => Side::Short,
        _ => {
            return Err(DataSourceError::ParseError(format!(
                "Invalid side: {}",
                side_str
            )))
        }
    };

    let px = decimal_field(fill_json, "px")?;
    let sz = decimal_field(fill_json, "sz")?;
    let fee = decimal_field(fill_json, "fee")?;
    let closed_pnl = decimal_field(fill_json, "closedPnl")?;

    if !px.is_positive() || !sz.is_positive() {
        return Err(DataSourceError::ParseError(format!(
            "Non-positive px/sz: {}/{}",
            px, sz
        )));
    }

    let builder = match fill_json.get("builder") {
        Some(serde_json::Value::Object(obj)) => obj.get("b").and_then(|v| v.as_str()),
        Some(serde_json::Value::String(s)) => Some(s.as_str()),
        _ => None,
    };

    let mut trade = Trade::new(TimeMs::new(time_ms), Coin::from(coin), side, sz, px)
        .with_fee(fee)
        .with_realized_pnl(closed_pnl);
    if let Some(builder) = builder.filter(|b| !b.trim().is_empty()) {
        trade = trade.with_attribution(builder);
    }
    if let Some(hash) = fill_json.get("hash").and_then(|v| v.as_str()) {
        trade = trade.with_hash(hash);
    }
    Ok(trade)
}

/// Parse one ledger update; non-transfer updates (e.g. spot transfers) yield None.
fn parse_deposit(
    update_json: &serde_json::Value,
    user: &Address,
) -> Result<Option<Deposit>, DataSourceError> {
    let time_ms = update_json
        .get("time")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DataSourceError::ParseError("Missing time field".to_string()))?;

    let delta = update_json
        .get("delta")
        .ok_or_else(|| DataSourceError::ParseError("Missing delta field".to_string()))?;

    let kind = delta.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let amount = match kind {
        "deposit" => decimal_field(delta, "usdc")?,
        "withdraw" => -decimal_field(delta, "usdc")?.abs(),
        _ => return Ok(None),
    };

    let tx_ref = update_json
        .get("hash")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(Some(Deposit::new(
        user.clone(),
        TimeMs::new(time_ms),
        amount,
        "USDC".to_string(),
        tx_ref,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(time: i64, coin: &str, hash: &str) -> serde_json::Value {
        serde_json::json!({
            "time": time, "coin": coin, "side": "B",
            "px": "100", "sz": "1", "fee": "0", "closedPnl": "0", "hash": hash
        })
    }

    #[test]
    fn test_merge_fill_page_skips_fills_from_earlier_pages() {
        let user = Address::from("0xuser");
        let btc = Coin::from("BTC");
        let mut seen = HashSet::new();
        let mut trades = Vec::new();

        let first = [
            fill(3000, "BTC", "0x3"),
            fill(1000, "BTC", "0x1"),
            fill(2000, "ETH", "0x2"),
        ];
        let all = TimeWindow::all();
        let page = merge_fill_page(&first, &user, Some(&btc), all, &mut seen, &mut trades);
        assert_eq!(page.added, 3);
        assert_eq!(page.latest_ms, Some(TimeMs::new(3000)));
        assert_eq!(trades.len(), 2);

        let second = [
            fill(3000, "BTC", "0x3"),
            fill(3000, "BTC", "0x4"),
            serde_json::json!({}),
        ];
        let page = merge_fill_page(&second, &user, Some(&btc), all, &mut seen, &mut trades);
        assert_eq!(page.added, 1);
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[2].hash.as_deref(), Some("0x4"));

        let page = merge_fill_page(&second, &user, Some(&btc), all, &mut seen, &mut trades);
        assert_eq!(page.added, 0);
        assert_eq!(trades.len(), 3);
    }

    #[test]
    fn test_fills_sharing_a_hash_are_distinct_by_tid() {
        let mut a = fill(1000, "BTC", "0xsame");
        a["tid"] = serde_json::json!(1);
        let mut b = fill(1000, "BTC", "0xsame");
        b["tid"] = serde_json::json!(2);

        let mut seen = HashSet::new();
        let mut trades = Vec::new();
        let page = merge_fill_page(
            &[a, b],
            &Address::from("0xuser"),
            None,
            TimeWindow::all(),
            &mut seen,
            &mut trades,
        );
        assert_eq!(page.added, 2);
        assert_eq!(trades.len(), 2);
    }

    #[test]
    fn test_merge_fill_page_applies_window() {
        let user = Address::from("0xuser");
        let mut seen = HashSet::new();
        let mut trades = Vec::new();
        let window = TimeWindow::new(Some(TimeMs::new(1500)), Some(TimeMs::new(2500)));

        let page = merge_fill_page(
            &[fill(1000, "BTC", "0x1"), fill(2000, "BTC", "0x2"), fill(3000, "BTC", "0x3")],
            &user,
            None,
            window,
            &mut seen,
            &mut trades,
        );

        assert_eq!(page.added, 3);
        assert_eq!(page.latest_ms, Some(TimeMs::new(3000)));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].time_ms, TimeMs::new(2000));
    }

    #[test]
    fn test_parse_trade_valid() {
        let fill_json = serde_json::json!({
            "time": 1000,
            "coin": "BTC",
            "side": "B",
            "px": "50000",
            "sz": "1",
            "fee": "10",
            "closedPnl": "0",
            "hash": "0xabc",
            "builder": { "b": "0xBuilder", "f": 10 }
        });

        let trade = parse_trade(&fill_json).unwrap();
        assert_eq!(trade.coin, Coin::from("BTC"));
        assert_eq!(trade.time_ms, TimeMs::new(1000));
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.fee, Decimal::from(10));
        assert_eq!(trade.attribution_tag.as_deref(), Some("0xBuilder"));
        assert_eq!(trade.hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_parse_trade_ask_is_short_and_legacy_builder_string() {
        let fill_json = serde_json::json!({
            "time": 1000,
            "coin": "ETH",
            "side": "A",
            "px": "3000",
            "sz": "2",
            "fee": "0.5",
            "closedPnl": "12.5",
            "builder": "0xlegacy"
        });

        let trade = parse_trade(&fill_json).unwrap();
        assert_eq!(trade.side, Side::Short);
        assert_eq!(trade.realized_pnl, Decimal::from_str_canonical("12.5").unwrap());
        assert_eq!(trade.attribution_tag.as_deref(), Some("0xlegacy"));
    }

    #[test]
    fn test_parse_trade_without_builder_has_no_tag() {
        let fill_json = serde_json::json!({
            "time": 1, "coin": "BTC", "side": "B",
            "px": "1", "sz": "1", "fee": "0", "closedPnl": "0"
        });
        assert!(parse_trade(&fill_json).unwrap().attribution_tag.is_none());
    }

    #[test]
    fn test_parse_trade_rejects_malformed() {
        let missing_px = serde_json::json!({
            "time": 1, "coin": "BTC", "side": "B",
            "sz": "1", "fee": "0", "closedPnl": "0"
        });
        assert!(matches!(
            parse_trade(&missing_px),
            Err(DataSourceError::ParseError(_))
        ));

        let bad_side = serde_json::json!({
            "time": 1, "coin": "BTC", "side": "X",
            "px": "1", "sz": "1", "fee": "0", "closedPnl": "0"
        });
        assert!(parse_trade(&bad_side).is_err());

        let zero_size = serde_json::json!({
            "time": 1, "coin": "BTC", "side": "B",
            "px": "1", "sz": "0", "fee": "0", "closedPnl": "0"
        });
        assert!(parse_trade(&zero_size).is_err());
    }

    #[test]
    fn test_parse_deposit_and_withdrawal() {
        let user = Address::from("0x123");
        let deposit = parse_deposit(
            &serde_json::json!({
                "time": 1000,
                "hash": "0xDEAD",
                "delta": { "type": "deposit", "usdc": "1000.5" }
            }),
            &user,
        )
        .unwrap()
        .unwrap();
        assert_eq!(deposit.amount, Decimal::from_str_canonical("1000.5").unwrap());
        assert_eq!(deposit.event_key, "0xdead");

        let withdrawal = parse_deposit(
            &serde_json::json!({
                "time": 2000,
                "delta": { "type": "withdraw", "usdc": "200", "fee": "1" }
            }),
            &user,
        )
        .unwrap()
        .unwrap();
        assert_eq!(withdrawal.amount, Decimal::from(-200));
    }

    #[test]
    fn test_parse_deposit_ignores_other_updates() {
        let other = parse_deposit(
            &serde_json::json!({
                "time": 1000,
                "delta": { "type": "spotTransfer", "token": "PURR" }
            }),
            &Address::from("0x123"),
        )
        .unwrap();
        assert!(other.is_none());
    }
}
