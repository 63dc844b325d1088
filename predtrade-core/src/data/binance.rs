//! Binance public klines.
//!
//! Fetches OHLCV bars from the unauthenticated REST klines endpoint, spot or
//! USDⓈ-M futures. Handles pagination, rate limiting and retries with
//! exponential backoff.
//!
//! Pagination walks forward from `start`: each page starts one millisecond
//! after the previous page's last open time. It stops on an empty page, a
//! short page, or a page that does not advance (duplicate boundary).
//!
//! The kline whose close time lies in the future is still forming and is
//! always dropped; the engine only ever sees complete bars.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::interval::Interval;
use super::provider::{BarSource, DataError};
use crate::domain::Bar;

const PAGE_LIMIT: usize = 1000;

/// Which Binance market to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinanceMarket {
    #[default]
    Spot,
    /// USDⓈ-margined perpetual futures.
    UsdM,
}

impl BinanceMarket {
    pub fn klines_url(self) -> &'static str {
        match self {
            BinanceMarket::Spot => "https://api.binance.com/api/v3/klines",
            BinanceMarket::UsdM => "https://fapi.binance.com/fapi/v1/klines",
        }
    }
}

/// Normalize a unified symbol to the exchange's request form.
///
/// `BTC/USDT:USDT` (a perpetual with settlement suffix) and `btc/usdt` both
/// become `BTCUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    let base = symbol.split(':').next().unwrap_or(symbol);
    base.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Binance klines client.
pub struct BinanceKlines {
    client: reqwest::blocking::Client,
    market: BinanceMarket,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl BinanceKlines {
    pub fn new(market: BinanceMarket) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            market,
            base_url: market.klines_url().to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Point the client at another host (a mirror or a local stub).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn market(&self) -> BinanceMarket {
        self.market
    }

    /// One page request with retry on rate limits, 5xx and transport errors.
    fn fetch_page(
        &self,
        symbol: &str,
        interval: Interval,
        since_ms: i64,
        end_ms: Option<i64>,
    ) -> Result<Vec<Vec<Value>>, DataError> {
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.as_str().to_string()),
            ("startTime", since_ms.to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(end_ms) = end_ms {
            query.push(("endTime", (end_ms - 1).to_string()));
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying klines request");
                std::thread::sleep(delay);
            }

            let resp = match self.client.get(&self.base_url).query(&query).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::Network(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::Network(e.to_string())),
            };

            let status = resp.status();
            // 418 is Binance's escalation of repeated 429s.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(symbol, %status, retry_after, "rate limited by exchange");
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status.is_server_error() {
                last_error = Some(DataError::Network(format!("HTTP {status} for {symbol}")));
                continue;
            }
            if status == reqwest::StatusCode::BAD_REQUEST {
                let body = resp.text().unwrap_or_default();
                // -1121: "Invalid symbol."
                if body.contains("-1121") {
                    return Err(DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    });
                }
                return Err(DataError::ResponseFormatChanged(format!(
                    "HTTP 400 for {symbol}: {body}"
                )));
            }
            if !status.is_success() {
                return Err(DataError::Network(format!("HTTP {status} for {symbol}")));
            }

            return resp.json::<Vec<Vec<Value>>>().map_err(|e| {
                DataError::ResponseFormatChanged(format!("failed to parse klines for {symbol}: {e}"))
            });
        }

        Err(last_error.unwrap_or_else(|| DataError::Network("max retries exceeded".into())))
    }
}

impl BarSource for BinanceKlines {
    fn name(&self) -> &str {
        match self.market {
            BinanceMarket::Spot => "binance_spot",
            BinanceMarket::UsdM => "binance_usdm",
        }
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        let symbol = normalize_symbol(symbol);
        let end_ms = end.map(|e| e.timestamp_millis());
        let now_ms = Utc::now().timestamp_millis();

        let mut bars: Vec<Bar> = Vec::new();
        let mut since = start.timestamp_millis();
        loop {
            let rows = self.fetch_page(&symbol, interval, since, end_ms)?;
            let page = parse_klines(&rows, now_ms)?;
            let fetched = rows.len();

            let last_open = match rows.last().map(|r| kline_open_time(r)).transpose()? {
                Some(t) => t,
                None => break,
            };
            let last_seen = bars.last().map(|b| b.timestamp);
            let fresh: Vec<Bar> = page
                .into_iter()
                .filter(|b| last_seen.map_or(true, |t| b.timestamp > t))
                .collect();
            let advanced = !fresh.is_empty();
            bars.extend(fresh);
            debug!(symbol = %symbol, fetched, total = bars.len(), "klines page");

            if fetched < PAGE_LIMIT || !advanced {
                break;
            }
            since = last_open + 1;
            if end_ms.map_or(false, |e| since >= e) {
                break;
            }
        }

        if bars.is_empty() {
            return Err(DataError::Empty { symbol, interval });
        }
        Ok(bars)
    }
}

fn kline_open_time(row: &[Value]) -> Result<i64, DataError> {
    row.first()
        .and_then(Value::as_i64)
        .ok_or_else(|| DataError::ResponseFormatChanged("kline without open time".into()))
}

fn kline_number(row: &[Value], index: usize, field: &str) -> Result<f64, DataError> {
    let value = row.get(index).ok_or_else(|| {
        DataError::ResponseFormatChanged(format!("kline missing {field}"))
    })?;
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| DataError::ResponseFormatChanged(format!("kline {field} '{s}': {e}"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("kline {field} {n}"))),
        other => Err(DataError::ResponseFormatChanged(format!(
            "kline {field} has type {other}"
        ))),
    }
}

/// Convert raw kline rows into bars, dropping the still-forming bar.
///
/// Row layout: `[open_time, open, high, low, close, volume, close_time, ...]`
/// with prices as decimal strings.
pub fn parse_klines(rows: &[Vec<Value>], now_ms: i64) -> Result<Vec<Bar>, DataError> {
    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let open_time = kline_open_time(row)?;
        let close_time = row
            .get(6)
            .and_then(Value::as_i64)
            .ok_or_else(|| DataError::ResponseFormatChanged("kline without close time".into()))?;
        if close_time >= now_ms {
            continue;
        }
        let timestamp = DateTime::from_timestamp_millis(open_time).ok_or_else(|| {
            DataError::ResponseFormatChanged(format!("invalid open time {open_time}"))
        })?;
        bars.push(Bar {
            timestamp,
            open: kline_number(row, 1, "open")?,
            high: kline_number(row, 2, "high")?,
            low: kline_number(row, 3, "low")?,
            close: kline_number(row, 4, "close")?,
            volume: kline_number(row, 5, "volume")?,
        });
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(open_time: i64, close: &str, close_time: i64) -> Vec<Value> {
        serde_json::from_value(json!([
            open_time, "100.0", "101.5", "99.0", close, "12.5", close_time,
            "1250.0", 42, "6.0", "600.0", "0"
        ]))
        .unwrap()
    }

    #[test]
    fn symbol_normalization() {
        assert_eq!(normalize_symbol("BTC/USDT:USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("eth/usdt"), "ETHUSDT");
        assert_eq!(normalize_symbol("SOLUSDT"), "SOLUSDT");
    }

    #[test]
    fn parses_string_prices() {
        let bars = parse_klines(&[row(1_704_067_200_000, "100.75", 1_704_070_799_999)], i64::MAX)
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 100.75);
        assert_eq!(bars[0].high, 101.5);
        assert_eq!(bars[0].volume, 12.5);
        assert_eq!(bars[0].timestamp.timestamp_millis(), 1_704_067_200_000);
    }

    #[test]
    fn drops_forming_bar() {
        let hour = 3_600_000;
        let rows = vec![
            row(0, "100", hour - 1),
            row(hour, "101", 2 * hour - 1),
            row(2 * hour, "102", 3 * hour - 1),
        ];
        let now = 2 * hour + 10;
        let bars = parse_klines(&rows, now).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 101.0);
    }

    #[test]
    fn malformed_row_is_format_error() {
        let rows = vec![vec![json!(0), json!("abc")]];
        assert!(matches!(
            parse_klines(&rows, i64::MAX),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn market_urls() {
        assert!(BinanceMarket::Spot.klines_url().contains("api.binance.com"));
        assert!(BinanceMarket::UsdM.klines_url().contains("fapi"));
    }
}
