use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick as returned by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Closing prices for one market, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub market: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub closes: Vec<f64>,
}

impl PriceSeries {
    /// Build a series from candles in any order.
    ///
    /// Candles are sorted by time and duplicate timestamps are dropped, which
    /// happens where paged requests overlap.
    pub fn from_candles(market: &str, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        let (timestamps, closes) = candles.into_iter().map(|c| (c.timestamp, c.close)).unzip();

        Self {
            market: market.to_string(),
            timestamps,
            closes,
        }
    }

    pub fn from_closes(market: &str, closes: Vec<f64>) -> Self {
        let start = Utc::now() - chrono::Duration::minutes(15 * closes.len() as i64);
        let timestamps = (0..closes.len())
            .map(|i| start + chrono::Duration::minutes(15 * i as i64))
            .collect();

        Self {
            market: market.to_string(),
            timestamps,
            closes,
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.closes.last().copied().filter(|p| p.is_finite())
    }

    /// Count of steps whose spacing exceeds 1.5x the expected interval
    pub fn gap_count(&self, expected_interval_secs: i64) -> usize {
        let max_gap_secs = expected_interval_secs + expected_interval_secs / 2;
        self.timestamps
            .windows(2)
            .filter(|w| (w[1] - w[0]).num_seconds() > max_gap_secs)
            .count()
    }
}

/// Candle interval, written the way the exchange spells it ("15m", "1H")
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Granularity {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "4H")]
    FourHours,
    #[serde(rename = "1D")]
    OneDay,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::FifteenMinutes => "15m",
            Granularity::ThirtyMinutes => "30m",
            Granularity::OneHour => "1H",
            Granularity::FourHours => "4H",
            Granularity::OneDay => "1D",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 5 * 60,
            Granularity::FifteenMinutes => 15 * 60,
            Granularity::ThirtyMinutes => 30 * 60,
            Granularity::OneHour => 60 * 60,
            Granularity::FourHours => 4 * 60 * 60,
            Granularity::OneDay => 24 * 60 * 60,
        }
    }

    /// Round `at` down to the start of its interval
    pub fn floor(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.seconds();
        let floored = at.timestamp().div_euclid(secs) * secs;
        DateTime::from_timestamp(floored, 0).unwrap_or(at)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side in the exchange's one-way position vocabulary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::OpenLong => "open_long",
            Side::CloseLong => "close_long",
            Side::OpenShort => "open_short",
            Side::CloseShort => "close_short",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    #[default]
    Normal,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Normal => "normal",
        }
    }
}

/// Kind of position held by an open record.
///
/// Band-reversion uses `OpenShort`/`CloseShort` (the latter is its long
/// leg); the momentum strategies use `Long`/`Short`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    OpenShort,
    CloseShort,
    Long,
    Short,
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionType::OpenShort => "open_short",
            PositionType::CloseShort => "close_short",
            PositionType::Long => "long",
            PositionType::Short => "short",
        };
        f.pad(s)
    }
}

/// Which entry branches a market may take
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    Long,
    Short,
    #[default]
    Both,
}

impl StrategyPreference {
    pub fn allows_long(&self) -> bool {
        matches!(self, StrategyPreference::Long | StrategyPreference::Both)
    }

    pub fn allows_short(&self) -> bool {
        matches!(self, StrategyPreference::Short | StrategyPreference::Both)
    }
}
