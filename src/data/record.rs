use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const TICKER: &str = "TICKER";
pub const DATE: &str = "DATE";
pub const PRICE_OPEN: &str = "Price_Open";
pub const PRICE_CLOSE: &str = "Price_Close";
pub const PRICE_HIGH: &str = "Price_High";
pub const PRICE_LOW: &str = "Price_Low";
pub const VOLUME: &str = "Volume";

/// Columns every raw input table must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    TICKER,
    DATE,
    PRICE_OPEN,
    PRICE_CLOSE,
    PRICE_HIGH,
    PRICE_LOW,
    VOLUME,
];

/// One row as handed over by a data source, before any validation.
///
/// Every field is kept as optional text: a missing cell and a malformed
/// cell are distinguished only by the cleaning stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "TICKER")]
    pub ticker: Option<String>,
    #[serde(rename = "DATE")]
    pub date: Option<String>,
    #[serde(rename = "Price_Open")]
    pub open: Option<String>,
    #[serde(rename = "Price_Close")]
    pub close: Option<String>,
    #[serde(rename = "Price_High")]
    pub high: Option<String>,
    #[serde(rename = "Price_Low")]
    pub low: Option<String>,
    #[serde(rename = "Volume")]
    pub volume: Option<String>,
}

/// A validated daily OHLCV observation for one ticker.
///
/// # Invariants
/// * `ticker` is non-empty
/// * `open`, `close`, `high`, `low` and `volume` are all strictly positive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(rename = "TICKER")]
    pub ticker: String,
    #[serde(rename = "DATE")]
    pub date: NaiveDate,
    #[serde(rename = "Price_Open")]
    pub open: f64,
    #[serde(rename = "Price_Close")]
    pub close: f64,
    #[serde(rename = "Price_High")]
    pub high: f64,
    #[serde(rename = "Price_Low")]
    pub low: f64,
    #[serde(rename = "Volume")]
    pub volume: f64,
}

impl PriceRecord {
    /// Returns `true` when the record satisfies the positivity and
    /// non-empty ticker rules.
    pub fn is_valid(&self) -> bool {
        !self.ticker.trim().is_empty()
            && [self.open, self.close, self.high, self.low, self.volume]
                .iter()
                .all(|&v| v > 0.0)
    }
}

impl From<&PriceRecord> for RawRow {
    fn from(record: &PriceRecord) -> Self {
        Self {
            ticker: Some(record.ticker.clone()),
            date: Some(record.date.format("%Y-%m-%d").to_string()),
            open: Some(record.open.to_string()),
            close: Some(record.close.to_string()),
            high: Some(record.high.to_string()),
            low: Some(record.low.to_string()),
            volume: Some(record.volume.to_string()),
        }
    }
}

/// A price record extended with its rolling features.
///
/// Only rows whose every feature is defined become a `FeaturedRecord`;
/// rows still warming up stay as `FeatureRow`s with missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedRecord {
    pub record: PriceRecord,
    pub return_1d: f64,
    pub ma_5d: f64,
    pub ma_10d: f64,
    pub volatility_10d: f64,
}
