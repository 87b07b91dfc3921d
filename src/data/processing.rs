use super::record::{FeaturedRecord, PriceRecord};
use rayon::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

pub const SHORT_MA_WINDOW: usize = 5;
pub const LONG_MA_WINDOW: usize = 10;
pub const VOLATILITY_WINDOW: usize = 10;

/// Observations a ticker needs before its first fully featured row.
///
/// The first return is undefined, so the volatility window is only filled
/// one observation after the long moving average.
pub const MIN_HISTORY: usize = VOLATILITY_WINDOW + 1;

/// A fixed-capacity trailing window over a series of values.
///
/// Pushing into a full window evicts the oldest value. Statistics are only
/// reported once the window holds `capacity` values.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Creates an empty window.
    ///
    /// # Arguments
    /// * `capacity` - Number of trailing values the window holds
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a value, evicting the oldest one if the window is full.
    ///
    /// # Arguments
    /// * `value` - The newest observation
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Simple mean of the window, `None` until the window is full.
    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() || self.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.capacity as f64)
    }

    /// Sample standard deviation (divisor `n - 1`), `None` until the window
    /// is full or if it holds fewer than two values.
    pub fn sample_std(&self) -> Option<f64> {
        if !self.is_full() || self.capacity < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = self
            .values
            .iter()
            .map(|&v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / (self.capacity - 1) as f64;

        Some(variance.sqrt())
    }
}

/// Rolling features of one observation. `None` marks a value whose window
/// is not filled yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingFeatures {
    pub return_1d: Option<f64>,
    pub ma_5d: Option<f64>,
    pub ma_10d: Option<f64>,
    pub volatility_10d: Option<f64>,
}

/// A price record together with its possibly incomplete features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub record: PriceRecord,
    pub features: RollingFeatures,
}

impl FeatureRow {
    /// Converts into a `FeaturedRecord` if every feature is defined and
    /// finite.
    pub fn into_featured(self) -> Option<FeaturedRecord> {
        let RollingFeatures {
            return_1d,
            ma_5d,
            ma_10d,
            volatility_10d,
        } = self.features;
        let finite = |v: Option<f64>| v.filter(|v| v.is_finite());

        Some(FeaturedRecord {
            return_1d: finite(return_1d)?,
            ma_5d: finite(ma_5d)?,
            ma_10d: finite(ma_10d)?,
            volatility_10d: finite(volatility_10d)?,
            record: self.record,
        })
    }
}

/// Running feature state for a single ticker.
///
/// Records must be fed in date order. A processor is never shared between
/// tickers; each partition gets a fresh one.
pub struct TickerProcessor {
    previous_close: Option<f64>,
    short_closes: RollingWindow,
    long_closes: RollingWindow,
    returns: RollingWindow,
}

impl TickerProcessor {
    pub fn new() -> Self {
        Self {
            previous_close: None,
            short_closes: RollingWindow::new(SHORT_MA_WINDOW),
            long_closes: RollingWindow::new(LONG_MA_WINDOW),
            returns: RollingWindow::new(VOLATILITY_WINDOW),
        }
    }

    /// Advances the windows by one observation and returns its features.
    pub fn process_record(&mut self, record: PriceRecord) -> FeatureRow {
        let close = record.close;
        let return_1d = self.previous_close.map(|prev| close / prev - 1.0);
        self.previous_close = Some(close);

        self.short_closes.push(close);
        self.long_closes.push(close);
        if let Some(r) = return_1d {
            self.returns.push(r);
        }

        FeatureRow {
            features: RollingFeatures {
                return_1d,
                ma_5d: self.short_closes.mean(),
                ma_10d: self.long_closes.mean(),
                volatility_10d: self.returns.sample_std(),
            },
            record,
        }
    }

    /// Processes a batch of records in the order given.
    ///
    /// # Arguments
    /// * `records` - One ticker's records, ascending by date
    ///
    /// # Returns
    /// One `FeatureRow` per input record. Rows inside the warm-up period
    /// carry `None` features.
    pub fn process_batch(&mut self, records: Vec<PriceRecord>) -> Vec<FeatureRow> {
        records
            .into_iter()
            .map(|record| self.process_record(record))
            .collect()
    }
}

impl Default for TickerProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the rolling features of one ticker's records.
///
/// The records are re-sorted by date (stable) first, so callers do not have
/// to guarantee the order. Rows still warming up are kept with missing
/// features.
pub fn annotate_ticker(records: &[PriceRecord]) -> Vec<FeatureRow> {
    let mut ordered = records.to_vec();
    ordered.sort_by(|a, b| a.date.cmp(&b.date));
    TickerProcessor::new().process_batch(ordered)
}

/// Groups records by ticker. Each partition owns its records and keeps
/// their input order.
pub fn partition_by_ticker(records: &[PriceRecord]) -> BTreeMap<String, Vec<PriceRecord>> {
    let mut partitions: BTreeMap<String, Vec<PriceRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.ticker.clone())
            .or_default()
            .push(record.clone());
    }
    partitions
}

#[derive(Debug, Clone, Default)]
pub struct FeatureOptions {
    /// Process ticker partitions on the rayon thread pool.
    pub parallel: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSummary {
    pub tickers: usize,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Tickers with fewer than `MIN_HISTORY` observations.
    pub insufficient_history: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FeaturedData {
    pub records: Vec<FeaturedRecord>,
    pub summary: FeatureSummary,
}

/// Feature stage: partitions cleaned records by ticker, computes rolling
/// features per partition and keeps only fully featured rows.
///
/// Output is grouped by ticker in ascending order and date-ascending within
/// each ticker, whether or not partitions were processed in parallel.
pub struct FeatureEngineer {
    options: FeatureOptions,
}

impl FeatureEngineer {
    pub fn new(options: FeatureOptions) -> Self {
        Self { options }
    }

    /// Runs the feature stage.
    ///
    /// # Arguments
    /// * `cleaned` - Output of the cleaning stage
    ///
    /// # Returns
    /// Fully featured rows plus a summary. Tickers shorter than `MIN_HISTORY`
    /// contribute no rows and are listed in the summary.
    pub fn engineer(&self, cleaned: &[PriceRecord]) -> FeaturedData {
        info!("Engineering features per TICKER");
        let partitions: Vec<(String, Vec<PriceRecord>)> =
            partition_by_ticker(cleaned).into_iter().collect();

        let insufficient_history: Vec<String> = partitions
            .iter()
            .filter(|(_, records)| records.len() < MIN_HISTORY)
            .map(|(ticker, _)| ticker.clone())
            .collect();
        for ticker in &insufficient_history {
            warn!(ticker = %ticker, "not enough history for rolling features, ticker skipped");
        }

        let featured: Vec<Vec<FeaturedRecord>> = if self.options.parallel {
            partitions
                .into_par_iter()
                .map(|(ticker, records)| featurize_partition(&ticker, &records))
                .collect()
        } else {
            partitions
                .iter()
                .map(|(ticker, records)| featurize_partition(ticker, records))
                .collect()
        };

        let summary = FeatureSummary {
            tickers: featured.len(),
            rows_in: cleaned.len(),
            rows_out: featured.iter().map(Vec::len).sum(),
            insufficient_history,
        };
        info!(
            "Rows after feature engineering and dropping NaNs: {}",
            summary.rows_out
        );

        FeaturedData {
            records: featured.into_iter().flatten().collect(),
            summary,
        }
    }
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(FeatureOptions::default())
    }
}

/// Runs the feature stage sequentially and returns only the featured rows.
pub fn engineer_features(cleaned: &[PriceRecord]) -> Vec<FeaturedRecord> {
    FeatureEngineer::default().engineer(cleaned).records
}

fn featurize_partition(ticker: &str, records: &[PriceRecord]) -> Vec<FeaturedRecord> {
    let featured: Vec<FeaturedRecord> = annotate_ticker(records)
        .into_iter()
        .filter_map(FeatureRow::into_featured)
        .collect();
    debug!(ticker, rows_in = records.len(), rows_out = featured.len(), "ticker featurized");
    featured
}
