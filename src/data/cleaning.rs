use super::record::{PriceRecord, RawRow};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

/// What to do with a row whose DATE cell is present but cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatePolicy {
    /// Abort the whole stage with `PipelineError::DateParse`.
    #[default]
    Abort,
    /// Drop the offending row and count it in the report.
    DropRow,
}

#[derive(Debug, Clone, Default)]
pub struct CleaningOptions {
    pub date_policy: DatePolicy,
}

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub rows_read: usize,
    pub dropped_bad_date: usize,
    pub dropped_missing: usize,
    pub dropped_malformed: usize,
    pub dropped_non_positive: usize,
    pub rows_kept: usize,
}

impl CleaningReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_bad_date + self.dropped_missing + self.dropped_malformed + self.dropped_non_positive
    }
}

/// Output of the cleaning stage: the validated records and how many rows
/// were discarded along the way.
#[derive(Debug, Clone)]
pub struct CleanedData {
    pub records: Vec<PriceRecord>,
    pub report: CleaningReport,
}

/// Validates raw rows and puts them in canonical `(ticker, date)` order.
///
/// Bad rows are dropped, never reported as errors. The only failure is an
/// unparseable DATE under `DatePolicy::Abort`, in which case no partial
/// result is produced.
pub struct DataCleaner {
    options: CleaningOptions,
}

impl DataCleaner {
    pub fn new(options: CleaningOptions) -> Self {
        Self { options }
    }

    /// Runs the cleaning pass over `rows`.
    ///
    /// # Arguments
    /// * `rows` - Raw rows in input order, as read from the source table
    ///
    /// # Returns
    /// The surviving records sorted by `(ticker, date)` and a report counting
    /// each drop reason. Duplicate dates keep their input order.
    ///
    /// # Errors
    /// Returns `PipelineError::DateParse` with the 1-based row number if a
    /// DATE cell cannot be parsed and the policy is `DatePolicy::Abort`.
    pub fn clean(&self, rows: &[RawRow]) -> Result<CleanedData> {
        let mut report = CleaningReport {
            rows_read: rows.len(),
            ..Default::default()
        };
        info!("Initial rows: {}", rows.len());

        // Dates are parsed for every row before anything is filtered.
        info!("Parsing DATE column");
        let mut dated = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let date = match present(&row.date) {
                None => None,
                Some(value) => match parse_date(value) {
                    Some(date) => Some(date),
                    None => match self.options.date_policy {
                        DatePolicy::Abort => {
                            return Err(PipelineError::DateParse {
                                row: index + 1,
                                value: value.to_string(),
                            });
                        }
                        DatePolicy::DropRow => {
                            debug!(row = index + 1, value, "dropping row with invalid DATE");
                            report.dropped_bad_date += 1;
                            continue;
                        }
                    },
                },
            };
            dated.push((row, date));
        }

        info!("Dropping rows with missing values");
        let mut parsed = Vec::with_capacity(dated.len());
        for (row, date) in dated {
            match parse_row(row, date) {
                Parsed::Missing => report.dropped_missing += 1,
                Parsed::Malformed => report.dropped_malformed += 1,
                Parsed::Record(record) => parsed.push(record),
            }
        }
        info!("Rows after dropping NAs: {}", parsed.len());

        info!("Filtering out invalid price data");
        let before = parsed.len();
        parsed.retain(PriceRecord::is_valid);
        report.dropped_non_positive = before - parsed.len();
        info!("Rows after filtering negatives/zeros: {}", parsed.len());

        info!("Sorting by TICKER and DATE");
        parsed.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));

        report.rows_kept = parsed.len();
        Ok(CleanedData {
            records: parsed,
            report,
        })
    }
}

impl Default for DataCleaner {
    fn default() -> Self {
        Self::new(CleaningOptions::default())
    }
}

/// Cleans `rows` with the default (abort on bad dates) policy.
pub fn clean(rows: &[RawRow]) -> Result<Vec<PriceRecord>> {
    DataCleaner::default().clean(rows).map(|cleaned| cleaned.records)
}

/// Parses a DATE cell into a calendar date.
///
/// Accepts plain `YYYY-MM-DD` dates as well as ISO-8601 / RFC 3339
/// timestamps, with or without an offset. The time of day is discarded;
/// offset-aware timestamps keep the date in their own offset.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|ts| ts.date())
}

enum Parsed {
    Missing,
    Malformed,
    Record(PriceRecord),
}

enum Cell {
    Missing,
    Malformed,
    Value(f64),
}

fn present(cell: &Option<String>) -> Option<&str> {
    cell.as_deref().filter(|v| !v.trim().is_empty())
}

fn number(cell: &Option<String>) -> Cell {
    match present(cell) {
        None => Cell::Missing,
        Some(v) => match v.trim().parse::<f64>() {
            Ok(n) if n.is_nan() => Cell::Missing,
            // `inf` and overflowing literals such as `1e400`
            Ok(n) if n.is_infinite() => Cell::Malformed,
            Ok(n) => Cell::Value(n),
            Err(_) => Cell::Malformed,
        },
    }
}

fn parse_row(row: &RawRow, date: Option<NaiveDate>) -> Parsed {
    let cells = [
        number(&row.open),
        number(&row.close),
        number(&row.high),
        number(&row.low),
        number(&row.volume),
    ];
    let (Some(ticker), Some(date)) = (present(&row.ticker), date) else {
        return Parsed::Missing;
    };
    if cells.iter().any(|c| matches!(c, Cell::Missing)) {
        return Parsed::Missing;
    }

    let mut values = [0.0; 5];
    for (slot, cell) in values.iter_mut().zip(cells) {
        match cell {
            Cell::Value(v) => *slot = v,
            _ => return Parsed::Malformed,
        }
    }
    let [open, close, high, low, volume] = values;

    Parsed::Record(PriceRecord {
        ticker: ticker.to_string(),
        date,
        open,
        close,
        high,
        low,
        volume,
    })
}
