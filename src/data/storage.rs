use super::record::{FeaturedRecord, PriceRecord, RawRow, REQUIRED_COLUMNS};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Flat CSV layout of a featured record.
#[derive(Serialize)]
struct FeaturedRow<'a> {
    #[serde(rename = "TICKER")]
    ticker: &'a str,
    #[serde(rename = "DATE")]
    date: NaiveDate,
    #[serde(rename = "Price_Open")]
    open: f64,
    #[serde(rename = "Price_Close")]
    close: f64,
    #[serde(rename = "Price_High")]
    high: f64,
    #[serde(rename = "Price_Low")]
    low: f64,
    #[serde(rename = "Volume")]
    volume: f64,
    #[serde(rename = "Return_1d")]
    return_1d: f64,
    #[serde(rename = "MA_5d")]
    ma_5d: f64,
    #[serde(rename = "MA_10d")]
    ma_10d: f64,
    #[serde(rename = "Volatility_10d")]
    volatility_10d: f64,
}

impl<'a> From<&'a FeaturedRecord> for FeaturedRow<'a> {
    fn from(f: &'a FeaturedRecord) -> Self {
        Self {
            ticker: &f.record.ticker,
            date: f.record.date,
            open: f.record.open,
            close: f.record.close,
            high: f.record.high,
            low: f.record.low,
            volume: f.record.volume,
            return_1d: f.return_1d,
            ma_5d: f.ma_5d,
            ma_10d: f.ma_10d,
            volatility_10d: f.volatility_10d,
        }
    }
}

fn reader<R: Read>(input: R) -> Result<csv::Reader<R>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);

    let headers = rdr.headers()?;
    if let Some(&column) = REQUIRED_COLUMNS
        .iter()
        .find(|&&column| !headers.iter().any(|h| h == column))
    {
        return Err(PipelineError::MissingColumn { column });
    }
    Ok(rdr)
}

/// Reads raw rows from CSV. Every required column must be present in the
/// header; empty cells become missing values.
pub fn read_raw_rows<R: Read>(input: R) -> Result<Vec<RawRow>> {
    let mut rdr = reader(input)?;
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<RawRow>, _>>()?;
    Ok(rows)
}

/// Reads records that were already cleaned. Any missing or malformed value
/// is an error.
pub fn read_price_records<R: Read>(input: R) -> Result<Vec<PriceRecord>> {
    let mut rdr = reader(input)?;
    let records = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<PriceRecord>, _>>()?;
    Ok(records)
}

/// Writes raw rows as CSV with the standard column header.
///
/// # Arguments
/// * `output` - Destination writer
/// * `rows` - Rows to write; missing cells are written empty
///
/// # Errors
/// Returns an error if serialization or the underlying write fails.
pub fn write_raw_rows<W: Write>(output: W, rows: &[RawRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(output);
    if rows.is_empty() {
        wtr.write_record(REQUIRED_COLUMNS)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes cleaned records as CSV. The header is written even when
/// `records` is empty.
pub fn write_price_records<W: Write>(output: W, records: &[PriceRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(output);
    if records.is_empty() {
        wtr.write_record(REQUIRED_COLUMNS)?;
    }
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes featured records as CSV: the price columns followed by
/// `Return_1d`, `MA_5d`, `MA_10d` and `Volatility_10d`.
///
/// # Arguments
/// * `output` - Destination writer
/// * `records` - Featured rows in output order
///
/// # Errors
/// Returns an error if serialization or the underlying write fails.
pub fn write_featured_records<W: Write>(output: W, records: &[FeaturedRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(output);
    if records.is_empty() {
        wtr.write_record(
            REQUIRED_COLUMNS
                .iter()
                .chain(&["Return_1d", "MA_5d", "MA_10d", "Volatility_10d"]),
        )?;
    }
    for record in records {
        wtr.serialize(FeaturedRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

fn open_input(path: &Path) -> Result<fs::File> {
    info!("Reading data from {}", path.display());
    Ok(fs::File::open(path)?)
}

fn create_output(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::File::create(path)?)
}

/// Opens `path` and reads it with `read_raw_rows`.
pub fn load_raw_rows(path: &Path) -> Result<Vec<RawRow>> {
    read_raw_rows(open_input(path)?)
}

/// Opens `path` and reads it with `read_price_records`.
pub fn load_price_records(path: &Path) -> Result<Vec<PriceRecord>> {
    read_price_records(open_input(path)?)
}

/// Saves raw rows to `path`, creating parent directories as needed.
///
/// # Arguments
/// * `path` - Output CSV file, truncated if it exists
/// * `rows` - Rows to save
///
/// # Errors
/// Returns an error if the file can't be created or written.
pub fn save_raw_rows(path: &Path, rows: &[RawRow]) -> Result<()> {
    write_raw_rows(create_output(path)?, rows)?;
    info!("Data saved to {}", path.display());
    Ok(())
}

/// Saves cleaned records to `path`, creating parent directories as needed.
pub fn save_price_records(path: &Path, records: &[PriceRecord]) -> Result<()> {
    write_price_records(create_output(path)?, records)?;
    info!("Cleaned data saved to {}", path.display());
    Ok(())
}

/// Saves featured records to `path`, creating parent directories as needed.
pub fn save_featured_records(path: &Path, records: &[FeaturedRecord]) -> Result<()> {
    write_featured_records(create_output(path)?, records)?;
    info!("Features saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "TICKER,DATE,Price_Open,Price_Close,Price_High,Price_Low,Volume\n";

    #[test]
    fn test_read_raw_rows_with_empty_cells() {
        let csv = format!("{HEADER}AAPL,2024-01-02,10,,12,9,1000\n");
        let rows = read_raw_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker.as_deref(), Some("AAPL"));
        assert_eq!(rows[0].close, None);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "TICKER,DATE,Price_Open,Price_Close,Price_High,Price_Low\nAAPL,2024-01-02,1,1,1,1\n";
        match read_raw_rows(csv.as_bytes()) {
            Err(PipelineError::MissingColumn { column }) => assert_eq!(column, "Volume"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_columns_and_column_order_are_ignored() {
        let csv = "Volume,Extra,TICKER,DATE,Price_Open,Price_Close,Price_High,Price_Low\n\
                   1000,x,AAPL,2024-01-02,10,10.5,12,9\n";
        let rows = read_raw_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].volume.as_deref(), Some("1000"));
        assert_eq!(rows[0].close.as_deref(), Some("10.5"));
    }

    #[test]
    fn test_header_only_input_is_empty() {
        assert!(read_raw_rows(HEADER.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_price_records_written_with_header_and_read_back() {
        let records = vec![PriceRecord {
            ticker: "AAPL".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 10.0,
            close: 10.5,
            high: 12.0,
            low: 9.0,
            volume: 1000.0,
        }];
        let mut buf = Vec::new();
        write_price_records(&mut buf, &records).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("TICKER,DATE,Price_Open,Price_Close,Price_High,Price_Low,Volume\n"));
        assert!(text.contains("AAPL,2024-01-02,"));
        assert_eq!(read_price_records(buf.as_slice()).unwrap(), records);
    }

    #[test]
    fn test_empty_featured_output_still_has_header() {
        let mut buf = Vec::new();
        write_featured_records(&mut buf, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text.trim_end(),
            "TICKER,DATE,Price_Open,Price_Close,Price_High,Price_Low,Volume,Return_1d,MA_5d,MA_10d,Volatility_10d"
        );
    }

    #[test]
    fn test_strict_reader_rejects_blank_values() {
        let csv = format!("{HEADER}AAPL,2024-01-02,10,,12,9,1000\n");
        assert!(matches!(
            read_price_records(csv.as_bytes()),
            Err(PipelineError::Csv(_))
        ));
    }
}
