//! End-to-end tests over CSV files: raw file → cleaned file → features file.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use stock_pipeline::data::{CleaningOptions, DatePolicy, FeatureOptions};
use stock_pipeline::pipeline::{self, PipelineOptions};
use stock_pipeline::PipelineError;

const HEADER: &str = "TICKER,DATE,Price_Open,Price_Close,Price_High,Price_Low,Volume";
const CLOSES: [f64; 11] = [10.0, 11.0, 12.0, 11.0, 10.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0];

fn write_raw(path: &Path, rows: &[String]) {
    let mut text = format!("{HEADER}\n");
    for row in rows {
        writeln!(text, "{row}").unwrap();
    }
    fs::write(path, text).unwrap();
}

fn series(ticker: &str, closes: &[f64]) -> Vec<String> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{ticker},2024-01-{:02} 05:00:00+00:00,{c},{c},{},{},1000",
                i + 1,
                c + 1.0,
                c - 0.5
            )
        })
        .collect()
}

#[test]
fn run_files_writes_cleaned_and_featured_tables() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("stock_data.csv");
    let cleaned = dir.path().join("out/stock_data_cleaned.csv");
    let features = dir.path().join("out/stock_data_features.csv");

    let mut rows = series("MSFT", &CLOSES);
    rows.extend(series("AAPL", &CLOSES[..10]));
    rows.push("MSFT,2024-01-20,1,1,1,1,-5".to_string());
    rows.push("MSFT,2024-01-21,1,,1,1,100".to_string());
    rows.reverse();
    write_raw(&input, &rows);

    let output = pipeline::run_files(&input, &cleaned, &features, &PipelineOptions::default()).unwrap();
    assert_eq!(output.cleaned.report.rows_read, 23);
    assert_eq!(output.cleaned.report.rows_kept, 21);
    assert_eq!(output.featured.records.len(), 1);

    let cleaned_text = fs::read_to_string(&cleaned).unwrap();
    let lines: Vec<&str> = cleaned_text.lines().collect();
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines.len(), 22);
    assert!(lines[1].starts_with("AAPL,2024-01-01,"));
    assert!(lines[11].starts_with("MSFT,2024-01-01,"));

    let features_text = fs::read_to_string(&features).unwrap();
    let lines: Vec<&str> = features_text.lines().collect();
    assert_eq!(
        lines[0],
        format!("{HEADER},Return_1d,MA_5d,MA_10d,Volatility_10d")
    );
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("MSFT,2024-01-11,14.0,14.0,"));
}

#[test]
fn clean_then_features_matches_single_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let cleaned = dir.path().join("cleaned.csv");
    let features = dir.path().join("features.csv");

    let closes: Vec<f64> = (0..25).map(|i| 20.0 + (i % 6) as f64 * 0.75).collect();
    write_raw(&input, &series("TSLA", &closes));

    let report = pipeline::clean_file(&input, &cleaned, &CleaningOptions::default()).unwrap();
    assert_eq!(report.rows_kept, 25);
    let summary = pipeline::features_file(&cleaned, &features, &FeatureOptions::default()).unwrap();
    assert_eq!(summary.rows_out, 15);

    let combined = dir.path().join("combined.csv");
    let combined_cleaned = dir.path().join("combined_cleaned.csv");
    pipeline::run_files(&input, &combined_cleaned, &combined, &PipelineOptions::default()).unwrap();
    assert_eq!(
        fs::read_to_string(&features).unwrap(),
        fs::read_to_string(&combined).unwrap()
    );
}

#[test]
fn missing_column_aborts_before_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let output = dir.path().join("cleaned.csv");
    fs::write(&input, "TICKER,DATE,Price_Open,Price_Close\nAAPL,2024-01-02,1,1\n").unwrap();

    let err = pipeline::clean_file(&input, &output, &CleaningOptions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::MissingColumn { column: "Price_High" }));
    assert!(!output.exists());
}

#[test]
fn bad_date_aborts_unless_dropping() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let output = dir.path().join("cleaned.csv");
    let mut rows = series("AAPL", &CLOSES[..3]);
    rows.push("AAPL,someday,1,1,1,1,1".to_string());
    write_raw(&input, &rows);

    let err = pipeline::clean_file(&input, &output, &CleaningOptions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::DateParse { row: 4, .. }));
    assert!(!output.exists());

    let options = CleaningOptions {
        date_policy: DatePolicy::DropRow,
    };
    let report = pipeline::clean_file(&input, &output, &options).unwrap();
    assert_eq!(report.rows_kept, 3);
    assert_eq!(report.dropped_bad_date, 1);
}

#[test]
fn empty_input_produces_header_only_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    let cleaned = dir.path().join("cleaned.csv");
    let features = dir.path().join("features.csv");
    write_raw(&input, &[]);

    let output = pipeline::run_files(&input, &cleaned, &features, &PipelineOptions::default()).unwrap();
    assert!(output.cleaned.records.is_empty());
    assert!(output.featured.records.is_empty());
    assert_eq!(fs::read_to_string(&cleaned).unwrap().lines().count(), 1);
    assert_eq!(fs::read_to_string(&features).unwrap().lines().count(), 1);
}
