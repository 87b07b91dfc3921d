//! Stage orchestration: raw rows → cleaned records → featured records.
//!
//! The in-memory entry point is [`run`]; the `*_file` helpers wrap the
//! stages with CSV loading and saving for the command-line driver.

use crate::data::cleaning::{CleanedData, CleaningOptions, CleaningReport, DataCleaner};
use crate::data::processing::{FeatureEngineer, FeatureOptions, FeatureSummary, FeaturedData};
use crate::data::record::RawRow;
use crate::data::storage;
use crate::error::Result;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub cleaning: CleaningOptions,
    pub features: FeatureOptions,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub cleaned: CleanedData,
    pub featured: FeaturedData,
}

/// Runs the cleaning stage followed by the feature stage.
///
/// Nothing is produced if cleaning fails.
pub fn run(rows: &[RawRow], options: &PipelineOptions) -> Result<PipelineOutput> {
    let cleaned = DataCleaner::new(options.cleaning.clone()).clean(rows)?;
    log_cleaning_report(&cleaned.report);
    let featured = FeatureEngineer::new(options.features.clone()).engineer(&cleaned.records);
    Ok(PipelineOutput { cleaned, featured })
}

/// Cleans a raw CSV file and saves the result.
///
/// # Arguments
/// * `input` - Raw CSV with the standard column header
/// * `output` - Path for the cleaned CSV
/// * `options` - Cleaning options
///
/// # Returns
/// The cleaning report. The output file is not touched if cleaning fails.
pub fn clean_file(input: &Path, output: &Path, options: &CleaningOptions) -> Result<CleaningReport> {
    let rows = storage::load_raw_rows(input)?;
    let cleaned = DataCleaner::new(options.clone()).clean(&rows)?;
    log_cleaning_report(&cleaned.report);
    storage::save_price_records(output, &cleaned.records)?;
    Ok(cleaned.report)
}

/// Computes features for a cleaned CSV file and saves the featured table.
///
/// # Errors
/// Returns an error if the input is missing a column or holds a malformed
/// value, or if the output can't be written.
pub fn features_file(input: &Path, output: &Path, options: &FeatureOptions) -> Result<FeatureSummary> {
    let records = storage::load_price_records(input)?;
    info!("Initial rows: {}", records.len());
    let featured = FeatureEngineer::new(options.clone()).engineer(&records);
    storage::save_featured_records(output, &featured.records)?;
    Ok(featured.summary)
}

/// Runs both stages over one raw file, saving the cleaned and the featured
/// tables.
pub fn run_files(
    input: &Path,
    cleaned_output: &Path,
    features_output: &Path,
    options: &PipelineOptions,
) -> Result<PipelineOutput> {
    let rows = storage::load_raw_rows(input)?;
    let output = run(&rows, options)?;
    storage::save_price_records(cleaned_output, &output.cleaned.records)?;
    storage::save_featured_records(features_output, &output.featured.records)?;
    Ok(output)
}

fn log_cleaning_report(report: &CleaningReport) {
    info!(
        rows_read = report.rows_read,
        rows_kept = report.rows_kept,
        dropped_bad_date = report.dropped_bad_date,
        dropped_missing = report.dropped_missing,
        dropped_malformed = report.dropped_malformed,
        dropped_non_positive = report.dropped_non_positive,
        "cleaning finished, {} rows dropped",
        report.rows_dropped()
    );
}
