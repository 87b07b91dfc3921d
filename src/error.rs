use thiserror::Error;

/// Errors surfaced by the pipeline stages.
///
/// Only structural problems live here. Rows that fail validation are not
/// errors: the cleaning stage drops and counts them (see `CleaningReport`),
/// and tickers without enough history simply produce no featured rows.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid DATE value {value:?} in row {row}")]
    DateParse { row: usize, value: String },

    #[error("required column '{column}' is missing from the input")]
    MissingColumn { column: &'static str },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid date {value:?}, expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error for {ticker}: {reason}")]
    Provider { ticker: String, reason: String },

    #[error("no data downloaded")]
    NoData,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
