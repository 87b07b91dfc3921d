use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "data";
pub const RAW_DATA_FILE: &str = "stock_data.csv";

/// Credentials and endpoint for the Alpaca market-data API.
#[derive(Clone, Default, Deserialize)]
pub struct AlpacaConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub base_url: Option<String>,
    /// Data feed (`iex` or `sip`); the API default is used when unset.
    pub feed: Option<String>,
}

impl fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("base_url", &self.base_url)
            .field("feed", &self.feed)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

/// Contents of the collection config file.
///
/// ```toml
/// tickers = ["AAPL", "MSFT"]
/// start_date = "2023-01-01"
/// end_date = "2023-12-31"
/// output_dir = "data"
///
/// [alpaca]
/// api_key = "..."
/// api_secret = "..."
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub tickers: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub alpaca: AlpacaConfig,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            tickers: Vec::new(),
            start_date: None,
            end_date: None,
            output_dir: default_output_dir(),
            alpaca: AlpacaConfig::default(),
        }
    }
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CollectionOverrides {
    pub tickers: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub output_dir: Option<PathBuf>,
}

/// A validated collection run.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output_dir: PathBuf,
    pub alpaca: AlpacaConfig,
}

impl CollectionPlan {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(RAW_DATA_FILE)
    }
}

impl CollectionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overrides the credentials with `ALPACA_API_KEY` / `ALPACA_API_SECRET`
    /// when they are set (a `.env` file is loaded by the binary beforehand).
    pub fn apply_env(&mut self) {
        self.apply_credentials(
            std::env::var("ALPACA_API_KEY").ok(),
            std::env::var("ALPACA_API_SECRET").ok(),
        );
    }

    pub fn apply_credentials(&mut self, api_key: Option<String>, api_secret: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.alpaca.api_key = key;
        }
        if let Some(secret) = api_secret.filter(|s| !s.is_empty()) {
            self.alpaca.api_secret = secret;
        }
    }

    pub fn apply_overrides(&mut self, overrides: CollectionOverrides) {
        if let Some(tickers) = overrides.tickers.filter(|t| !t.is_empty()) {
            self.tickers = tickers;
        }
        if let Some(start) = overrides.start_date {
            self.start_date = Some(start);
        }
        if let Some(end) = overrides.end_date {
            self.end_date = Some(end);
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
    }

    /// Validates the merged configuration.
    pub fn resolve(self) -> Result<CollectionPlan> {
        if self.tickers.is_empty() {
            return Err(PipelineError::Config("no tickers configured".to_string()));
        }
        let start = parse_config_date(
            self.start_date
                .as_deref()
                .ok_or_else(|| PipelineError::Config("start_date is not set".to_string()))?,
        )?;
        let end = parse_config_date(
            self.end_date
                .as_deref()
                .ok_or_else(|| PipelineError::Config("end_date is not set".to_string()))?,
        )?;
        if start > end {
            return Err(PipelineError::Config(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }

        Ok(CollectionPlan {
            tickers: self.tickers,
            start,
            end,
            output_dir: self.output_dir,
            alpaca: self.alpaca,
        })
    }
}

pub fn parse_config_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| PipelineError::InvalidDate {
        value: value.to_string(),
    })
}
