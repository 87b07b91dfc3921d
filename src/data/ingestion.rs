use super::record::RawRow;
use crate::config::AlpacaConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, error, info};

pub const DEFAULT_ALPACA_DATA_URL: &str = "https://data.alpaca.markets";

/// A provider of raw daily bars.
///
/// Implementations return rows in the standard column layout; they do not
/// validate them, that is the cleaning stage's job.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Human-readable name of the provider.
    fn name(&self) -> &str;

    /// Fetches daily bars for `ticker` between `start` and `end` (inclusive).
    async fn fetch_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<RawRow>>;
}

/// One bar as returned by the Alpaca market-data API.
#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: String,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BarsPage {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

fn bars_to_rows(ticker: &str, bars: Vec<AlpacaBar>) -> Vec<RawRow> {
    bars.into_iter()
        .map(|bar| RawRow {
            ticker: Some(ticker.to_string()),
            date: Some(bar.timestamp),
            open: Some(bar.open.to_string()),
            close: Some(bar.close.to_string()),
            high: Some(bar.high.to_string()),
            low: Some(bar.low.to_string()),
            volume: Some(bar.volume.to_string()),
        })
        .collect()
}

/// Daily bar client for the Alpaca market-data v2 REST API.
pub struct AlpacaClient {
    api_key: String,
    api_secret: String,
    base_url: String,
    feed: Option<String>,
    client: reqwest::Client,
}

impl AlpacaClient {
    /// Creates a client from the resolved Alpaca credentials.
    ///
    /// # Errors
    /// Returns `PipelineError::Config` if the key or secret is empty.
    pub fn new(config: &AlpacaConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() || config.api_secret.trim().is_empty() {
            return Err(PipelineError::Config(
                "alpaca api_key and api_secret must be set (config file or ALPACA_API_KEY / ALPACA_API_SECRET)"
                    .to_string(),
            ));
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ALPACA_DATA_URL.to_string()),
            feed: config.feed.clone(),
            client: reqwest::Client::new(),
        })
    }

    async fn fetch_page(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Result<BarsPage> {
        let url = format!(
            "{}/v2/stocks/{}/bars",
            self.base_url.trim_end_matches('/'),
            ticker
        );

        let mut query: Vec<(&str, String)> = vec![
            ("timeframe", "1Day".to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
            ("adjustment", "raw".to_string()),
            ("limit", "10000".to_string()),
        ];
        if let Some(feed) = &self.feed {
            query.push(("feed", feed.clone()));
        }
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider {
                ticker: ticker.to_string(),
                reason: format!("{}: {}", status, body.trim()),
            });
        }

        Ok(response.json::<BarsPage>().await?)
    }
}

#[async_trait]
impl BarSource for AlpacaClient {
    fn name(&self) -> &str {
        "Alpaca Markets"
    }

    async fn fetch_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRow>> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .fetch_page(ticker, start, end, page_token.as_deref())
                .await?;
            let bars = page.bars.unwrap_or_default();
            debug!(ticker, bars = bars.len(), "received page");
            rows.extend(bars_to_rows(ticker, bars));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(rows)
    }
}

/// Downloads bars for every ticker from `source`.
///
/// A ticker that fails is logged and skipped. The call only fails when no
/// ticker produced any row.
pub async fn download_all(
    source: &dyn BarSource,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<RawRow>> {
    info!("Connecting to {} API...", source.name());
    let mut all_rows = Vec::new();

    for ticker in tickers {
        info!("Downloading data for {}", ticker);
        match source.fetch_bars(ticker, start, end).await {
            Ok(rows) => {
                info!("Downloaded {} rows for {}", rows.len(), ticker);
                all_rows.extend(rows);
            }
            Err(e) => error!("Error downloading {}: {}", ticker, e),
        }
    }

    if all_rows.is_empty() {
        error!("No data downloaded.");
        return Err(PipelineError::NoData);
    }

    info!("Data download complete.");
    Ok(all_rows)
}
