use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use stock_pipeline::config::{CollectionConfig, CollectionOverrides, DEFAULT_CONFIG_PATH};
use stock_pipeline::data::{download_all, AlpacaClient, CleaningOptions, DatePolicy, FeatureOptions};
use stock_pipeline::data::storage;
use stock_pipeline::{logging, pipeline};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "stock-pipeline",
    about = "Daily stock data collection, cleaning and feature engineering"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log file to append to. Defaults to a per-command file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download daily bars from Alpaca and write <output_dir>/stock_data.csv.
    Collect {
        /// Path to the TOML config file. Defaults to ./config.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Tickers to download (e.g., AAPL MSFT).
        #[arg(long, num_args = 1..)]
        tickers: Option<Vec<String>>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end_date: Option<String>,

        /// Output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Validate raw rows and sort them by ticker and date.
    Clean {
        /// Path to raw input CSV.
        #[arg(long, default_value = "data/stock_data.csv")]
        input: PathBuf,

        /// Path for cleaned output CSV.
        #[arg(long, default_value = "data/stock_data_cleaned.csv")]
        output: PathBuf,

        /// Drop rows with an unparseable DATE instead of aborting.
        #[arg(long, default_value_t = false)]
        drop_bad_dates: bool,
    },
    /// Compute returns, moving averages and volatility per ticker.
    Features {
        /// Path to cleaned input CSV.
        #[arg(long, default_value = "data/stock_data_cleaned.csv")]
        input: PathBuf,

        /// Path for features output CSV.
        #[arg(long, default_value = "data/stock_data_features.csv")]
        output: PathBuf,

        /// Process tickers in parallel.
        #[arg(long, default_value_t = false)]
        parallel: bool,
    },
    /// Clean and feature-engineer a raw file in one go.
    Run {
        /// Path to raw input CSV.
        #[arg(long, default_value = "data/stock_data.csv")]
        input: PathBuf,

        /// Path for cleaned output CSV.
        #[arg(long, default_value = "data/stock_data_cleaned.csv")]
        cleaned_output: PathBuf,

        /// Path for features output CSV.
        #[arg(long, default_value = "data/stock_data_features.csv")]
        features_output: PathBuf,

        /// Drop rows with an unparseable DATE instead of aborting.
        #[arg(long, default_value_t = false)]
        drop_bad_dates: bool,

        /// Process tickers in parallel.
        #[arg(long, default_value_t = false)]
        parallel: bool,
    },
}

impl Commands {
    fn default_log_file(&self) -> &'static str {
        match self {
            Commands::Collect { .. } => "data_collection.log",
            Commands::Clean { .. } => "data_cleaning.log",
            Commands::Features { .. } => "feature_engineering.log",
            Commands::Run { .. } => "pipeline.log",
        }
    }
}

fn cleaning_options(drop_bad_dates: bool) -> CleaningOptions {
    CleaningOptions {
        date_policy: if drop_bad_dates {
            DatePolicy::DropRow
        } else {
            DatePolicy::Abort
        },
    }
}

/// Downloads raw bars for the configured tickers and saves them as CSV.
///
/// Configuration is merged in order: config file, then environment
/// (`.env` included), then command-line flags.
///
/// # Errors
/// Returns an error if the configuration is invalid, the API credentials
/// are missing, no ticker could be downloaded, or the output can't be written.
async fn collect(config_path: Option<PathBuf>, overrides: CollectionOverrides) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => load_config(&path)?,
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config(path)?
            } else {
                warn!("{} not found, using command-line values only", DEFAULT_CONFIG_PATH);
                CollectionConfig::default()
            }
        }
    };
    config.apply_env();
    config.apply_overrides(overrides);

    let plan = config.resolve().context("invalid collection configuration")?;
    info!(
        tickers = ?plan.tickers,
        start = %plan.start,
        end = %plan.end,
        output_dir = %plan.output_dir.display(),
        "Final configuration"
    );

    let client = AlpacaClient::new(&plan.alpaca)?;
    let rows = download_all(&client, &plan.tickers, plan.start, plan.end).await?;

    let output = plan.output_path();
    storage::save_raw_rows(&output, &rows)
        .with_context(|| format!("Error saving data to {}", output.display()))?;
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<CollectionConfig> {
    let config = CollectionConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    info!("Config loaded from {}", path.display());
    Ok(config)
}

/// Dispatches the parsed command.
async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Collect {
            config,
            tickers,
            start_date,
            end_date,
            output_dir,
        } => {
            let overrides = CollectionOverrides {
                tickers,
                start_date,
                end_date,
                output_dir,
            };
            collect(config, overrides).await
        }
        Commands::Clean {
            input,
            output,
            drop_bad_dates,
        } => {
            pipeline::clean_file(&input, &output, &cleaning_options(drop_bad_dates))
                .with_context(|| format!("cleaning {} failed", input.display()))?;
            Ok(())
        }
        Commands::Features {
            input,
            output,
            parallel,
        } => {
            pipeline::features_file(&input, &output, &FeatureOptions { parallel })
                .with_context(|| format!("feature engineering on {} failed", input.display()))?;
            Ok(())
        }
        Commands::Run {
            input,
            cleaned_output,
            features_output,
            drop_bad_dates,
            parallel,
        } => {
            let options = pipeline::PipelineOptions {
                cleaning: cleaning_options(drop_bad_dates),
                features: FeatureOptions { parallel },
            };
            pipeline::run_files(&input, &cleaned_output, &features_output, &options)
                .with_context(|| format!("pipeline run on {} failed", input.display()))?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();
    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(cli.command.default_log_file()));
    logging::init(&log_file, cli.verbose)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    info!("Arguments parsed: {:?}", cli.command);

    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
