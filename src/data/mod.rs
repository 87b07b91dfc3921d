pub mod cleaning;
pub mod ingestion;
pub mod processing;
pub mod record;
pub mod storage;

pub use cleaning::{clean, CleanedData, CleaningOptions, CleaningReport, DataCleaner, DatePolicy};
pub use ingestion::{download_all, AlpacaClient, BarSource};
pub use processing::{engineer_features, FeatureEngineer, FeatureOptions, FeaturedData};
pub use record::{FeaturedRecord, PriceRecord, RawRow};
