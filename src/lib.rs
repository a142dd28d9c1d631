pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{CsvWorkbook, GeminiClassifier, GeminiSettings, ZipTableWriter};
pub use config::{cli::LocalStorage, toml_config::ClassifierConfig};
pub use core::{
    engine::ClassificationEngine, orchestrator::PipelineOrchestrator, retry::RetryingBatchRunner,
};
pub use utils::error::{ClassifyError, Result};

#[cfg(feature = "cli")]
pub use config::CliConfig;
