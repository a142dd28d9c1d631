pub mod aggregator;
pub mod chunker;
pub mod columns;
pub mod engine;
pub mod export;
pub mod orchestrator;
pub mod retry;
pub mod taxonomy;
pub mod view;

pub use crate::domain::model::{
    CategorizedRow, ClassificationResult, FilterState, Progress, Record, SortDirection, SortSpec,
};
pub use crate::domain::ports::{Classifier, Sleeper, SourceReader, Storage, TableWriter};
pub use crate::utils::error::Result;
