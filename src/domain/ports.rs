use crate::domain::model::{ClassificationRequest, RawRow};
use crate::domain::table::ExportTable;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Byte sink for produced artifacts.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// External text-classification service.
///
/// Receives one batch in order and returns the decoded response body. Any
/// `Err` is treated as transient by the batch runner. The body is left as raw
/// JSON so the runner decides what counts as well-formed.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<serde_json::Value>;
}

/// Suspension used between retry attempts. Swappable so tests never wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Read side of a tabular workbook.
pub trait SourceReader: Send + Sync {
    fn list_sheets(&self) -> Result<Vec<String>>;
    fn read_header_row(&self, sheet: &str) -> Result<Vec<String>>;
    fn read_rows(&self, sheet: &str) -> Result<Vec<RawRow>>;
    /// `row_index` is the 0-based data row (header excluded).
    fn read_cell_link(&self, sheet: &str, row_index: usize, column: &str) -> Result<Option<String>>;
}

/// Write side: turns an export table into an artifact and returns its location.
pub trait TableWriter: Send + Sync {
    fn write_table(
        &self,
        table: &ExportTable,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}
