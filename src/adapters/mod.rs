// Adapters layer: concrete implementations of the domain ports (classifier service, workbook, export).

pub mod gemini;
pub mod workbook;
pub mod zip_writer;

pub use gemini::{GeminiClassifier, GeminiSettings};
pub use workbook::CsvWorkbook;
pub use zip_writer::ZipTableWriter;
