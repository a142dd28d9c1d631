use crate::domain::model::cell_text;
use crate::domain::ports::{Storage, TableWriter};
use crate::domain::table::{CellMetadata, ExportTable, LayoutHints};
use crate::utils::error::Result;
use serde::Serialize;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const CSV_ENTRY: &str = "categorized.csv";
pub const TSV_ENTRY: &str = "categorized.tsv";
pub const METADATA_ENTRY: &str = "cell_metadata.json";

#[derive(Serialize)]
struct MetadataSidecar<'a> {
    table: &'a str,
    generated_at: String,
    layout: &'a LayoutHints,
    cells: &'a [CellMetadata],
}

/// Packs an export table into `<name>.zip` with CSV, TSV and a JSON sidecar
/// carrying links, fills and layout hints.
pub struct ZipTableWriter<S: Storage> {
    storage: S,
    output_path: String,
}

impl<S: Storage> ZipTableWriter<S> {
    pub fn new(storage: S, output_path: impl Into<String>) -> Self {
        Self {
            storage,
            output_path: output_path.into(),
        }
    }

    pub fn encode(table: &ExportTable) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        zip.start_file(CSV_ENTRY, SimpleFileOptions::default())?;
        zip.write_all(&delimited(table, b',')?)?;

        zip.start_file(TSV_ENTRY, SimpleFileOptions::default())?;
        zip.write_all(&delimited(table, b'\t')?)?;

        zip.start_file(METADATA_ENTRY, SimpleFileOptions::default())?;
        let sidecar = MetadataSidecar {
            table: &table.name,
            generated_at: chrono::Utc::now().to_rfc3339(),
            layout: &table.layout,
            cells: &table.cells,
        };
        zip.write_all(serde_json::to_string_pretty(&sidecar)?.as_bytes())?;

        Ok(zip.finish()?.into_inner())
    }
}

fn delimited(table: &ExportTable, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

impl<S: Storage> TableWriter for ZipTableWriter<S> {
    async fn write_table(&self, table: &ExportTable) -> Result<String> {
        let file_name = format!("{}.zip", table.name);
        let data = Self::encode(table)?;

        tracing::debug!("Writing {} ({} bytes) to storage", file_name, data.len());
        self.storage.write_file(&file_name, &data).await?;

        Ok(format!("{}/{}", self.output_path.trim_end_matches('/'), file_name))
    }
}
