use crate::domain::model::RawRow;
use crate::domain::ports::SourceReader;
use crate::utils::error::{ClassifyError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

/// Name of the optional hyperlink sidecar inside a ZIP workbook.
pub const LINKS_ENTRY: &str = "links.json";

#[derive(Debug, Clone, Deserialize)]
struct LinkEntry {
    sheet: String,
    row: usize,
    column: String,
    uri: String,
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    headers: Vec<String>,
    rows: Vec<RawRow>,
    links: HashMap<(usize, String), String>,
}

/// Workbook made of CSV sheets: a single `.csv` file, or a `.zip` holding one
/// `.csv` per sheet plus an optional `links.json` with cell hyperlinks.
#[derive(Debug, Clone, Default)]
pub struct CsvWorkbook {
    sheets: Vec<Sheet>,
}

impl CsvWorkbook {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        tracing::debug!("Reading workbook {} ({} bytes)", path.display(), bytes.len());
        match extension.as_deref() {
            Some("zip") => Self::from_zip(bytes),
            _ => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Sheet1");
                Self::from_csv(name, &bytes)
            }
        }
    }

    pub fn from_csv(sheet_name: &str, bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            sheets: vec![parse_sheet(sheet_name, bytes)?],
        })
    }

    pub fn from_zip(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut sheets = Vec::new();
        let mut links: Vec<LinkEntry> = Vec::new();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;

            if entry_name == LINKS_ENTRY {
                links = serde_json::from_slice(&content)?;
            } else if entry_name.to_ascii_lowercase().ends_with(".csv") {
                let stem = Path::new(&entry_name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&entry_name)
                    .to_string();
                sheets.push(parse_sheet(&stem, &content)?);
            }
        }

        let mut workbook = Self { sheets };
        for link in links {
            workbook = workbook.with_link(&link.sheet, link.row, &link.column, &link.uri);
        }
        Ok(workbook)
    }

    /// Attaches a hyperlink to a cell; unknown sheets are ignored.
    pub fn with_link(mut self, sheet: &str, row: usize, column: &str, uri: &str) -> Self {
        if let Some(target) = self.sheets.iter_mut().find(|s| s.name == sheet) {
            target
                .links
                .insert((row, column.to_string()), uri.to_string());
        }
        self
    }

    fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ClassifyError::InvalidConfigValueError {
                field: "sheet".to_string(),
                value: name.to_string(),
                reason: "Workbook has no such sheet".to_string(),
            })
    }
}

/// Semicolon wins when the header line has more of them than commas.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn parse_sheet(name: &str, bytes: &[u8]) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(bytes))
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Empty cells are absent, like a spreadsheet's unset cells.
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(header, cell)| (header.clone(), serde_json::Value::String(cell.to_string())))
            .collect();
        rows.push(row);
    }

    tracing::debug!("Sheet '{}': {} columns, {} rows", name, headers.len(), rows.len());
    Ok(Sheet {
        name: name.to_string(),
        headers,
        rows,
        links: HashMap::new(),
    })
}

impl SourceReader for CsvWorkbook {
    fn list_sheets(&self) -> Result<Vec<String>> {
        Ok(self.sheets.iter().map(|s| s.name.clone()).collect())
    }

    fn read_header_row(&self, sheet: &str) -> Result<Vec<String>> {
        Ok(self.sheet(sheet)?.headers.clone())
    }

    fn read_rows(&self, sheet: &str) -> Result<Vec<RawRow>> {
        Ok(self.sheet(sheet)?.rows.clone())
    }

    fn read_cell_link(&self, sheet: &str, row_index: usize, column: &str) -> Result<Option<String>> {
        Ok(self
            .sheet(sheet)?
            .links
            .get(&(row_index, column.to_string()))
            .cloned())
    }
}
