use serde::{Deserialize, Serialize};

/// Rich-cell attributes the writer should reproduce for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMetadata {
    /// 0-based data row in the exported table (header excluded).
    pub row: usize,
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
}

/// Opaque presentation hints; the core never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutHints {
    pub column_width: u16,
    pub wrap_text: bool,
    pub vertical_align: VerticalAlign,
}

impl Default for LayoutHints {
    fn default() -> Self {
        Self {
            column_width: 40,
            wrap_text: true,
            vertical_align: VerticalAlign::Top,
        }
    }
}

/// Flat, export-ready table handed to a `TableWriter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub cells: Vec<CellMetadata>,
    pub layout: LayoutHints,
}

impl ExportTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn metadata_for(&self, row: usize, column: &str) -> Option<&CellMetadata> {
        self.cells
            .iter()
            .find(|meta| meta.row == row && meta.column == column)
    }
}
