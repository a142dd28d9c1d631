use crate::core::taxonomy::Taxonomy;
use crate::domain::model::CategorizedRow;
use crate::domain::ports::SourceReader;
use crate::domain::table::{CellMetadata, ExportTable, LayoutHints};
use crate::utils::error::Result;
use std::collections::HashMap;

pub const DEFAULT_CATEGORY_COLUMN: &str = "category";

/// Hyperlinks keyed by source position: (0-based data row, column).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellLinks {
    links: HashMap<(usize, String), String>,
}

impl CellLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the link of every cell in `column` for the first `row_count` rows.
    pub fn collect<R: SourceReader + ?Sized>(
        reader: &R,
        sheet: &str,
        column: &str,
        row_count: usize,
    ) -> Result<Self> {
        let mut links = Self::new();
        for row_index in 0..row_count {
            if let Some(uri) = reader.read_cell_link(sheet, row_index, column)? {
                links.insert(row_index, column, uri);
            }
        }
        Ok(links)
    }

    pub fn insert(&mut self, row_index: usize, column: &str, uri: String) {
        self.links.insert((row_index, column.to_string()), uri);
    }

    pub fn get(&self, row_index: usize, column: &str) -> Option<&str> {
        self.links
            .get(&(row_index, column.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Projects a view back into flat rows plus per-cell metadata for a writer.
#[derive(Debug, Clone)]
pub struct ExportMapper {
    category_column: String,
    layout: LayoutHints,
    taxonomy: Taxonomy,
}

impl Default for ExportMapper {
    fn default() -> Self {
        Self {
            category_column: DEFAULT_CATEGORY_COLUMN.to_string(),
            layout: LayoutHints::default(),
            taxonomy: Taxonomy::default(),
        }
    }
}

impl ExportMapper {
    pub fn new(category_column: impl Into<String>, layout: LayoutHints, taxonomy: Taxonomy) -> Self {
        Self {
            category_column: category_column.into(),
            layout,
            taxonomy,
        }
    }

    pub fn category_column(&self) -> &str {
        &self.category_column
    }

    /// Name of the appended category column for a sheet with `headers`.
    /// A source header with the same name keeps its data and the category
    /// column gets a numeric suffix instead.
    pub fn output_category_column(&self, headers: &[String]) -> String {
        let mut candidate = self.category_column.clone();
        let mut suffix = 1;
        while headers.iter().any(|h| *h == candidate) {
            suffix += 1;
            candidate = format!("{}_{}", self.category_column, suffix);
        }
        candidate
    }

    /// Columns are the source headers followed by the category column; the
    /// internal id is not exported. Links on `value_column` follow each row
    /// back to its source position.
    pub fn project(
        &self,
        name: &str,
        headers: &[String],
        value_column: &str,
        rows: &[&CategorizedRow],
        links: &CellLinks,
    ) -> ExportTable {
        let category_column = self.output_category_column(headers);
        let mut columns = headers.to_vec();
        columns.push(category_column.clone());

        let mut cells = Vec::new();
        let flat_rows = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let link = row
                    .id
                    .checked_sub(1)
                    .and_then(|position| links.get(position, value_column));
                if let Some(uri) = link {
                    cells.push(CellMetadata {
                        row: index,
                        column: value_column.to_string(),
                        hyperlink: Some(uri.to_string()),
                        fill_color: None,
                    });
                }
                if row.is_classified() {
                    cells.push(CellMetadata {
                        row: index,
                        column: category_column.clone(),
                        hyperlink: None,
                        fill_color: Some(self.taxonomy.color_for(&row.category).to_string()),
                    });
                }

                let mut values: Vec<serde_json::Value> = headers
                    .iter()
                    .map(|header| {
                        row.raw_row
                            .get(header)
                            .cloned()
                            .unwrap_or(serde_json::Value::Null)
                    })
                    .collect();
                values.push(serde_json::Value::String(row.category.clone()));
                values
            })
            .collect();

        ExportTable {
            name: name.to_string(),
            columns,
            rows: flat_rows,
            cells,
            layout: self.layout.clone(),
        }
    }
}
