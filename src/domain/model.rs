use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One source row as read from a sheet: header name -> cell value.
pub type RawRow = HashMap<String, serde_json::Value>;

/// A source row reduced to its identity and the text to classify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based position in source order.
    pub id: usize,
    pub value: String,
    pub raw_row: RawRow,
}

impl Record {
    /// Blank values never reach the classifier.
    pub fn is_candidate(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

/// Builds records for `column`, numbering every row from 1 whether or not it has a value.
pub fn records_from_rows(rows: Vec<RawRow>, column: &str) -> Vec<Record> {
    rows.into_iter()
        .enumerate()
        .map(|(index, raw_row)| {
            let value = raw_row.get(column).map(cell_text).unwrap_or_default();
            Record {
                id: index + 1,
                value,
                raw_row,
            }
        })
        .collect()
}

/// Renders a cell as plain text; `null` becomes the empty string.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wire shape of one request entry sent to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub id: usize,
    pub value: String,
}

impl From<&Record> for ClassificationRequest {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            value: record.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: usize,
    pub category: String,
}

/// A record joined with its classification; `category` is empty when unclassified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorizedRow {
    pub id: usize,
    pub value: String,
    pub category: String,
    pub raw_row: RawRow,
}

impl CategorizedRow {
    pub fn is_classified(&self) -> bool {
        !self.category.is_empty()
    }

    /// Resolves a field by name: `id` and `category` are synthetic, anything else is a source column.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "id" => Some(serde_json::Value::from(self.id)),
            "category" => Some(serde_json::Value::String(self.category.clone())),
            column => self.raw_row.get(column).cloned(),
        }
    }
}

/// Trimmed, case-folded label used whenever categories are compared.
pub fn normalize_category(label: &str) -> String {
    label.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub selected_categories: BTreeSet<String>,
    pub selected_regions: BTreeSet<String>,
    pub min_cost_by_category: BTreeMap<String, f64>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.selected_categories.insert(normalize_category(category));
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.selected_regions.insert(region.trim().to_string());
        self
    }

    pub fn with_min_cost(mut self, category: &str, amount: f64) -> Self {
        self.min_cost_by_category
            .insert(normalize_category(category), amount);
        self
    }

    pub fn toggle_category(&mut self, category: &str) {
        let key = normalize_category(category);
        if !self.selected_categories.remove(&key) {
            self.selected_categories.insert(key);
        }
    }

    pub fn toggle_region(&mut self, region: &str) {
        let key = region.trim().to_string();
        if !self.selected_regions.remove(&key) {
            self.selected_regions.insert(key);
        }
    }

    /// `None` clears the threshold for that category.
    pub fn set_min_cost(&mut self, category: &str, amount: Option<f64>) {
        let key = normalize_category(category);
        match amount {
            Some(amount) => {
                self.min_cost_by_category.insert(key, amount);
            }
            None => {
                self.min_cost_by_category.remove(&key);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected_categories.is_empty()
            && self.selected_regions.is_empty()
            && self.min_cost_by_category.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: Option<String>,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn by(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: Some(key.into()),
            direction,
        }
    }

    /// Clicking the active key flips the direction; a new key starts ascending.
    pub fn toggle(&mut self, key: &str) {
        if self.key.as_deref() == Some(key) {
            self.direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
        } else {
            self.key = Some(key.to_string());
            self.direction = SortDirection::Ascending;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed_batches: usize,
    pub total_batches: usize,
}

impl Progress {
    pub fn new(completed_batches: usize, total_batches: usize) -> Self {
        Self {
            completed_batches,
            total_batches,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.total_batches == 0
    }
}
