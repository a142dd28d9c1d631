use crate::core::columns::SemanticColumns;
use crate::domain::model::{cell_text, normalize_category, CategorizedRow, FilterState, SortDirection, SortSpec};
use serde_json::Value;
use std::cmp::Ordering;

/// Reads a money-like cell: every char except digits, `.` and `-` is dropped before parsing.
///
/// `"120 руб."` parses as `120.0`; text with no digits yields `None`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Filters and orders categorized rows for display or export.
#[derive(Debug, Clone, Default)]
pub struct ViewEngine {
    columns: SemanticColumns,
}

impl ViewEngine {
    pub fn new(columns: SemanticColumns) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &SemanticColumns {
        &self.columns
    }

    pub fn view<'a>(
        &self,
        rows: &'a [CategorizedRow],
        filters: &FilterState,
        sort: &SortSpec,
    ) -> Vec<&'a CategorizedRow> {
        let mut visible = self.filter(rows, filters);
        self.sort(&mut visible, sort);
        visible
    }

    pub fn filter<'a, I>(&self, rows: I, filters: &FilterState) -> Vec<&'a CategorizedRow>
    where
        I: IntoIterator<Item = &'a CategorizedRow>,
    {
        rows.into_iter().filter(|row| self.keep(row, filters)).collect()
    }

    /// Region, then category, then cost threshold; the first failing check excludes the row.
    pub fn keep(&self, row: &CategorizedRow, filters: &FilterState) -> bool {
        if let Some(region_column) = &self.columns.region {
            if !filters.selected_regions.is_empty() {
                let region = row.raw_row.get(region_column).map(cell_text).unwrap_or_default();
                if !filters.selected_regions.contains(region.trim()) {
                    return false;
                }
            }
        }

        let category = normalize_category(&row.category);
        if !filters.selected_categories.is_empty()
            && !filters.selected_categories.contains(&category)
        {
            return false;
        }

        if let (Some(threshold), Some(cost_column)) = (
            filters.min_cost_by_category.get(&category),
            &self.columns.cost,
        ) {
            let cost = row
                .raw_row
                .get(cost_column)
                .and_then(|cell| parse_amount(&cell_text(cell)));
            match cost {
                Some(cost) if cost >= *threshold => {}
                _ => return false,
            }
        }

        true
    }

    /// Stable sort; rows with equal keys keep their relative order.
    pub fn sort(&self, rows: &mut [&CategorizedRow], sort: &SortSpec) {
        let Some(key) = sort.key.as_deref() else {
            return;
        };
        let numeric = self.columns.cost.as_deref() == Some(key);

        rows.sort_by(|a, b| {
            let ordering = if numeric {
                amount_or_zero(a.field(key)).total_cmp(&amount_or_zero(b.field(key)))
            } else {
                compare_values(a.field(key).as_ref(), b.field(key).as_ref())
            };
            match sort.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }
}

fn amount_or_zero(cell: Option<Value>) -> f64 {
    cell.and_then(|v| parse_amount(&cell_text(&v)))
        .unwrap_or(0.0)
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Natural ordering within a JSON type; across types, missing < bool < number < string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) if type_rank(a) == type_rank(b) => x.to_string().cmp(&y.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
