use crate::domain::model::{CategorizedRow, ClassificationResult, Record};
use std::collections::HashMap;

/// Left join of `records` with `results` on `id`, in record order.
///
/// Every record yields exactly one row; unclassified records get an empty
/// category and results for unknown ids are dropped. When a result id repeats,
/// the later result wins.
pub fn merge(records: &[Record], results: &[ClassificationResult]) -> Vec<CategorizedRow> {
    let by_id: HashMap<usize, &str> = results
        .iter()
        .map(|r| (r.id, r.category.as_str()))
        .collect();

    let orphans = by_id
        .keys()
        .filter(|id| **id == 0 || **id > records.len())
        .count();
    if orphans > 0 {
        tracing::debug!("Discarding {} results with unknown ids", orphans);
    }

    records
        .iter()
        .map(|record| CategorizedRow {
            id: record.id,
            value: record.value.clone(),
            category: by_id.get(&record.id).copied().unwrap_or_default().to_string(),
            raw_row: record.raw_row.clone(),
        })
        .collect()
}
