use crate::domain::model::normalize_category;
use std::collections::HashMap;

pub const DEFAULT_LABELS: [&str; 11] = [
    "айти",
    "телеком",
    "инф.структура",
    "строительство/ремонт",
    "оборудование",
    "по/лицензии",
    "транспорт/логистика",
    "канцтовары/хозтовары",
    "одежда/сиз",
    "услуги (прочее)",
    "прочее",
];

pub const DEFAULT_CATCH_ALL: &str = "прочее";
pub const FALLBACK_COLOR: &str = "#f3f4f6";

/// Closed set of category labels plus the catch-all used for anything else.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    labels: Vec<String>,
    catch_all: String,
    colors: HashMap<String, String>,
}

/// Fill colors shown for the most common categories.
pub fn default_colors() -> HashMap<String, String> {
    [
        ("айти", "#d1fae5"),
        ("телеком", "#cffafe"),
        ("инф.структура", "#fef9c3"),
        ("прочее", "#fee2e2"),
    ]
    .into_iter()
    .map(|(label, color)| (label.to_string(), color.to_string()))
    .collect()
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(
            DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            DEFAULT_CATCH_ALL.to_string(),
        )
        .with_colors(default_colors())
    }
}

impl Taxonomy {
    pub fn new(labels: Vec<String>, catch_all: String) -> Self {
        let mut labels: Vec<String> = labels.into_iter().map(|l| l.trim().to_string()).collect();
        let catch_all = catch_all.trim().to_string();
        if !labels
            .iter()
            .any(|l| normalize_category(l) == normalize_category(&catch_all))
        {
            labels.push(catch_all.clone());
        }
        Self {
            labels,
            catch_all,
            colors: HashMap::new(),
        }
    }

    pub fn with_colors(mut self, colors: HashMap<String, String>) -> Self {
        self.colors = colors
            .into_iter()
            .map(|(label, color)| (normalize_category(&label), color))
            .collect();
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn catch_all(&self) -> &str {
        &self.catch_all
    }

    /// Canonical spelling of `label` if it belongs to the taxonomy.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        let wanted = normalize_category(label);
        self.labels
            .iter()
            .find(|l| normalize_category(l) == wanted)
            .map(String::as_str)
    }

    /// Maps any label into the taxonomy, falling back to the catch-all.
    pub fn coerce(&self, label: &str) -> String {
        match self.resolve(label) {
            Some(known) => known.to_string(),
            None => {
                tracing::warn!(
                    "Category '{}' is outside the taxonomy, using '{}'",
                    label,
                    self.catch_all
                );
                self.catch_all.clone()
            }
        }
    }

    pub fn color_for(&self, category: &str) -> &str {
        self.colors
            .get(&normalize_category(category))
            .map(String::as_str)
            .unwrap_or(FALLBACK_COLOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_and_whitespace_insensitive() {
        let taxonomy = Taxonomy::default();
        assert_eq!(taxonomy.resolve("  ИНФ.СТРУКТУРА "), Some("инф.структура"));
        assert_eq!(taxonomy.resolve("мебель"), None);
    }

    #[test]
    fn test_coerce_unknown_to_catch_all() {
        let taxonomy = Taxonomy::default();
        assert_eq!(taxonomy.coerce("Телеком"), "телеком");
        assert_eq!(taxonomy.coerce("мебель"), "прочее");
        assert_eq!(taxonomy.coerce(""), "прочее");
    }

    #[test]
    fn test_catch_all_always_in_labels() {
        let taxonomy = Taxonomy::new(vec!["a".to_string()], "other".to_string());
        assert_eq!(taxonomy.labels(), ["a".to_string(), "other".to_string()]);
    }

    #[test]
    fn test_colors() {
        let taxonomy = Taxonomy::default();
        assert_eq!(taxonomy.color_for("АЙТИ"), "#d1fae5");
        assert_eq!(taxonomy.color_for("оборудование"), FALLBACK_COLOR);
    }
}
