use serde::{Deserialize, Serialize};

/// Meaning a source column can carry, independent of its header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticRole {
    Region,
    Cost,
}

/// Decides whether a header plays a role. Swap implementations to change alias sets.
pub trait ColumnMatcher: Send + Sync {
    fn matches(&self, role: SemanticRole, header: &str) -> bool;
}

/// Header aliases per role: region matches by substring, cost by equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMatcher {
    pub region_aliases: Vec<String>,
    pub cost_aliases: Vec<String>,
}

impl Default for AliasMatcher {
    fn default() -> Self {
        Self {
            region_aliases: ["регион", "область", "region"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cost_aliases: ["стоимость", "сумма", "цена", "cost", "amount"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ColumnMatcher for AliasMatcher {
    fn matches(&self, role: SemanticRole, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        match role {
            SemanticRole::Region => self
                .region_aliases
                .iter()
                .any(|alias| header.contains(&alias.to_lowercase())),
            SemanticRole::Cost => self
                .cost_aliases
                .iter()
                .any(|alias| header == alias.to_lowercase()),
        }
    }
}

impl<F> ColumnMatcher for F
where
    F: Fn(SemanticRole, &str) -> bool + Send + Sync,
{
    fn matches(&self, role: SemanticRole, header: &str) -> bool {
        self(role, header)
    }
}

/// Headers resolved for each role; `None` leaves filters tied to that role inert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemanticColumns {
    pub region: Option<String>,
    pub cost: Option<String>,
}

impl SemanticColumns {
    /// First header (in sheet order) matching each role.
    pub fn detect(headers: &[String], matcher: &dyn ColumnMatcher) -> Self {
        let find = |role| {
            headers
                .iter()
                .find(|h| matcher.matches(role, h))
                .cloned()
        };
        let detected = Self {
            region: find(SemanticRole::Region),
            cost: find(SemanticRole::Cost),
        };
        tracing::debug!(
            "Semantic columns: region={:?}, cost={:?}",
            detected.region,
            detected.cost
        );
        detected
    }

    pub fn get(&self, role: SemanticRole) -> Option<&str> {
        match role {
            SemanticRole::Region => self.region.as_deref(),
            SemanticRole::Cost => self.cost.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_aliases() {
        let columns = SemanticColumns::detect(
            &headers(&["Наименование", "Регион поставки", "Стоимость"]),
            &AliasMatcher::default(),
        );
        assert_eq!(columns.region.as_deref(), Some("Регион поставки"));
        assert_eq!(columns.cost.as_deref(), Some("Стоимость"));
    }

    #[test]
    fn test_cost_requires_exact_header() {
        let columns = SemanticColumns::detect(
            &headers(&["Name", "Total cost estimate"]),
            &AliasMatcher::default(),
        );
        assert_eq!(columns, SemanticColumns::default());
        assert_eq!(columns.get(SemanticRole::Cost), None);
    }

    #[test]
    fn test_closure_matcher() {
        let matcher = |role: SemanticRole, header: &str| {
            role == SemanticRole::Cost && header.starts_with("Preis")
        };
        let columns = SemanticColumns::detect(&headers(&["Artikel", "Preis (EUR)"]), &matcher);
        assert_eq!(columns.get(SemanticRole::Cost), Some("Preis (EUR)"));
        assert_eq!(columns.region, None);
    }
}
