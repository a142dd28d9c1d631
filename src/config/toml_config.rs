use crate::adapters::gemini::{GeminiSettings, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::core::chunker::DEFAULT_BATCH_SIZE;
use crate::core::columns::AliasMatcher;
use crate::core::export::DEFAULT_CATEGORY_COLUMN;
use crate::core::retry::{MalformedResponsePolicy, ResponseMapping, RetryPolicy};
use crate::core::taxonomy::{default_colors, Taxonomy, DEFAULT_CATCH_ALL, DEFAULT_LABELS};
use crate::domain::table::{LayoutHints, VerticalAlign};
use crate::utils::error::{ClassifyError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Full configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub classifier: ServiceConfig,
    pub batching: BatchingConfig,
    pub taxonomy: TaxonomyConfig,
    pub columns: ColumnsConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_output_tokens: u32,
    pub response_mapping: ResponseMapping,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_seconds: 120,
            max_output_tokens: 8192,
            response_mapping: ResponseMapping::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub malformed_response: MalformedResponsePolicy,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: 3,
            initial_delay_ms: 2000,
            malformed_response: MalformedResponsePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub labels: Vec<String>,
    pub catch_all: String,
    pub colors: HashMap<String, String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            catch_all: DEFAULT_CATCH_ALL.to_string(),
            colors: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub region_aliases: Option<Vec<String>>,
    pub cost_aliases: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_path: Option<String>,
    pub category_column: String,
    pub column_width: u16,
    pub wrap_text: bool,
    pub vertical_align: VerticalAlign,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let layout = LayoutHints::default();
        Self {
            output_path: None,
            category_column: DEFAULT_CATEGORY_COLUMN.to_string(),
            column_width: layout.column_width,
            wrap_text: layout.wrap_text,
            vertical_align: layout.vertical_align,
        }
    }
}

impl ClassifierConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content)?;
        toml::from_str(&processed).map_err(|e| ClassifyError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.batching.max_attempts,
            Duration::from_millis(self.batching.initial_delay_ms),
        )
    }

    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            base_url: self.classifier.base_url.clone(),
            model: self.classifier.model.clone(),
            api_key: self.classifier.api_key.clone(),
            timeout: Duration::from_secs(self.classifier.timeout_seconds),
            max_output_tokens: self.classifier.max_output_tokens,
        }
    }

    /// Configured colors extend the built-in palette.
    pub fn taxonomy(&self) -> Taxonomy {
        let mut colors = default_colors();
        colors.extend(self.taxonomy.colors.clone());

        Taxonomy::new(self.taxonomy.labels.clone(), self.taxonomy.catch_all.clone()).with_colors(colors)
    }

    pub fn alias_matcher(&self) -> AliasMatcher {
        let defaults = AliasMatcher::default();
        AliasMatcher {
            region_aliases: self
                .columns
                .region_aliases
                .clone()
                .unwrap_or(defaults.region_aliases),
            cost_aliases: self
                .columns
                .cost_aliases
                .clone()
                .unwrap_or(defaults.cost_aliases),
        }
    }

    pub fn layout(&self) -> LayoutHints {
        LayoutHints {
            column_width: self.export.column_width,
            wrap_text: self.export.wrap_text,
            vertical_align: self.export.vertical_align,
        }
    }
}

/// Replaces `${VAR}` with the variable's value; unset variables are left as written.
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ClassifyError::ConfigError {
        message: format!("invalid substitution pattern: {}", e),
    })?;
    let result = re.replace_all(content, |caps: &regex::Captures| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
    });
    Ok(result.into_owned())
}

impl Validate for ClassifierConfig {
    fn validate(&self) -> Result<()> {
        validate_url("classifier.base_url", &self.classifier.base_url)?;
        validate_non_empty_string("classifier.model", &self.classifier.model)?;
        validate_positive_number("batching.batch_size", self.batching.batch_size, 1)?;
        validate_positive_number("batching.max_attempts", self.batching.max_attempts as usize, 1)?;
        validate_non_empty_string("taxonomy.catch_all", &self.taxonomy.catch_all)?;
        if self.taxonomy.labels.is_empty() {
            return Err(ClassifyError::InvalidConfigValueError {
                field: "taxonomy.labels".to_string(),
                value: "[]".to_string(),
                reason: "At least one category label is required".to_string(),
            });
        }
        validate_non_empty_string("export.category_column", &self.export.category_column)?;
        validate_range("export.column_width", self.export.column_width, 1, 255)?;
        if let Some(output_path) = &self.export.output_path {
            validate_path("export.output_path", output_path)?;
        }
        Ok(())
    }
}
