use crate::core::taxonomy::Taxonomy;
use crate::domain::model::ClassificationRequest;
use crate::domain::ports::Classifier;
use crate::utils::error::{ClassifyError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_output_tokens: u32,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            max_output_tokens: 8192,
        }
    }
}

/// Classifier backed by a `generateContent` endpoint in JSON output mode.
pub struct GeminiClassifier {
    client: Client,
    settings: GeminiSettings,
    api_key: String,
    taxonomy: Taxonomy,
}

impl GeminiClassifier {
    /// Fails with `MissingCredentialError` when neither the settings nor the
    /// environment provide an API key.
    pub fn new(settings: GeminiSettings, taxonomy: Taxonomy) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty() && !key.starts_with("${"))
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| ClassifyError::MissingCredentialError {
                message: format!("set classifier.api_key or the {} variable", API_KEY_ENV),
            })?;

        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            settings,
            api_key,
            taxonomy,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    pub fn build_prompt(&self, batch: &[ClassificationRequest]) -> Result<String> {
        let labels = serde_json::to_string(self.taxonomy.labels())?;
        let data = serde_json::to_string_pretty(batch)?;
        let catch_all = self.taxonomy.catch_all();

        Ok(format!(
            r#"You are an expert procurement analyst. Categorize each procurement item by its description.

Respond with a JSON array in the same order as the input, one object per entry, each with "id" (number), "value" (string) and "category" (string).

## CATEGORY LIST
The "category" value MUST be one of these exact strings: {labels}.

## INSTRUCTIONS
- "инф.структура" is for network hardware, servers, data centers.
- "строительство/ремонт" is for construction, renovation, road work and related works.
- "по/лицензии" is for software and licenses.
- "одежда/сиз" is for clothing and personal protective equipment.
- If no category fits, use "{catch_all}". Never leave the category blank or invent new categories.

## EXAMPLES
- "Работы по возведению (строительству) нежилых зданий/сооружений" -> "строительство/ремонт"
- "Работы по среднему ремонту автомобильной дороги" -> "строительство/ремонт"
- "Сервер HPE ProLiant" -> "инф.структура"
- "Лицензия на антивирус" -> "по/лицензии"

## DATA
{data}
"#
        ))
    }

    fn request_body(&self, prompt: String) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "response_mime_type": "application/json",
                "max_output_tokens": self.settings.max_output_tokens,
            },
            "safetySettings": [
                { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_ONLY_HIGH" },
                { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_ONLY_HIGH" },
            ],
        })
    }
}

/// Pulls the generated text out of a `generateContent` response.
fn response_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Value> {
        let body = self.request_body(self.build_prompt(batch)?);
        tracing::debug!("Sending {} entries to {}", batch.len(), self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Classifier response status: {}", status);
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClassifyError::ServiceError {
                message: format!("HTTP {}: {}", status, detail.chars().take(300).collect::<String>()),
            });
        }

        let payload: Value = response.json().await?;
        let text = response_text(&payload).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ClassifyError::ServiceError {
                message: "empty response, possibly blocked by safety filters".to_string(),
            });
        }

        serde_json::from_str(&text).map_err(|e| ClassifyError::ServiceError {
            message: format!("response text is not valid JSON: {}", e),
        })
    }
}
