use crate::core::taxonomy::Taxonomy;
use crate::domain::model::{ClassificationRequest, ClassificationResult, Record};
use crate::domain::ports::{Classifier, Sleeper};
use crate::utils::error::{ClassifyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);

/// How response entries are matched back to request entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMapping {
    /// Entry `i` classifies request `i`; any echoed id is only checked for a warning.
    #[default]
    Positional,
    /// Every entry must echo an id from the batch; anything else fails the attempt.
    ById,
}

/// What to do when the response body is not a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedResponsePolicy {
    /// Accept the batch with zero results and move on. Suspect, but matches
    /// long-standing behavior.
    #[default]
    TreatAsEmpty,
    /// Count it as a failed attempt.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Wait after failed attempt `attempt` (1-based): `d, 2d, 4d, ...`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempting(u32),
    Succeeded(u32),
    PermanentFailure(u32),
}

impl AttemptState {
    pub fn after_success(self) -> Self {
        match self {
            Self::Attempting(n) => Self::Succeeded(n),
            done => done,
        }
    }

    pub fn after_failure(self, policy: &RetryPolicy) -> Self {
        match self {
            Self::Attempting(n) if n < policy.max_attempts => Self::Attempting(n + 1),
            Self::Attempting(n) => Self::PermanentFailure(n),
            done => done,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Classified(Vec<ClassificationResult>),
    /// The service answered with something other than a list; nothing was merged.
    Malformed,
    Failed { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub attempts: u32,
}

impl BatchReport {
    pub fn results(&self) -> &[ClassificationResult] {
        match &self.outcome {
            BatchOutcome::Classified(results) => results,
            _ => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Failed { .. })
    }
}

/// Drives one batch through a classifier with bounded retries and exponential backoff.
pub struct RetryingBatchRunner<C: Classifier, S: Sleeper> {
    classifier: C,
    sleeper: S,
    policy: RetryPolicy,
    mapping: ResponseMapping,
    malformed: MalformedResponsePolicy,
    taxonomy: Taxonomy,
}

impl<C: Classifier, S: Sleeper> RetryingBatchRunner<C, S> {
    pub fn new(classifier: C, sleeper: S) -> Self {
        Self {
            classifier,
            sleeper,
            policy: RetryPolicy::default(),
            mapping: ResponseMapping::default(),
            malformed: MalformedResponsePolicy::default(),
            taxonomy: Taxonomy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_mapping(mut self, mapping: ResponseMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_malformed_policy(mut self, malformed: MalformedResponsePolicy) -> Self {
        self.malformed = malformed;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Never returns an error: exhausting every attempt is reported as `BatchOutcome::Failed`.
    pub async fn run(&self, batch: &[Record]) -> BatchReport {
        let request: Vec<ClassificationRequest> = batch.iter().map(Into::into).collect();
        let mut state = AttemptState::Attempting(1);
        let mut last_error = String::new();

        while let AttemptState::Attempting(attempt) = state {
            match self.attempt(&request).await {
                Ok(outcome) => {
                    tracing::debug!("Batch of {} classified on attempt {}", request.len(), attempt);
                    return BatchReport {
                        outcome,
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        "Classification attempt {}/{} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        err
                    );
                    last_error = err.to_string();
                    state = state.after_failure(&self.policy);
                    if matches!(state, AttemptState::Attempting(_)) {
                        self.sleeper.sleep(self.policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        let attempts = match state {
            AttemptState::PermanentFailure(n)
            | AttemptState::Succeeded(n)
            | AttemptState::Attempting(n) => n,
        };
        BatchReport {
            outcome: BatchOutcome::Failed {
                attempts,
                last_error,
            },
            attempts,
        }
    }

    async fn attempt(&self, request: &[ClassificationRequest]) -> Result<BatchOutcome> {
        let body = self.classifier.classify(request).await?;
        let entries = match body {
            serde_json::Value::Array(entries) => entries,
            other => {
                return match self.malformed {
                    MalformedResponsePolicy::TreatAsEmpty => {
                        tracing::warn!(
                            "Classifier response is not a list, accepting batch with no results: {}",
                            truncate(&other.to_string(), 200)
                        );
                        Ok(BatchOutcome::Malformed)
                    }
                    MalformedResponsePolicy::Retry => Err(ClassifyError::MalformedResponseError {
                        message: "expected a JSON array".to_string(),
                    }),
                };
            }
        };

        let results = match self.mapping {
            ResponseMapping::Positional => self.map_positionally(request, &entries),
            ResponseMapping::ById => self.map_by_id(request, &entries)?,
        };
        Ok(BatchOutcome::Classified(results))
    }

    fn map_positionally(
        &self,
        request: &[ClassificationRequest],
        entries: &[serde_json::Value],
    ) -> Vec<ClassificationResult> {
        if entries.len() != request.len() {
            tracing::warn!(
                "Classifier returned {} entries for {} requests",
                entries.len(),
                request.len()
            );
        }

        request
            .iter()
            .zip(entries)
            .enumerate()
            .filter_map(|(position, (req, entry))| {
                if let Some(echoed) = entry_id(entry) {
                    if echoed != req.id as i64 {
                        tracing::warn!(
                            "Entry {} echoes id {} but is mapped to id {} by position",
                            position,
                            echoed,
                            req.id
                        );
                    }
                }
                let category = entry_category(entry)?;
                Some(ClassificationResult {
                    id: req.id,
                    category: self.taxonomy.coerce(category),
                })
            })
            .collect()
    }

    fn map_by_id(
        &self,
        request: &[ClassificationRequest],
        entries: &[serde_json::Value],
    ) -> Result<Vec<ClassificationResult>> {
        let known: HashSet<usize> = request.iter().map(|r| r.id).collect();
        let mut results = Vec::with_capacity(entries.len());

        for (position, entry) in entries.iter().enumerate() {
            let id = entry_id(entry).ok_or_else(|| ClassifyError::MalformedResponseError {
                message: format!("entry {} has no id", position),
            })?;
            if id < 1 || !known.contains(&(id as usize)) {
                return Err(ClassifyError::ResponseMismatchError { position, found: id });
            }
            if let Some(category) = entry_category(entry) {
                results.push(ClassificationResult {
                    id: id as usize,
                    category: self.taxonomy.coerce(category),
                });
            }
        }
        Ok(results)
    }
}

fn entry_id(entry: &serde_json::Value) -> Option<i64> {
    match entry.get("id")? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn entry_category(entry: &serde_json::Value) -> Option<&str> {
    entry.get("category")?.as_str()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
