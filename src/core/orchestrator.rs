use crate::core::aggregator;
use crate::core::chunker::{batch_count, chunk};
use crate::core::retry::{BatchOutcome, RetryingBatchRunner};
use crate::domain::model::{CategorizedRow, ClassificationResult, Progress, Record};
use crate::domain::ports::{Classifier, Sleeper};
use crate::utils::error::{ClassifyError, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    /// `batch_index` is 1-based.
    Aborted { batch_index: usize, attempts: u32 },
    /// The run never started; the message says why.
    Rejected(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }
}

/// Read-only view of a run, published after every observable change.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub state: RunState,
    pub progress: Progress,
    pub results: Arc<[ClassificationResult]>,
    pub errors: Arc<[String]>,
}

impl PipelineSnapshot {
    /// Rows as they stand at this snapshot: `records` joined with the results so far.
    pub fn merged(&self, records: &[Record]) -> Vec<CategorizedRow> {
        aggregator::merge(records, &self.results)
    }
}

/// Progress, accumulated results and user-visible errors for the current run.
///
/// Only the orchestrator mutates it; everyone else reads snapshots.
pub struct PipelineContext {
    state: RunState,
    progress: Progress,
    results: Vec<ClassificationResult>,
    errors: Vec<String>,
    publisher: watch::Sender<PipelineSnapshot>,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineContext {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(PipelineSnapshot {
            state: RunState::Idle,
            progress: Progress::default(),
            results: Arc::from(Vec::new()),
            errors: Arc::from(Vec::new()),
        });
        Self {
            state: RunState::Idle,
            progress: Progress::default(),
            results: Vec::new(),
            errors: Vec::new(),
            publisher,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            state: self.state.clone(),
            progress: self.progress,
            results: Arc::from(self.results.clone()),
            errors: Arc::from(self.errors.clone()),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn results(&self) -> &[ClassificationResult] {
        &self.results
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Back to `Idle` with nothing accumulated.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.progress = Progress::default();
        self.results.clear();
        self.errors.clear();
        self.publish();
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }

    fn reject(&mut self, message: String) {
        self.errors.push(message.clone());
        self.state = RunState::Rejected(message);
        self.publish();
    }
}

/// Logs published progress until the run reaches a terminal state or the
/// publisher is dropped.
pub async fn log_progress(mut receiver: watch::Receiver<PipelineSnapshot>) {
    while receiver.changed().await.is_ok() {
        let snapshot = receiver.borrow_and_update().clone();
        if snapshot.state.is_terminal() {
            break;
        }
        if !snapshot.progress.is_idle() {
            tracing::info!(
                "⏳ {}/{} batches done",
                snapshot.progress.completed_batches,
                snapshot.progress.total_batches
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    pub total_batches: usize,
    pub processed_batches: usize,
    pub classified: usize,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Error describing the failed batch of an aborted run.
    pub fn error(&self) -> Option<ClassifyError> {
        match self.state {
            RunState::Aborted {
                batch_index,
                attempts,
            } => Some(ClassifyError::BatchFailedError {
                batch_index,
                attempts,
            }),
            _ => None,
        }
    }
}

/// Sends batches through the runner strictly one after another.
pub struct PipelineOrchestrator<C: Classifier, S: Sleeper> {
    runner: RetryingBatchRunner<C, S>,
    batch_size: usize,
    context: PipelineContext,
}

impl<C: Classifier, S: Sleeper> PipelineOrchestrator<C, S> {
    pub fn new(runner: RetryingBatchRunner<C, S>, batch_size: usize) -> Self {
        Self {
            runner,
            batch_size,
            context: PipelineContext::new(),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.context.subscribe()
    }

    pub fn reset(&mut self) {
        self.context.reset();
    }

    /// Classifies the non-blank records of `column`.
    ///
    /// Returns `Err` only when the run cannot start (bad batch size, nothing to
    /// classify). A batch that exhausts its retries ends the run as
    /// `RunState::Aborted` and keeps everything classified before it.
    pub async fn run(&mut self, column: &str, records: &[Record]) -> Result<RunSummary> {
        self.context.reset();

        let candidates: Vec<Record> = records
            .iter()
            .filter(|r| r.is_candidate())
            .cloned()
            .collect();

        let batches = match chunk(&candidates, self.batch_size) {
            Ok(batches) => batches,
            Err(err) => {
                self.context.reject(err.to_string());
                return Err(err);
            }
        };
        if candidates.is_empty() {
            let err = ClassifyError::EmptyInputError {
                column: column.to_string(),
            };
            self.context.reject(err.user_friendly_message());
            return Err(err);
        }

        let total = batch_count(candidates.len(), self.batch_size);
        let started = Instant::now();
        tracing::info!(
            "🚀 Classifying {} of {} records from '{}' in {} batches",
            candidates.len(),
            records.len(),
            column,
            total
        );
        self.context.state = RunState::Running;

        for (index, batch) in batches.enumerate() {
            self.context.progress = Progress::new(index, total);
            self.context.publish();
            tracing::info!("📦 Batch {}/{} ({} records)", index + 1, total, batch.len());

            let report = self.runner.run(batch).await;
            match report.outcome {
                BatchOutcome::Classified(results) => {
                    self.context.results.extend(results);
                    self.context.publish();
                }
                BatchOutcome::Malformed => {
                    tracing::warn!("Batch {} produced no results (malformed response)", index + 1);
                }
                BatchOutcome::Failed {
                    attempts,
                    last_error,
                } => {
                    let err = ClassifyError::BatchFailedError {
                        batch_index: index + 1,
                        attempts,
                    };
                    tracing::error!("❌ {} (last error: {})", err, last_error);
                    self.context.errors.push(err.user_friendly_message());
                    self.context.state = RunState::Aborted {
                        batch_index: index + 1,
                        attempts,
                    };
                    self.context.progress = Progress::default();
                    self.context.publish();
                    return Ok(RunSummary {
                        state: self.context.state.clone(),
                        total_batches: total,
                        processed_batches: index,
                        classified: self.context.results.len(),
                    });
                }
            }
        }

        self.context.state = RunState::Completed;
        self.context.progress = Progress::default();
        self.context.publish();
        tracing::info!(
            "✅ Classified {} records in {:?}",
            self.context.results.len(),
            started.elapsed()
        );

        Ok(RunSummary {
            state: RunState::Completed,
            total_batches: total,
            processed_batches: total,
            classified: self.context.results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::RetryPolicy;
    use crate::domain::model::{ClassificationRequest, RawRow};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every batch with one category per entry, failing any batch whose first id is in `fail_on`.
    struct EchoClassifier {
        fail_on: Vec<usize>,
        batch_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Classifier for EchoClassifier {
        async fn classify(&self, batch: &[ClassificationRequest]) -> Result<serde_json::Value> {
            self.batch_sizes.lock().unwrap().push(batch.len());
            if self.fail_on.contains(&batch[0].id) {
                return Err(ClassifyError::ServiceError {
                    message: "rate limited".to_string(),
                });
            }
            Ok(json!(batch
                .iter()
                .map(|_| json!({"category": "айти"}))
                .collect::<Vec<_>>()))
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn records(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|id| Record {
                id,
                value: format!("item {}", id),
                raw_row: RawRow::new(),
            })
            .collect()
    }

    fn orchestrator(fail_on: Vec<usize>, batch_size: usize) -> PipelineOrchestrator<EchoClassifier, NoSleep> {
        let classifier = EchoClassifier {
            fail_on,
            batch_sizes: Mutex::new(Vec::new()),
        };
        let runner = RetryingBatchRunner::new(classifier, NoSleep)
            .with_policy(RetryPolicy::new(3, Duration::from_millis(1)));
        PipelineOrchestrator::new(runner, batch_size)
    }

    #[tokio::test]
    async fn test_completed_run_resets_progress() {
        let mut orchestrator = orchestrator(vec![], 2);
        let summary = orchestrator.run("Name", &records(5)).await.unwrap();

        assert!(summary.is_completed());
        assert_eq!(summary.total_batches, 3);
        assert_eq!(summary.classified, 5);
        assert_eq!(orchestrator.context().progress(), Progress::default());
        assert_eq!(orchestrator.context().state(), &RunState::Completed);
        assert_eq!(
            *orchestrator.runner.classifier().batch_sizes.lock().unwrap(),
            vec![2, 2, 1]
        );
    }

    #[tokio::test]
    async fn test_abort_keeps_earlier_results() {
        let mut orchestrator = orchestrator(vec![101], 100);
        let summary = orchestrator.run("Name", &records(250)).await.unwrap();

        assert_eq!(
            summary.state,
            RunState::Aborted {
                batch_index: 2,
                attempts: 3
            }
        );
        assert_eq!(summary.processed_batches, 1);
        assert_eq!(orchestrator.context().results().len(), 100);
        assert!(orchestrator.context().results().iter().all(|r| r.id <= 100));
        assert_eq!(orchestrator.context().errors(), ["Batch 2 failed after 3 attempts."]);
        // 1 call for batch 1, 3 for batch 2, batch 3 never attempted
        assert_eq!(orchestrator.runner.classifier().batch_sizes.lock().unwrap().len(), 4);
        assert!(matches!(
            summary.error(),
            Some(ClassifyError::BatchFailedError { batch_index: 2, attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn test_blank_records_rejected_before_running() {
        let mut orchestrator = orchestrator(vec![], 10);
        let blank = vec![Record {
            id: 1,
            value: "  ".to_string(),
            raw_row: RawRow::new(),
        }];

        let err = orchestrator.run("Name", &blank).await.unwrap_err();

        assert!(matches!(err, ClassifyError::EmptyInputError { .. }));
        assert!(matches!(orchestrator.context().state(), RunState::Rejected(_)));
        assert!(orchestrator.runner.classifier().batch_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let mut orchestrator = orchestrator(vec![], 0);
        let err = orchestrator.run("Name", &records(3)).await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidConfigValueError { .. }));
    }

    #[tokio::test]
    async fn test_final_snapshot_after_completion() {
        let mut orchestrator = orchestrator(vec![], 2);
        let mut receiver = orchestrator.subscribe();

        orchestrator.run("Name", &records(4)).await.unwrap();

        let latest = receiver.borrow_and_update().clone();
        assert_eq!(latest.state, RunState::Completed);
        assert!(latest.state.is_terminal());
        assert_eq!(latest.results.len(), 4);
        assert!(latest.progress.is_idle());
    }

    /// Records what a subscriber sees each time a batch reaches the classifier.
    #[derive(Default)]
    struct Observer {
        receiver: Mutex<Option<watch::Receiver<PipelineSnapshot>>>,
        seen: Mutex<Vec<(Progress, usize, RunState)>>,
    }

    #[async_trait]
    impl Classifier for Observer {
        async fn classify(&self, batch: &[ClassificationRequest]) -> Result<serde_json::Value> {
            if let Some(receiver) = self.receiver.lock().unwrap().as_ref() {
                let snapshot = receiver.borrow().clone();
                self.seen
                    .lock()
                    .unwrap()
                    .push((snapshot.progress, snapshot.results.len(), snapshot.state));
            }
            Ok(json!(batch
                .iter()
                .map(|_| json!({"category": "телеком"}))
                .collect::<Vec<_>>()))
        }
    }

    #[tokio::test]
    async fn test_progress_and_results_published_before_each_batch() {
        let runner = RetryingBatchRunner::new(Observer::default(), NoSleep);
        let mut orchestrator = PipelineOrchestrator::new(runner, 2);
        *orchestrator.runner.classifier().receiver.lock().unwrap() = Some(orchestrator.subscribe());

        orchestrator.run("Name", &records(5)).await.unwrap();

        let seen = orchestrator.runner.classifier().seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (Progress::new(0, 3), 0, RunState::Running),
                (Progress::new(1, 3), 2, RunState::Running),
                (Progress::new(2, 3), 4, RunState::Running),
            ]
        );
        assert!(seen.iter().all(|(_, _, state)| !state.is_terminal()));
    }

    #[tokio::test]
    async fn test_progress_logger_stops_at_terminal_state() {
        let mut orchestrator = orchestrator(vec![], 2);
        let reporter = tokio::spawn(log_progress(orchestrator.subscribe()));

        orchestrator.run("Name", &records(5)).await.unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(1), reporter).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_snapshot_merges_partial_results() {
        let mut orchestrator = orchestrator(vec![3], 2);
        let source = records(5);

        orchestrator.run("Name", &source).await.unwrap();

        let rows = orchestrator.context().snapshot().merged(&source);
        assert_eq!(rows.len(), 5);
        let classified: Vec<usize> = rows
            .iter()
            .filter(|row| row.is_classified())
            .map(|row| row.id)
            .collect();
        assert_eq!(classified, vec![1, 2]);
        assert!(orchestrator.context().state().is_terminal());
    }
}
