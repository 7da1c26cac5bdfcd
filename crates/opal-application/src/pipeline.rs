//! Pipeline run orchestration.
//!
//! A run executes its stages strictly in ascending `order`, one at a time.
//! Before each stage the run re-checks the stop flag, the budget gate, and
//! the pause flag, so control actions take effect at the next stage
//! boundary. Stage execution itself happens outside the run lock; only the
//! bookkeeping before and after holds it.

use opal_core::error::{OpalError, Result};
use opal_core::pipeline::{ResultBucket, Stage, StageExecutor, StageResult, StageStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Loaded but not started.
    #[default]
    Idle,
    /// A `run()` call is advancing stages.
    Running,
    /// Paused at a stage boundary; `resume()` picks up the next pending
    /// stage.
    Paused,
    /// Stopped, by request or by a halt (budget, stage failure).
    Stopped,
    /// All stages completed.
    Completed,
}

/// Shared control flags for an in-flight run.
///
/// Handed out by [`PipelineOrchestrator::controls`] so callers (and stage
/// executors, if they want to) can pause or stop without holding a
/// reference to the orchestrator itself.
#[derive(Debug, Default)]
pub struct PipelineControls {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl PipelineControls {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of a run, also the shape stored in run history.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    /// The prompt the run started from.
    pub prompt: String,
    /// Stage states at snapshot time.
    pub stages: Vec<Stage>,
    /// Results routed by bucket.
    pub results: HashMap<ResultBucket, Vec<StageResult>>,
    /// Cumulative spend (USD). Monotonic within a run.
    pub spend: f64,
    /// Run lifecycle state.
    pub state: RunState,
    /// Completed stages as a percentage of all stages.
    pub progress_percent: u8,
}

#[derive(Default)]
struct RunInner {
    prompt: String,
    stages: Vec<Stage>,
    results: HashMap<ResultBucket, Vec<StageResult>>,
    spend: f64,
    state: RunState,
}

impl RunInner {
    fn progress_percent(&self) -> u8 {
        if self.stages.is_empty() {
            return 0;
        }
        let completed = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        ((completed * 100) / self.stages.len()) as u8
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            prompt: self.prompt.clone(),
            stages: self.stages.clone(),
            results: self.results.clone(),
            spend: self.spend,
            state: self.state,
            progress_percent: self.progress_percent(),
        }
    }
}

/// Drives multi-stage optimization runs through a [`StageExecutor`].
pub struct PipelineOrchestrator {
    executor: Arc<dyn StageExecutor>,
    budget_limit: f64,
    controls: Arc<PipelineControls>,
    inner: Arc<RwLock<RunInner>>,
    /// Completed runs, most recent first.
    history: Arc<RwLock<VecDeque<RunSnapshot>>>,
    history_limit: usize,
}

impl PipelineOrchestrator {
    pub fn new(executor: Arc<dyn StageExecutor>, budget_limit: f64, history_limit: usize) -> Self {
        Self {
            executor,
            budget_limit,
            controls: Arc::new(PipelineControls::default()),
            inner: Arc::new(RwLock::new(RunInner::default())),
            history: Arc::new(RwLock::new(VecDeque::new())),
            history_limit,
        }
    }

    /// Shared control flags for the current run.
    pub fn controls(&self) -> Arc<PipelineControls> {
        self.controls.clone()
    }

    /// Loads a fresh run, replacing any previous one. Stages are reordered
    /// by ascending `order` and control flags are cleared.
    pub async fn load(&self, prompt: impl Into<String>, mut stages: Vec<Stage>) {
        stages.sort_by_key(|s| s.order);
        self.controls.paused.store(false, Ordering::SeqCst);
        self.controls.stopped.store(false, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        *inner = RunInner {
            prompt: prompt.into(),
            stages,
            ..RunInner::default()
        };
    }

    /// Advances the loaded run until it completes, pauses, stops, or halts.
    ///
    /// # Errors
    ///
    /// Returns `BudgetExceeded` when cumulative spend reaches the budget
    /// limit before a pending stage, and a `Stage` error when an executor
    /// fails. Either halt leaves the run Stopped; the failing stage keeps
    /// its error message.
    pub async fn run(&self) -> Result<()> {
        loop {
            // Stage boundary: control flags and budget are re-checked here.
            if self.controls.is_stopped() {
                let mut inner = self.inner.write().await;
                inner.state = RunState::Stopped;
                tracing::info!("pipeline run stopped");
                return Ok(());
            }

            let (stage, input) = {
                let mut inner = self.inner.write().await;

                let Some(index) = inner
                    .stages
                    .iter()
                    .position(|s| s.status != StageStatus::Completed)
                else {
                    if inner.state != RunState::Completed {
                        inner.state = RunState::Completed;
                        let snapshot = inner.snapshot();
                        drop(inner);
                        self.record_history(snapshot).await;
                    }
                    return Ok(());
                };

                if inner.spend >= self.budget_limit {
                    inner.state = RunState::Stopped;
                    tracing::warn!(
                        spend = inner.spend,
                        limit = self.budget_limit,
                        "pipeline halted at budget limit"
                    );
                    return Err(OpalError::budget_exceeded(inner.spend, self.budget_limit));
                }

                if self.controls.is_paused() {
                    inner.state = RunState::Paused;
                    tracing::info!("pipeline run paused");
                    return Ok(());
                }

                inner.state = RunState::Running;
                let input = if index == 0 {
                    inner.prompt.clone()
                } else {
                    // Chained input: the previous stage completed, so its
                    // output is set.
                    inner.stages[index - 1]
                        .output
                        .clone()
                        .unwrap_or_else(|| inner.prompt.clone())
                };
                let stage = &mut inner.stages[index];
                stage.status = StageStatus::Active;
                stage.input = Some(input.clone());
                stage.started_at = Some(chrono::Utc::now().to_rfc3339());
                (stage.clone(), input)
            };

            tracing::debug!(stage = %stage.name, order = stage.order, "executing stage");
            let executed = self.executor.execute(&stage, &input).await;

            let mut inner = self.inner.write().await;
            let Some(slot) = inner.stages.iter_mut().find(|s| s.id == stage.id) else {
                // The run was reloaded while the stage executed.
                return Ok(());
            };
            match executed {
                Ok(result) => {
                    slot.status = StageStatus::Completed;
                    slot.output = Some(result.output.clone());
                    slot.completed_at = Some(chrono::Utc::now().to_rfc3339());
                    slot.token_usage = result.token_usage;
                    inner.spend += result.cost;
                    route_result(&mut inner.results, &stage, &result.output);
                }
                Err(e) => {
                    slot.status = StageStatus::Errored;
                    slot.error = Some(e.to_string());
                    slot.completed_at = Some(chrono::Utc::now().to_rfc3339());
                    inner.state = RunState::Stopped;
                    tracing::warn!(stage = %stage.name, "stage failed: {}", e);
                    return Err(OpalError::stage(&stage.name, e.to_string()));
                }
            }
        }
    }

    /// Requests a pause; takes effect at the next stage boundary.
    pub fn pause(&self) {
        self.controls.pause();
    }

    /// Clears the pause flag and resumes from the first pending stage.
    /// Already-completed stages are not re-executed.
    pub async fn resume(&self) -> Result<()> {
        self.controls.paused.store(false, Ordering::SeqCst);
        self.run().await
    }

    /// Requests a stop. Unlike pause this is terminal for the run.
    pub async fn stop(&self) {
        self.controls.stop();
        let mut inner = self.inner.write().await;
        if inner.state != RunState::Completed {
            inner.state = RunState::Stopped;
        }
    }

    /// Current view of the run.
    pub async fn progress(&self) -> RunSnapshot {
        self.inner.read().await.snapshot()
    }

    /// Completed-run history, most recent first.
    pub async fn history(&self) -> Vec<RunSnapshot> {
        self.history.read().await.iter().cloned().collect()
    }

    async fn record_history(&self, snapshot: RunSnapshot) {
        let mut history = self.history.write().await;
        history.push_front(snapshot);
        history.truncate(self.history_limit);
    }
}

/// Routes a completed stage's output into its bucket. Compare stages
/// additionally copy the result into the Best bucket.
fn route_result(
    results: &mut HashMap<ResultBucket, Vec<StageResult>>,
    stage: &Stage,
    output: &str,
) {
    let bucket = ResultBucket::for_stage_type(stage.stage_type);
    let mut result = StageResult::new(bucket, output);
    result
        .metadata
        .insert("stage_id".to_string(), stage.id.clone());
    result
        .metadata
        .insert("stage_name".to_string(), stage.name.clone());

    if bucket == ResultBucket::Comparison {
        let mut best = result.clone();
        best.id = uuid::Uuid::new_v4().to_string();
        best.bucket = ResultBucket::Best;
        results.entry(ResultBucket::Best).or_default().push(best);
    }
    results.entry(bucket).or_default().push(result);
}
