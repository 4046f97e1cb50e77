// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! One tokio task per ready step. Every node carries a counter of
//! predecessors still outstanding; a completion decrements the counters of
//! its successors and a node is dispatched exactly once, when its counter
//! reaches zero. The scheduler loop is the only place that merges outputs
//! into the state, so each dispatched step sees a snapshot taken between
//! two whole merges.

use futures::FutureExt;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, Id, JoinError, JoinSet};
use uuid::Uuid;

use crate::adk::error::{FlowError, StateError};
use crate::ects::envelope::{ResponseEnvelope, RunRequest};
use crate::ects::workflow::registry::Workflow;
use crate::ects::workflow::state::{StateKey, StateUpdate, WorkflowState};

/// Completion record of one step within an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step_id: String,
    pub status: StepStatus,
    /// Execution time in milliseconds; zero if the step never ran
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub invocation_id: String,
    pub state: WorkflowState,
    /// Per-step records in topological order
    pub records: Vec<StepRecord>,
    pub total_elapsed_ms: u64,
}

/// Progress notifications for streaming callers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    StepStarted { step_id: String },
    StepCompleted { step_id: String, elapsed_ms: u64 },
    StepFailed { step_id: String, error: String },
    Completed { response: ResponseEnvelope },
    Error { message: String },
}

type TaskOutput = (String, Duration, Result<StateUpdate, FlowError>);

/// Step ids of the tasks currently on the join set
#[derive(Default)]
struct TaskIds(HashMap<Id, String>);

impl TaskIds {
    fn track(&mut self, handle: &AbortHandle, step_id: &str) {
        self.0.insert(handle.id(), step_id.to_string());
    }

    fn finish(&mut self, id: Id) -> Option<String> {
        self.0.remove(&id)
    }

    /// A task that ended without producing output
    fn lost(&mut self, err: &JoinError) -> FlowError {
        FlowError::StepPanicked {
            step: self
                .finish(err.id())
                .unwrap_or_else(|| "<unknown>".to_string()),
        }
    }
}

/// Mutable bookkeeping for one invocation; never shared between invocations
struct Invocation {
    id: String,
    state: WorkflowState,
    status: HashMap<String, StepStatus>,
    pending: HashMap<String, usize>,
    elapsed: HashMap<String, u64>,
    tasks: TaskIds,
}

impl Invocation {
    fn new(workflow: &Workflow, seed: WorkflowState) -> Self {
        let graph = workflow.graph();
        let order = graph.topological_order();

        Self {
            id: Uuid::new_v4().to_string(),
            state: seed,
            status: order
                .iter()
                .map(|id| (id.clone(), StepStatus::Pending))
                .collect(),
            pending: order
                .iter()
                .map(|id| (id.clone(), graph.predecessors(id).len()))
                .collect(),
            elapsed: HashMap::new(),
            tasks: TaskIds::default(),
        }
    }

    fn records(&self, order: &[String]) -> Vec<StepRecord> {
        order
            .iter()
            .map(|id| StepRecord {
                step_id: id.clone(),
                status: self.status[id],
                elapsed_ms: self.elapsed.get(id).copied().unwrap_or(0),
            })
            .collect()
    }
}

/// Graph-based workflow executor
#[derive(Clone)]
pub struct GraphExecutor {
    workflow: Arc<Workflow>,
    events: Option<mpsc::Sender<StepEvent>>,
}

impl GraphExecutor {
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self {
            workflow,
            events: None,
        }
    }

    /// Report step progress on `tx`; a dropped receiver is ignored
    pub fn with_events(mut self, tx: mpsc::Sender<StepEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    /// Run the workflow and return the final state
    pub async fn execute(&self, seed: WorkflowState) -> Result<WorkflowState, FlowError> {
        self.run(seed).await.map(|result| result.state)
    }

    /// Run one request end to end and return the wrapped summary
    pub async fn invoke(&self, request: RunRequest) -> Result<ResponseEnvelope, FlowError> {
        let state = self.execute(request.into_state()).await?;
        let envelope = state.value(StateKey::FinalResponse)?.to_json();
        Ok(serde_json::from_value(envelope)?)
    }

    /// Run the workflow, keeping per-step records
    pub async fn run(&self, seed: WorkflowState) -> Result<ExecutionResult, FlowError> {
        let start = Instant::now();
        let graph = self.workflow.graph();
        let mut invocation = Invocation::new(&self.workflow, seed);
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        log::info!(
            "Invocation {} started for workflow {}",
            invocation.id,
            self.workflow.name()
        );

        self.dispatch(graph.entry(), &mut invocation, &mut tasks)
            .await?;

        let mut finished = false;
        while let Some(joined) = tasks.join_next_with_id().await {
            let (step_id, elapsed, result) = match joined {
                Ok((task_id, output)) => {
                    invocation.tasks.finish(task_id);
                    output
                }
                Err(e) => {
                    let err = invocation.tasks.lost(&e);
                    log::error!("Invocation {}: step task lost: {}", invocation.id, e);
                    let step_id = match &err {
                        FlowError::StepPanicked { step } if invocation.status.contains_key(step) => {
                            Some(step.clone())
                        }
                        _ => None,
                    };
                    return Err(self
                        .abort(&mut invocation, &mut tasks, step_id.as_deref(), err)
                        .await);
                }
            };

            let elapsed_ms = elapsed.as_millis() as u64;
            invocation.elapsed.insert(step_id.clone(), elapsed_ms);

            if let Err(err) = result.and_then(|update| self.merge(&step_id, update, &mut invocation))
            {
                return Err(self
                    .abort(&mut invocation, &mut tasks, Some(step_id.as_str()), err)
                    .await);
            }

            invocation.status.insert(step_id.clone(), StepStatus::Done);
            log::info!(
                "Invocation {}: step {} completed in {}ms",
                invocation.id,
                step_id,
                elapsed_ms
            );
            self.emit(StepEvent::StepCompleted {
                step_id: step_id.clone(),
                elapsed_ms,
            })
            .await;

            if step_id == graph.terminal() {
                finished = true;
                break;
            }

            for next in graph.successors(&step_id) {
                let remaining = invocation
                    .pending
                    .get_mut(next)
                    .map(|count| {
                        *count -= 1;
                        *count
                    })
                    .unwrap_or(usize::MAX);
                if remaining == 0 {
                    if let Err(err) = self.dispatch(next, &mut invocation, &mut tasks).await {
                        return Err(self
                            .abort(&mut invocation, &mut tasks, Some(next.as_str()), err)
                            .await);
                    }
                }
            }
        }

        if !finished {
            let missing = graph
                .topological_order()
                .iter()
                .filter(|id| invocation.status[*id] != StepStatus::Done)
                .cloned()
                .collect();
            return Err(FlowError::Incomplete { missing });
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Invocation {} completed in {}ms",
            invocation.id,
            total_elapsed_ms
        );

        Ok(ExecutionResult {
            records: invocation.records(graph.topological_order()),
            invocation_id: invocation.id,
            state: invocation.state,
            total_elapsed_ms,
        })
    }

    /// Spawn a step on a snapshot of the current state
    async fn dispatch(
        &self,
        step_id: &str,
        invocation: &mut Invocation,
        tasks: &mut JoinSet<TaskOutput>,
    ) -> Result<(), FlowError> {
        let step = self
            .workflow
            .step(step_id)
            .cloned()
            .ok_or_else(|| FlowError::contract(step_id, "step is not registered"))?;

        if let Some(key) = step.reads().iter().find(|k| !invocation.state.contains(**k)) {
            return Err(FlowError::Precondition {
                step: step_id.to_string(),
                key: *key,
            });
        }

        invocation
            .status
            .insert(step_id.to_string(), StepStatus::Running);
        log::info!("Invocation {}: dispatching step {}", invocation.id, step_id);
        self.emit(StepEvent::StepStarted {
            step_id: step_id.to_string(),
        })
        .await;

        let snapshot = invocation.state.clone();
        let id = step_id.to_string();
        let handle = tasks.spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(step.run(&snapshot))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(FlowError::StepPanicked { step: id.clone() }));
            (id, started.elapsed(), result)
        });
        invocation.tasks.track(&handle, step_id);

        Ok(())
    }

    /// Check a step's output against its declared write-set, then merge it
    fn merge(
        &self,
        step_id: &str,
        update: StateUpdate,
        invocation: &mut Invocation,
    ) -> Result<(), FlowError> {
        let declared: BTreeSet<StateKey> = self
            .workflow
            .graph()
            .contract(step_id)
            .map(|c| c.writes.iter().copied().collect())
            .unwrap_or_default();
        let produced: BTreeSet<StateKey> = update.keys().collect();

        if declared != produced {
            return Err(FlowError::contract(
                step_id,
                format!("declared writes {:?}, produced {:?}", declared, produced),
            ));
        }

        invocation.state.merge(update).map_err(|e| {
            if let StateError::Conflict(key) = &e {
                log::error!(
                    "Invocation {}: step {} overwrote '{}'; graph is miswired",
                    invocation.id,
                    step_id,
                    key
                );
            }
            FlowError::State(e)
        })
    }

    /// Fail the invocation; in-flight siblings finish detached and are ignored
    async fn abort(
        &self,
        invocation: &mut Invocation,
        tasks: &mut JoinSet<TaskOutput>,
        step_id: Option<&str>,
        err: FlowError,
    ) -> FlowError {
        if let Some(step_id) = step_id {
            invocation
                .status
                .insert(step_id.to_string(), StepStatus::Failed);
            self.emit(StepEvent::StepFailed {
                step_id: step_id.to_string(),
                error: err.to_string(),
            })
            .await;
        }

        log::error!("Invocation {} failed: {}", invocation.id, err);

        if !tasks.is_empty() {
            log::warn!(
                "Invocation {}: discarding {} in-flight step(s)",
                invocation.id,
                tasks.len()
            );
            tasks.detach_all();
        }

        err
    }

    async fn emit(&self, event: StepEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ects::workflow::step::{Step, StepKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock step for testing - writes a fixed text into each declared key
    struct MockStep {
        id: String,
        reads: Vec<StateKey>,
        writes: Vec<StateKey>,
        delay_ms: u64,
        fail: bool,
        runs: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
        seen: Arc<Mutex<Option<WorkflowState>>>,
        gauge: Option<Arc<Gauge>>,
    }

    /// Steps running right now, and the most ever seen at once
    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockStep {
        fn new(id: &str, reads: Vec<StateKey>, writes: Vec<StateKey>) -> Self {
            Self {
                id: id.to_string(),
                reads,
                writes,
                delay_ms: 0,
                fail: false,
                runs: Arc::new(AtomicUsize::new(0)),
                finished: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(None)),
                gauge: None,
            }
        }

        fn gauged(mut self, gauge: &Arc<Gauge>) -> Self {
            self.gauge = Some(gauge.clone());
            self
        }

        fn delayed(mut self, delay_ms: u64) -> Self {
            self.delay_ms = delay_ms;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl Step for MockStep {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> StepKind {
            StepKind::Generative
        }

        fn reads(&self) -> &[StateKey] {
            &self.reads
        }

        fn writes(&self) -> &[StateKey] {
            &self.writes
        }

        async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, FlowError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(state.clone());
            if let Some(gauge) = &self.gauge {
                let now = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                gauge.peak.fetch_max(now, Ordering::SeqCst);
            }
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if let Some(gauge) = &self.gauge {
                gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FlowError::step(
                    &self.id,
                    crate::adk::error::ModelError::other("boom"),
                ));
            }
            Ok(self
                .writes
                .iter()
                .fold(StateUpdate::new(), |u, k| u.text(*k, format!("{}-out", self.id))))
        }
    }

    /// A step that lies about its write-set
    struct RogueStep;

    #[async_trait]
    impl Step for RogueStep {
        fn id(&self) -> &str {
            "rogue"
        }

        fn kind(&self) -> StepKind {
            StepKind::Local
        }

        fn reads(&self) -> &[StateKey] {
            &[]
        }

        fn writes(&self) -> &[StateKey] {
            &[StateKey::FaHighlightsOut]
        }

        async fn run(&self, _state: &WorkflowState) -> Result<StateUpdate, FlowError> {
            Ok(StateUpdate::new().text(StateKey::GuidValidationOut, "wrong key"))
        }
    }

    fn seed() -> WorkflowState {
        WorkflowState::seeded("t", "x", "d", "i")
    }

    /// start -> {a (slow), b} -> join
    fn diamond(a: MockStep, b: MockStep, join: MockStep) -> Arc<Workflow> {
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(MockStep::new("start", vec![StateKey::Transcript], vec![])),
            Arc::new(a),
            Arc::new(b),
            Arc::new(join),
        ];
        Arc::new(
            Workflow::new(
                "diamond",
                &StateKey::SEEDS,
                steps,
                [("start", "a"), ("start", "b"), ("a", "join"), ("b", "join")],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_join_waits_for_slow_branch() {
        let a = MockStep::new("a", vec![], vec![StateKey::FaHighlightsOut]).delayed(50);
        let b = MockStep::new("b", vec![], vec![StateKey::GuidValidationOut]);
        let join = MockStep::new(
            "join",
            vec![StateKey::FaHighlightsOut, StateKey::GuidValidationOut],
            vec![StateKey::AiSummary],
        );
        let join_seen = join.seen.clone();
        let join_runs = join.runs.clone();

        let executor = GraphExecutor::new(diamond(a, b, join));
        let result = executor.run(seed()).await.unwrap();

        assert_eq!(join_runs.load(Ordering::SeqCst), 1);
        let seen = join_seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.text(StateKey::FaHighlightsOut).unwrap(), "a-out");
        assert_eq!(seen.text(StateKey::GuidValidationOut).unwrap(), "b-out");
        assert_eq!(result.state.text(StateKey::AiSummary).unwrap(), "join-out");
        assert!(result
            .records
            .iter()
            .all(|r| r.status == StepStatus::Done));
    }

    #[tokio::test]
    async fn test_siblings_run_concurrently() {
        let gauge = Arc::new(Gauge::default());
        let a = MockStep::new("a", vec![], vec![StateKey::FaHighlightsOut])
            .delayed(50)
            .gauged(&gauge);
        let b = MockStep::new("b", vec![], vec![StateKey::GuidValidationOut])
            .delayed(50)
            .gauged(&gauge);
        let join = MockStep::new("join", vec![], vec![StateKey::AiSummary]).gauged(&gauge);

        let executor = GraphExecutor::new(diamond(a, b, join));
        executor.execute(seed()).await.unwrap();

        // both branches were in flight at the same moment
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        assert_eq!(gauge.in_flight.load(Ordering::SeqCst), 0);
    }

    fn lose_task() -> TaskOutput {
        panic!("task lost outside the step")
    }

    #[tokio::test]
    async fn test_lost_task_is_named() {
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let mut ids = TaskIds::default();
        let handle = tasks.spawn(async { lose_task() });
        ids.track(&handle, "summarizer");

        let err = tasks.join_next_with_id().await.unwrap().unwrap_err();
        assert!(err.is_panic());
        assert!(matches!(
            ids.lost(&err),
            FlowError::StepPanicked { ref step } if step == "summarizer"
        ));
        // an untracked task still fails, without a name
        assert!(matches!(
            ids.lost(&err),
            FlowError::StepPanicked { ref step } if step == "<unknown>"
        ));
    }

    #[tokio::test]
    async fn test_failure_stops_downstream() {
        let a = MockStep::new("a", vec![], vec![StateKey::FaHighlightsOut]).failing();
        let b = MockStep::new("b", vec![], vec![StateKey::GuidValidationOut]).delayed(20);
        let join = MockStep::new("join", vec![], vec![StateKey::AiSummary]);
        let join_runs = join.runs.clone();

        let executor = GraphExecutor::new(diamond(a, b, join));
        let err = executor.execute(seed()).await.unwrap_err();

        assert!(matches!(err, FlowError::Step { ref step, .. } if step == "a"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(join_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_in_flight_sibling_is_not_cancelled() {
        let a = MockStep::new("a", vec![], vec![StateKey::FaHighlightsOut]).failing();
        let b = MockStep::new("b", vec![], vec![StateKey::GuidValidationOut]).delayed(30);
        let b_finished = b.finished.clone();
        let join = MockStep::new("join", vec![], vec![StateKey::AiSummary]);

        let executor = GraphExecutor::new(diamond(a, b, join));
        assert!(executor.execute(seed()).await.is_err());
        assert_eq!(b_finished.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(b_finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_write_set_is_contract_error() {
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(MockStep::new("start", vec![], vec![])),
            Arc::new(RogueStep),
        ];
        let workflow =
            Workflow::new("rogue", &StateKey::SEEDS, steps, [("start", "rogue")]).unwrap();

        let err = GraphExecutor::new(Arc::new(workflow))
            .execute(seed())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Contract { ref step, .. } if step == "rogue"));
    }

    #[tokio::test]
    async fn test_missing_seed_is_precondition_error() {
        let a = MockStep::new("a", vec![], vec![StateKey::FaHighlightsOut]);
        let b = MockStep::new("b", vec![], vec![StateKey::GuidValidationOut]);
        let join = MockStep::new("join", vec![], vec![StateKey::AiSummary]);

        let err = GraphExecutor::new(diamond(a, b, join))
            .execute(WorkflowState::empty())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Precondition { key: StateKey::Transcript, .. }
        ));
    }

    #[tokio::test]
    async fn test_events_follow_dependency_order() {
        let a = MockStep::new("a", vec![], vec![StateKey::FaHighlightsOut]);
        let b = MockStep::new("b", vec![], vec![StateKey::GuidValidationOut]);
        let join = MockStep::new("join", vec![], vec![StateKey::AiSummary]);

        let (tx, mut rx) = mpsc::channel(32);
        let executor = GraphExecutor::new(diamond(a, b, join)).with_events(tx);
        executor.execute(seed()).await.unwrap();
        drop(executor);

        let mut completed = vec![];
        let mut started = vec![];
        while let Some(event) = rx.recv().await {
            match event {
                StepEvent::StepStarted { step_id } => started.push(step_id),
                StepEvent::StepCompleted { step_id, .. } => completed.push(step_id),
                other => panic!("unexpected event {:?}", other),
            }
        }

        assert_eq!(started.len(), 4);
        assert_eq!(completed.first().map(String::as_str), Some("start"));
        assert_eq!(completed.last().map(String::as_str), Some("join"));
        let join_start = started.iter().position(|s| s == "join").unwrap();
        assert_eq!(join_start, 3);
    }
}
