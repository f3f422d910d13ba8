//! Durable run orchestration.
//!
//! The orchestrator owns one driver task per unfinished run. A driver walks
//! the run's [`Workflow`] state machine, persisting the record after every
//! step, and parks on a per-run [`Notify`] whenever the workflow suspends.
//! [`Orchestrator::resolve`] writes the promise first and then wakes the
//! driver; `notify_one` keeps a permit, so a wake-up that lands before the
//! driver parks is not lost.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use jobhook_types::{CorrelationId, ResolveOutcome, RunRecord, RunStatus, WorkflowStep};
use jobhook_util::{PromiseStore, RunStore, StoreError};
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::registry::WorkflowRegistry;
use crate::trigger::JobTrigger;
use crate::workflow::{StepOutcome, Workflow, WorkflowContext};

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),
    #[error("no run recorded for id '{0}'")]
    UnknownRun(CorrelationId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode promise payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Job identifier passed to every trigger.
    pub job_id: u64,
    /// How long a run may stay in `Awaiting`. `None` waits indefinitely.
    pub await_timeout: Option<Duration>,
}

impl OrchestratorSettings {
    pub fn new(job_id: u64) -> Self {
        Self {
            job_id,
            await_timeout: None,
        }
    }

    pub fn with_await_timeout(mut self, await_timeout: Option<Duration>) -> Self {
        self.await_timeout = await_timeout;
        self
    }
}

/// Starts, resumes and wakes durable workflow runs.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: WorkflowRegistry,
    context: WorkflowContext,
    await_timeout: Option<Duration>,
    /// Runs with an active driver task.
    live: Mutex<HashMap<CorrelationId, watch::Sender<WorkflowStep>>>,
    wakers: Mutex<HashMap<CorrelationId, Arc<Notify>>>,
}

impl Orchestrator {
    pub fn new(
        registry: WorkflowRegistry,
        promises: Arc<dyn PromiseStore>,
        runs: Arc<dyn RunStore>,
        trigger: Arc<dyn JobTrigger>,
        settings: OrchestratorSettings,
    ) -> Self {
        let context = WorkflowContext {
            promises,
            runs,
            trigger,
            job_id: settings.job_id,
        };
        Self {
            inner: Arc::new(Inner {
                registry,
                context,
                await_timeout: settings.await_timeout,
                live: Mutex::new(HashMap::new()),
                wakers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start a run of `workflow` for `id`, or return a handle to the existing run.
    ///
    /// Never waits for the run to progress. Must be called within a Tokio runtime.
    pub fn begin_run(&self, workflow: &str, id: CorrelationId, url: impl Into<String>) -> Result<RunHandle, OrchestratorError> {
        if !self.inner.registry.contains(workflow) {
            return Err(OrchestratorError::UnknownWorkflow(workflow.to_string()));
        }

        let (record, created) = self
            .inner
            .context
            .runs
            .insert_if_absent(RunRecord::new(workflow, id, url))?;
        if created {
            info!(run_id = %record.id, workflow, url = %record.url, "starting workflow run");
        } else {
            debug!(run_id = %record.id, step = %record.step, "workflow run already exists");
        }
        self.attach(record.id)
    }

    /// Handle for an existing run, resuming its driver if needed.
    pub fn handle(&self, id: &CorrelationId) -> Result<Option<RunHandle>, OrchestratorError> {
        if self.inner.context.runs.get(id)?.is_none() {
            return Ok(None);
        }
        self.attach(id.clone()).map(Some)
    }

    /// Resolve the promise for `id` with `value`, using the id as idempotency key.
    ///
    /// Unknown ids and repeated deliveries are reported through the outcome, never as errors.
    pub fn resolve(&self, id: &CorrelationId, value: &str) -> Result<ResolveOutcome, OrchestratorError> {
        let data = serde_json::to_string(value)?;
        let outcome = self.inner.context.promises.resolve(id, data, id.as_str())?;
        match outcome {
            ResolveOutcome::Resolved => {
                info!(run_id = %id, "promise resolved");
                self.wake(id);
            }
            ResolveOutcome::Duplicate => debug!(run_id = %id, "duplicate resolution ignored"),
            ResolveOutcome::AlreadyResolved => {
                warn!(run_id = %id, "promise already resolved under another key; keeping the first value")
            }
            ResolveOutcome::Unknown => warn!(run_id = %id, "resolution for unknown promise ignored"),
        }
        Ok(outcome)
    }

    /// Spawn drivers for every persisted run that has not finished. Returns how many were found.
    pub fn recover(&self) -> Result<usize, OrchestratorError> {
        let unfinished = self.inner.context.runs.unfinished()?;
        let count = unfinished.len();
        for run in unfinished {
            info!(run_id = %run.id, step = %run.step, "recovering workflow run");
            self.attach(run.id)?;
        }
        Ok(count)
    }

    fn attach(&self, id: CorrelationId) -> Result<RunHandle, OrchestratorError> {
        let mut live = self.inner.live.lock().expect("live run lock poisoned");
        if let Some(sender) = live.get(&id) {
            return Ok(RunHandle::new(id, sender.subscribe()));
        }

        // Read under the lock: a driver persists its final step before leaving `live`.
        let record = self
            .inner
            .context
            .runs
            .get(&id)?
            .ok_or_else(|| OrchestratorError::UnknownRun(id.clone()))?;
        let (sender, receiver) = watch::channel(record.step);
        if !record.step.is_terminal() {
            live.insert(id.clone(), sender.clone());
            let orchestrator = self.clone();
            tokio::spawn(async move { orchestrator.drive(record, sender).await });
        }
        Ok(RunHandle::new(id, receiver))
    }

    async fn drive(self, mut run: RunRecord, sender: watch::Sender<WorkflowStep>) {
        let id = run.id.clone();
        match self.inner.registry.get(&run.workflow) {
            Some(workflow) => {
                if let Err(drive_error) = self.drive_steps(workflow.as_ref(), &mut run, &sender).await {
                    error!(
                        run_id = %id,
                        step = %run.step,
                        error = %drive_error,
                        "workflow driver stopped; the run resumes on next recovery"
                    );
                }
            }
            None => {
                error!(run_id = %id, workflow = %run.workflow, "run references an unregistered workflow");
                run.error = Some(format!("unknown workflow '{}'", run.workflow));
                run.transition(WorkflowStep::Failed);
                if let Err(store_error) = self.inner.context.runs.update(&run) {
                    error!(run_id = %id, error = %store_error, "failed to persist run failure");
                }
                sender.send_replace(run.step);
            }
        }

        // Both entries go under the live lock so a driver attached right after
        // this one cannot have its waker removed.
        let mut live = self.inner.live.lock().expect("live run lock poisoned");
        live.remove(&id);
        self.inner.wakers.lock().expect("waker lock poisoned").remove(&id);
    }

    async fn drive_steps(
        &self,
        workflow: &dyn Workflow,
        run: &mut RunRecord,
        sender: &watch::Sender<WorkflowStep>,
    ) -> Result<(), OrchestratorError> {
        let context = &self.inner.context;
        while !run.step.is_terminal() {
            match workflow.step(run, context).await? {
                StepOutcome::Continue => {
                    context.runs.update(run)?;
                    sender.send_replace(run.step);
                    debug!(run_id = %run.id, step = %run.step, "workflow step persisted");
                }
                StepOutcome::Suspend => {
                    if self.suspend(run).await {
                        continue;
                    }
                    warn!(run_id = %run.id, "await timeout elapsed before the promise was resolved");
                    run.error = Some("timed out waiting for promise resolution".to_string());
                    run.transition(WorkflowStep::TimedOut);
                    context.runs.update(run)?;
                    sender.send_replace(run.step);
                }
            }
        }
        info!(run_id = %run.id, step = %run.step, "workflow run finished");
        Ok(())
    }

    /// Park until woken. Returns `false` when the await timeout elapsed first.
    async fn suspend(&self, run: &RunRecord) -> bool {
        let notify = self.waker(&run.id);
        debug!(run_id = %run.id, "run suspended awaiting promise");
        match self.inner.await_timeout {
            None => {
                notify.notified().await;
                true
            }
            Some(await_timeout) => {
                let remaining = remaining_await(run, await_timeout);
                tokio::time::timeout(remaining, notify.notified()).await.is_ok()
            }
        }
    }

    fn waker(&self, id: &CorrelationId) -> Arc<Notify> {
        let mut wakers = self.inner.wakers.lock().expect("waker lock poisoned");
        Arc::clone(wakers.entry(id.clone()).or_default())
    }

    fn wake(&self, id: &CorrelationId) {
        let live = self.inner.live.lock().expect("live run lock poisoned");
        if live.contains_key(id) {
            self.waker(id).notify_one();
        } else {
            debug!(run_id = %id, "no active driver; the resolution is read when the run resumes");
        }
    }
}

/// Time left before an awaiting run times out, measured from the persisted `awaiting_since`.
fn remaining_await(run: &RunRecord, await_timeout: Duration) -> Duration {
    let Some(since) = run.awaiting_since else {
        return await_timeout;
    };
    let elapsed = (Utc::now() - since).to_std().unwrap_or_default();
    await_timeout.saturating_sub(elapsed)
}

/// Observer for a single run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: CorrelationId,
    receiver: watch::Receiver<WorkflowStep>,
}

impl RunHandle {
    fn new(id: CorrelationId, receiver: watch::Receiver<WorkflowStep>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Latest known step. Never blocks.
    pub fn step(&self) -> WorkflowStep {
        *self.receiver.borrow()
    }

    /// Non-blocking completion check.
    pub fn done(&self) -> bool {
        self.step().is_terminal()
    }

    pub fn status(&self) -> RunStatus {
        self.step().into()
    }

    /// Wait until the step satisfies `predicate`, or the driver stops.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(WorkflowStep) -> bool) -> WorkflowStep {
        let reached = self.receiver.wait_for(|step| predicate(*step)).await.map(|step| *step);
        reached.unwrap_or_else(|_| *self.receiver.borrow())
    }

    /// Wait for a terminal step.
    pub async fn wait(&mut self) -> WorkflowStep {
        self.wait_for(WorkflowStep::is_terminal).await
    }
}
