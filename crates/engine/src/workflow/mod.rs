//! Workflow definitions driven by the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use jobhook_types::RunRecord;
use jobhook_util::{PromiseStore, RunStore, StoreError};

use crate::orchestrator::OrchestratorError;
use crate::trigger::JobTrigger;

pub mod data_pipeline;

/// What the orchestrator should do after a step ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Persist the run and drive the next step.
    Continue,
    /// Park the run until its promise is resolved.
    Suspend,
}

/// Collaborators available to a workflow step.
#[derive(Clone)]
pub struct WorkflowContext {
    pub promises: Arc<dyn PromiseStore>,
    pub runs: Arc<dyn RunStore>,
    pub trigger: Arc<dyn JobTrigger>,
    /// Job identifier on the platform.
    pub job_id: u64,
}

impl WorkflowContext {
    /// Persist the run mid-step, before a side effect that must not repeat.
    pub fn checkpoint(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.runs.update(run)
    }
}

/// A resumable state machine over [`RunRecord`].
///
/// `step` is called with the run at a non-terminal step and moves it forward
/// by mutating the record. It must be safe to call again with the persisted
/// record after a crash.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Registry name, also stored on every run record.
    fn name(&self) -> &'static str;

    async fn step(&self, run: &mut RunRecord, context: &WorkflowContext) -> Result<StepOutcome, OrchestratorError>;
}
