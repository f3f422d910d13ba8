//! Workflow run records and the persisted step pointer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CorrelationId;

/// Step pointer of a durable workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Run recorded, promise not yet created.
    Start,
    /// Promise exists; the job trigger is about to fire.
    Triggering,
    /// Suspended until the promise resolves.
    Awaiting,
    Complete,
    Failed,
    TimedOut,
}

impl WorkflowStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStep::Complete | WorkflowStep::Failed | WorkflowStep::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::Start => "start",
            WorkflowStep::Triggering => "triggering",
            WorkflowStep::Awaiting => "awaiting",
            WorkflowStep::Complete => "complete",
            WorkflowStep::Failed => "failed",
            WorkflowStep::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse status reported to callers of the front door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    Working,
}

impl RunStatus {
    /// Plain-text body returned by `GET /run`.
    pub fn message(self) -> &'static str {
        match self {
            RunStatus::Done => "I am done",
            RunStatus::Working => "working on it",
        }
    }
}

impl From<WorkflowStep> for RunStatus {
    fn from(step: WorkflowStep) -> Self {
        if step.is_terminal() { RunStatus::Done } else { RunStatus::Working }
    }
}

/// Persisted state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: CorrelationId,
    /// Registry name of the workflow driving this run.
    pub workflow: String,
    pub url: String,
    pub step: WorkflowStep,
    /// Set before the job trigger fires so a restart never fires it twice.
    #[serde(default)]
    pub trigger_attempted: bool,
    /// When the run entered `Awaiting`; the await timeout is measured from here.
    #[serde(default)]
    pub awaiting_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(workflow: impl Into<String>, id: CorrelationId, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow: workflow.into(),
            url: url.into(),
            step: WorkflowStep::Start,
            trigger_attempted: false,
            awaiting_since: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the step pointer, stamping `awaiting_since` on entry to `Awaiting`.
    pub fn transition(&mut self, step: WorkflowStep) {
        let now = Utc::now();
        if step == WorkflowStep::Awaiting && self.awaiting_since.is_none() {
            self.awaiting_since = Some(now);
        }
        self.step = step;
        self.updated_at = now;
    }

    pub fn status(&self) -> RunStatus {
        self.step.into()
    }
}
