//! The data pipeline workflow: trigger a remote job, then wait for its callback.

use async_trait::async_trait;
use jobhook_types::{JobInvocationParams, RunRecord, WorkflowStep};
use jobhook_util::redact_sensitive;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::orchestrator::OrchestratorError;
use crate::workflow::{StepOutcome, Workflow, WorkflowContext};

/// Registry name of [`DataPipeline`].
pub const DATA_PIPELINE: &str = "data_pipeline";

/// Creates the run's promise, fires the job with the promise id, and completes
/// with whatever value the job's callback resolves the promise with.
pub struct DataPipeline;

#[async_trait]
impl Workflow for DataPipeline {
    fn name(&self) -> &'static str {
        DATA_PIPELINE
    }

    async fn step(&self, run: &mut RunRecord, context: &WorkflowContext) -> Result<StepOutcome, OrchestratorError> {
        match run.step {
            WorkflowStep::Start => {
                // The promise must exist before the job can call back.
                context.promises.create(&run.id)?;
                run.transition(WorkflowStep::Triggering);
                Ok(StepOutcome::Continue)
            }
            WorkflowStep::Triggering => {
                if run.trigger_attempted {
                    warn!(run_id = %run.id, "trigger was attempted before a restart; not firing again");
                    run.transition(WorkflowStep::Awaiting);
                    return Ok(StepOutcome::Continue);
                }

                run.trigger_attempted = true;
                context.checkpoint(run)?;

                let params = JobInvocationParams::new(context.job_id, run.id.clone(), run.url.clone());
                match context.trigger.trigger(&params).await {
                    Ok(()) => run.transition(WorkflowStep::Awaiting),
                    Err(trigger_error) => {
                        let message = redact_sensitive(&format!("{trigger_error:#}"));
                        error!(run_id = %run.id, job_id = context.job_id, error = %message, "job trigger failed");
                        run.error = Some(message);
                        run.transition(WorkflowStep::Failed);
                    }
                }
                Ok(StepOutcome::Continue)
            }
            WorkflowStep::Awaiting => {
                // `create` is idempotent and also heals a promise file that lost this entry.
                let promise = context.promises.create(&run.id)?;
                let Some(value) = promise.value() else {
                    return Ok(StepOutcome::Suspend);
                };
                info!(run_id = %run.id, value = %display_value(&value), "job execution has finished");
                run.result = Some(value);
                run.transition(WorkflowStep::Complete);
                Ok(StepOutcome::Continue)
            }
            // terminal steps are never driven
            WorkflowStep::Complete | WorkflowStep::Failed | WorkflowStep::TimedOut => Ok(StepOutcome::Continue),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
