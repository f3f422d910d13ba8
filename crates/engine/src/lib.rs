//! # Jobhook Engine
//!
//! The engine drives durable workflow runs: each run is an explicit state
//! machine whose step pointer and pending promise are both persisted, so a
//! process restart re-enters the machine exactly where it stopped.
//!
//! ## Lifecycle of a run
//!
//! 1. **Start**: the pending promise for the run's correlation id is created.
//! 2. **Triggering**: the attempt is recorded, then the job trigger fires once.
//! 3. **Awaiting**: the run suspends until an external caller resolves the promise.
//! 4. **Complete**: the resolved value is consumed.
//!
//! A failed trigger ends the run in `Failed`; an optional await timeout ends a
//! run that was never resolved in `TimedOut`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jobhook_engine::{NoopTrigger, Orchestrator, OrchestratorSettings, WorkflowRegistry, DATA_PIPELINE};
//! use jobhook_types::CorrelationId;
//! use jobhook_util::{InMemoryPromiseStore, InMemoryRunStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     WorkflowRegistry::with_defaults(),
//!     Arc::new(InMemoryPromiseStore::new()),
//!     Arc::new(InMemoryRunStore::new()),
//!     Arc::new(NoopTrigger),
//!     OrchestratorSettings::new(1234),
//! );
//! let id = CorrelationId::new("abc123")?;
//! let mut handle = orchestrator.begin_run(DATA_PIPELINE, id.clone(), "s3://bucket/input")?;
//! assert!(!handle.done());
//! orchestrator.resolve(&id, "finished")?;
//! handle.wait().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`trigger`**: the seam to the job platform ([`JobTrigger`])
//! - **`workflow`**: the [`Workflow`] trait and the built-in data pipeline
//! - **`registry`**: name → workflow mapping built once at startup
//! - **`orchestrator`**: spawns drivers, wakes suspended runs, recovers after restart

pub mod orchestrator;
pub mod registry;
pub mod trigger;
pub mod workflow;

pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorSettings, RunHandle};
pub use registry::WorkflowRegistry;
pub use trigger::{JobTrigger, NoopTrigger, PlatformJobTrigger};
pub use workflow::data_pipeline::{DATA_PIPELINE, DataPipeline};
pub use workflow::{StepOutcome, Workflow, WorkflowContext};
