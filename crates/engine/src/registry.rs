//! Name → workflow mapping, built once at process start.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::workflow::Workflow;
use crate::workflow::data_pipeline::DataPipeline;

/// Registered workflows keyed by [`Workflow::name`].
///
/// Run records store the workflow name, so a restarted process finds the
/// machine for every persisted run through this registry.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: IndexMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in workflows.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DataPipeline));
        registry
    }

    /// Register a workflow, replacing any previous one with the same name.
    pub fn register(&mut self, workflow: Arc<dyn Workflow>) -> Option<Arc<dyn Workflow>> {
        self.workflows.insert(workflow.name().to_string(), workflow)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.workflows.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }
}
