//! Shared type definitions for the jobhook workspace.
//!
//! Everything that crosses a crate boundary lives here: the correlation
//! identifier linking a run to its external resolution, the parameters handed
//! to the job platform, and the persisted promise and run records.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod promise;
pub mod workflow;

pub use promise::{PromiseRecord, PromiseState, ResolveOutcome};
pub use workflow::{RunRecord, RunStatus, WorkflowStep};

/// Notebook parameter carrying the correlation identifier back to the job.
pub const PROMISE_ID_PARAM: &str = "promise_id";
/// Notebook parameter carrying the target URL.
pub const URL_PARAM: &str = "url";

/// Error returned when a correlation identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationIdError {
    #[error("correlation id must not be empty")]
    Empty,
}

/// Opaque key shared by a workflow run and its pending promise.
///
/// Surrounding whitespace is trimmed on construction; an empty value is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Build a correlation id from caller-supplied text.
    pub fn new(value: impl Into<String>) -> Result<Self, CorrelationIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CorrelationIdError::Empty);
        }
        if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CorrelationId {
    type Err = CorrelationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = CorrelationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CorrelationId> for String {
    fn from(value: CorrelationId) -> Self {
        value.0
    }
}

/// Parameters for a single "run now" invocation on the job platform.
///
/// Constructed once per run and passed opaquely to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInvocationParams {
    /// Numeric job identifier configured on the platform.
    pub job_id: u64,
    /// Correlation id the job must echo back when it resolves the promise.
    pub correlation_id: CorrelationId,
    /// Payload URL the job operates on.
    pub url: String,
}

impl JobInvocationParams {
    pub fn new(job_id: u64, correlation_id: CorrelationId, url: impl Into<String>) -> Self {
        Self {
            job_id,
            correlation_id,
            url: url.into(),
        }
    }

    /// Job-level parameters as the platform expects them.
    pub fn notebook_params(&self) -> IndexMap<String, String> {
        let mut params = IndexMap::new();
        params.insert(PROMISE_ID_PARAM.to_string(), self.correlation_id.to_string());
        params.insert(URL_PARAM.to_string(), self.url.clone());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_trims_whitespace() {
        let id = CorrelationId::new("  abc123 ").unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn correlation_id_rejects_blank() {
        assert_eq!(CorrelationId::new("   "), Err(CorrelationIdError::Empty));
        assert!("".parse::<CorrelationId>().is_err());
    }

    #[test]
    fn correlation_id_deserialization_validates() {
        let parsed: Result<CorrelationId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
        let parsed: CorrelationId = serde_json::from_str("\"run-1\"").unwrap();
        assert_eq!(parsed.to_string(), "run-1");
    }

    #[test]
    fn notebook_params_carry_promise_id_and_url() {
        let params = JobInvocationParams::new(42, CorrelationId::new("abc").unwrap(), "s3://bucket/key");
        let notebook = params.notebook_params();
        assert_eq!(notebook.get(PROMISE_ID_PARAM).map(String::as_str), Some("abc"));
        assert_eq!(notebook.get(URL_PARAM).map(String::as_str), Some("s3://bucket/key"));
        assert_eq!(notebook.keys().collect::<Vec<_>>(), vec![PROMISE_ID_PARAM, URL_PARAM]);
    }
}
