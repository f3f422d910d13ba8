//! Pending promise records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CorrelationId;

/// Lifecycle of a single-assignment promise. `Resolved` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PromiseState {
    Pending,
    Resolved {
        /// JSON-encoded payload supplied by the resolver.
        data: String,
        /// Key used to deduplicate repeated deliveries.
        idempotency_key: String,
        resolved_at: DateTime<Utc>,
    },
}

/// Persisted promise keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub id: CorrelationId,
    #[serde(flatten)]
    pub state: PromiseState,
    pub created_at: DateTime<Utc>,
}

impl PromiseRecord {
    pub fn pending(id: CorrelationId) -> Self {
        Self {
            id,
            state: PromiseState::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, PromiseState::Resolved { .. })
    }

    /// Raw JSON-encoded payload, if resolved.
    pub fn data(&self) -> Option<&str> {
        match &self.state {
            PromiseState::Resolved { data, .. } => Some(data),
            PromiseState::Pending => None,
        }
    }

    /// Decoded payload, if resolved. Payloads that are not valid JSON come back as plain strings.
    pub fn value(&self) -> Option<Value> {
        self.data()
            .map(|data| serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string())))
    }
}

/// Result of a resolution attempt against the promise store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// The promise moved from pending to resolved.
    Resolved,
    /// Same idempotency key delivered again; nothing changed.
    Duplicate,
    /// Already resolved under a different key; first writer wins.
    AlreadyResolved,
    /// No promise exists for the id.
    Unknown,
}

impl ResolveOutcome {
    /// `true` only when this call changed the promise.
    pub fn took_effect(self) -> bool {
        matches!(self, ResolveOutcome::Resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_record_decodes_json_string_payload() {
        let mut record = PromiseRecord::pending(CorrelationId::new("abc").unwrap());
        assert!(record.value().is_none());

        record.state = PromiseState::Resolved {
            data: serde_json::to_string("done:42").unwrap(),
            idempotency_key: "abc".into(),
            resolved_at: Utc::now(),
        };
        assert!(record.is_resolved());
        assert_eq!(record.value(), Some(Value::String("done:42".into())));
    }

    #[test]
    fn non_json_payload_falls_back_to_string() {
        let mut record = PromiseRecord::pending(CorrelationId::new("abc").unwrap());
        record.state = PromiseState::Resolved {
            data: "not json".into(),
            idempotency_key: "abc".into(),
            resolved_at: Utc::now(),
        };
        assert_eq!(record.value(), Some(Value::String("not json".into())));
    }

    #[test]
    fn record_serializes_state_inline() {
        let record = PromiseRecord::pending(CorrelationId::new("abc").unwrap());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["id"], "abc");
    }
}
