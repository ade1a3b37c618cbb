//! Per-run configuration passed through to every capability invocation.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Configuration for one orchestrator run.
///
/// Carried by reference into every tool invocation. The cancellation
/// token is honored cooperatively: a capability observing it returns the
/// interrupt error, which always propagates out of the batch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Identifier of the owning run.
    pub run_id: String,
    /// Identifier of the current step within the run.
    pub step_id: String,
    /// Cooperative cancellation signal.
    pub cancellation: CancellationToken,
    /// Opaque metadata forwarded to capabilities and error reporters.
    pub metadata: HashMap<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            step_id: uuid::Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
            metadata: HashMap::new(),
        }
    }
}

impl RunConfig {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn with_step_id(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = step_id.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_generates_identifiers() {
        let cfg = RunConfig::default();
        assert!(!cfg.run_id.is_empty());
        assert!(!cfg.step_id.is_empty());
        assert!(!cfg.cancellation.is_cancelled());
    }

    #[test]
    fn builder_overrides() {
        let cfg = RunConfig::new("run-1")
            .with_step_id("step-3")
            .with_metadata("agent", serde_json::json!("planner"));
        assert_eq!(cfg.run_id, "run-1");
        assert_eq!(cfg.step_id, "step-3");
        assert_eq!(cfg.metadata["agent"], serde_json::json!("planner"));
    }
}
