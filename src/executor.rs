//! Single-call execution: capability lookup, usage counting, context
//! injection, and conversion of results and failures into uniform
//! outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RunConfig;
use crate::error::{Result, ToolWeaveError};
use crate::registry::{FilteredView, RegistryHandle, ToolRegistry};
use crate::types::{CanonicalToolCall, ToolMessage, ToolOutcome, ToolReturn, UsageSnapshot};

/// Context handed to a capability for one invocation.
#[derive(Clone)]
pub struct InvocationContext {
    /// Id of the canonical call being executed.
    pub call_id: String,
    /// Tool name being executed.
    pub name: String,
    /// Parsed call arguments.
    pub args: Value,
    /// Per-turn step identifier from the run configuration.
    pub step_id: String,
    /// Zero-based invocation number for this tool name: equal to the
    /// usage count prior to this call.
    pub turn: u64,
    /// Name-keyed injected context for well-known calls; `None` for
    /// everything else.
    pub injected: Option<InjectedContext>,
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("call_id", &self.call_id)
            .field("name", &self.name)
            .field("step_id", &self.step_id)
            .field("turn", &self.turn)
            .field("has_injected", &self.injected.is_some())
            .finish()
    }
}

/// Registry visibility injected into well-known calls before invocation.
#[derive(Clone)]
pub enum InjectedContext {
    /// The caller-filtered programmatic map and definition list.
    Programmatic(FilteredView),
    /// The full, unfiltered registry snapshot.
    FullRegistry(Arc<ToolRegistry>),
}

/// Enumerated context-injecting call kinds. Each maps to a pure function
/// from base context and registry snapshot to an extended context, so no
/// name string-matching happens inside the execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextInjection {
    /// The call receives the programmatic filtered view (e.g. a call
    /// that itself needs the list of programmatically callable tools).
    ProgrammaticView,
    /// The call receives the unfiltered registry (e.g. full-registry
    /// search).
    FullRegistry,
}

/// Extend a base context with registry visibility for one injection kind.
pub fn extend_context(
    mut base: InvocationContext,
    kind: ContextInjection,
    registry: &Arc<ToolRegistry>,
) -> InvocationContext {
    base.injected = Some(match kind {
        ContextInjection::ProgrammaticView => {
            InjectedContext::Programmatic(registry.programmatic_view().clone())
        }
        ContextInjection::FullRegistry => InjectedContext::FullRegistry(registry.clone()),
    });
    base
}

/// Description of a failed invocation handed to the error reporter.
#[derive(Debug, Clone)]
pub struct ToolErrorInfo {
    pub error: String,
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// External error-reporting collaborator. Failures inside it are caught
/// and logged; they never mask the original tool failure.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, info: ToolErrorInfo, config: &RunConfig) -> Result<()>;
}

/// Executes one canonical call against the active registry.
pub struct ToolExecutor {
    registry: RegistryHandle,
    usage: Mutex<HashMap<String, u64>>,
    suppress_errors: bool,
    reporter: Option<Arc<dyn ErrorReporter>>,
    injections: HashMap<String, ContextInjection>,
}

impl ToolExecutor {
    pub fn new(registry: RegistryHandle) -> Self {
        Self {
            registry,
            usage: Mutex::new(HashMap::new()),
            suppress_errors: true,
            reporter: None,
            injections: HashMap::new(),
        }
    }

    /// When disabled, invocation failures propagate and abort the batch
    /// instead of becoming error messages. Defaults to enabled.
    pub fn with_suppression(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Register a context-injecting call kind for a well-known tool name.
    pub fn with_context_injection(
        mut self,
        name: impl Into<String>,
        kind: ContextInjection,
    ) -> Self {
        self.injections.insert(name.into(), kind);
        self
    }

    /// Read-only snapshot of per-tool invocation counts.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.usage
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Increment the usage count for `name`, returning the prior count.
    fn bump_usage(&self, name: &str) -> u64 {
        let mut usage = self
            .usage
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let count = usage.entry(name.to_string()).or_insert(0);
        let prior = *count;
        *count += 1;
        prior
    }

    /// Execute one canonical call and convert its result or failure into
    /// a uniform outcome.
    pub async fn execute(&self, call: &CanonicalToolCall, config: &RunConfig) -> Result<ToolOutcome> {
        let registry = self.registry.current();
        let Some(capability) = registry.resolve(&call.name) else {
            tracing::debug!(tool = %call.name, id = %call.id, "tool not found in registry");
            return Ok(ToolOutcome::Message(correction_message(
                &call.name,
                &call.id,
                &ToolWeaveError::ToolNotFound(call.name.clone()),
            )));
        };

        // Counted before invocation so a failing call still counts as
        // used; the prior count doubles as the zero-based turn number.
        let turn = self.bump_usage(&call.name);

        let mut ctx = InvocationContext {
            call_id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
            step_id: config.step_id.clone(),
            turn,
            injected: None,
        };
        if let Some(kind) = self.injections.get(&call.name) {
            ctx = extend_context(ctx, *kind, &registry);
        }

        match capability.invoke(ctx, config).await {
            Ok(ToolReturn::Message(msg)) => Ok(ToolOutcome::Message(msg)),
            Ok(ToolReturn::Directive(directive)) => Ok(ToolOutcome::Directive(directive)),
            Ok(ToolReturn::Value(value)) => Ok(ToolOutcome::Message(ToolMessage::success(
                &call.name,
                render_value(value),
                &call.id,
            ))),
            // Interrupts are never swallowed, whatever the suppression
            // setting.
            Err(err) if err.is_interrupt() => Err(err),
            Err(err) if !self.suppress_errors => Err(err),
            Err(err) => {
                if let Some(reporter) = &self.reporter {
                    let info = ToolErrorInfo {
                        error: err.to_string(),
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.args.clone(),
                    };
                    if let Err(report_err) = reporter.report(info, config).await {
                        tracing::warn!(
                            tool = %call.name,
                            error = %report_err,
                            "error reporter failed; original error outcome kept"
                        );
                    }
                }
                Ok(ToolOutcome::Message(correction_message(
                    &call.name,
                    &call.id,
                    &err,
                )))
            }
        }
    }
}

/// Error message instructing the model to correct its call.
fn correction_message(name: &str, call_id: &str, err: &ToolWeaveError) -> ToolMessage {
    ToolMessage::error(
        name,
        format!("Error: {err}\n Please fix your mistakes."),
        call_id,
    )
}

/// Serialize a raw capability result to message text.
fn render_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => serde_json::to_string(&other).unwrap_or_else(|_| other.to_string()),
    }
}
