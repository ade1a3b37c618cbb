//! Batch coordination: filters an upstream assistant turn down to the
//! calls that actually need local execution, runs them concurrently, and
//! reconciles message and directive outcomes into one batch result.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;

use crate::config::RunConfig;
use crate::error::Result;
use crate::executor::ToolExecutor;
use crate::registry::{DynamicToolLoader, RegistryHandle};
use crate::types::{
    BatchItem, BatchResult, CanonicalToolCall, ControlDirective, ToolMessage, ToolOutcome,
};

/// One upstream assistant turn: the canonical calls it requested plus the
/// tool results that already exist in the conversation.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub calls: Vec<CanonicalToolCall>,
    /// Results already present in the conversation; their call ids are
    /// never re-executed.
    pub prior_results: Vec<ToolMessage>,
}

impl AssistantTurn {
    pub fn new(calls: Vec<CanonicalToolCall>) -> Self {
        Self {
            calls,
            prior_results: Vec::new(),
        }
    }

    pub fn with_prior_results(mut self, results: Vec<ToolMessage>) -> Self {
        self.prior_results = results;
        self
    }
}

/// Input to one batch run: either explicit dispatch of a single call by
/// identity, or a full assistant turn.
#[derive(Debug, Clone)]
pub enum ToolBatchRequest {
    Single(CanonicalToolCall),
    Turn(AssistantTurn),
}

/// Runs the calls of one assistant turn and reconciles their outcomes.
pub struct BatchCoordinator {
    executor: Arc<ToolExecutor>,
    registry: RegistryHandle,
    loader: Option<Arc<dyn DynamicToolLoader>>,
}

impl BatchCoordinator {
    /// `registry` must be the same handle the executor resolves against,
    /// so that a dynamic swap is visible to this batch's dispatch.
    pub fn new(executor: Arc<ToolExecutor>, registry: RegistryHandle) -> Self {
        Self {
            executor,
            registry,
            loader: None,
        }
    }

    pub fn with_dynamic_loader(mut self, loader: Arc<dyn DynamicToolLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Execute the batch and reconcile its outcomes.
    ///
    /// Remaining calls run concurrently; the outcome list preserves the
    /// input call order. Only an interrupt, or an invocation failure with
    /// suppression disabled, aborts the batch.
    pub async fn run(&self, request: ToolBatchRequest, config: &RunConfig) -> Result<BatchResult> {
        let pending = self.pending_calls(request);

        if let Some(loader) = &self.loader
            && let Some(replacement) = loader.load(&pending).await?
        {
            // Swapping the instance also invalidates its cached
            // programmatic view.
            self.registry.replace(replacement);
        }

        let outcomes = try_join_all(
            pending
                .iter()
                .map(|call| self.executor.execute(call, config)),
        )
        .await?;

        Ok(reconcile(outcomes))
    }

    fn pending_calls(&self, request: ToolBatchRequest) -> Vec<CanonicalToolCall> {
        let (calls, satisfied): (Vec<_>, HashSet<String>) = match request {
            ToolBatchRequest::Single(call) => (vec![call], HashSet::new()),
            ToolBatchRequest::Turn(turn) => {
                let satisfied = turn
                    .prior_results
                    .iter()
                    .map(|m| m.tool_call_id.clone())
                    .collect();
                (turn.calls, satisfied)
            }
        };

        calls
            .into_iter()
            .filter(|call| {
                if satisfied.contains(&call.id) {
                    tracing::debug!(id = %call.id, tool = %call.name, "call already satisfied, skipping");
                    return false;
                }
                if call.is_server_executed() {
                    tracing::debug!(id = %call.id, tool = %call.name, "server-executed call, skipping");
                    return false;
                }
                true
            })
            .collect()
    }
}

/// Merge outcomes into the batch result shape.
///
/// Without directives the messages come back as one flat batch. With
/// directives, each message is wrapped as its own single-element batch,
/// non-parent directives stay independent in place, and parent-targeting
/// directives with dispatch lists collapse into a single directive whose
/// dispatch targets are concatenated in outcome order, appended last.
fn reconcile(outcomes: Vec<ToolOutcome>) -> BatchResult {
    if !outcomes
        .iter()
        .any(|o| matches!(o, ToolOutcome::Directive(_)))
    {
        return BatchResult::Flat(
            outcomes
                .into_iter()
                .filter_map(|o| match o {
                    ToolOutcome::Message(m) => Some(m),
                    ToolOutcome::Directive(_) => None,
                })
                .collect(),
        );
    }

    let mut items = Vec::with_capacity(outcomes.len());
    let mut merged_parent: Option<ControlDirective> = None;
    for outcome in outcomes {
        match outcome {
            ToolOutcome::Message(msg) => items.push(BatchItem::Messages(vec![msg])),
            ToolOutcome::Directive(directive) if directive.is_parent_merge_candidate() => {
                match merged_parent.as_mut() {
                    Some(acc) => acc.sends.extend(directive.sends),
                    None => merged_parent = Some(directive),
                }
            }
            ToolOutcome::Directive(directive) => items.push(BatchItem::Directive(directive)),
        }
    }
    if let Some(directive) = merged_parent {
        items.push(BatchItem::Directive(directive));
    }
    BatchResult::Routed(items)
}
