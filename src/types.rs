//! Core data model: streamed chunks, canonical calls, outcomes, and
//! registry records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved id prefix for calls the provider executes server-side.
/// Calls carrying this prefix are never dispatched to a local capability.
pub const SERVER_EXECUTED_PREFIX: &str = "srvtoolu_";

/// Caller tag for tools invocable directly by the model.
pub const DIRECT_CALLER: &str = "direct";

/// Caller tag for tools invocable through programmatic execution.
pub const PROGRAMMATIC_CALLER: &str = "programmatic";

/// A partial observation of one tool call within a stream.
///
/// Chunks for the same `index` arrive in stream order; their argument
/// fragments are concatenated and missing identity fields are back-filled
/// from earlier chunks at the same index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallChunk {
    /// Stream-local position of the call this chunk belongs to.
    pub index: usize,
    /// Call id, when the provider supplied one in this chunk.
    pub id: Option<String>,
    /// Tool name, when the provider supplied one in this chunk.
    pub name: Option<String>,
    /// Argument JSON fragment (concatenated across chunks).
    pub args_fragment: Option<String>,
}

impl ToolCallChunk {
    /// Chunk carrying only an argument fragment.
    pub fn fragment(index: usize, args: impl Into<String>) -> Self {
        Self {
            index,
            id: None,
            name: None,
            args_fragment: Some(args.into()),
        }
    }
}

/// Last-known-good identity for a call index within one streamed turn.
///
/// Written whenever a chunk supplies a non-empty name or id, read whenever
/// a later chunk or the final accumulated record lacks one.
#[derive(Debug, Clone, Default)]
pub struct RecoveredCallInfo {
    pub index: usize,
    pub name: String,
    pub id: String,
}

/// Tool call as providers put it on the wire: arguments still a JSON
/// string, identity possibly absent or empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// JSON-encoded argument string.
    #[serde(default)]
    pub arguments: String,
}

/// A fully reconstructed, executable tool invocation.
///
/// Invariant: `id` and `name` are non-empty. Calls failing this invariant
/// are dropped during normalization and never reach the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalToolCall {
    pub id: String,
    pub name: String,
    /// Parsed argument object; `{}` when the wire string was malformed.
    pub args: Value,
    /// Discriminator, always the literal `"tool_call"`.
    #[serde(default = "tool_call_kind")]
    pub kind: String,
}

fn tool_call_kind() -> String {
    "tool_call".to_string()
}

impl CanonicalToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            kind: tool_call_kind(),
        }
    }

    /// Whether this call was executed out-of-band by the provider.
    pub fn is_server_executed(&self) -> bool {
        self.id.starts_with(SERVER_EXECUTED_PREFIX)
    }
}

/// An assistant turn as received from upstream, before normalization.
///
/// Conforming providers populate `tool_calls`; non-conforming providers
/// leave it empty and place raw call records in `fallback_calls` (a
/// provider-metadata location), which the normalizer recovers from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAssistantTurn {
    /// Standard, complete tool-call list when the provider supplies one.
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
    /// Fallback location for raw call records (array of objects with
    /// `id`/`name`/`arguments` fields, any of which may be missing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_calls: Option<Value>,
}

/// Outcome status of one executed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMessageStatus {
    Success,
    Error,
}

/// Conversational result of one executed call, attributed to the
/// originating tool name and call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMessage {
    pub status: ToolMessageStatus,
    pub name: String,
    pub content: String,
    pub tool_call_id: String,
}

impl ToolMessage {
    pub fn success(
        name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            status: ToolMessageStatus::Success,
            name: name.into(),
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn error(
        name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            status: ToolMessageStatus::Error,
            name: name.into(),
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

/// Routing target of a control directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouteTarget {
    /// Redirect execution to the parent graph.
    Parent,
    /// Redirect execution to a named node in the current graph.
    Node { name: String },
}

/// One dispatch entry carried by a control directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub node: String,
    pub payload: Value,
}

/// A request to redirect graph execution.
///
/// Directives targeting the parent graph within one batch are merged: the
/// first becomes the accumulator and every subsequent parent-targeting
/// directive's dispatch targets are appended in outcome order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDirective {
    pub target: RouteTarget,
    pub sends: Vec<DispatchTarget>,
}

impl ControlDirective {
    pub fn to_parent(sends: Vec<DispatchTarget>) -> Self {
        Self {
            target: RouteTarget::Parent,
            sends,
        }
    }

    pub fn to_node(name: impl Into<String>, sends: Vec<DispatchTarget>) -> Self {
        Self {
            target: RouteTarget::Node { name: name.into() },
            sends,
        }
    }

    /// Whether this directive participates in parent-directive merging.
    pub fn is_parent_merge_candidate(&self) -> bool {
        self.target == RouteTarget::Parent && !self.sends.is_empty()
    }
}

/// Result of executing one canonical call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    Message(ToolMessage),
    Directive(ControlDirective),
}

/// Value a capability may return: a raw value to be wrapped as a success
/// message, a pre-formed message, or a control directive.
#[derive(Debug, Clone)]
pub enum ToolReturn {
    Value(Value),
    Message(ToolMessage),
    Directive(ControlDirective),
}

impl From<Value> for ToolReturn {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// Registry record for one tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool's parameters.
    #[serde(default)]
    pub parameters: Value,
    /// Caller tags allowed to invoke this tool. Absent on the wire means
    /// direct-only, which keeps the tool out of programmatic filtering.
    #[serde(default = "default_allowed_callers")]
    pub allowed_callers: Vec<String>,
}

fn default_allowed_callers() -> Vec<String> {
    vec![DIRECT_CALLER.to_string()]
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            allowed_callers: default_allowed_callers(),
        }
    }

    pub fn with_allowed_callers<I, S>(mut self, callers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_callers = callers.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows_caller(&self, tag: &str) -> bool {
        self.allowed_callers.iter().any(|c| c == tag)
    }
}

/// One entry of a routed batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BatchItem {
    /// Message batch for one call (single-element to preserve per-call
    /// boundaries when directives are present).
    Messages(Vec<ToolMessage>),
    Directive(ControlDirective),
}

/// Reconciled result of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BatchResult {
    /// No directive was produced: all messages as one flat batch.
    Flat(Vec<ToolMessage>),
    /// At least one directive was produced: per-call message batches and
    /// independent directives in input order, with the merged
    /// parent-directive (if any) appended last.
    Routed(Vec<BatchItem>),
}

impl BatchResult {
    /// Terminal state of the batch that produced this result.
    pub fn status(&self) -> BatchStatus {
        if self
            .messages()
            .iter()
            .any(|m| m.status == ToolMessageStatus::Error)
        {
            BatchStatus::PartiallyFailed
        } else {
            BatchStatus::AllSucceeded
        }
    }

    /// All tool messages in this result, in order. Directives are skipped.
    pub fn messages(&self) -> Vec<&ToolMessage> {
        match self {
            Self::Flat(msgs) => msgs.iter().collect(),
            Self::Routed(items) => items
                .iter()
                .filter_map(|i| match i {
                    BatchItem::Messages(msgs) => Some(msgs.iter()),
                    BatchItem::Directive(_) => None,
                })
                .flatten()
                .collect(),
        }
    }
}

/// Terminal state of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    AllSucceeded,
    PartiallyFailed,
}

/// Read-only snapshot of per-tool invocation counts.
pub type UsageSnapshot = HashMap<String, u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_call_serializes_kind_tag() {
        let call = CanonicalToolCall::new("c1", "search", serde_json::json!({"q": "x"}));
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v.get("kind").and_then(|k| k.as_str()), Some("tool_call"));
    }

    #[test]
    fn server_executed_prefix_detected() {
        let call = CanonicalToolCall::new("srvtoolu_abc", "web_search", serde_json::json!({}));
        assert!(call.is_server_executed());
        let call = CanonicalToolCall::new("call_abc", "web_search", serde_json::json!({}));
        assert!(!call.is_server_executed());
    }

    #[test]
    fn tool_def_defaults_to_direct_caller() {
        let def: ToolDef = serde_json::from_value(serde_json::json!({
            "name": "lookup",
        }))
        .unwrap();
        assert!(def.allows_caller(DIRECT_CALLER));
        assert!(!def.allows_caller(PROGRAMMATIC_CALLER));
    }

    #[test]
    fn parent_merge_candidate_requires_sends() {
        let d = ControlDirective::to_parent(vec![]);
        assert!(!d.is_parent_merge_candidate());
        let d = ControlDirective::to_parent(vec![DispatchTarget {
            node: "writer".into(),
            payload: serde_json::json!({}),
        }]);
        assert!(d.is_parent_merge_candidate());
        let d = ControlDirective::to_node("writer", vec![]);
        assert!(!d.is_parent_merge_candidate());
    }
}
