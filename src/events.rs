//! Outward event routing for multi-agent runs.
//!
//! Consumes step and delta notifications from the run loop and decides,
//! per multi-agent visibility rules, what the transport layer gets to
//! see. Tool-call argument deltas are additionally fed to an internal
//! accumulator so the aggregator can reconstruct calls regardless of
//! what was forwarded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::ChunkAccumulator;
use crate::types::{CanonicalToolCall, ToolCallChunk, ToolMessage};

/// Per-notification metadata: which agent produced it and its place in
/// the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMeta {
    /// Owning agent name.
    pub agent: String,
    /// Whether this agent is the designated terminal agent of the chain.
    pub is_terminal_agent: bool,
}

/// Payload of one step notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepPayload {
    /// The step produced tool calls. Always forwarded.
    ToolCalls(Vec<CanonicalToolCall>),
    /// The step produced tool results.
    ToolResults(Vec<ToolMessage>),
    /// The step produced assistant text.
    Text(String),
}

impl StepPayload {
    fn is_tool_call_step(&self) -> bool {
        matches!(self, Self::ToolCalls(_))
    }
}

/// Notification received from the run loop.
#[derive(Debug, Clone)]
pub enum RunNotification {
    /// A run step completed.
    Step { meta: StepMeta, payload: StepPayload },
    /// A streamed tool-call fragment arrived.
    Delta { meta: StepMeta, chunk: ToolCallChunk },
}

/// Event forwarded to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardedEvent {
    Step { agent: String, payload: StepPayload },
    Delta { agent: String, chunk: ToolCallChunk },
    /// Generic substitute emitted in place of hidden intermediate-agent
    /// output.
    Progress { agent: String },
}

/// Receives forwarded events, in the order they were decided.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ForwardedEvent);
}

/// Sink backed by an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ForwardedEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ForwardedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ForwardedEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped, discarding forwarded event");
        }
    }
}

/// Visibility configuration for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitOptions {
    /// Hide intermediate-agent output, substituting progress events.
    pub hide_intermediate: bool,
}

/// Routes run notifications to an [`EventSink`] per visibility rules.
pub struct EventAggregator {
    options: EmitOptions,
    sink: Arc<dyn EventSink>,
    accumulator: ChunkAccumulator,
}

impl EventAggregator {
    pub fn new(options: EmitOptions, sink: Arc<dyn EventSink>) -> Self {
        Self {
            options,
            sink,
            accumulator: ChunkAccumulator::new(),
        }
    }

    /// Apply the per-notification decision rule and forward accordingly.
    pub fn handle(&mut self, notification: RunNotification) {
        match notification {
            RunNotification::Step { meta, payload } => {
                if payload.is_tool_call_step() || meta.is_terminal_agent {
                    self.sink.emit(ForwardedEvent::Step {
                        agent: meta.agent,
                        payload,
                    });
                } else if !self.options.hide_intermediate {
                    self.sink.emit(ForwardedEvent::Step {
                        agent: meta.agent,
                        payload,
                    });
                } else {
                    self.sink.emit(ForwardedEvent::Progress { agent: meta.agent });
                }
            }
            RunNotification::Delta { meta, chunk } => {
                // Internal aggregation sees every delta, forwarded or not.
                self.accumulator.push(chunk.clone());

                // A terminal empty fragment would overwrite accumulated
                // argument text on the receiving side; keep it internal.
                if chunk.args_fragment.is_none() {
                    tracing::debug!(index = chunk.index, "filtering terminal empty delta");
                    return;
                }
                self.sink.emit(ForwardedEvent::Delta {
                    agent: meta.agent,
                    chunk,
                });
            }
        }
    }

    /// Finalize the internally aggregated tool calls for this turn and
    /// reset for the next one.
    pub fn take_aggregated_calls(&mut self) -> Vec<CanonicalToolCall> {
        let calls = self.accumulator.finalize();
        self.accumulator.reset();
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(agent: &str, terminal: bool) -> StepMeta {
        StepMeta {
            agent: agent.into(),
            is_terminal_agent: terminal,
        }
    }

    fn aggregator(hide: bool) -> (EventAggregator, mpsc::UnboundedReceiver<ForwardedEvent>) {
        let (sink, rx) = ChannelSink::new();
        (
            EventAggregator::new(
                EmitOptions {
                    hide_intermediate: hide,
                },
                Arc::new(sink),
            ),
            rx,
        )
    }

    #[tokio::test]
    async fn tool_call_steps_always_forwarded() {
        let (mut agg, mut rx) = aggregator(true);
        agg.handle(RunNotification::Step {
            meta: meta("researcher", false),
            payload: StepPayload::ToolCalls(vec![CanonicalToolCall::new(
                "c1",
                "search",
                serde_json::json!({}),
            )]),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            ForwardedEvent::Step { agent, .. } if agent == "researcher"
        ));
    }

    #[tokio::test]
    async fn terminal_agent_text_forwarded_even_when_hidden() {
        let (mut agg, mut rx) = aggregator(true);
        agg.handle(RunNotification::Step {
            meta: meta("finalizer", true),
            payload: StepPayload::Text("answer".into()),
        });
        assert!(matches!(rx.try_recv().unwrap(), ForwardedEvent::Step { .. }));
    }

    #[tokio::test]
    async fn hidden_intermediate_text_substituted_with_progress() {
        let (mut agg, mut rx) = aggregator(true);
        agg.handle(RunNotification::Step {
            meta: meta("researcher", false),
            payload: StepPayload::Text("thinking".into()),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            ForwardedEvent::Progress { agent } if agent == "researcher"
        ));
    }

    #[tokio::test]
    async fn visible_intermediate_text_forwarded_raw() {
        let (mut agg, mut rx) = aggregator(false);
        agg.handle(RunNotification::Step {
            meta: meta("researcher", false),
            payload: StepPayload::Text("thinking".into()),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            ForwardedEvent::Step { payload: StepPayload::Text(t), .. } if t == "thinking"
        ));
    }

    #[tokio::test]
    async fn terminal_empty_delta_filtered_but_aggregated() {
        let (mut agg, mut rx) = aggregator(false);
        agg.handle(RunNotification::Delta {
            meta: meta("researcher", false),
            chunk: ToolCallChunk {
                index: 0,
                id: Some("c1".into()),
                name: Some("search".into()),
                args_fragment: Some(r#"{"q":"x"}"#.into()),
            },
        });
        agg.handle(RunNotification::Delta {
            meta: meta("researcher", false),
            chunk: ToolCallChunk {
                index: 0,
                id: None,
                name: None,
                args_fragment: None,
            },
        });

        // Only the first delta went outward.
        assert!(matches!(rx.try_recv().unwrap(), ForwardedEvent::Delta { .. }));
        assert!(rx.try_recv().is_err());

        // Internal aggregation still saw both and reconstructs the call.
        let calls = agg.take_aggregated_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].args, serde_json::json!({"q": "x"}));
    }

    #[tokio::test]
    async fn aggregation_resets_between_turns() {
        let (mut agg, _rx) = aggregator(false);
        agg.handle(RunNotification::Delta {
            meta: meta("a", false),
            chunk: ToolCallChunk {
                index: 0,
                id: Some("c1".into()),
                name: Some("search".into()),
                args_fragment: Some("{}".into()),
            },
        });
        assert_eq!(agg.take_aggregated_calls().len(), 1);
        assert!(agg.take_aggregated_calls().is_empty());
    }
}
