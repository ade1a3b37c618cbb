//! Chunk accumulation for streamed tool calls.
//!
//! Providers fragment tool calls across many stream events and not all of
//! them repeat the call's id or name on every fragment. The accumulator
//! merges fragments by stream index, keeps a last-known-good identity per
//! index, and reconstructs canonical calls once the turn is complete.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::types::{CanonicalToolCall, RecoveredCallInfo, ToolCallChunk};

/// Partially accumulated state for one call index.
#[derive(Debug, Clone, Default)]
struct CallSlot {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates [`ToolCallChunk`]s for one assistant turn.
///
/// A chunk carrying identity (a non-empty id or name) begins the call at
/// its index: providers emit identity only on a call's opening fragment,
/// so an identity-bearing chunk re-initializes the slot. This also keeps
/// replays stable: re-pushing an already-accumulated sequence starts the
/// slot over instead of doubling its content. Identity-less fragments
/// extend the argument text, and terminal closing chunks with empty
/// fragments never erase it.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    slots: BTreeMap<usize, CallSlot>,
    recovered: HashMap<usize, RecoveredCallInfo>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one chunk into the accumulated state.
    ///
    /// Identity fields carried by the chunk are also written to the
    /// recovery map immediately, so a later chunk (or the final
    /// accumulated record) that lacks them can still be identified.
    pub fn push(&mut self, chunk: ToolCallChunk) {
        let has_identity = matches!(chunk.id.as_deref(), Some(id) if !id.is_empty())
            || matches!(chunk.name.as_deref(), Some(name) if !name.is_empty());

        if has_identity {
            // Opening (or replayed) fragment of the call at this index.
            // A wiped id is still reachable through the recovery map.
            self.slots.insert(
                chunk.index,
                CallSlot {
                    id: chunk.id.clone().unwrap_or_default(),
                    name: chunk.name.clone().unwrap_or_default(),
                    arguments: chunk.args_fragment.clone().unwrap_or_default(),
                },
            );
        } else {
            let slot = self.slots.entry(chunk.index).or_default();
            if let Some(args) = chunk.args_fragment.as_deref() {
                slot.arguments.push_str(args);
            }
        }

        self.record_recovery(chunk.index, chunk.name.as_deref(), chunk.id.as_deref());
    }

    /// Record a last-known-good identity observation for `index`.
    pub fn record_recovery(&mut self, index: usize, name: Option<&str>, id: Option<&str>) {
        if !matches!(name, Some(n) if !n.is_empty()) && !matches!(id, Some(i) if !i.is_empty()) {
            return;
        }
        let entry = self.recovered.entry(index).or_insert_with(|| {
            RecoveredCallInfo {
                index,
                ..Default::default()
            }
        });
        if let Some(name) = name
            && !name.is_empty()
        {
            entry.name = name.to_string();
        }
        if let Some(id) = id
            && !id.is_empty()
        {
            entry.id = id.to_string();
        }
    }

    /// Last-known-good identity for `index`, if any chunk supplied one.
    pub fn recovered(&self, index: usize) -> Option<&RecoveredCallInfo> {
        self.recovered.get(&index)
    }

    /// Reconstruct the ordered canonical call list for this turn.
    ///
    /// Idempotent: ids synthesized here are written back into the
    /// recovery map, so finalizing again (or replaying the same chunks)
    /// yields the same list. Slots that never received a name anywhere
    /// are dropped: the upstream gave no executable intent.
    pub fn finalize(&mut self) -> Vec<CanonicalToolCall> {
        let indices: Vec<usize> = self.slots.keys().copied().collect();
        let mut calls = Vec::with_capacity(indices.len());

        for index in indices {
            let slot = self.slots[&index].clone();
            let name = if !slot.name.is_empty() {
                slot.name.clone()
            } else if let Some(info) = self.recovered.get(&index) {
                info.name.clone()
            } else {
                String::new()
            };
            if name.is_empty() {
                tracing::debug!(index, "dropping tool call with no recoverable name");
                continue;
            }

            let id = if !slot.id.is_empty() {
                slot.id.clone()
            } else {
                let recovered_id = self
                    .recovered
                    .get(&index)
                    .map(|info| info.id.clone())
                    .unwrap_or_default();
                if !recovered_id.is_empty() {
                    recovered_id
                } else {
                    let id = synthesize_call_id();
                    tracing::debug!(index, id = %id, "synthesized id for unidentified tool call");
                    self.record_recovery(index, Some(&name), Some(&id));
                    id
                }
            };

            calls.push(CanonicalToolCall::new(
                id,
                name,
                parse_arguments(&slot.arguments),
            ));
        }

        calls
    }

    /// Clear all per-turn state, including recovered identities.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.recovered.clear();
    }
}

/// Parse a wire argument string, tolerating malformed input.
///
/// A malformed argument string must not drop an otherwise-identifiable
/// call, so decode failures yield an empty object instead of an error.
pub fn parse_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "malformed tool arguments, substituting empty object");
        Value::Object(Default::default())
    })
}

/// Synthesize a call id for calls the upstream never identified:
/// timestamp millis plus a random suffix.
pub fn synthesize_call_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "call_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}
