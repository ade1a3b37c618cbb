//! Normalization of raw assistant turns into canonical tool calls.
//!
//! Conforming providers hand over a complete tool-call list and need no
//! recovery. Non-conforming providers leave the list empty and bury raw
//! call records in a fallback location, often without ids or names on
//! every record; those are reconstructed positionally against the
//! accumulator's recovered identities.

use serde_json::Value;

use super::accumulator::{ChunkAccumulator, parse_arguments, synthesize_call_id};
use crate::types::{CanonicalToolCall, RawAssistantTurn};

/// Produce the final ordered canonical call list for one assistant turn.
pub fn normalize_turn(
    acc: &mut ChunkAccumulator,
    turn: &RawAssistantTurn,
) -> Vec<CanonicalToolCall> {
    if !turn.tool_calls.is_empty() {
        return turn
            .tool_calls
            .iter()
            .filter_map(|call| {
                if call.name.is_empty() {
                    tracing::debug!(id = %call.id, "dropping wire call with empty name");
                    return None;
                }
                let id = if call.id.is_empty() {
                    synthesize_call_id()
                } else {
                    call.id.clone()
                };
                Some(CanonicalToolCall::new(
                    id,
                    call.name.clone(),
                    parse_arguments(&call.arguments),
                ))
            })
            .collect();
    }

    let Some(records) = turn.fallback_calls.as_ref().and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut calls = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let record_name = str_field(record, "name");
        let record_id = str_field(record, "id");

        // Identity carried by the record itself feeds recovery for later
        // records and turns of the same stream.
        acc.record_recovery(index, Some(&record_name), Some(&record_id));

        let name = if !record_name.is_empty() {
            record_name
        } else {
            acc.recovered(index)
                .map(|info| info.name.clone())
                .unwrap_or_default()
        };
        if name.is_empty() {
            tracing::debug!(index, "dropping fallback call with no recoverable name");
            continue;
        }

        let id = if !record_id.is_empty() {
            record_id
        } else {
            let recovered = acc
                .recovered(index)
                .map(|info| info.id.clone())
                .unwrap_or_default();
            if !recovered.is_empty() {
                recovered
            } else {
                let id = synthesize_call_id();
                acc.record_recovery(index, Some(&name), Some(&id));
                id
            }
        };

        let args = match record.get("arguments") {
            Some(Value::String(s)) => parse_arguments(s),
            Some(v @ Value::Object(_)) => v.clone(),
            _ => Value::Object(Default::default()),
        };

        calls.push(CanonicalToolCall::new(id, name, args));
    }
    calls
}

fn str_field(record: &Value, field: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCallChunk, WireToolCall};

    #[test]
    fn standard_list_used_directly() {
        let mut acc = ChunkAccumulator::new();
        let turn = RawAssistantTurn {
            tool_calls: vec![WireToolCall {
                id: "c1".into(),
                name: "search".into(),
                arguments: r#"{"q":"rust"}"#.into(),
            }],
            fallback_calls: Some(serde_json::json!([{"name": "ignored"}])),
        };
        let calls = normalize_turn(&mut acc, &turn);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].args, serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn fallback_records_recover_identity_from_chunks() {
        let mut acc = ChunkAccumulator::new();
        acc.push(ToolCallChunk {
            index: 0,
            id: Some("c7".into()),
            name: Some("lookup".into()),
            args_fragment: None,
        });
        let turn = RawAssistantTurn {
            tool_calls: vec![],
            fallback_calls: Some(serde_json::json!([
                {"arguments": r#"{"key":"v"}"#}
            ])),
        };
        let calls = normalize_turn(&mut acc, &turn);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c7");
        assert_eq!(calls[0].name, "lookup");
        assert_eq!(calls[0].args, serde_json::json!({"key": "v"}));
    }

    #[test]
    fn fallback_without_identity_is_dropped() {
        let mut acc = ChunkAccumulator::new();
        let turn = RawAssistantTurn {
            tool_calls: vec![],
            fallback_calls: Some(serde_json::json!([
                {"arguments": "{}"}
            ])),
        };
        assert!(normalize_turn(&mut acc, &turn).is_empty());
    }

    #[test]
    fn fallback_without_id_gets_synthesized_one() {
        let mut acc = ChunkAccumulator::new();
        let turn = RawAssistantTurn {
            tool_calls: vec![],
            fallback_calls: Some(serde_json::json!([
                {"name": "search", "arguments": "not-json"}
            ])),
        };
        let calls = normalize_turn(&mut acc, &turn);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].args, serde_json::json!({}));

        // Same turn normalized again reuses the recorded id.
        let again = normalize_turn(&mut acc, &turn);
        assert_eq!(again[0].id, calls[0].id);
    }

    #[test]
    fn object_arguments_accepted_as_is() {
        let mut acc = ChunkAccumulator::new();
        let turn = RawAssistantTurn {
            tool_calls: vec![],
            fallback_calls: Some(serde_json::json!([
                {"id": "c1", "name": "search", "arguments": {"q": 1}}
            ])),
        };
        let calls = normalize_turn(&mut acc, &turn);
        assert_eq!(calls[0].args, serde_json::json!({"q": 1}));
    }
}
