//! Streamed tool-call reconstruction.
//!
//! [`accumulator`] merges fragmented chunks by stream index and keeps
//! last-known-good identities; [`normalizer`] turns a raw assistant turn
//! (standard list or fallback records) into canonical calls.

pub mod accumulator;
pub mod normalizer;

pub use accumulator::{ChunkAccumulator, parse_arguments, synthesize_call_id};
pub use normalizer::normalize_turn;
