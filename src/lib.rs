//! # Toolweave - Tool-Call Reconciliation & Execution Core
//!
//! Toolweave sits between a streaming language-model client and a
//! graph-based multi-agent orchestrator. Providers emit tool invocations
//! incrementally and inconsistently; this crate reconstructs canonical
//! calls from fragmented (and possibly malformed) streaming input,
//! executes them against a replaceable per-run tool registry with
//! isolation between failures, and reconciles message and graph-routing
//! outcomes into a single coherent batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolweave::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     // Reconstruct calls from streamed fragments
//!     let mut acc = ChunkAccumulator::new();
//!     acc.push(ToolCallChunk {
//!         index: 0,
//!         id: Some("c1".into()),
//!         name: Some("search".into()),
//!         args_fragment: Some(r#"{"q":"rust"}"#.into()),
//!     });
//!     let calls = acc.finalize();
//!
//!     // Execute them as one batch
//!     let registry = RegistryHandle::new(ToolRegistry::default());
//!     let executor = Arc::new(ToolExecutor::new(registry.clone()));
//!     let coordinator = BatchCoordinator::new(executor, registry);
//!     let result = coordinator
//!         .run(
//!             ToolBatchRequest::Turn(AssistantTurn::new(calls)),
//!             &RunConfig::default(),
//!         )
//!         .await?;
//!     println!("{} outcomes", result.messages().len());
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod registry;
pub mod stream;
pub mod types;

/// Commonly used types, re-exported for convenient glob import.
pub mod prelude {
    pub use crate::batch::{AssistantTurn, BatchCoordinator, ToolBatchRequest};
    pub use crate::config::RunConfig;
    pub use crate::error::{Result, ToolWeaveError};
    pub use crate::events::{
        ChannelSink, EmitOptions, EventAggregator, EventSink, ForwardedEvent, RunNotification,
        StepMeta, StepPayload,
    };
    pub use crate::executor::{
        ContextInjection, ErrorReporter, InjectedContext, InvocationContext, ToolErrorInfo,
        ToolExecutor,
    };
    pub use crate::registry::{
        DynamicToolLoader, FilteredView, RegistryHandle, ToolCapability, ToolRegistry,
    };
    pub use crate::stream::{ChunkAccumulator, normalize_turn};
    pub use crate::types::{
        BatchItem, BatchResult, BatchStatus, CanonicalToolCall, ControlDirective, DispatchTarget,
        RawAssistantTurn, RouteTarget, SERVER_EXECUTED_PREFIX, ToolCallChunk, ToolDef,
        ToolMessage, ToolMessageStatus, ToolOutcome, ToolReturn, WireToolCall,
    };
}
