//! Tool registry: name-to-capability resolution with caller-filtered
//! views.
//!
//! The registry is replaceable as a whole unit only. The caller-filtered
//! programmatic view is computed lazily once per registry instance, so a
//! replacement (a new instance) is also the cache invalidation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;

use crate::config::RunConfig;
use crate::error::Result;
use crate::executor::InvocationContext;
use crate::types::{CanonicalToolCall, PROGRAMMATIC_CALLER, ToolDef, ToolReturn};

/// An invokable tool capability.
///
/// Accepts the invocation context and the run configuration, and returns
/// either a raw value, a pre-formed tool message, or a control directive.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    async fn invoke(&self, ctx: InvocationContext, config: &RunConfig) -> Result<ToolReturn>;
}

/// Name-to-capability map together with the ordered filtered definitions,
/// built in a single pass over the registry.
#[derive(Clone, Default)]
pub struct FilteredView {
    pub tools: HashMap<String, Arc<dyn ToolCapability>>,
    pub defs: Vec<ToolDef>,
}

impl std::fmt::Debug for FilteredView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredView")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("defs", &self.defs.len())
            .finish()
    }
}

/// The set of tools available to one orchestrator instance.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolCapability>>,
    defs: Vec<ToolDef>,
    programmatic: OnceLock<FilteredView>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ToolRegistry {
    /// Build a registry from definition/capability pairs. Definition
    /// order is preserved for filtered views.
    pub fn new(entries: Vec<(ToolDef, Arc<dyn ToolCapability>)>) -> Self {
        let mut tools = HashMap::with_capacity(entries.len());
        let mut defs = Vec::with_capacity(entries.len());
        for (def, capability) in entries {
            tools.insert(def.name.clone(), capability);
            defs.push(def);
        }
        Self {
            tools,
            defs,
            programmatic: OnceLock::new(),
        }
    }

    /// Resolve a tool name to its capability.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolCapability>> {
        self.tools.get(name).cloned()
    }

    /// Ordered tool definitions.
    pub fn defs(&self) -> &[ToolDef] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Single-pass filtered view for a caller tag: simultaneously builds
    /// the name-to-capability map and the ordered definition list of
    /// tools whose allowed-caller set includes `caller`.
    pub fn filtered_view(&self, caller: &str) -> FilteredView {
        let mut view = FilteredView::default();
        for def in &self.defs {
            if !def.allows_caller(caller) {
                continue;
            }
            if let Some(capability) = self.tools.get(&def.name) {
                view.tools.insert(def.name.clone(), capability.clone());
                view.defs.push(def.clone());
            }
        }
        view
    }

    /// Filtered view for programmatic execution, computed at most once
    /// per registry instance.
    pub fn programmatic_view(&self) -> &FilteredView {
        self.programmatic
            .get_or_init(|| self.filtered_view(PROGRAMMATIC_CALLER))
    }
}

/// Shared, whole-unit-replaceable handle to the active registry.
///
/// Replacement is last-writer-wins and only occurs at batch-dispatch
/// boundaries, never mid-invocation.
#[derive(Clone)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Arc<ToolRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// Snapshot of the currently active registry.
    pub fn current(&self) -> Arc<ToolRegistry> {
        self.inner
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Swap in a new registry. The previous instance's cached views die
    /// with it.
    pub fn replace(&self, registry: ToolRegistry) {
        tracing::debug!(tools = registry.len(), "replacing active tool registry");
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        *guard = Arc::new(registry);
    }
}

/// Optional collaborator that can swap the registry for a batch, keyed on
/// the calls about to run (e.g. runtime-loaded toolsets).
#[async_trait]
pub trait DynamicToolLoader: Send + Sync {
    /// Return a replacement registry for this batch, or `None` to keep
    /// the current one.
    async fn load(&self, pending: &[CanonicalToolCall]) -> Result<Option<ToolRegistry>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DIRECT_CALLER;
    use serde_json::Value;

    struct Echo;

    #[async_trait]
    impl ToolCapability for Echo {
        async fn invoke(&self, ctx: InvocationContext, _config: &RunConfig) -> Result<ToolReturn> {
            Ok(ToolReturn::Value(ctx.args))
        }
    }

    fn entry(name: &str, callers: &[&str]) -> (ToolDef, Arc<dyn ToolCapability>) {
        (
            ToolDef::new(name, "", Value::Null).with_allowed_callers(callers.iter().copied()),
            Arc::new(Echo),
        )
    }

    #[test]
    fn filtered_view_respects_caller_tags() {
        let registry = ToolRegistry::new(vec![
            entry("direct_only", &[DIRECT_CALLER]),
            entry("both", &[DIRECT_CALLER, PROGRAMMATIC_CALLER]),
            entry("prog_only", &[PROGRAMMATIC_CALLER]),
        ]);
        let view = registry.programmatic_view();
        assert_eq!(view.defs.len(), 2);
        assert_eq!(view.defs[0].name, "both");
        assert_eq!(view.defs[1].name, "prog_only");
        assert!(view.tools.contains_key("prog_only"));
        assert!(!view.tools.contains_key("direct_only"));
    }

    #[test]
    fn programmatic_view_is_cached_per_instance() {
        let registry = ToolRegistry::new(vec![entry("a", &[PROGRAMMATIC_CALLER])]);
        let first = registry.programmatic_view() as *const FilteredView;
        let second = registry.programmatic_view() as *const FilteredView;
        assert_eq!(first, second);
    }

    #[test]
    fn replacement_swaps_whole_instance() {
        let handle = RegistryHandle::new(ToolRegistry::new(vec![entry("old", &[DIRECT_CALLER])]));
        assert!(handle.current().resolve("old").is_some());

        handle.replace(ToolRegistry::new(vec![entry("new", &[DIRECT_CALLER])]));
        let current = handle.current();
        assert!(current.resolve("old").is_none());
        assert!(current.resolve("new").is_some());
    }
}
