//! Registry of tools available to one execution, plus the parallel
//! provider-facing definition list `spec.md` §3 describes ("a mapping
//! from name to executable tool ... and a parallel mapping of
//! provider-facing definitions").

use std::collections::HashMap;
use std::sync::Arc;

use crate::tool::{Tool, ToolDefinition};

/// Holds tools as `Arc<dyn Tool>` keyed by name, directly grounded in
/// the teacher's `ToolRegistry` (`neuron-tool`). Registration is
/// idempotent by name per `spec.md` §4.4: re-registering the same name
/// overwrites.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Silently a no-op if its name is empty (per
    /// `spec.md` §4.4's `addTool` contract); overwrites any existing
    /// tool under the same name otherwise.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        if name.is_empty() {
            return;
        }
        tracing::trace!(tool = %name, "engine.com.tool_registered");
        self.tools.insert(name, tool);
    }

    /// Remove a tool by name. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            tracing::trace!(tool = %name, "engine.com.tool_removed");
        }
        removed
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Every registered tool's provider-facing definition, in
    /// insertion-unordered (`HashMap`) but stable-per-call order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| ToolDefinition::from(t.metadata())).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Remove every registered tool (used by `COM::clear()`).
    pub fn clear(&mut self) {
        self.tools.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolMetadata;
    use engine_types::ContentBlock;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;

    struct Echo(ToolMetadata);
    impl Tool for Echo {
        fn metadata(&self) -> &ToolMetadata {
            &self.0
        }
        fn run(&self, input: serde_json::Value) -> Pin<Box<dyn Future<Output = Result<Vec<ContentBlock>, crate::error::ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(vec![ContentBlock::Json { value: input }]) })
        }
    }

    fn echo(name: &str) -> Arc<dyn Tool> {
        Arc::new(Echo(ToolMetadata::new(name, "echoes", json!({"type": "object"}))))
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(echo("a"));
        reg.register(echo("a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn empty_name_is_silently_ignored() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(Echo(ToolMetadata::new("", "", json!({})))));
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let mut reg = ToolRegistry::new();
        reg.register(echo("a"));
        assert!(reg.remove("a"));
        assert!(!reg.remove("a"));
    }

    #[test]
    fn definitions_mirror_registered_tools() {
        let mut reg = ToolRegistry::new();
        reg.register(echo("a"));
        reg.register(echo("b"));
        let defs = reg.definitions();
        assert_eq!(defs.len(), 2);
    }
}
