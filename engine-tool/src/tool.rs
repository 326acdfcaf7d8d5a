//! The [`Tool`] trait and its metadata, grounded in the teacher's
//! `ToolDyn`/`ToolRegistry` pair (`neuron-tool`), generalized per
//! `spec.md` §6 to carry an execution-type tag and an optional
//! confirmation requirement.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use engine_types::ContentBlock;
use serde_json::Value;

use crate::error::ToolError;

/// Who executes a tool call, per `spec.md` §6.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// Executed in-process by this engine's [`Tool::run`].
    Server,
    /// Executed by an external client; the engine awaits a result via
    /// [`crate::coordinator::ClientToolCoordinator`].
    Client,
    /// Already executed by the model provider itself; the engine only
    /// records the result.
    Provider,
    /// Forwarded to an MCP transport (external collaborator, §1).
    Mcp,
}

/// Whether a tool call requires out-of-band confirmation before
/// executing, and if so, whether that depends on the call's input.
#[derive(Clone)]
pub enum ConfirmationRequirement {
    /// Never requires confirmation.
    Never,
    /// Always requires confirmation.
    Always,
    /// Requires confirmation iff the predicate returns `true` for the
    /// call's parsed input.
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl ConfirmationRequirement {
    /// Evaluate this requirement against a call's input.
    pub fn requires(&self, input: &Value) -> bool {
        match self {
            ConfirmationRequirement::Never => false,
            ConfirmationRequirement::Always => true,
            ConfirmationRequirement::Predicate(p) => p(input),
        }
    }
}

impl std::fmt::Debug for ConfirmationRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationRequirement::Never => write!(f, "Never"),
            ConfirmationRequirement::Always => write!(f, "Always"),
            ConfirmationRequirement::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Metadata describing a tool, independent of its executable body.
/// The provider-facing half of `spec.md` §3's "executable tool +
/// parallel provider-facing definitions" pair.
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    /// Unique name within a registry.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: Value,
    /// Who executes calls to this tool.
    pub execution_type: ExecutionType,
    /// Whether calls require confirmation before executing.
    pub requires_confirmation: ConfirmationRequirement,
    /// Free-form provider-specific options (e.g. caching hints),
    /// passed through to the model adapter unmodified.
    pub provider_options: Option<Value>,
}

impl ToolMetadata {
    /// Build metadata for a server-executed tool with no confirmation
    /// requirement and no provider options — the common case.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            execution_type: ExecutionType::Server,
            requires_confirmation: ConfirmationRequirement::Never,
            provider_options: None,
        }
    }

    /// Builder: set the execution type.
    pub fn with_execution_type(mut self, execution_type: ExecutionType) -> Self {
        self.execution_type = execution_type;
        self
    }

    /// Builder: set the confirmation requirement.
    pub fn with_confirmation(mut self, requirement: ConfirmationRequirement) -> Self {
        self.requires_confirmation = requirement;
        self
    }
}

/// The provider-facing shape of a tool: what gets handed to a model
/// adapter, stripped of anything execution-specific.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    /// The tool's name.
    pub name: String,
    /// The tool's description.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: Value,
    /// Who executes calls to this tool.
    pub execution_type: ExecutionType,
}

impl From<&ToolMetadata> for ToolDefinition {
    fn from(metadata: &ToolMetadata) -> Self {
        Self {
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            input_schema: metadata.input_schema.clone(),
            execution_type: metadata.execution_type,
        }
    }
}

/// Object-safe trait for tool implementations. Any tool source (local
/// function, MCP server, HTTP endpoint) implements this trait; tools
/// are stored as `Arc<dyn Tool>` in [`crate::ToolRegistry`], directly
/// grounded in the teacher's `ToolDyn`/`Arc<dyn ToolDyn>` pattern.
pub trait Tool: Send + Sync {
    /// This tool's metadata.
    fn metadata(&self) -> &ToolMetadata;

    /// Execute the tool, producing result content blocks.
    fn run(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Vec<ContentBlock>, ToolError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool(ToolMetadata);

    impl Tool for EchoTool {
        fn metadata(&self) -> &ToolMetadata {
            &self.0
        }

        fn run(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Vec<ContentBlock>, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(vec![ContentBlock::Json { value: input }]) })
        }
    }

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn tool_is_object_safe() {
        _assert_send_sync::<Arc<dyn Tool>>();
    }

    #[test]
    fn confirmation_predicate_consults_input() {
        let req = ConfirmationRequirement::Predicate(Arc::new(|v: &Value| v.get("dangerous").is_some()));
        assert!(req.requires(&json!({"dangerous": true})));
        assert!(!req.requires(&json!({})));
    }

    #[tokio::test]
    async fn echo_tool_runs() {
        let tool = EchoTool(ToolMetadata::new("echo", "echoes", json!({"type": "object"})));
        let result = tool.run(json!({"a": 1})).await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
