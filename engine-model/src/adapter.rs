//! The [`ModelAdapter`] boundary: what the tick orchestrator dispatches
//! a tick's formatted input to (`spec.md` §6).
//!
//! Unlike the teacher's `Provider` trait (`neuron-turn::provider`,
//! deliberately not object-safe via RPITIT, generic over one concrete
//! backend), this seam needs a *pluggable, swappable-at-runtime*
//! adapter behind `Arc<dyn ModelAdapter>` — so it follows the object-safe
//! `Operator`/`Turn` pattern (`async_trait`) instead, per `SPEC_FULL.md`
//! §6's resolution.

use std::pin::Pin;

use async_trait::async_trait;
use engine_types::ContentBlock;
use futures::Stream;
use serde_json::Value;

use crate::error::ModelError;

/// Generation parameters plus presentation hints (`spec.md` §3's
/// `modelOptions`).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelOptions {
    /// Sampling temperature, if the adapter supports it.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Role name and delimiter to use when rendering `event`-role
    /// timeline entries inline (some adapters have no native "event"
    /// role and must fold it into a delimited user/system block).
    pub event_role_mapping: Option<RoleMapping>,
    /// Role name and delimiter to use when rendering ephemeral content
    /// inline.
    pub ephemeral_role_mapping: Option<RoleMapping>,
    /// Name of the preferred renderer for this adapter (e.g. `"xml"`),
    /// consulted by the structure renderer's resolution algorithm
    /// (§4.3) as the default when no element overrides it.
    pub preferred_renderer: Option<String>,
}

/// How to fold a non-native role into a delimited block of another role.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RoleMapping {
    /// The role to present this content under.
    pub role: String,
    /// Delimiter wrapped around the content, e.g. `("<event>", "</event>")`.
    pub delimiter: (String, String),
}

/// Declared capabilities of a model adapter, surfaced via [`ModelMetadata`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelCapabilities {
    /// Whether the adapter supports `stream`.
    pub streaming: bool,
    /// Whether the adapter supports image content blocks.
    pub images: bool,
    /// Whether the adapter supports extended/chain-of-thought reasoning.
    pub reasoning: bool,
    /// An optional message-transformation policy name the orchestrator
    /// or a renderer may consult (adapter-specific, opaque here).
    pub message_transform_policy: Option<String>,
}

/// Identity and declared capabilities of a model adapter.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    /// Adapter/model identifier (e.g. `"claude-opus-4"`).
    pub id: String,
    /// Provider name (e.g. `"anthropic"`).
    pub provider: String,
    /// Declared capabilities.
    pub capabilities: ModelCapabilities,
}

/// Token/cost accounting for one model call.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
}

/// Why the model/tree decided to stop ticking.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StopReason {
    /// Short machine-readable reason.
    pub reason: String,
    /// Optional human-readable elaboration.
    pub description: Option<String>,
}

/// One tool call the model emitted, to be executed by the engine
/// (as opposed to [`EngineResponse::executed_tool_results`], already
/// executed by the provider itself).
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Correlates this call to its eventual result.
    pub tool_use_id: engine_types::ToolUseId,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed input.
    pub input: Value,
}

/// The engine-shaped result of one model call, produced by
/// [`ModelAdapter::to_engine_state`] from the adapter's raw output.
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    /// New timeline entries to append (typically the assistant's turn).
    pub new_timeline_entries: Vec<engine_types::Message>,
    /// Sections the model/provider updated in place.
    pub updated_sections: Vec<(engine_types::SectionId, Vec<ContentBlock>)>,
    /// Tool calls for the engine to execute.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Tool calls the provider already executed (e.g. built-in
    /// provider-side tools); recorded but not re-run.
    pub executed_tool_results: Vec<ContentBlock>,
    /// Whether the tree should stop ticking after this response.
    pub should_stop: bool,
    /// Why, if `should_stop`.
    pub stop_reason: Option<StopReason>,
    /// Token usage for this call, if reported.
    pub usage: Option<Usage>,
}

/// One chunk of a streamed model response (opaque to the engine beyond
/// what `process_stream` needs to fold it into a final output).
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<Value, ModelError>> + Send>>;

/// The pluggable boundary the tick orchestrator dispatches rendered
/// context to. Concrete adapters (Anthropic, OpenAI, Ollama, ...) are
/// out of scope (`spec.md` §1) — this is the interface only.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// This adapter's identity and capabilities.
    fn metadata(&self) -> &ModelMetadata;

    /// Convert the engine's formatted input into this adapter's native
    /// request shape.
    async fn from_engine_state(&self, formatted: Value) -> Result<Value, ModelError>;

    /// Convert this adapter's native output into the engine-shaped
    /// [`EngineResponse`].
    async fn to_engine_state(&self, model_output: Value) -> Result<EngineResponse, ModelError>;

    /// Issue a non-streaming generation call.
    async fn generate(&self, model_input: Value) -> Result<Value, ModelError>;

    /// Issue a streaming generation call, if supported.
    async fn stream(&self, model_input: Value) -> Result<ModelStream, ModelError> {
        let _ = model_input;
        Err(ModelError::Other("this adapter does not support streaming".into()))
    }

    /// Fold a stream of chunks into the final native output shape
    /// `to_engine_state` expects.
    async fn process_stream(&self, chunks: ModelStream) -> Result<Value, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_types::Classify;
    use futures::stream;

    struct Echo(ModelMetadata);

    #[async_trait]
    impl ModelAdapter for Echo {
        fn metadata(&self) -> &ModelMetadata {
            &self.0
        }

        async fn from_engine_state(&self, formatted: Value) -> Result<Value, ModelError> {
            Ok(formatted)
        }

        async fn to_engine_state(&self, model_output: Value) -> Result<EngineResponse, ModelError> {
            let text = model_output.as_str().unwrap_or_default().to_string();
            Ok(EngineResponse {
                new_timeline_entries: vec![engine_types::Message::assistant(text)],
                should_stop: true,
                stop_reason: Some(StopReason { reason: "done".into(), description: None }),
                ..Default::default()
            })
        }

        async fn generate(&self, model_input: Value) -> Result<Value, ModelError> {
            Ok(model_input)
        }

        async fn process_stream(&self, mut chunks: ModelStream) -> Result<Value, ModelError> {
            use futures::StreamExt;
            let mut acc = String::new();
            while let Some(chunk) = chunks.next().await {
                if let Some(s) = chunk?.as_str() {
                    acc.push_str(s);
                }
            }
            Ok(Value::String(acc))
        }
    }

    #[tokio::test]
    async fn echo_adapter_round_trips() {
        let adapter = Echo(ModelMetadata {
            id: "echo".into(),
            provider: "test".into(),
            capabilities: ModelCapabilities::default(),
        });
        let input = adapter.from_engine_state(Value::String("hi".into())).await.unwrap();
        let output = adapter.generate(input).await.unwrap();
        let response = adapter.to_engine_state(output).await.unwrap();
        assert!(response.should_stop);
        assert_eq!(response.new_timeline_entries.len(), 1);
    }

    #[tokio::test]
    async fn default_stream_is_unsupported() {
        let adapter = Echo(ModelMetadata {
            id: "echo".into(),
            provider: "test".into(),
            capabilities: ModelCapabilities::default(),
        });
        let err = adapter.stream(Value::Null).await.unwrap_err();
        assert_eq!(err.category(), engine_types::ErrorCategory::Unknown);
    }

    #[tokio::test]
    async fn process_stream_folds_chunks() {
        let adapter = Echo(ModelMetadata {
            id: "echo".into(),
            provider: "test".into(),
            capabilities: ModelCapabilities::default(),
        });
        let chunks: ModelStream = Box::pin(stream::iter(vec![Ok(Value::String("a".into())), Ok(Value::String("b".into()))]));
        let out = adapter.process_stream(chunks).await.unwrap();
        assert_eq!(out, Value::String("ab".into()));
    }
}
