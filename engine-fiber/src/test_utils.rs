//! Minimal reference components for exercising the reconciler and
//! hook runtime without a concrete model/tool stack.
//!
//! Gated behind the `test-utils` feature (teacher convention: see
//! `layer0::test_utils`'s `EchoOperator`/`LoggingHook`/`InMemoryStore`)
//! so downstream crates can depend on these in their own test suites
//! without pulling them into a production build.

use async_trait::async_trait;
use serde_json::Value;

use crate::element::{FunctionComponent, Node};
use crate::error::RenderError;
use crate::hook::{Deps, RenderCx};

/// Re-renders its `text` prop unchanged as a single text child. Useful
/// as the simplest possible leaf component in reconciliation tests.
pub struct EchoComponent;

#[async_trait]
impl FunctionComponent for EchoComponent {
    fn name(&self) -> &str {
        "Echo"
    }

    async fn render(&self, props: &Value, _cx: &mut RenderCx<'_>) -> Result<Vec<Node>, RenderError> {
        let text = props.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(vec![Node::Text(text.to_string())])
    }
}

/// Exercises the state and mount-effect hooks: increments its counter
/// once on mount via `use_effect` with empty deps, per `spec.md` §8
/// scenario 3 (`useState(0)` + `useEffect(() => setC(c+1), [])`
/// observed as `0, 1, 1` across three ticks).
pub struct CounterComponent;

#[async_trait]
impl FunctionComponent for CounterComponent {
    fn name(&self) -> &str {
        "Counter"
    }

    async fn render(&self, _props: &Value, cx: &mut RenderCx<'_>) -> Result<Vec<Node>, RenderError> {
        let (count, set_count) = cx.use_state(|| 0i64).map_err(RenderError::Hook)?;
        cx.use_effect(
            crate::hook::EffectPhase::Mount,
            Deps::Once,
            {
                let set_count = set_count.clone();
                move || {
                    set_count.update(|c| c + 1);
                    None
                }
            },
        )
        .map_err(RenderError::Hook)?;
        Ok(vec![Node::Text(count.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::render_and_commit;
    use crate::element::{Element, ElementType};
    use crate::hook::{Com, UpdateQueue};
    use std::sync::Arc;

    struct NullCom;
    impl Com for NullCom {
        fn get_state(&self, _key: &str) -> Option<Value> {
            None
        }
        fn set_state(&self, _key: &str, _value: Value) -> Option<Value> {
            None
        }
        fn subscribe_state(&self, _key: &str, _listener: Box<dyn Fn(&Value) + Send + Sync>) -> u64 {
            0
        }
        fn unsubscribe_state(&self, _key: &str, _subscription: u64) {}
        fn remove_state(&self, _key: &str) {}
        fn request_recompile(&self, _reason: Option<String>) {}
    }

    #[tokio::test]
    async fn echo_component_passes_text_through() {
        let mut tree = crate::fiber::FiberTree::new();
        let com: Arc<dyn Com> = Arc::new(NullCom);
        let queue = Arc::new(UpdateQueue::new());
        let echo = Element::new(
            ElementType::Function(Arc::new(EchoComponent)),
            serde_json::json!({"text": "hi"}),
            Vec::new(),
        );
        let root = Element::fragment(vec![echo.into()]);
        let (structure, _schedule) = render_and_commit(&mut tree, root, Arc::clone(&com), Arc::clone(&queue)).await.unwrap();
        assert!(structure.timeline_entries.is_empty());
    }
}
