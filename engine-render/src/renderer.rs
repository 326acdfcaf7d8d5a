//! The pluggable rendering-mode seam (`spec.md` §4.3's "rendering
//! mode" wrapper elements, e.g. a markdown or xml formatter).
//!
//! Grounded in the teacher's object-safe trait-object registry
//! pattern (`neuron-tool::ToolRegistry`), generalized from executable
//! tools to text formatters.

use std::collections::HashMap;
use std::sync::Arc;

use engine_fiber::SectionContent;
use engine_types::ContentBlock;

/// Turns semantic content (section content, content blocks) into the
/// text a model adapter ultimately receives. Implementations are
/// synchronous and pure: formatting never touches the COM or I/O.
pub trait Renderer: Send + Sync {
    /// The name components reference via a rendering-mode wrapper
    /// element's `mode` prop (e.g. `"markdown"`, `"xml"`).
    fn name(&self) -> &str;

    /// Format a section's combined content as text.
    fn format_section(&self, content: &SectionContent) -> String;

    /// Format a sequence of content blocks as text. Native
    /// passthrough blocks (images, already-formatted code, raw JSON)
    /// are left to the caller to special-case; this is only invoked
    /// when §4.3 step 2's passthrough test says formatting applies.
    fn format_blocks(&self, blocks: &[ContentBlock]) -> String;
}

/// The engine's built-in fallback: content passes through as plain
/// text with no markup, matching the `None` (unwrapped) renderer case
/// in `spec.md` §4.3.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn name(&self) -> &str {
        "plain"
    }

    fn format_section(&self, content: &SectionContent) -> String {
        match content {
            SectionContent::Text(t) => t.clone(),
            SectionContent::Blocks(blocks) => self.format_blocks(blocks),
            SectionContent::Object(obj) => {
                serde_json::to_string_pretty(obj).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }

    fn format_blocks(&self, blocks: &[ContentBlock]) -> String {
        blocks
            .iter()
            .filter_map(|b| b.as_text().map(str::to_string).or_else(|| {
                serde_json::to_string(b).ok()
            }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Looks up a [`Renderer`] by the name attached to a compiled item
/// during §4.3's renderer-resolution walk, falling back to
/// [`PlainRenderer`] when unset or unknown.
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn Renderer>>,
    default: Arc<dyn Renderer>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererRegistry {
    /// A registry seeded with only the built-in [`PlainRenderer`] as
    /// the default.
    pub fn new() -> Self {
        Self { renderers: HashMap::new(), default: Arc::new(PlainRenderer) }
    }

    /// Register a renderer under its own name.
    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        self.renderers.insert(renderer.name().to_string(), renderer);
    }

    /// Resolve a renderer by name, falling back to the default when
    /// `name` is `None` or unregistered.
    pub fn resolve(&self, name: Option<&str>) -> Arc<dyn Renderer> {
        match name {
            Some(n) => self.renderers.get(n).cloned().unwrap_or_else(|| Arc::clone(&self.default)),
            None => Arc::clone(&self.default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_name_falls_back_to_plain() {
        let registry = RendererRegistry::new();
        let renderer = registry.resolve(Some("xml"));
        assert_eq!(renderer.name(), "plain");
    }

    #[test]
    fn plain_renderer_joins_text_blocks() {
        let renderer = PlainRenderer;
        let text = renderer.format_blocks(&[ContentBlock::text("a"), ContentBlock::text("b")]);
        assert_eq!(text, "a\nb");
    }
}
