//! `CompiledStructure` — what one reconciliation pass collects from
//! the intrinsic tags it walks past, before it is applied to a COM.

use std::collections::BTreeMap;

use engine_types::{ContentBlock, Message, SectionId};
use serde_json::Value;

/// Combined content of a section after two `addSection`-equivalent
/// contributions at the same id. Both-string joins with a blank
/// line; both-array concatenates; both-object shallow-merges; mixed
/// wraps as a sequence.
#[derive(Debug, Clone)]
pub enum SectionContent {
    /// Plain text content.
    Text(String),
    /// An ordered sequence of semantic content blocks.
    Blocks(Vec<ContentBlock>),
    /// An arbitrary object.
    Object(serde_json::Map<String, Value>),
}

impl SectionContent {
    /// Combine two contributions to the same section id, per the
    /// rule above.
    pub fn combine(self, other: SectionContent) -> SectionContent {
        match (self, other) {
            (SectionContent::Text(a), SectionContent::Text(b)) => SectionContent::Text(format!("{a}\n\n{b}")),
            (SectionContent::Blocks(mut a), SectionContent::Blocks(b)) => {
                a.extend(b);
                SectionContent::Blocks(a)
            }
            (SectionContent::Object(mut a), SectionContent::Object(b)) => {
                for (k, v) in b {
                    a.insert(k, v);
                }
                SectionContent::Object(a)
            }
            (a, b) => {
                let to_block = |c: SectionContent| -> Vec<ContentBlock> {
                    match c {
                        SectionContent::Text(t) => vec![ContentBlock::text(t)],
                        SectionContent::Blocks(b) => b,
                        SectionContent::Object(o) => vec![ContentBlock::Json { value: Value::Object(o) }],
                    }
                };
                let mut blocks = to_block(a);
                blocks.extend(to_block(b));
                SectionContent::Blocks(blocks)
            }
        }
    }
}

/// A section collected during reconciliation, before rendering.
#[derive(Debug, Clone)]
pub struct CompiledSection {
    /// Stable id, scoped to one execution.
    pub id: SectionId,
    /// Title, joined as `## {title}` when consolidated.
    pub title: Option<String>,
    /// Combined content.
    pub content: SectionContent,
    /// Who can see this section's formatted output.
    pub visibility: engine_types::Visibility,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Free-form metadata; last writer wins.
    pub metadata: Value,
    /// Inherited rendering mode at the point this section was collected.
    pub renderer: Option<String>,
    /// Formatted content, filled in by `engine-render` once a renderer
    /// has been applied.
    pub formatted: Option<String>,
}

/// One timeline entry collected during reconciliation.
#[derive(Debug, Clone)]
pub struct CompiledTimelineEntry {
    /// The underlying message.
    pub message: Message,
    /// Visibility for this entry.
    pub visibility: engine_types::Visibility,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Inherited rendering mode at the point this entry was collected.
    pub renderer: Option<String>,
    /// Position in render order, for deterministic consolidation.
    pub index: usize,
}

/// Where a system-message contribution came from.
#[derive(Debug, Clone)]
pub enum SystemMessageSource {
    /// A named section's formatted content.
    Section(SectionId),
    /// A loose `<Message role="system">` contribution, not tied to a section.
    Loose(String),
}

/// One contribution to the consolidated system message, in render order.
#[derive(Debug, Clone)]
pub struct SystemMessageItem {
    /// Where the content came from.
    pub source: SystemMessageSource,
    /// Render-order position, used to sort before consolidation.
    pub index: usize,
    /// Inherited rendering mode at collection time.
    pub renderer: Option<String>,
}

/// A tool registration collected during reconciliation.
#[derive(Debug, Clone)]
pub struct CompiledTool {
    /// The tool's registered name.
    pub name: String,
    /// JSON Schema for the tool's input, if declared by the element.
    pub input_schema: Option<Value>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Where in the final formatted output an ephemeral entry is spliced.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralPosition {
    /// Before everything else.
    Start,
    /// After everything else.
    End,
    /// Immediately before the user's most recent message.
    BeforeUser,
    /// Immediately after the system message.
    AfterSystem,
    /// Inline at collection order, among other flow content.
    Flow,
}

/// An ephemeral entry collected during reconciliation, cleared at the
/// start of the next tick.
#[derive(Debug, Clone)]
pub struct CompiledEphemeral {
    /// Content blocks, with contiguous text runs coalesced.
    pub content: Vec<ContentBlock>,
    /// Splice position.
    pub position: EphemeralPosition,
    /// Ordering among entries sharing a position.
    pub order: i64,
    /// Optional entry type tag.
    pub kind: Option<String>,
    /// Optional entry id.
    pub id: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: Value,
}

/// Everything one reconciliation pass collected from intrinsic tags.
/// Produced fresh by every render+commit pass; applied to a COM by
/// `engine-render`, then discarded.
#[derive(Default)]
pub struct CompiledStructure {
    /// Sections, keyed by id, in `SectionId` sort order (not
    /// first-seen order — `BTreeMap` iterates by key). Collection
    /// order among sections is not otherwise observable: system-message
    /// consolidation orders its contributions by `SystemMessageItem::index`
    /// instead, independent of this map's iteration order.
    pub sections: BTreeMap<String, CompiledSection>,
    /// Timeline entries, in render order.
    pub timeline_entries: Vec<CompiledTimelineEntry>,
    /// System-message contributions, in render order.
    pub system_message_items: Vec<SystemMessageItem>,
    /// Tools registered this pass.
    pub tools: Vec<CompiledTool>,
    /// Ephemeral entries collected this pass.
    pub ephemeral: Vec<CompiledEphemeral>,
    /// Metadata contributed by `<Model>`/`<ModelOptions>`/free-form
    /// metadata elements, shallow-merged in render order.
    pub metadata: serde_json::Map<String, Value>,
    /// The active model adapter identifier, if a `<Model>` element was rendered.
    pub model: Option<String>,
    /// Generation options, if a `<ModelOptions>` element was rendered.
    pub model_options: Option<Value>,
}

impl CompiledStructure {
    /// An empty structure, ready to be filled in by a commit walk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or merge a section at `id`, combining content per the
    /// `SectionContent::combine` rule and letting the latest
    /// contribution win for title/visibility/metadata.
    pub fn add_section(&mut self, section: CompiledSection) {
        self.sections
            .entry(section.id.as_str().to_string())
            .and_modify(|existing| {
                existing.title = section.title.clone();
                existing.visibility = section.visibility;
                existing.metadata = section.metadata.clone();
                existing.renderer = section.renderer.clone().or(existing.renderer.clone());
                existing.content = std::mem::replace(&mut existing.content, SectionContent::Text(String::new()))
                    .combine(section.content.clone());
            })
            .or_insert(section);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_types::Visibility;

    fn section(id: &str, content: &str) -> CompiledSection {
        CompiledSection {
            id: SectionId::new(id),
            title: Some(id.to_string()),
            content: SectionContent::Text(content.to_string()),
            visibility: Visibility::Model,
            tags: Vec::new(),
            metadata: Value::Null,
            renderer: None,
            formatted: None,
        }
    }

    #[test]
    fn repeated_section_id_merges_content() {
        let mut structure = CompiledStructure::new();
        structure.add_section(section("a", "hello"));
        structure.add_section(section("a", "world"));
        assert_eq!(structure.sections.len(), 1);
        match &structure.sections["a"].content {
            SectionContent::Text(t) => assert_eq!(t, "hello\n\nworld"),
            _ => panic!("expected text content"),
        }
    }
}
