//! Applying one reconciliation pass's [`CompiledStructure`] to a
//! [`ContextObjectModel`] (`spec.md` §4.3 "Application to COM").

use std::sync::Arc;

use engine_com::{ContextObjectModel, Section, TimelineEntry};
use engine_fiber::{CompiledStructure, SystemMessageSource};
use engine_model::ModelAdapter;
use engine_tool::Tool;
use engine_types::{ContentBlock, Message, Role};

use crate::renderer::RendererRegistry;

/// Looks up the live implementation backing a compiled tool/model
/// announcement by name. The render tree only carries declarative
/// metadata (name, schema); the executable instances live in the
/// host session's configuration, outside the component tree.
pub trait Resolver: Send + Sync {
    /// Resolve a tool by the name a `<Tool>` element declared.
    fn resolve_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// Resolve a model adapter by the identifier a `<Model>` element declared.
    fn resolve_model(&self, id: &str) -> Option<Arc<dyn ModelAdapter>>;
}

struct FormattedSection {
    title: Option<String>,
    formatted: String,
}

fn needs_formatting(renderer: Option<&str>, blocks: &[ContentBlock]) -> bool {
    renderer.is_some() || blocks.iter().any(|b| !b.is_native_passthrough() && b.as_text().is_none())
}

/// Apply `structure` to `com`, per §4.3 steps 1-5. Infallible:
/// unresolved tools/models are logged and skipped rather than
/// failing the tick, since a render pass cannot know in advance
/// whether the host configured a backing implementation.
pub fn apply_structure(
    structure: CompiledStructure,
    com: &ContextObjectModel,
    renderers: &RendererRegistry,
    resolver: &dyn Resolver,
) {
    // Step 1: sections. Format content, cache it on the section, and
    // keep a local copy for system-message consolidation below.
    let mut formatted_sections = std::collections::HashMap::new();
    for (id, compiled) in structure.sections {
        let renderer = renderers.resolve(compiled.renderer.as_deref());
        let formatted = renderer.format_section(&compiled.content);
        formatted_sections.insert(
            id,
            FormattedSection { title: compiled.title.clone(), formatted: formatted.clone() },
        );
        com.add_section(Section {
            id: compiled.id,
            title: compiled.title,
            content: compiled.content,
            visibility: compiled.visibility,
            tags: compiled.tags,
            metadata: compiled.metadata,
            formatted: Some(formatted),
            rendered_by: Some(renderer.name().to_string()),
        });
    }

    // Step 2: timeline entries.
    for entry in structure.timeline_entries {
        let mut message = entry.message;
        if needs_formatting(entry.renderer.as_deref(), &message.content) {
            let renderer = renderers.resolve(entry.renderer.as_deref());
            let text = renderer.format_blocks(&message.content);
            message.content = vec![ContentBlock::text(text)];
        }
        let mut timeline_entry = TimelineEntry::message(message);
        timeline_entry.visibility = entry.visibility;
        timeline_entry.tags = entry.tags;
        com.add_timeline_entry(timeline_entry);
    }

    // Step 3: consolidate system messages.
    let mut items = structure.system_message_items;
    items.sort_by_key(|i| i.index);
    let mut parts = Vec::new();
    for item in items {
        let renderer = renderers.resolve(item.renderer.as_deref());
        let part = match item.source {
            SystemMessageSource::Section(id) => formatted_sections.get(id.as_str()).map(|s| match &s.title {
                Some(title) => format!("## {title}\n{}", s.formatted),
                None => s.formatted.clone(),
            }),
            SystemMessageSource::Loose(text) => {
                let formatted = renderer.format_blocks(&[ContentBlock::text(text)]);
                Some(formatted)
            }
        };
        if let Some(part) = part {
            if !part.is_empty() {
                parts.push(part);
            }
        }
    }
    if !parts.is_empty() {
        com.add_message(Message::new(Role::System, vec![ContentBlock::text(parts.join("\n\n"))]));
    }

    // Step 4: tools and ephemeral entries.
    for tool in structure.tools {
        match resolver.resolve_tool(&tool.name) {
            Some(implementation) => com.add_tool(implementation),
            None => tracing::trace!(tool = %tool.name, "engine.render.tool_unresolved"),
        }
    }
    for ephemeral in structure.ephemeral {
        com.add_ephemeral(engine_com::EphemeralEntry {
            content: ephemeral.content,
            position: ephemeral.position,
            order: ephemeral.order,
            kind: ephemeral.kind,
            id: ephemeral.id,
            tags: ephemeral.tags,
            metadata: ephemeral.metadata,
        });
    }

    // Step 5: metadata, and the active model (if a `<Model>` element rendered).
    for (key, value) in structure.metadata {
        com.add_metadata(&key, value);
    }
    if let Some(model_id) = structure.model {
        match resolver.resolve_model(&model_id) {
            Some(adapter) => {
                let options = structure
                    .model_options
                    .and_then(|v| serde_json::from_value(v).map_err(|e| tracing::warn!(error = %e, "engine.render.model_options_invalid")).ok());
                com.set_model(adapter, options);
            }
            None => tracing::warn!(model = %model_id, "engine.render.model_unresolved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_fiber::{CompiledSection, CompiledTimelineEntry, SystemMessageItem};
    use engine_types::{SectionId, Visibility};
    use serde_json::json;

    struct NoopResolver;
    impl Resolver for NoopResolver {
        fn resolve_tool(&self, _name: &str) -> Option<Arc<dyn Tool>> {
            None
        }
        fn resolve_model(&self, _id: &str) -> Option<Arc<dyn ModelAdapter>> {
            None
        }
    }

    #[test]
    fn section_formatted_text_is_cached() {
        let mut structure = CompiledStructure::new();
        structure.add_section(CompiledSection {
            id: SectionId::new("notes"),
            title: Some("Notes".into()),
            content: engine_fiber::SectionContent::Text("hello".into()),
            visibility: Visibility::Model,
            tags: vec![],
            metadata: json!(null),
            renderer: None,
            formatted: None,
        });
        let com = ContextObjectModel::new();
        apply_structure(structure, &com, &RendererRegistry::new(), &NoopResolver);
        let sections = com.sections();
        assert_eq!(sections["notes"].formatted.as_deref(), Some("hello"));
    }

    #[test]
    fn system_message_items_consolidate_into_one_message() {
        let mut structure = CompiledStructure::new();
        structure.system_message_items.push(SystemMessageItem {
            source: SystemMessageSource::Loose("be terse".into()),
            index: 0,
            renderer: None,
        });
        structure.system_message_items.push(SystemMessageItem {
            source: SystemMessageSource::Loose("be kind".into()),
            index: 1,
            renderer: None,
        });
        let com = ContextObjectModel::new();
        apply_structure(structure, &com, &RendererRegistry::new(), &NoopResolver);
        assert_eq!(com.system_messages().len(), 1);
        assert_eq!(com.system_messages()[0].text_content(), "be terse\n\nbe kind");
    }

    #[test]
    fn empty_system_message_items_emit_nothing() {
        let structure = CompiledStructure::new();
        let com = ContextObjectModel::new();
        apply_structure(structure, &com, &RendererRegistry::new(), &NoopResolver);
        assert!(com.system_messages().is_empty());
    }

    #[test]
    fn timeline_entry_with_semantic_block_gets_formatted() {
        let mut structure = CompiledStructure::new();
        structure.timeline_entries.push(CompiledTimelineEntry {
            message: Message::new(Role::Assistant, vec![ContentBlock::ToolUse {
                id: "1".into(),
                name: "bash".into(),
                input: json!({}),
            }]),
            visibility: Visibility::Model,
            tags: vec![],
            renderer: None,
            index: 0,
        });
        let com = ContextObjectModel::new();
        apply_structure(structure, &com, &RendererRegistry::new(), &NoopResolver);
        let timeline = com.timeline();
        assert_eq!(timeline.len(), 1);
        assert!(timeline[0].message.content[0].as_text().is_some());
    }
}
