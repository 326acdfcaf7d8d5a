//! `sections`: named, optionally-titled context folded into the
//! consolidated system message (`spec.md` §3/§4.3).

use engine_fiber::SectionContent;
use engine_types::{SectionId, Visibility};
use serde_json::Value;

/// A section stored on the COM, after `engine-render` has applied a
/// reconciliation pass's [`engine_fiber::CompiledSection`] contributions.
#[derive(Debug, Clone)]
pub struct Section {
    /// Stable id.
    pub id: SectionId,
    /// Title, joined as `## {title}` when consolidated.
    pub title: Option<String>,
    /// Combined content.
    pub content: SectionContent,
    /// Who can see this section's formatted output.
    pub visibility: Visibility,
    /// Free-form audience tags.
    pub tags: Vec<String>,
    /// Free-form metadata; last writer wins.
    pub metadata: Value,
    /// Formatted content, cached once a renderer has been applied.
    pub formatted: Option<String>,
    /// Name of the renderer that produced `formatted`, if any.
    pub rendered_by: Option<String>,
}

impl Section {
    /// Merge another contribution to this section, per `spec.md`
    /// §4.3's content-combination rule (delegated to
    /// [`SectionContent::combine`]); title/visibility/metadata/renderer
    /// follow "last writer wins". Invalidates the cached formatted
    /// content since the underlying content changed.
    pub fn merge(&mut self, other: Section) {
        self.title = other.title;
        self.visibility = other.visibility;
        self.metadata = other.metadata;
        self.tags = other.tags;
        let previous = std::mem::replace(&mut self.content, SectionContent::Text(String::new()));
        self.content = previous.combine(other.content);
        self.formatted = None;
        self.rendered_by = None;
    }
}
