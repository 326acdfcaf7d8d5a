//! `ephemeral`: transient context rebuilt fresh every tick, cleared at
//! the start of the next one (`spec.md` §3/§4.3).

use engine_fiber::EphemeralPosition;
use engine_types::ContentBlock;
use serde_json::Value;

/// One ephemeral entry.
#[derive(Debug, Clone)]
pub struct EphemeralEntry {
    /// Content blocks, with contiguous text runs coalesced.
    pub content: Vec<ContentBlock>,
    /// Splice position in the formatted output.
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

/// Coalesce contiguous runs of [`ContentBlock::Text`] within one
/// entry's content into a single block, per `spec.md` §4.3 step 4.
pub fn coalesce_text(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    let mut out: Vec<ContentBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match (&block, out.last_mut()) {
            (ContentBlock::Text { text }, Some(ContentBlock::Text { text: prev })) => {
                prev.push('\n');
                prev.push_str(text);
            }
            _ => out.push(block),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_text_blocks_coalesce() {
        let blocks = vec![ContentBlock::text("a"), ContentBlock::text("b"), ContentBlock::Json { value: Value::Null }, ContentBlock::text("c")];
        let coalesced = coalesce_text(blocks);
        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0].as_text(), Some("a\nb"));
    }
}
