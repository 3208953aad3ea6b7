// Grounding context rendering


use crate::database::SearchHit;

pub const CONTEXT_HEADER: &str = "\n\n--- Relevant Knowledge Base Articles ---\n";

/// Render hits as one text block, grouped by title in first-seen order.
///
/// Within a group the hits keep their ranking order. No hits renders as an
/// empty string.
#[inline]
pub fn render_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for hit in hits {
        match groups.iter_mut().find(|(title, _)| *title == hit.title) {
            Some((_, contents)) => contents.push(&hit.content),
            None => groups.push((hit.title.as_str(), vec![hit.content.as_str()])),
        }
    }

    let mut context = String::from(CONTEXT_HEADER);
    for (title, contents) in groups {
        context.push_str("\n### From: ");
        context.push_str(title);
        context.push('\n');
        for content in contents {
            context.push_str("- ");
            context.push_str(content.trim());
            context.push('\n');
        }
    }
    context
}
