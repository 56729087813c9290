//! Oracle prompts for image description and contextual tag placement.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the description constraints or
//!    the placement rules requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without spinning up a real oracle, making prompt regressions easy to
//!    catch.

/// Meta-words the vision model must not use when describing an image.
///
/// A description like "Diagram of the waterfall model" wastes half of its
/// ten words restating that the subject is an image. The placement model
/// matches descriptions against summary prose, and prose talks about the
/// waterfall model, not about diagrams.
pub const FORBIDDEN_DESCRIPTION_WORDS: [&str; 5] =
    ["image", "diagram", "figure", "chart", "flowchart"];

/// Build the vision prompt for describing one captured region.
///
/// `title_context` is the document title (the first non-empty line of the
/// summary); it anchors the model's vocabulary to the document's domain.
pub fn vision_description_prompt(title_context: &str) -> String {
    format!(
        r#"You are analysing a figure extracted from a document titled "{title_context}".

Describe the technical content of this figure in AT MOST 10 words.

Rules:
- Name the concept the figure shows, not its visual form
- NEVER use the words: image, diagram, figure, chart, flowchart
- Do not add punctuation-only filler or commentary
- Answer with the description only"#
    )
}

/// Build the placement prompt for inserting one tag into the summary.
///
/// The model receives the full current summary and must return it verbatim
/// with the tag inserted on its own line after the first paragraph of the
/// best-matching section — or completely unchanged when no section matches.
pub fn placement_prompt(tag: &str, description: &str, summary: &str) -> String {
    format!(
        r#"You are placing a figure reference into a text summary.

Figure reference tag: {tag}
Figure content: {description}

Task: return the COMPLETE summary below with the tag {tag} inserted on its
own line immediately after the first paragraph of the section whose subject
best matches the figure content.

Rules:
- Insert the tag EXACTLY ONCE, or not at all if no section matches
- Do not remove, reorder, or rewrite any existing text
- Do not remove or move any tag already present in the summary
- Return ONLY the summary text, with no commentary or code fences

Summary:
{summary}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_prompt_carries_title_and_word_limit() {
        let p = vision_description_prompt("Software Engineering Fundamentals");
        assert!(p.contains("Software Engineering Fundamentals"));
        assert!(p.contains("10 words"));
        for word in FORBIDDEN_DESCRIPTION_WORDS {
            assert!(p.contains(word), "prompt must name forbidden word {word}");
        }
    }

    #[test]
    fn placement_prompt_embeds_tag_description_and_summary() {
        let p = placement_prompt(
            "[IMAGE_ID_0_1]",
            "Waterfall development phases",
            "# Title\n\nBody paragraph.",
        );
        assert!(p.contains("[IMAGE_ID_0_1]"));
        assert!(p.contains("Waterfall development phases"));
        assert!(p.contains("Body paragraph."));
    }
}
