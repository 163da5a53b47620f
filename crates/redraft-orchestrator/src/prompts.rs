/// Instructions for growing a chunk in place.
pub fn expand_instructions(instructions: &str) -> String {
    format!(
        "{instructions}\n\n\
         Expand the passage below. Keep all of the existing text and continue it \
         with additional material. Return the existing text followed by the new content."
    )
}

/// Instructions for writing `sections` new trailing sections after a document.
pub fn append_instructions(instructions: &str, sections: usize) -> String {
    let noun = if sections == 1 { "section" } else { "sections" };
    format!(
        "{instructions}\n\n\
         Write {sections} new {noun} that continue the document below. Return only \
         the new {noun}, separated by blank lines, without repeating the existing text."
    )
}

/// Instructions for refining an earlier rewrite.
pub fn refinement_instructions(previous: &str, refinement: &str) -> String {
    format!(
        "The text below was produced by applying these instructions:\n{previous}\n\n\
         Revise it further according to these instructions:\n{refinement}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_pluralizes() {
        assert!(append_instructions("go", 1).contains("1 new section that"));
        assert!(append_instructions("go", 3).contains("3 new sections that"));
    }

    #[test]
    fn refinement_embeds_both_instruction_sets() {
        let prompt = refinement_instructions("make it formal", "shorter please");
        assert!(prompt.contains("make it formal"));
        assert!(prompt.contains("shorter please"));
    }

    #[test]
    fn expand_keeps_user_instructions_first() {
        assert!(expand_instructions("add examples").starts_with("add examples\n\n"));
    }
}
