// Prompt template rendering
// `{name}` placeholders, `{{` and `}}` for literal braces


use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Unknown placeholder {{{0}}} in prompt template")]
    UnknownPlaceholder(String),
    #[error("Unclosed '{{' at byte {0} in prompt template")]
    UnclosedBrace(usize),
    #[error("Single '}}' at byte {0} in prompt template")]
    UnmatchedClosingBrace(usize),
}

/// Substitute `{rag_context}` and `{json_data}` into `template`
#[inline]
pub fn render_prompt(
    template: &str,
    rag_context: &str,
    json_data: &str,
) -> Result<String, PromptError> {
    render_template(
        template,
        &[("rag_context", rag_context), ("json_data", json_data)],
    )
}

/// Replace every `{name}` in `template` with its value from `vars`
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.next_if(|(_, next)| *next == '{').is_some() => out.push('{'),
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) => name.push(ch),
                        None => return Err(PromptError::UnclosedBrace(pos)),
                    }
                }
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or(PromptError::UnknownPlaceholder(name))?;
                out.push_str(value);
            }
            '}' if chars.next_if(|(_, next)| *next == '}').is_some() => out.push('}'),
            '}' => return Err(PromptError::UnmatchedClosingBrace(pos)),
            other => out.push(other),
        }
    }

    Ok(out)
}
