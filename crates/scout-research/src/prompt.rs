//! Prompt assembly from scraped sources.

/// Replaced with the user's query text.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Replaced with the combined source content.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

/// Template used when a request does not bring its own.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are a research assistant. Using only the web content below, write a concise, well-structured research summary about "{query}".

Highlight the key findings, points of agreement and disagreement between sources, and open questions. Mention the source URL when you rely on a specific page.

{content}"#;

/// Keep at most `limit` characters (Unicode scalar values) of `text`.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Label a source's text with the URL it came from.
pub fn format_block(url: &str, text: &str) -> String {
    format!("Content from {}:\n{}", url, text)
}

/// Join labelled blocks with blank lines, preserving order.
pub fn combine_blocks<S: AsRef<str>>(blocks: &[S]) -> String {
    blocks
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitute `{query}` and `{content}` in `template`.
///
/// This is literal replacement in a single left-to-right pass: every occurrence
/// is replaced, inserted text is never re-scanned, and any other brace sequence
/// is copied through untouched.
///
/// Unlike chaining two `str::replace` calls, a query containing `{content}`
/// stays literal instead of being expanded.
pub fn render_prompt(template: &str, query: &str, content: &str) -> String {
    let mut out = String::with_capacity(template.len() + query.len() + content.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(QUERY_PLACEHOLDER) {
            out.push_str(query);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(CONTENT_PLACEHOLDER) {
            out.push_str(content);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}
