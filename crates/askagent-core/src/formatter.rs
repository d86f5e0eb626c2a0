//! Renders accumulated search results into a prompt block.

use std::fmt::Write as _;

use crate::search::SearchResult;

/// Per-result content budget, in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 500;

const HEADER: &str = "=== 웹 검색 결과 ===";

#[derive(Debug, Clone, Copy)]
pub struct ContextFormatter {
    snippet_chars: usize,
}

impl ContextFormatter {
    pub fn new(snippet_chars: usize) -> Self {
        Self { snippet_chars }
    }

    /// Numbered block in retrieval order; empty input renders as `""`.
    pub fn format(&self, results: &[SearchResult]) -> String {
        if results.is_empty() {
            return String::new();
        }

        let mut output = format!("{HEADER}\n\n");
        for (idx, result) in results.iter().enumerate() {
            let _ = writeln!(output, "[{}] {}", idx + 1, result.title);
            let _ = writeln!(output, "URL: {}", result.url);
            let _ = writeln!(
                output,
                "내용: {}\n",
                truncate_chars(&result.content, self.snippet_chars)
            );
        }
        output
    }
}

impl Default for ContextFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_SNIPPET_CHARS)
    }
}

const ELLIPSIS: &str = "...";

/// Cut on a char boundary so the result, ellipsis included, fits `max_chars`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.char_indices().nth(max_chars).is_none() {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(byte_idx, _)| byte_idx)
        .unwrap_or(text.len());
    let mut output = text[..cut].to_string();
    output.push_str(&ELLIPSIS[..(max_chars - keep).min(ELLIPSIS.len())]);
    output
}
