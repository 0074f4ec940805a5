use html_escape::encode_text;
use regex::{Regex, RegexBuilder};
use tracing::warn;

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

/// Compiled size cap for the term pattern; past it text is only escaped
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Split free-text search input into terms.
///
/// Quotes and `*` carry meaning in the index query syntax, so they are dropped
/// from the edges of each term.
pub fn query_terms(input: &str) -> Vec<String> {
    input
        .split_whitespace()
        .map(|t| t.trim_matches(|c| c == '"' || c == '*'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Highlights escaped text for a fixed set of terms
pub struct Highlighter {
    pattern: Option<Regex>,
}

impl Highlighter {
    pub fn new(terms: &[String]) -> Self {
        let mut alternatives: Vec<&str> = terms.iter().map(String::as_str).collect();
        // Longest first so "hello" wins over "hell" at the same position.
        alternatives.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        alternatives.dedup();

        let pattern = if alternatives.is_empty() {
            None
        } else {
            let joined = alternatives
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            match RegexBuilder::new(&joined)
                .case_insensitive(true)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
            {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Highlighting disabled for {} terms: {}", alternatives.len(), e);
                    None
                }
            }
        };

        Self { pattern }
    }

    /// HTML-escape `raw` and wrap each case-insensitive term occurrence in
    /// `<mark>`.
    ///
    /// Matching runs over the unescaped text and each segment is escaped on the
    /// way out, so a marker can never split an entity like `&lt;` and nothing is
    /// escaped twice.
    pub fn highlight(&self, raw: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return encode_text(raw).into_owned();
        };

        let mut out = String::with_capacity(raw.len() + 16);
        let mut last = 0;
        for m in pattern.find_iter(raw) {
            if m.start() == m.end() {
                continue;
            }
            out.push_str(&encode_text(&raw[last..m.start()]));
            out.push_str(MARK_OPEN);
            out.push_str(&encode_text(m.as_str()));
            out.push_str(MARK_CLOSE);
            last = m.end();
        }
        out.push_str(&encode_text(&raw[last..]));
        out
    }
}

/// One-shot convenience over [`Highlighter`]
pub fn highlight(raw: &str, terms: &[String]) -> String {
    Highlighter::new(terms).highlight(raw)
}
