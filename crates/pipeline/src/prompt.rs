//! Prompt construction for the synthesizer.
//!
//! ## Layout
//! Retrieved records are numbered in result order:
//!
//! ```text
//! 1. Clannad
//!    Genres: Drama, Romance
//!    Synopsis: Tomoya Okazaki is a delinquent who ...
//! ```
//!
//! Entries are separated by a blank line and added until the context budget
//! (separators included) would be exceeded. The query is cut to its own
//! budget, so the rendered prompt never exceeds the template plus both limits. The first entry is always kept so a non-empty result
//! never produces an ungrounded prompt. Nothing here depends on time, maps or
//! randomness: identical inputs render byte-identical prompts.

use std::path::Path;

use retrieval::{RetrievalResult, ScoredRecord};

use crate::error::{SynthesisError, TemplateError};
use crate::query::DEFAULT_MAX_QUERY_CHARS;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;
pub const DEFAULT_MAX_SYNOPSIS_CHARS: usize = 600;

const ENTRY_SEPARATOR: &str = "\n\n";

const CONTEXT_SLOT: &str = "{context}";
const QUERY_SLOT: &str = "{query}";

const DEFAULT_TEMPLATE: &str = concat!(
    "You are an expert anime recommender. Use only the anime listed in the context ",
    "to answer the viewer's request.\n\n",
    "Suggest exactly three titles from the context. For each one give the title, ",
    "a short plot summary and why it matches the request, as a numbered list. ",
    "If nothing in the context fits, say that you don't know rather than ",
    "inventing titles.\n\n",
    "Context:\n{context}\n\n",
    "Viewer request: {query}\n\n",
    "Recommendations:"
);

/// A prompt with `{context}` and `{query}` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        for slot in [CONTEXT_SLOT, QUERY_SLOT] {
            if !text.contains(slot) {
                return Err(TemplateError::MissingPlaceholder(slot));
            }
        }
        Ok(Self { text })
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|e| TemplateError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::new(text)
    }

    /// Fill both slots in a single pass.
    ///
    /// Substituted text is never rescanned, so a query that itself contains
    /// `{context}` is inserted literally.
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + context.len() + query.len());
        let mut rest = self.text.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY_SLOT) {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Turns a query and its retrieval hits into a bounded prompt
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: PromptTemplate,
    max_context_chars: usize,
    max_synopsis_chars: usize,
    max_query_chars: usize,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            max_synopsis_chars: DEFAULT_MAX_SYNOPSIS_CHARS,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
        }
    }

    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn with_max_synopsis_chars(mut self, max: usize) -> Self {
        self.max_synopsis_chars = max;
        self
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    /// Render the context block for `results`.
    ///
    /// # Returns
    /// * `Err(SynthesisError::EmptyContext)` - when there are no results
    pub fn build_context(&self, results: &RetrievalResult) -> Result<String, SynthesisError> {
        if results.is_empty() {
            return Err(SynthesisError::EmptyContext);
        }

        let mut context = String::new();
        let mut used = 0;
        for (i, hit) in results.iter().enumerate() {
            let entry = self.format_entry(i + 1, hit);
            let separator = if i > 0 { ENTRY_SEPARATOR } else { "" };
            let cost = separator.len() + entry.chars().count();
            if i > 0 && used + cost > self.max_context_chars {
                break;
            }
            context.push_str(separator);
            context.push_str(&entry);
            used += cost;
        }
        Ok(context)
    }

    /// Build the full prompt for `query` grounded in `results`.
    ///
    /// A query over the query budget is cut with `truncate_chars`.
    pub fn build(&self, query: &str, results: &RetrievalResult) -> Result<String, SynthesisError> {
        let context = self.build_context(results)?;
        let query = truncate_chars(query, self.max_query_chars);
        Ok(self.template.render(&context, &query))
    }

    fn format_entry(&self, position: usize, hit: &ScoredRecord) -> String {
        let doc = &hit.document;
        let mut entry = format!("{}. {}", position, doc.title);
        if !doc.genres.is_empty() {
            entry.push_str("\n   Genres: ");
            entry.push_str(&doc.genres.join(", "));
        }
        let synopsis = doc.synopsis.trim();
        if !synopsis.is_empty() {
            entry.push_str("\n   Synopsis: ");
            entry.push_str(&truncate_chars(synopsis, self.max_synopsis_chars));
        }
        entry
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PromptTemplate::default())
    }
}

/// Cut `text` to at most `max` characters (never inside a UTF-8 sequence),
/// marking the cut with `...`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((byte_end, _)) => format!("{}...", text[..byte_end].trim_end()),
    }
}
