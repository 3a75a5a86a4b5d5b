//! Query normalization.

use crate::error::QueryError;

/// Longest query accepted by `normalize_bounded` unless configured otherwise
pub const DEFAULT_MAX_QUERY_CHARS: usize = 1000;

/// Trim surrounding whitespace and reject queries with nothing left.
///
/// Interior whitespace and case are preserved, so the function is
/// idempotent on its own output.
pub fn normalize(raw: &str) -> Result<String, QueryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(QueryError::Empty);
    }
    Ok(trimmed.to_string())
}

/// `normalize`, then reject queries longer than `max_chars` characters.
///
/// The limit applies to the trimmed text, so padding never counts.
pub fn normalize_bounded(raw: &str, max_chars: usize) -> Result<String, QueryError> {
    let query = normalize(raw)?;
    let found = query.chars().count();
    if found > max_chars {
        return Err(QueryError::TooLong {
            max: max_chars,
            found,
        });
    }
    Ok(query)
}
