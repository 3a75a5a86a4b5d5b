//! Retrieval result types.

use data_loader::AnimeDocument;

/// One retrieved anime and its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub document: AnimeDocument,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

impl ScoredRecord {
    pub fn new(document: AnimeDocument, score: f32) -> Self {
        Self { document, score }
    }
}

/// Top-K hits ordered by descending score.
///
/// Construction enforces the ordering: hits are stably sorted by score, so
/// equal scores keep the order the index produced them in (its insertion
/// order), then truncated to `k`. Non-finite scores are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<ScoredRecord>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_hits(mut hits: Vec<ScoredRecord>, k: usize) -> Self {
        hits.retain(|h| h.score.is_finite());
        // sort_by is stable
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Self { hits }
    }

    pub fn hits(&self) -> &[ScoredRecord] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<ScoredRecord> {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredRecord> {
        self.hits.iter()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.document.title.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredRecord;
    type IntoIter = std::slice::Iter<'a, ScoredRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: u64, score: f32) -> ScoredRecord {
        ScoredRecord::new(AnimeDocument::new(id, format!("T{id}")), score)
    }

    #[test]
    fn test_from_hits_sorts_and_truncates() {
        let result = RetrievalResult::from_hits(vec![hit(1, 0.2), hit(2, 0.9), hit(3, 0.5)], 2);
        assert_eq!(result.titles(), vec!["T2", "T3"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let result = RetrievalResult::from_hits(
            vec![hit(7, 0.5), hit(3, 0.8), hit(1, 0.5), hit(4, 0.5)],
            10,
        );
        assert_eq!(result.titles(), vec!["T3", "T7", "T1", "T4"]);
    }

    #[test]
    fn test_non_finite_scores_dropped() {
        let result = RetrievalResult::from_hits(vec![hit(1, f32::NAN), hit(2, 0.1)], 5);
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits()[0].document.id, 2);
    }

    #[test]
    fn test_zero_k_is_empty() {
        let result = RetrievalResult::from_hits(vec![hit(1, 0.3)], 0);
        assert!(result.is_empty());
    }
}
