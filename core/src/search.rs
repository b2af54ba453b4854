//! Hybrid ranking: BM25 over the inverted index fused with cosine
//! scores from the semantic index.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::index::InvertedIndex;
use crate::semantic::SemanticIndex;
use crate::tokenizer::tokenize;

/// BM25 and fusion parameters. Out-of-range values are replaced with the
/// defaults at construction instead of failing.
#[derive(Debug, Clone, Copy)]
pub struct RankerConfig {
    pub k1: f64,
    pub b: f64,
    pub lexical_weight: f64,
    pub semantic_weight: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            lexical_weight: 1.0,
            semantic_weight: 0.65,
        }
    }
}

impl RankerConfig {
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.k1 > 0.0) || !self.k1.is_finite() {
            self.k1 = defaults.k1;
        }
        if !(0.0..=1.0).contains(&self.b) {
            self.b = defaults.b;
        }
        if !(self.lexical_weight >= 0.0) || !self.lexical_weight.is_finite() {
            self.lexical_weight = defaults.lexical_weight;
        }
        if !(self.semantic_weight >= 0.0) || !self.semantic_weight.is_finite() {
            self.semantic_weight = defaults.semantic_weight;
        }
        self
    }
}

/// A ranked document for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Executes ranked queries against the inverted index, optionally fusing
/// in semantic similarity.
pub struct SearchService {
    index: Arc<InvertedIndex>,
    semantic: Option<Arc<SemanticIndex>>,
    config: RankerConfig,
}

impl SearchService {
    pub fn new(index: Arc<InvertedIndex>, semantic: Option<Arc<SemanticIndex>>) -> Self {
        Self::with_config(index, semantic, RankerConfig::default())
    }

    pub fn with_config(
        index: Arc<InvertedIndex>,
        semantic: Option<Arc<SemanticIndex>>,
        config: RankerConfig,
    ) -> Self {
        Self {
            index,
            semantic,
            config: config.sanitized(),
        }
    }

    /// Tokenizes the query, scores documents, and returns the top
    /// results ordered by score descending, ties broken by ascending doc
    /// id. `top_k == 0` returns everything. Never fails; degenerate
    /// input degrades to an empty list.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let doc_count = self.index.document_count() as f64;
        let mut average_length = self.index.average_document_length();
        if average_length == 0.0 {
            average_length = 1.0;
        }

        // Repeated query tokens contribute once per occurrence, which
        // acts as a query-side term-frequency weight.
        let mut combined: HashMap<String, f64> = HashMap::new();
        for term in &tokens {
            let postings = self.index.postings(term);
            if postings.is_empty() {
                continue;
            }
            let df = self.index.document_frequency(term) as f64;
            if df == 0.0 {
                continue;
            }
            let idf = ((doc_count - df + 0.5) / (df + 0.5)).ln().max(0.0);
            for posting in postings {
                let doc_length = match self.index.document_length(&posting.doc_id) {
                    Some(length) if length > 0 => length as f64,
                    _ => average_length,
                };
                let numerator = posting.term_frequency * (self.config.k1 + 1.0);
                let denominator = posting.term_frequency
                    + self.config.k1
                        * (1.0 - self.config.b + self.config.b * (doc_length / average_length));
                *combined.entry(posting.doc_id).or_insert(0.0) +=
                    self.config.lexical_weight * idf * (numerator / denominator);
            }
        }

        if let Some(semantic) = &self.semantic {
            let semantic_limit = top_k.max(10);
            for candidate in semantic.query(query, semantic_limit) {
                *combined.entry(candidate.doc_id).or_insert(0.0) +=
                    self.config.semantic_weight * candidate.score;
            }
        }

        let mut results = Vec::with_capacity(combined.len());
        for (doc_id, score) in combined {
            // A document scored from a stale postings copy may have been
            // replaced mid-query; skip ids the store no longer knows.
            let Some(doc) = self.index.document(&doc_id) else {
                continue;
            };
            let snippet = build_snippet(&doc.content, &tokens);
            results.push(SearchHit {
                doc_id,
                score,
                title: doc.title,
                snippet,
                url: doc.url,
            });
        }

        results.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
            Some(Ordering::Equal) | None => a.doc_id.cmp(&b.doc_id),
            Some(order) => order,
        });
        if top_k > 0 && results.len() > top_k {
            results.truncate(top_k);
        }
        results
    }
}

/// A window of the original content around the first query-token match,
/// or the leading 80 bytes when nothing matches. Offsets are widened
/// outward to character boundaries so multi-byte content never splits.
fn build_snippet(content: &str, tokens: &[String]) -> String {
    if content.is_empty() {
        return String::new();
    }

    let lowered = content.to_lowercase();
    for token in tokens {
        if let Some(found) = lowered.find(token.as_str()) {
            let anchor = found.min(content.len());
            let start = floor_char_boundary(content, anchor.saturating_sub(40));
            let end = ceil_char_boundary(content, (anchor + 40).min(content.len()));
            return content[start..end].to_string();
        }
    }

    let end = ceil_char_boundary(content, content.len().min(80));
    content[..end].to_string()
}

fn floor_char_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn ceil_char_boundary(text: &str, mut at: usize) -> usize {
    while at < text.len() && !text.is_char_boundary(at) {
        at += 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::semantic::SemanticOptions;

    fn service(index: Arc<InvertedIndex>) -> SearchService {
        SearchService::new(index, None)
    }

    #[test]
    fn empty_index_returns_no_results() {
        let results = service(Arc::new(InvertedIndex::new())).search("anything", 10);
        assert!(results.is_empty());
    }

    #[test]
    fn empty_query_returns_no_results() {
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new("d", "", "", "some content"));
        assert!(service(index).search("", 10).is_empty());
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new("d", "", "", "some content"));
        assert!(service(index).search("!!!", 10).is_empty());
    }

    #[test]
    fn ranks_the_matching_document_first() {
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new(
            "1",
            "",
            "Vector Search",
            "Vector search uses embeddings and approximate nearest neighbors.",
        ));
        index.add_document(Document::new(
            "2",
            "",
            "Circuit Breakers",
            "Circuit breakers protect distributed systems from cascading failures.",
        ));

        let results = service(index).search("vector search", 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].doc_id, "1");
        assert_eq!(results[0].title, "Vector Search");
    }

    #[test]
    fn semantic_side_boosts_non_lexical_matches() {
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new("lex", "", "Keyword Match", "Classical keyword search"));
        index.add_document(Document::new(
            "sem",
            "",
            "Embeddings",
            "Dense vector representations for semantic retrieval",
        ));

        let semantic = Arc::new(SemanticIndex::new(SemanticOptions {
            dimension: 64,
            hyperplane_count: 16,
            seed: 42,
        }));
        semantic.add_document(&Document::new("lex", "", "", "Classical keyword search"));
        semantic.add_document(&Document::new(
            "sem",
            "",
            "",
            "Dense vector representations for semantic retrieval",
        ));

        let svc = SearchService::with_config(
            index,
            Some(semantic),
            RankerConfig {
                lexical_weight: 0.2,
                semantic_weight: 1.0,
                ..RankerConfig::default()
            },
        );

        let results = svc.search("dense retrieval", 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].doc_id, "sem");
    }

    #[test]
    fn equal_scores_break_ties_by_ascending_doc_id() {
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new("beta", "", "", "twin content here"));
        index.add_document(Document::new("alpha", "", "", "twin content here"));

        let results = service(index).search("twin content", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, results[1].score);
        assert_eq!(results[0].doc_id, "alpha");
        assert_eq!(results[1].doc_id, "beta");
    }

    #[test]
    fn larger_top_k_extends_the_smaller_result_prefix() {
        let index = Arc::new(InvertedIndex::new());
        for i in 0..8 {
            let repeats = "needle ".repeat(i + 1);
            index.add_document(Document::new(
                format!("doc{i}"),
                "",
                "",
                format!("{repeats} padding words {i}"),
            ));
        }
        let svc = service(index);
        let small = svc.search("needle", 3);
        let large = svc.search("needle", 6);
        assert_eq!(small.len(), 3);
        assert_eq!(large[..3], small[..]);
    }

    #[test]
    fn snippet_windows_around_the_first_match() {
        let long_prefix = "x".repeat(100);
        let content = format!("{long_prefix} the magic keyword appears here and more trailing text follows it");
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new("d", "", "", content.clone()));

        let results = service(index).search("keyword", 1);
        let snippet = &results[0].snippet;
        assert!(snippet.contains("keyword"));
        assert!(snippet.len() <= 81);
    }

    #[test]
    fn snippet_falls_back_to_leading_content() {
        let index = Arc::new(InvertedIndex::new());
        let mut doc = Document::new("d", "", "", "short body without the query word");
        doc.tokens = vec!["match".into()];
        index.add_document(doc);

        let results = service(index).search("match", 1);
        assert_eq!(results[0].snippet, "short body without the query word");
    }

    #[test]
    fn snippet_never_splits_multibyte_characters() {
        let content = "päivä ".repeat(30);
        let index = Arc::new(InvertedIndex::new());
        index.add_document(Document::new("d", "", "", content));

        // Token "iv" occurs inside each word; the window must land on
        // char boundaries without panicking.
        let results = service(index).search("iv", 1);
        assert!(results[0].snippet.contains("iv"));
    }

    #[test]
    fn invalid_config_values_fall_back_to_defaults() {
        let config = RankerConfig {
            k1: -3.0,
            b: 7.5,
            lexical_weight: f64::NAN,
            semantic_weight: -1.0,
        }
        .sanitized();
        assert_eq!(config.k1, 1.5);
        assert_eq!(config.b, 0.75);
        assert_eq!(config.lexical_weight, 1.0);
        assert_eq!(config.semantic_weight, 0.65);
    }
}
