//! Approximate nearest-neighbor retrieval over hashed embeddings, using
//! random-hyperplane signatures as bucket keys.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::document::Document;
use crate::embedding::{cosine_similarity, dot, HashingEmbedder, Vector};

/// Construction parameters. Zero values fall back to the documented
/// defaults; a zero seed derives one from the wall clock, so callers
/// wanting reproducible bucket layouts should pass an explicit seed.
#[derive(Debug, Clone, Copy)]
pub struct SemanticOptions {
    pub dimension: usize,
    pub hyperplane_count: usize,
    pub seed: i64,
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            dimension: 128,
            hyperplane_count: 24,
            seed: 0,
        }
    }
}

impl SemanticOptions {
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.dimension == 0 {
            self.dimension = defaults.dimension;
        }
        if self.hyperplane_count == 0 {
            self.hyperplane_count = defaults.hyperplane_count;
        }
        if self.seed == 0 {
            self.seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as i64)
                .unwrap_or(1);
        }
        self
    }
}

/// A semantic retrieval candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticResult {
    pub doc_id: String,
    pub score: f64,
}

#[derive(Default)]
struct SemanticState {
    vectors: HashMap<String, Vector>,
    buckets: HashMap<String, HashSet<String>>,
}

/// Vector store plus LSH bucket map.
///
/// Hyperplanes are sampled once at construction and never persisted; a
/// restart re-embeds the corpus under fresh planes, which only reshapes
/// the buckets, not the cosine scores.
pub struct SemanticIndex {
    embedder: HashingEmbedder,
    hyperplanes: Vec<Vector>,
    state: RwLock<SemanticState>,
}

impl SemanticIndex {
    pub fn new(options: SemanticOptions) -> Self {
        let options = options.sanitized();
        let mut rng = StdRng::seed_from_u64(options.seed as u64);
        let hyperplanes = (0..options.hyperplane_count)
            .map(|_| {
                (0..options.dimension)
                    .map(|_| rng.sample(StandardNormal))
                    .collect()
            })
            .collect();
        Self {
            embedder: HashingEmbedder::new(options.dimension),
            hyperplanes,
            state: RwLock::default(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn hyperplane_count(&self) -> usize {
        self.hyperplanes.len()
    }

    /// One bit per hyperplane: '1' iff the projection is non-negative.
    fn signature(&self, vector: &[f64]) -> String {
        self.hyperplanes
            .iter()
            .map(|plane| if dot(vector, plane) >= 0.0 { '1' } else { '0' })
            .collect()
    }

    /// Embeds the document content and stores it under its signature
    /// bucket. A document whose content embeds to the zero vector is
    /// skipped. Re-indexing removes the id from its previous bucket
    /// before inserting, so exactly one bucket ever holds it.
    pub fn add_document(&self, doc: &Document) {
        let vector = self.embedder.embed_text(&doc.content);
        if vector.iter().all(|coordinate| *coordinate == 0.0) {
            return;
        }
        let signature = self.signature(&vector);

        let mut state = self.state.write();
        let previous_signature = state
            .vectors
            .get(&doc.id)
            .map(|previous| self.signature(previous));
        if let Some(previous_signature) = previous_signature {
            let emptied = match state.buckets.get_mut(&previous_signature) {
                Some(bucket) => {
                    bucket.remove(&doc.id);
                    bucket.is_empty()
                }
                None => false,
            };
            if emptied {
                state.buckets.remove(&previous_signature);
            }
        }
        state.vectors.insert(doc.id.clone(), vector);
        state
            .buckets
            .entry(signature)
            .or_default()
            .insert(doc.id.clone());
    }

    /// Approximate nearest neighbors for the query text, cosine-ranked.
    ///
    /// Candidates come from the query's signature bucket; when that
    /// yields fewer than `top_k`, the scan widens over the stored
    /// vectors up to `5 * top_k`. `top_k == 0` skips the widening and
    /// returns every bucket candidate.
    pub fn query(&self, query: &str, top_k: usize) -> Vec<SemanticResult> {
        let vector = self.embedder.embed_text(query);
        if vector.iter().all(|coordinate| *coordinate == 0.0) {
            return Vec::new();
        }
        let signature = self.signature(&vector);

        let mut results = {
            let state = self.state.read();
            let mut candidates: Vec<String> = state
                .buckets
                .get(&signature)
                .map(|bucket| bucket.iter().cloned().collect())
                .unwrap_or_default();
            if candidates.len() < top_k {
                let limit = top_k.saturating_mul(5).max(top_k);
                for doc_id in state.vectors.keys() {
                    candidates.push(doc_id.clone());
                    if candidates.len() >= limit {
                        break;
                    }
                }
            }

            let mut seen = HashSet::with_capacity(candidates.len());
            let mut scored = Vec::with_capacity(candidates.len());
            for doc_id in candidates {
                if !seen.insert(doc_id.clone()) {
                    continue;
                }
                if let Some(stored) = state.vectors.get(&doc_id) {
                    let score = cosine_similarity(&vector, stored);
                    scored.push(SemanticResult { doc_id, score });
                }
            }
            scored
        };

        results.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
            Some(Ordering::Equal) | None => a.doc_id.cmp(&b.doc_id),
            Some(order) => order,
        });
        if top_k > 0 && results.len() > top_k {
            results.truncate(top_k);
        }
        results
    }

    pub fn document_vector(&self, id: &str) -> Option<Vector> {
        self.state.read().vectors.get(id).cloned()
    }

    /// Clears vectors and buckets, keeping the hyperplanes.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.vectors.clear();
        state.buckets.clear();
    }

    #[cfg(test)]
    fn buckets_containing(&self, id: &str) -> usize {
        self.state
            .read()
            .buckets
            .values()
            .filter(|bucket| bucket.contains(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(seed: i64) -> SemanticOptions {
        SemanticOptions {
            dimension: 64,
            hyperplane_count: 16,
            seed,
        }
    }

    #[test]
    fn query_returns_nearest_document_first() {
        let index = SemanticIndex::new(options(99));
        index.add_document(&Document::new("1", "", "", "Vector embeddings enable semantic search."));
        index.add_document(&Document::new("2", "", "", "Caching strategies reduce tail latency."));

        let results = index.query("semantic embeddings", 2);
        assert!(!results.is_empty());
        assert_eq!(results[0].doc_id, "1");
    }

    #[test]
    fn scores_stay_within_cosine_bounds() {
        let index = SemanticIndex::new(options(7));
        index.add_document(&Document::new("a", "", "", "alpha beta gamma"));
        index.add_document(&Document::new("b", "", "", "delta epsilon"));

        for result in index.query("alpha beta gamma", 0) {
            assert!((-1.0..=1.0).contains(&result.score));
        }
        let identical = index.query("alpha beta gamma", 1);
        assert!((identical[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_query_and_empty_content_are_no_ops() {
        let index = SemanticIndex::new(options(3));
        index.add_document(&Document::new("noise", "", "", "!!! ---"));
        assert!(index.document_vector("noise").is_none());
        assert!(index.query("...", 5).is_empty());
    }

    #[test]
    fn reindexing_leaves_exactly_one_bucket_entry() {
        let index = SemanticIndex::new(options(42));
        index.add_document(&Document::new("d", "", "", "original wording about storage engines"));
        index.add_document(&Document::new("d", "", "", "entirely different prose on compilers"));

        assert_eq!(index.buckets_containing("d"), 1);
        let results = index.query("entirely different prose on compilers", 1);
        assert_eq!(results[0].doc_id, "d");
        assert!((results[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_options_fall_back_to_defaults() {
        let index = SemanticIndex::new(SemanticOptions {
            dimension: 0,
            hyperplane_count: 0,
            seed: 11,
        });
        assert_eq!(index.dimension(), 128);
        assert_eq!(index.hyperplane_count(), 24);
    }

    #[test]
    fn identical_seeds_reproduce_identical_hyperplanes() {
        let a = SemanticIndex::new(options(5));
        let b = SemanticIndex::new(options(5));
        assert_eq!(a.hyperplanes, b.hyperplanes);
    }

    #[test]
    fn reset_clears_storage() {
        let index = SemanticIndex::new(options(1));
        index.add_document(&Document::new("d", "", "", "some indexed words"));
        index.reset();
        assert!(index.document_vector("d").is_none());
        assert!(index.query("indexed", 5).is_empty());
    }
}
