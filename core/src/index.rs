use std::collections::HashMap;

use parking_lot::RwLock;

use crate::document::Document;
use crate::tokenizer::tokenize;

/// A term occurrence in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: String,
    pub term_frequency: f64,
}

#[derive(Default)]
struct IndexState {
    documents: HashMap<String, Document>,
    postings: HashMap<String, HashMap<String, Posting>>,
    doc_lengths: HashMap<String, usize>,
    doc_terms: HashMap<String, Vec<String>>,
    total_tokens: usize,
}

/// Concurrent postings store with corpus statistics.
///
/// One writer at a time mutates the whole state under the write lock;
/// readers copy out what they need under the read lock and hold nothing
/// afterwards. Re-indexing an id first retracts every posting the
/// previous version contributed, so the post-state always equals a
/// single insertion of the latest payload.
#[derive(Default)]
pub struct InvertedIndex {
    state: RwLock<IndexState>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document. Tokenization and counting happen
    /// before the lock is taken; the critical section is pure map work.
    pub fn add_document(&self, mut doc: Document) {
        if doc.tokens.is_empty() {
            doc.tokens = tokenize(&doc.content);
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in &doc.tokens {
            *counts.entry(token.clone()).or_insert(0) += 1;
        }

        let mut state = self.state.write();

        if let Some(previous_terms) = state.doc_terms.remove(&doc.id) {
            for term in previous_terms {
                if let Some(posting_list) = state.postings.get_mut(&term) {
                    posting_list.remove(&doc.id);
                    if posting_list.is_empty() {
                        state.postings.remove(&term);
                    }
                }
            }
            if let Some(previous_length) = state.doc_lengths.get(&doc.id).copied() {
                state.total_tokens -= previous_length;
            }
        }

        let mut inserted_tokens = 0;
        let mut terms = Vec::with_capacity(counts.len());
        for (term, count) in counts {
            inserted_tokens += count;
            terms.push(term.clone());
            state.postings.entry(term).or_default().insert(
                doc.id.clone(),
                Posting {
                    doc_id: doc.id.clone(),
                    term_frequency: count as f64,
                },
            );
        }

        state.doc_lengths.insert(doc.id.clone(), doc.tokens.len());
        state.doc_terms.insert(doc.id.clone(), terms);
        state.total_tokens += inserted_tokens;
        state.documents.insert(doc.id.clone(), doc);
    }

    /// Returns a copy of the postings list for a term, sorted by doc id.
    /// Empty if the term is unknown.
    pub fn postings(&self, term: &str) -> Vec<Posting> {
        let mut list: Vec<Posting> = {
            let state = self.state.read();
            state
                .postings
                .get(term)
                .map(|entry| entry.values().cloned().collect())
                .unwrap_or_default()
        };
        list.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        list
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.state
            .read()
            .postings
            .get(term)
            .map_or(0, HashMap::len)
    }

    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn average_document_length(&self) -> f64 {
        let state = self.state.read();
        if state.doc_lengths.is_empty() {
            return 0.0;
        }
        state.total_tokens as f64 / state.doc_lengths.len() as f64
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.state.read().documents.get(id).cloned()
    }

    /// Cached token count for a document, so scoring can read lengths
    /// without copying content.
    pub fn document_length(&self, id: &str) -> Option<usize> {
        self.state.read().doc_lengths.get(id).copied()
    }

    /// All documents ordered by ascending id; the snapshot writer relies
    /// on this for byte-stable output.
    pub fn documents(&self) -> Vec<Document> {
        let mut all: Vec<Document> = self.state.read().documents.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    #[cfg(test)]
    fn total_tokens(&self) -> usize {
        self.state.read().total_tokens
    }
}
