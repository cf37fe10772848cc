//! Sparse TF-IDF vector index with brute-force cosine search.
//!
//! Each indexed item is a [`DocumentVector`]: raw term counts plus the
//! L2-normalized weights `count × (1 + idf)`. Because stored and query
//! vectors are unit length, cosine similarity is a sparse dot product.
//!
//! # Weight freshness
//!
//! [`VectorIndex::add`] weights a new vector with the IDF values currently
//! in the vocabulary and marks the index stale. [`VectorIndex::refresh`]
//! recomputes IDF for the current document count and reweights every
//! vector from its counts. Every stored vector is always consistent with
//! the vocabulary's IDF table; staleness only means that table lags the
//! document frequencies.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::codec;
use crate::error::Result;
use crate::vocabulary::{TermIndex, Vocabulary};

/// One indexed item.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVector {
    item_id: i64,
    counts: Vec<(TermIndex, u32)>,
    weights: Vec<(TermIndex, f32)>,
    norm: f32,
}

impl DocumentVector {
    fn from_counts(item_id: i64, counts: Vec<(TermIndex, u32)>, vocab: &Vocabulary) -> Self {
        let raw: Vec<(TermIndex, f32)> = counts
            .iter()
            .map(|&(t, c)| (t, c as f32 * vocab.term_weight(t)))
            .collect();
        let norm = raw.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        let weights = if norm > 0.0 {
            raw.into_iter().map(|(t, w)| (t, w / norm)).collect()
        } else {
            Vec::new()
        };
        Self {
            item_id,
            counts,
            weights,
            norm,
        }
    }

    /// Reassemble a vector decoded from disk.
    ///
    /// Raw counts are recovered as `weight × norm / (1 + idf)`, rounded.
    pub(crate) fn from_weights(
        item_id: i64,
        norm: f32,
        weights: Vec<(TermIndex, f32)>,
        vocab: &Vocabulary,
    ) -> Self {
        let counts = weights
            .iter()
            .map(|&(t, w)| {
                let count = (w * norm / vocab.term_weight(t)).round().max(1.0);
                (t, count as u32)
            })
            .collect();
        Self {
            item_id,
            counts,
            weights,
            norm,
        }
    }

    fn reweight(&mut self, vocab: &Vocabulary) {
        let counts = std::mem::take(&mut self.counts);
        *self = Self::from_counts(self.item_id, counts, vocab);
    }

    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    /// Normalized `(term, weight)` pairs, sorted by term index.
    pub fn weights(&self) -> &[(TermIndex, f32)] {
        &self.weights
    }

    /// L2 norm of the weights before normalization.
    pub fn norm(&self) -> f32 {
        self.norm
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn terms(&self) -> Vec<TermIndex> {
        self.counts.iter().map(|&(t, _)| t).collect()
    }

    /// Cosine similarity to another vector, in `[0, 1]`.
    pub fn similarity(&self, other: &DocumentVector) -> f32 {
        cosine_similarity(&self.weights, &other.weights)
    }
}

/// Cosine similarity of two sparse vectors sorted by term index.
///
/// Returns `0.0` when either vector is empty or has zero magnitude.
/// Weights are non-negative, so the result is clamped to `[0, 1]`.
pub fn cosine_similarity(a: &[(TermIndex, f32)], b: &[(TermIndex, f32)]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }

    let norm_a = a.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(0.0, 1.0)
}

fn count_terms(seq: &[TermIndex]) -> Vec<(TermIndex, u32)> {
    let mut counts: HashMap<TermIndex, u32> = HashMap::new();
    for &t in seq {
        *counts.entry(t).or_insert(0) += 1;
    }
    let mut counts: Vec<(TermIndex, u32)> = counts.into_iter().collect();
    counts.sort_unstable_by_key(|&(t, _)| t);
    counts
}

/// A scored search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub item_id: i64,
    pub score: f32,
}

/// The vocabulary plus one vector per item, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    vocabulary: Vocabulary,
    vectors: Vec<DocumentVector>,
    positions: HashMap<i64, usize>,
    stale: bool,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `text` under `item_id`, replacing any previous vector.
    ///
    /// A replaced item keeps its original insertion position.
    pub fn add(&mut self, item_id: i64, text: &str) {
        let seq = self.vocabulary.register(text);
        let vector = DocumentVector::from_counts(item_id, count_terms(&seq), &self.vocabulary);
        let unique = vector.terms();

        match self.positions.get(&item_id).copied() {
            Some(pos) => {
                let old = std::mem::replace(&mut self.vectors[pos], vector);
                self.vocabulary.remove_document(&old.terms());
            }
            None => {
                self.positions.insert(item_id, self.vectors.len());
                self.vectors.push(vector);
            }
        }
        self.vocabulary.add_document(&unique);
        self.stale = true;
    }

    /// Remove an item's vector. Terms stay in the vocabulary.
    ///
    /// Returns `false` if the item was not indexed.
    pub fn remove(&mut self, item_id: i64) -> bool {
        let Some(pos) = self.positions.remove(&item_id) else {
            return false;
        };
        let old = self.vectors.remove(pos);
        self.vocabulary.remove_document(&old.terms());
        for p in self.positions.values_mut() {
            if *p > pos {
                *p -= 1;
            }
        }
        self.stale = true;
        true
    }

    /// Recompute IDF for the current corpus and reweight every vector.
    pub fn refresh(&mut self) {
        if let Err(err) = self.vocabulary.recompute_idf(self.vectors.len()) {
            debug!(%err, "index refresh skipped");
            self.stale = false;
            return;
        }
        for vector in &mut self.vectors {
            vector.reweight(&self.vocabulary);
        }
        self.stale = false;
    }

    /// Clear everything and index `corpus` in order, computing IDF once.
    pub fn rebuild<I, S>(&mut self, corpus: I)
    where
        I: IntoIterator<Item = (i64, S)>,
        S: AsRef<str>,
    {
        self.vocabulary.clear();
        self.vectors.clear();
        self.positions.clear();
        for (item_id, text) in corpus {
            self.add(item_id, text.as_ref());
        }
        self.refresh();
    }

    /// Build the transient vector for a query without touching statistics.
    pub fn query_vector(&self, query_text: &str) -> DocumentVector {
        let seq = self.vocabulary.lookup(query_text);
        DocumentVector::from_counts(0, count_terms(&seq), &self.vocabulary)
    }

    /// Rank indexed items by cosine similarity to `query_text`.
    ///
    /// Keeps hits with `score >= min_score` and a non-zero score, ordered by
    /// score descending with ties in insertion order, truncated to `top_k`.
    pub fn search(&self, query_text: &str, top_k: usize, min_score: f32) -> Vec<SearchHit> {
        if self.vectors.is_empty() {
            debug!("search on empty corpus");
            return Vec::new();
        }
        if self.stale {
            debug!("search on index with pending IDF refresh");
        }

        let query = self.query_vector(query_text);
        if query.is_empty() {
            return Vec::new();
        }

        self.rank(&query, None, top_k, min_score)
    }

    /// Items most similar to an indexed item, excluding the item itself.
    ///
    /// Same filtering and ordering as [`search`](Self::search). Returns
    /// nothing for an unknown id.
    pub fn similar_to(&self, item_id: i64, top_k: usize, min_score: f32) -> Vec<SearchHit> {
        match self.get(item_id) {
            Some(target) if !target.is_empty() => self.rank(target, Some(item_id), top_k, min_score),
            _ => Vec::new(),
        }
    }

    fn rank(
        &self,
        query: &DocumentVector,
        exclude: Option<i64>,
        top_k: usize,
        min_score: f32,
    ) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .filter(|v| Some(v.item_id) != exclude)
            .map(|v| SearchHit {
                item_id: v.item_id,
                score: query.similarity(v),
            })
            .filter(|h| h.score > 0.0 && h.score >= min_score)
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }

    pub fn get(&self, item_id: i64) -> Option<&DocumentVector> {
        self.positions.get(&item_id).map(|&p| &self.vectors[p])
    }

    pub fn contains(&self, item_id: i64) -> bool {
        self.positions.contains_key(&item_id)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Vectors in insertion order.
    pub fn vectors(&self) -> &[DocumentVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// True when documents changed since the last [`refresh`](Self::refresh).
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Serialize the whole index in the persisted binary format.
    pub fn export(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// Load an index from the persisted binary format.
    pub fn import(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }

    pub(crate) fn from_parts(vocabulary: Vocabulary, vectors: Vec<DocumentVector>) -> Self {
        let positions = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (v.item_id, i))
            .collect();
        Self {
            vocabulary,
            vectors,
            positions,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(items: &[(i64, &str)]) -> VectorIndex {
        let mut index = VectorIndex::new();
        index.rebuild(items.iter().copied());
        index
    }

    #[test]
    fn test_dairy_milk_finds_organic_milk() {
        let index = index_of(&[(1, "Organic Milk"), (2, "Whole Wheat Bread")]);
        let hits = index.search("dairy milk", 1, 0.1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, 1);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_bread_excluded_from_milk_query() {
        let index = index_of(&[(1, "Organic Milk"), (2, "Whole Wheat Bread")]);
        let hits = index.search("dairy milk", 10, 0.1);
        assert!(hits.iter().all(|h| h.item_id != 2));
    }

    #[test]
    fn test_self_similarity_is_one() {
        let index = index_of(&[
            (1, "Organic Milk"),
            (2, "Whole Wheat Bread"),
            (3, "Chocolate Milk"),
        ]);
        for v in index.vectors() {
            let sim = v.similarity(v);
            assert!((sim - 1.0).abs() < 1e-6, "self similarity {sim}");
        }
    }

    #[test]
    fn test_similarity_symmetric_and_bounded() {
        let index = index_of(&[
            (1, "Organic Milk"),
            (2, "Chocolate Milk"),
            (3, "Milk Chocolate Bar"),
            (4, "Whole Wheat Bread"),
        ]);
        for a in index.vectors() {
            for b in index.vectors() {
                let ab = a.similarity(b);
                let ba = b.similarity(a);
                assert!((0.0..=1.0).contains(&ab));
                assert!((ab - ba).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_empty_vector_has_zero_similarity() {
        let index = index_of(&[(1, "the of"), (2, "Organic Milk")]);
        let empty = index.get(1).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.similarity(empty), 0.0);
        assert_eq!(empty.similarity(index.get(2).unwrap()), 0.0);
        assert!(index.similar_to(1, 10, 0.0).is_empty());
        assert!(index.search("the of", 10, 0.0).is_empty());
    }

    #[test]
    fn test_unknown_query_terms_match_nothing() {
        let index = index_of(&[(1, "Organic Milk")]);
        assert!(index.search("chicken", 10, 0.0).is_empty());
    }

    #[test]
    fn test_query_does_not_grow_vocabulary() {
        let index = index_of(&[(1, "Organic Milk")]);
        let before = index.vocabulary().len();
        index.search("dairy cheese yogurt", 10, 0.0);
        assert_eq!(index.vocabulary().len(), before);
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let index = index_of(&[(7, "Apple Juice"), (3, "Apple Pie"), (5, "Apple Cider")]);
        let hits = index.search("apple", 10, 0.0);
        let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
        assert_eq!(ids, vec![7, 3, 5]);
    }

    #[test]
    fn test_min_score_and_top_k() {
        let index = index_of(&[
            (1, "Milk"),
            (2, "Organic Milk Whole Fresh"),
            (3, "Bread"),
        ]);
        let hits = index.search("milk", 10, 0.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item_id, 1);
        assert!(hits[0].score >= hits[1].score);

        let strict = index.search("milk", 10, 0.99);
        assert_eq!(strict.len(), 1);

        let top1 = index.search("milk", 1, 0.0);
        assert_eq!(top1.len(), 1);
    }

    #[test]
    fn test_readd_replaces_vector() {
        let mut index = index_of(&[(1, "Organic Milk"), (2, "Bread")]);
        index.add(1, "Cheddar Cheese");
        index.refresh();
        assert_eq!(index.len(), 2);
        assert!(index.search("milk", 10, 0.0).is_empty());
        assert_eq!(index.search("cheddar", 10, 0.0)[0].item_id, 1);
        // Original position kept.
        assert_eq!(index.vectors()[0].item_id(), 1);
        let milk = index.vocabulary().index_of("milk").unwrap();
        assert_eq!(index.vocabulary().entries()[milk as usize].document_frequency, 0);
    }

    #[test]
    fn test_remove_keeps_vocabulary() {
        let mut index = index_of(&[(1, "Organic Milk"), (2, "Bread"), (3, "Eggs")]);
        let vocab_len = index.vocabulary().len();
        assert!(index.remove(2));
        assert!(!index.remove(2));
        assert_eq!(index.len(), 2);
        assert_eq!(index.vocabulary().len(), vocab_len);
        assert!(index.contains(3));
        assert_eq!(index.get(3).unwrap().item_id(), 3);
        assert!(index.is_stale());
    }

    #[test]
    fn test_refresh_reweights_rare_terms_higher() {
        let mut index = VectorIndex::new();
        for (id, text) in [
            (1, "milk"),
            (2, "milk bread"),
            (3, "milk eggs"),
            (4, "milk cheese"),
            (5, "truffle milk"),
        ] {
            index.add(id, text);
        }
        index.refresh();
        let v = index.get(5).unwrap();
        let truffle = index.vocabulary().index_of("truffle").unwrap();
        let milk = index.vocabulary().index_of("milk").unwrap();
        let w = |t| v.weights().iter().find(|(i, _)| *i == t).unwrap().1;
        assert!(w(truffle) > w(milk));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let corpus = [(1, "Organic Milk"), (2, "Whole Wheat Bread"), (3, "Milk Chocolate")];
        let mut index = VectorIndex::new();
        index.rebuild(corpus);
        let a = index.export();
        index.rebuild(corpus);
        let b = index.export();
        assert_eq!(a, b);
    }

    #[test]
    fn test_similar_to_excludes_self() {
        let index = index_of(&[
            (1, "Organic Milk"),
            (2, "Milk Chocolate"),
            (3, "Whole Wheat Bread"),
            (4, "Organic Whole Milk"),
        ]);
        let hits = index.similar_to(1, 10, 0.0);
        let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
        assert_eq!(ids, vec![4, 2]);
        assert!(hits[0].score > hits[1].score);

        assert_eq!(index.similar_to(1, 1, 0.0).len(), 1);
        assert!(index.similar_to(99, 10, 0.0).is_empty());
    }

    #[test]
    fn test_empty_index_search() {
        let index = VectorIndex::new();
        assert!(index.search("milk", 10, 0.0).is_empty());
    }

    #[test]
    fn test_cosine_unnormalized_input() {
        let a = vec![(0, 3.0), (1, 4.0)];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
        assert_eq!(cosine_similarity(&[(0, 1.0)], &[(1, 1.0)]), 0.0);
    }
}
