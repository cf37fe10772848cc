//! Term dictionary with document frequencies and IDF weights.
//!
//! The vocabulary assigns dense `u32` indices to terms in first-seen order.
//! It only grows; the single way to shrink it is [`Vocabulary::clear`],
//! used by a full index rebuild.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tokenize;

/// Dense index of a term in the [`Vocabulary`].
pub type TermIndex = u32;

/// One vocabulary entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TermEntry {
    /// Normalized term text.
    pub text: String,
    /// Number of indexed documents containing the term.
    pub document_frequency: u32,
    /// Inverse document frequency from the last [`Vocabulary::recompute_idf`].
    pub idf: f32,
}

/// Term dictionary owned by a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    by_text: HashMap<String, TermIndex>,
    entries: Vec<TermEntry>,
    /// Document count the current IDF values were computed for (0 = never).
    idf_document_count: u32,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize `text`, assigning indices to unseen terms.
    ///
    /// Returns one index per term occurrence, repeats included, so the
    /// caller can derive term frequencies.
    pub fn register(&mut self, text: &str) -> Vec<TermIndex> {
        tokenize::terms(text)
            .into_iter()
            .map(|term| self.intern(term))
            .collect()
    }

    /// Tokenize `text` against the existing dictionary without growing it.
    ///
    /// Terms that were never registered are skipped.
    pub fn lookup(&self, text: &str) -> Vec<TermIndex> {
        tokenize::terms(text)
            .iter()
            .filter_map(|term| self.by_text.get(term).copied())
            .collect()
    }

    fn intern(&mut self, term: String) -> TermIndex {
        if let Some(&idx) = self.by_text.get(&term) {
            return idx;
        }
        let idx = self.entries.len() as TermIndex;
        self.entries.push(TermEntry {
            text: term.clone(),
            document_frequency: 0,
            idf: 0.0,
        });
        self.by_text.insert(term, idx);
        idx
    }

    /// Record that a document containing `unique_terms` entered the corpus.
    pub(crate) fn add_document(&mut self, unique_terms: &[TermIndex]) {
        for &idx in unique_terms {
            if let Some(entry) = self.entries.get_mut(idx as usize) {
                entry.document_frequency += 1;
            }
        }
    }

    /// Record that a document containing `unique_terms` left the corpus.
    pub(crate) fn remove_document(&mut self, unique_terms: &[TermIndex]) {
        for &idx in unique_terms {
            if let Some(entry) = self.entries.get_mut(idx as usize) {
                entry.document_frequency = entry.document_frequency.saturating_sub(1);
            }
        }
    }

    /// Recompute every IDF as `ln(N / (1 + df))`, floored at zero.
    ///
    /// Fails with [`Error::EmptyCorpus`] when `total_document_count` is zero.
    pub fn recompute_idf(&mut self, total_document_count: usize) -> Result<()> {
        if total_document_count == 0 {
            return Err(Error::EmptyCorpus);
        }
        let n = total_document_count as f64;
        for entry in &mut self.entries {
            let idf = (n / (1.0 + f64::from(entry.document_frequency))).ln();
            entry.idf = idf.max(0.0) as f32;
        }
        self.idf_document_count = total_document_count as u32;
        Ok(())
    }

    /// IDF of a term as of the last recompute.
    pub fn idf(&self, idx: TermIndex) -> Result<f32> {
        if self.idf_document_count == 0 {
            return Err(Error::EmptyCorpus);
        }
        Ok(self.entries.get(idx as usize).map_or(0.0, |e| e.idf))
    }

    /// Multiplier applied to a raw term count: `1 + idf`.
    ///
    /// Terms never covered by a recompute weigh 1, as does everything
    /// before the first recompute.
    pub fn term_weight(&self, idx: TermIndex) -> f32 {
        1.0 + self.idf(idx).unwrap_or(0.0)
    }

    pub fn index_of(&self, term: &str) -> Option<TermIndex> {
        self.by_text.get(term).copied()
    }

    pub fn term(&self, idx: TermIndex) -> Option<&str> {
        self.entries.get(idx as usize).map(|e| e.text.as_str())
    }

    pub fn entries(&self) -> &[TermEntry] {
        &self.entries
    }

    pub fn idf_document_count(&self) -> u32 {
        self.idf_document_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every term. Only a full rebuild does this.
    pub fn clear(&mut self) {
        self.by_text.clear();
        self.entries.clear();
        self.idf_document_count = 0;
    }

    /// Reassemble a vocabulary from decoded entries.
    ///
    /// Fails if two entries share the same text.
    pub(crate) fn from_entries(entries: Vec<TermEntry>, idf_document_count: u32) -> Result<Self> {
        let mut by_text = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if by_text.insert(entry.text.clone(), i as TermIndex).is_some() {
                return Err(Error::corruption(format!(
                    "duplicate vocabulary term '{}'",
                    entry.text
                )));
            }
        }
        Ok(Self {
            by_text,
            entries,
            idf_document_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_in_first_seen_order() {
        let mut vocab = Vocabulary::new();
        let seq = vocab.register("milk bread milk");
        assert_eq!(seq, vec![0, 1, 0]);
        assert_eq!(vocab.term(0), Some("milk"));
        assert_eq!(vocab.term(1), Some("bread"));
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_register_is_stable() {
        let mut vocab = Vocabulary::new();
        vocab.register("organic milk");
        let again = vocab.register("milk organic");
        assert_eq!(again, vec![1, 0]);
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_grow() {
        let mut vocab = Vocabulary::new();
        vocab.register("organic milk");
        let seq = vocab.lookup("dairy milk");
        assert_eq!(seq, vec![1]);
        assert_eq!(vocab.len(), 2);
        assert!(vocab.index_of("dairy").is_none());
    }

    #[test]
    fn test_recompute_idf_empty_corpus() {
        let mut vocab = Vocabulary::new();
        vocab.register("milk");
        assert!(matches!(vocab.recompute_idf(0), Err(Error::EmptyCorpus)));
        assert!(matches!(vocab.idf(0), Err(Error::EmptyCorpus)));
        assert_eq!(vocab.term_weight(0), 1.0);
    }

    #[test]
    fn test_recompute_idf_formula() {
        let mut vocab = Vocabulary::new();
        let a = vocab.register("milk");
        vocab.add_document(&a);
        let b = vocab.register("bread");
        vocab.add_document(&b);
        let c = vocab.register("milk eggs");
        vocab.add_document(&[c[0], c[1]]);
        // Pad the corpus so some terms get positive weight.
        vocab.recompute_idf(10).unwrap();

        let milk = vocab.index_of("milk").unwrap();
        let bread = vocab.index_of("bread").unwrap();
        assert!((vocab.idf(milk).unwrap() - (10.0f32 / 3.0).ln()).abs() < 1e-6);
        assert!((vocab.idf(bread).unwrap() - (10.0f32 / 2.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_idf_floored_at_zero() {
        let mut vocab = Vocabulary::new();
        let a = vocab.register("milk");
        vocab.add_document(&a);
        vocab.add_document(&a);
        vocab.recompute_idf(2).unwrap();
        // ln(2 / 3) < 0
        assert_eq!(vocab.idf(0).unwrap(), 0.0);
        assert_eq!(vocab.term_weight(0), 1.0);
    }

    #[test]
    fn test_remove_document_saturates() {
        let mut vocab = Vocabulary::new();
        let a = vocab.register("milk");
        vocab.remove_document(&a);
        assert_eq!(vocab.entries()[0].document_frequency, 0);
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let entry = TermEntry {
            text: "milk".to_string(),
            document_frequency: 1,
            idf: 0.0,
        };
        let result = Vocabulary::from_entries(vec![entry.clone(), entry], 1);
        assert!(matches!(result, Err(Error::IndexCorruption(_))));
    }

    #[test]
    fn test_clear() {
        let mut vocab = Vocabulary::new();
        vocab.register("milk");
        vocab.recompute_idf(1).unwrap();
        vocab.clear();
        assert!(vocab.is_empty());
        assert_eq!(vocab.idf_document_count(), 0);
    }
}
