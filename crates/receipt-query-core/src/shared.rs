//! Snapshot publication for concurrent search and serialized writes.
//!
//! Readers take an `Arc` to the current [`VectorIndex`] and search it
//! without holding any lock. A writer clones the index, mutates the clone,
//! refreshes IDF once for the whole batch, and swaps the new snapshot in.
//! If the mutation fails, nothing is published.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::Result;
use crate::index::{SearchHit, VectorIndex};

/// A [`VectorIndex`] shared between many readers and one writer at a time.
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Arc<VectorIndex>>,
    writer: Mutex<()>,
}

impl SharedIndex {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            writer: Mutex::new(()),
        }
    }

    /// The currently published index.
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        let current = self.current.read();
        Arc::clone(&*current)
    }

    /// Search the current snapshot.
    pub fn search(&self, query_text: &str, top_k: usize, min_score: f32) -> Vec<SearchHit> {
        self.snapshot().search(query_text, top_k, min_score)
    }

    /// Items similar to `item_id` in the current snapshot.
    pub fn similar_to(&self, item_id: i64, top_k: usize, min_score: f32) -> Vec<SearchHit> {
        self.snapshot().similar_to(item_id, top_k, min_score)
    }

    /// Apply `mutate` to a private copy and publish it, refreshed.
    ///
    /// Writers are serialized. The published snapshot changes only if
    /// `mutate` returns `Ok`.
    pub fn update<R, F>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut VectorIndex) -> Result<R>,
    {
        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        let out = mutate(&mut next)?;
        if next.is_stale() {
            next.refresh();
        }
        debug!(vectors = next.len(), terms = next.vocabulary().len(), "publishing index snapshot");
        *self.current.write() = Arc::new(next);
        Ok(out)
    }

    /// Replace the published index wholesale.
    pub fn replace(&self, mut index: VectorIndex) {
        let _guard = self.writer.lock();
        if index.is_stale() {
            index.refresh();
        }
        *self.current.write() = Arc::new(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_update_publishes_refreshed_snapshot() {
        let shared = SharedIndex::default();
        shared
            .update(|index| {
                index.add(1, "Organic Milk");
                index.add(2, "Whole Wheat Bread");
                Ok(())
            })
            .unwrap();
        let snap = shared.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(!snap.is_stale());
        assert_eq!(snap.vocabulary().idf_document_count(), 2);
    }

    #[test]
    fn test_failed_update_publishes_nothing() {
        let shared = SharedIndex::new(VectorIndex::new());
        let result: Result<()> = shared.update(|index| {
            index.add(1, "Organic Milk");
            Err(Error::corruption("simulated"))
        });
        assert!(result.is_err());
        assert!(shared.snapshot().is_empty());
    }

    #[test]
    fn test_old_snapshot_survives_update() {
        let shared = SharedIndex::default();
        shared
            .update(|index| {
                index.add(1, "Organic Milk");
                Ok(())
            })
            .unwrap();
        let before = shared.snapshot();
        shared
            .update(|index| {
                index.remove(1);
                Ok(())
            })
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before.search("milk", 5, 0.0).len(), 1);
        assert!(shared.search("milk", 5, 0.0).is_empty());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let shared = Arc::new(SharedIndex::default());
        shared
            .update(|index| {
                index.add(0, "milk");
                Ok(())
            })
            .unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let hits = shared.search("milk", 100, 0.0);
                        assert!(!hits.is_empty());
                        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
                    }
                })
            })
            .collect();

        for id in 1..50 {
            shared
                .update(|index| {
                    index.add(id, "fresh milk");
                    Ok(())
                })
                .unwrap();
        }

        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(shared.snapshot().len(), 50);
    }
}
