use crate::types::ResultSet;
use std::sync::RwLock;

/// Holds the most recent result set.
///
/// Writes are whole-set swaps under the write lock, so readers observe
/// either the previous set or the new one, never a mix. The scheduler loop
/// is the sole writer; scrapes are concurrent readers.
#[derive(Default)]
pub struct ResultStore {
    results: RwLock<ResultSet>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, results: ResultSet) {
        let mut guard = self
            .results
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = results;
    }

    pub fn get(&self) -> ResultSet {
        self.results
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.set(ResultSet::new());
    }
}
