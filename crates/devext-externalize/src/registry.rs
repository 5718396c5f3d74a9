//! Ids confirmed external during this process.

use std::hash::BuildHasherDefault;
use std::sync::{PoisonError, RwLock};

use indexmap::IndexSet;
use rustc_hash::FxHasher;

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Append-only, insertion-ordered set of externalized module ids.
///
/// Written by both interceptors and read by the prefix-strip transform.
/// Every entry matched a criterion when it was inserted; entries are never
/// removed, so a registry only grows for the lifetime of the plugin.
#[derive(Debug, Default)]
pub struct ExternalRegistry {
    ids: RwLock<FxIndexSet<String>>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`. Returns `true` the first time an id is seen.
    pub fn insert(&self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_is_idempotent_and_ordered() {
        let registry = ExternalRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.insert("b"));
        assert!(registry.insert("a"));
        assert!(!registry.insert("b"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
        assert_eq!(registry.snapshot(), vec!["b", "a"]);
    }

    #[test]
    fn test_concurrent_inserts() {
        let registry = Arc::new(ExternalRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for n in 0..50 {
                        registry.insert(&format!("pkg-{}", (n + i) % 50));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 50);
    }
}
