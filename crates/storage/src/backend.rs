//! The external key-value backend interface.
//!
//! The core consumes a flat string store and stays agnostic about what
//! implements it. [`MemoryKv`] is the in-process reference backend used by
//! nodes for speculative state and by every test in the workspace.

use std::collections::BTreeMap;

use parking_lot::RwLock;

/// The persistent key-value store the platform runs over.
///
/// Implementations must be safe for concurrent use; the transactional
/// layer above serializes writers per partition, but independent
/// transactions over disjoint partitions read and flush in parallel.
pub trait KvBackend: Send + Sync {
    /// Read a key. `None` when absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Unconditionally overwrite a key.
    fn put(&self, key: &str, value: &str);

    /// Remove a key. Removing an absent key is a no-op.
    fn del(&self, key: &str);
}

/// In-memory reference backend.
///
/// Keys are held in a sorted map so [`MemoryKv::snapshot`] produces a
/// deterministic image, which tests use for byte-identical state
/// comparisons.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKv {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// A point-in-time copy of the whole store.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn del(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_del() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a"), None);
        kv.put("a", "1");
        assert_eq!(kv.get("a"), Some("1".to_string()));
        kv.put("a", "2");
        assert_eq!(kv.get("a"), Some("2".to_string()));
        kv.del("a");
        assert_eq!(kv.get("a"), None);
        kv.del("a"); // absent delete is a no-op
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let kv = MemoryKv::new();
        kv.put("x", "1");
        let snap = kv.snapshot();
        kv.put("y", "2");
        assert_eq!(snap.len(), 1);
        assert_eq!(kv.len(), 2);
    }
}
