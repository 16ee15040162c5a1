//! Key prefixing over any [`KvAccess`].

use veris_common::Result;

use crate::keyvalue::KvAccess;

/// A sub-keyspace inside another [`KvAccess`].
///
/// Every key is prefixed with `"<namespace>."`. Namespaces compose: a
/// `NamespacedKv` over another `NamespacedKv` nests the prefixes, which is
/// how `(contract, store)` partitions are built over the transaction
/// overlay.
pub struct NamespacedKv<S: KvAccess> {
    inner: S,
    prefix: String,
}

impl<S: KvAccess> NamespacedKv<S> {
    /// Wrap `inner`, scoping all access under `namespace`.
    pub fn new(inner: S, namespace: &str) -> Self {
        NamespacedKv {
            inner,
            prefix: format!("{namespace}."),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl<S: KvAccess> KvAccess for NamespacedKv<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.inner.put(&self.full_key(key), value)
    }

    fn del(&mut self, key: &str) -> Result<()> {
        self.inner.del(&self.full_key(key))
    }
}
