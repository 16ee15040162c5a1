//! Contract-scoped string maps and the access trait they build on.

use veris_common::{Address, Error, Result};

use crate::namespace::NamespacedKv;

/// Read/write access to a string keyspace.
///
/// Implemented by the transactional overlay, by namespace wrappers, and by
/// the sandbox bridge, so the higher-level stores ([`crate::StoreMap`],
/// [`crate::StoreArray`], the token register) work identically on either
/// side of the isolation boundary.
pub trait KvAccess {
    /// Read a key. `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally overwrite a key.
    fn put(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove a key.
    fn del(&mut self, key: &str) -> Result<()>;
}

impl<T: KvAccess + ?Sized> KvAccess for &mut T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value)
    }

    fn del(&mut self, key: &str) -> Result<()> {
        (**self).del(key)
    }
}

/// Validate a logical store name.
///
/// Store names become namespace segments, so they must be non-empty and
/// must not contain the separator.
pub(crate) fn check_store_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Storage("store name cannot be empty".into()));
    }
    if name.contains('.') {
        return Err(Error::Storage(format!(
            "store name cannot contain '.': {name:?}"
        )));
    }
    Ok(())
}

/// A persistent string map scoped to one contract's storage partition.
///
/// The partition key is `(contract address, store name)`; no other
/// contract can observe or mutate it. `get` returns `None` for absent
/// keys and `put` is an unconditional overwrite.
pub struct KeyValue<S: KvAccess> {
    ns: NamespacedKv<S>,
}

impl<S: KvAccess> KeyValue<S> {
    /// Open the `(contract, store)` partition of `inner`.
    pub fn new(inner: S, contract: &Address, store: &str) -> Result<Self> {
        check_store_name(store)?;
        Ok(KeyValue {
            ns: NamespacedKv::new(inner, &format!("{contract}.{store}")),
        })
    }

    /// Open a raw partition by its full name.
    ///
    /// Used by the engine for host-side bookkeeping partitions (rent
    /// table, contract records); contract code always goes through
    /// [`KeyValue::new`].
    pub fn open_partition(inner: S, partition: &str) -> Self {
        KeyValue {
            ns: NamespacedKv::new(inner, partition),
        }
    }

    /// Read a key from the partition.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.ns.get(key)
    }

    /// Overwrite a key in the partition.
    pub fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.ns.put(key, value)
    }

    /// Remove a key from the partition.
    pub fn del(&mut self, key: &str) -> Result<()> {
        self.ns.del(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KvBackend;
    use crate::{MemoryKv, TransactionalKv};
    use std::sync::Arc;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_partitions_are_disjoint() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend.clone());

        KeyValue::new(&mut tx, &addr("contract-a"), "wallets")
            .unwrap()
            .put("k", "from-a")
            .unwrap();
        KeyValue::new(&mut tx, &addr("contract-b"), "wallets")
            .unwrap()
            .put("k", "from-b")
            .unwrap();

        let kv_a = KeyValue::new(&mut tx, &addr("contract-a"), "wallets").unwrap();
        assert_eq!(kv_a.get("k").unwrap(), Some("from-a".to_string()));
        drop(kv_a);
        tx.commit();
        assert_eq!(backend.get("contract-a.wallets.k"), Some("from-a".to_string()));
        assert_eq!(backend.get("contract-b.wallets.k"), Some("from-b".to_string()));
    }

    #[test]
    fn test_store_name_validation() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend);
        assert!(KeyValue::new(&mut tx, &addr("c"), "").is_err());
        assert!(KeyValue::new(&mut tx, &addr("c"), "a.b").is_err());
        assert!(KeyValue::new(&mut tx, &addr("c"), "ok").is_ok());
    }
}
