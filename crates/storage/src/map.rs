//! Field-addressable map view over a contract partition.

use serde_json::Value;
use veris_common::{Address, Result};

use crate::keyvalue::KvAccess;
use crate::typed::TypedKeyValue;

/// A map-like store with explicit accessor operations.
///
/// Field reads and writes translate to canonical typed get/put against
/// the partition. There is no dynamic property interception: `get`,
/// `set` and `remove` are the whole contract, which keeps the storage
/// access statically checkable.
pub struct StoreMap<S: KvAccess> {
    typed: TypedKeyValue<S>,
}

impl<S: KvAccess> StoreMap<S> {
    /// Open the named map store inside `contract`'s partition.
    pub fn new(inner: S, contract: &Address, store: &str) -> Result<Self> {
        Ok(StoreMap {
            typed: TypedKeyValue::new(inner, contract, store)?,
        })
    }

    /// Read a field. `None` when never written or removed.
    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        self.typed.get(field)
    }

    /// Write a field.
    pub fn set(&mut self, field: &str, value: &Value) -> Result<()> {
        self.typed.put(field, value)
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Result<()> {
        self.typed.del(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryKv, TransactionalKv};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_set_get_remove() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend);
        let contract = Address::new("c1").unwrap();
        let mut map = StoreMap::new(&mut tx, &contract, "prices").unwrap();

        assert_eq!(map.get("ram").unwrap(), None);
        map.set("ram", &json!(2)).unwrap();
        assert_eq!(map.get("ram").unwrap(), Some(json!(2)));
        map.set("ram", &json!(4)).unwrap();
        assert_eq!(map.get("ram").unwrap(), Some(json!(4)));
        map.remove("ram").unwrap();
        assert_eq!(map.get("ram").unwrap(), None);
    }

    #[test]
    fn test_structured_fields() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend);
        let contract = Address::new("c1").unwrap();
        let mut map = StoreMap::new(&mut tx, &contract, "orders").unwrap();

        let order = json!({"seller": "a", "amount": "5", "open": true});
        map.set("order-1", &order).unwrap();
        assert_eq!(map.get("order-1").unwrap(), Some(order));
    }
}
