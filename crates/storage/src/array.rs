//! Index-addressable array view over a contract partition.

use serde_json::{json, Value};
use veris_common::{Address, Error, Result};

use crate::keyvalue::KvAccess;
use crate::typed::TypedKeyValue;

/// Key of the explicit length counter inside the array's own namespace.
const LENGTH_KEY: &str = "length";

/// An array-like store: integer-indexed values plus an explicit length
/// counter kept in the same partition.
///
/// Elements are stored wrapped (`{"val": ...}`) so a falsy value is
/// distinguishable from absence; popped slots are overwritten with a bare
/// tombstone that reads back as absent. The length counter is read and
/// updated through the same exclusive access as the element writes, so
/// each push/pop updates both atomically with respect to the invocation.
///
/// Invariant: `length == 1 + highest index ever successfully written,
/// minus pops`.
pub struct StoreArray<S: KvAccess> {
    typed: TypedKeyValue<S>,
}

impl<S: KvAccess> StoreArray<S> {
    /// Open the named array store inside `contract`'s partition.
    pub fn new(inner: S, contract: &Address, store: &str) -> Result<Self> {
        Ok(StoreArray {
            typed: TypedKeyValue::new(inner, contract, store)?,
        })
    }

    /// Array view over a raw partition (host-side bookkeeping).
    pub fn open_partition(inner: S, partition: &str) -> Self {
        StoreArray {
            typed: TypedKeyValue::open_partition(inner, partition),
        }
    }

    /// Current length.
    pub fn len(&self) -> Result<u64> {
        match self.typed.get(LENGTH_KEY)? {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                Error::Storage(format!("corrupt array length: {n}"))
            }),
            Some(other) => Err(Error::Storage(format!("corrupt array length: {other}"))),
            None => Ok(0),
        }
    }

    /// True when the array holds no elements.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn set_len(&mut self, length: u64) -> Result<()> {
        self.typed.put(LENGTH_KEY, &json!(length))
    }

    /// Read the element at `index`. `None` for never-written or popped
    /// slots.
    pub fn get(&self, index: u64) -> Result<Option<Value>> {
        match self.typed.get(&index.to_string())? {
            // elements are wrapped; anything else is a tombstone
            Some(Value::Object(mut wrapper)) => Ok(wrapper.remove("val")),
            Some(_) | None => Ok(None),
        }
    }

    /// Write the element at `index`, growing the length when writing at
    /// or past the current end.
    pub fn set(&mut self, index: u64, value: &Value) -> Result<()> {
        let len = self.len()?;
        if index >= len {
            self.set_len(index + 1)?;
        }
        self.typed.put(&index.to_string(), &json!({ "val": value }))
    }

    /// Append a value; returns the new length.
    pub fn push(&mut self, value: &Value) -> Result<u64> {
        let len = self.len()?;
        self.set(len, value)?;
        Ok(len + 1)
    }

    /// Remove and return the last element. `None` on an empty array.
    pub fn pop(&mut self) -> Result<Option<Value>> {
        let len = self.len()?;
        if len == 0 {
            return Ok(None);
        }
        let last = len - 1;
        let element = self.get(last)?;
        self.set_len(last)?;
        // tombstone the slot; a bare non-object reads back as absent
        self.typed.put(&last.to_string(), &json!(false))?;
        Ok(element)
    }

    /// First index holding `value`, or -1. Bounded linear scan over
    /// `[0, length)`.
    pub fn index_of(&self, value: &Value) -> Result<i64> {
        let needle = crate::canonical_json(value);
        for index in 0..self.len()? {
            if let Some(element) = self.get(index)? {
                if crate::canonical_json(&element) == needle {
                    return Ok(index as i64);
                }
            }
        }
        Ok(-1)
    }

    /// Last index holding `value`, or -1. Bounded linear scan over
    /// `[0, length)`.
    pub fn last_index_of(&self, value: &Value) -> Result<i64> {
        let needle = crate::canonical_json(value);
        for index in (0..self.len()?).rev() {
            if let Some(element) = self.get(index)? {
                if crate::canonical_json(&element) == needle {
                    return Ok(index as i64);
                }
            }
        }
        Ok(-1)
    }

    /// Materialize the live elements in index order; holes are skipped.
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        for index in 0..self.len()? {
            if let Some(element) = self.get(index)? {
                items.push(element);
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryKv, TransactionalKv};
    use serde_json::json;
    use std::sync::Arc;

    fn array(tx: &mut TransactionalKv) -> StoreArray<&mut TransactionalKv> {
        let contract = Address::new("c1").unwrap();
        StoreArray::new(tx, &contract, "items").unwrap()
    }

    fn fresh() -> TransactionalKv {
        TransactionalKv::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_push_pop_length() {
        let mut tx = fresh();
        let mut arr = array(&mut tx);
        arr.push(&json!(1)).unwrap();
        arr.push(&json!(2)).unwrap();
        assert_eq!(arr.push(&json!(3)).unwrap(), 3);
        assert_eq!(arr.len().unwrap(), 3);

        assert_eq!(arr.pop().unwrap(), Some(json!(3)));
        assert_eq!(arr.len().unwrap(), 2);
        // popped slot reads as absent
        assert_eq!(arr.get(2).unwrap(), None);
    }

    #[test]
    fn test_index_of() {
        let mut tx = fresh();
        let mut arr = array(&mut tx);
        for v in [json!(1), json!(2), json!(3), json!(2)] {
            arr.push(&v).unwrap();
        }
        assert_eq!(arr.index_of(&json!(2)).unwrap(), 1);
        assert_eq!(arr.last_index_of(&json!(2)).unwrap(), 3);
        assert_eq!(arr.index_of(&json!(99)).unwrap(), -1);
    }

    #[test]
    fn test_falsy_element_distinguishable_from_absence() {
        let mut tx = fresh();
        let mut arr = array(&mut tx);
        arr.push(&json!(false)).unwrap();
        arr.push(&json!(0)).unwrap();
        assert_eq!(arr.get(0).unwrap(), Some(json!(false)));
        assert_eq!(arr.get(1).unwrap(), Some(json!(0)));
        assert_eq!(arr.get(2).unwrap(), None);
        assert_eq!(arr.index_of(&json!(false)).unwrap(), 0);
    }

    #[test]
    fn test_sparse_set_grows_length() {
        let mut tx = fresh();
        let mut arr = array(&mut tx);
        arr.set(4, &json!("x")).unwrap();
        assert_eq!(arr.len().unwrap(), 5);
        assert_eq!(arr.get(2).unwrap(), None);
        assert_eq!(arr.get(4).unwrap(), Some(json!("x")));
        assert_eq!(arr.to_vec().unwrap(), vec![json!("x")]);
    }

    #[test]
    fn test_pop_empty() {
        let mut tx = fresh();
        let mut arr = array(&mut tx);
        assert_eq!(arr.pop().unwrap(), None);
    }

    #[test]
    fn test_pop_then_push_reuses_slot() {
        let mut tx = fresh();
        let mut arr = array(&mut tx);
        arr.push(&json!("a")).unwrap();
        arr.pop().unwrap();
        arr.push(&json!("b")).unwrap();
        assert_eq!(arr.len().unwrap(), 1);
        assert_eq!(arr.get(0).unwrap(), Some(json!("b")));
    }
}
