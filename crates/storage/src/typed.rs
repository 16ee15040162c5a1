//! Structured values under canonical encoding.
//!
//! State hashes must match bit-for-bit across independently executing
//! replicas, so structurally equal values have to encode identically no
//! matter how they were constructed. [`canonical_json`] fixes one
//! encoding: object keys sorted ascending at every nesting level, no
//! insignificant whitespace, serde_json's standard escapes and number
//! formatting for the leaves.

use serde_json::Value;
use veris_common::{Address, Error, Result};

use crate::keyvalue::{KeyValue, KvAccess};

/// Encode a JSON value canonically: recursively sorted object keys,
/// compact separators.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // leaf encoding via serde_json: deterministic escapes
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(out, &map[*key]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// A [`KeyValue`] that stores structured values canonically.
pub struct TypedKeyValue<S: KvAccess> {
    kv: KeyValue<S>,
}

impl<S: KvAccess> TypedKeyValue<S> {
    /// Open the `(contract, store)` partition for typed access.
    pub fn new(inner: S, contract: &Address, store: &str) -> Result<Self> {
        Ok(TypedKeyValue {
            kv: KeyValue::new(inner, contract, store)?,
        })
    }

    /// Typed view over a raw partition (host-side bookkeeping).
    pub fn open_partition(inner: S, partition: &str) -> Self {
        TypedKeyValue {
            kv: KeyValue::open_partition(inner, partition),
        }
    }

    /// Store a value under its canonical encoding.
    pub fn put(&mut self, key: &str, value: &Value) -> Result<()> {
        self.kv.put(key, &canonical_json(value))
    }

    /// Read a value back. `None` when absent.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.kv.get(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .map_err(|e| Error::Storage(format!("corrupt typed value at {key:?}: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Remove a key.
    pub fn del(&mut self, key: &str) -> Result<()> {
        self.kv.del(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryKv, TransactionalKv};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_canonical_encoding_is_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_canonical_encoding_nested() {
        let v = json!({"z": {"b": [1, {"y": 0, "x": 1}], "a": null}, "a": true});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":true,"z":{"a":null,"b":[1,{"x":1,"y":0}]}}"#
        );
    }

    #[test]
    fn test_round_trip_deep_equal() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend);
        let contract = Address::new("c1").unwrap();
        let mut typed = TypedKeyValue::new(&mut tx, &contract, "data").unwrap();

        let stored = json!({"b": 1, "a": 2});
        typed.put("obj", &stored).unwrap();
        let loaded = typed.get("obj").unwrap().unwrap();
        assert_eq!(loaded, json!({"a": 2, "b": 1}));
        assert_eq!(typed.get("missing").unwrap(), None);
    }

    #[test]
    fn test_falsy_values_survive() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend);
        let contract = Address::new("c1").unwrap();
        let mut typed = TypedKeyValue::new(&mut tx, &contract, "data").unwrap();

        typed.put("f", &json!(false)).unwrap();
        typed.put("n", &Value::Null).unwrap();
        typed.put("z", &json!(0)).unwrap();
        assert_eq!(typed.get("f").unwrap(), Some(json!(false)));
        assert_eq!(typed.get("n").unwrap(), Some(Value::Null));
        assert_eq!(typed.get("z").unwrap(), Some(json!(0)));
    }
}
