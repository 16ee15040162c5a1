//! Typed contract events.
//!
//! Contracts declare an event's positional argument types up front; every
//! emission is validated against the declaration and fails with a
//! validation error before anything leaves the contract. Accepted
//! records land in the emitting contract's event partition through the
//! invocation overlay, so they commit and roll back with the rest of the
//! transaction.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use veris_common::{Address, Amount, Error, Result};
use veris_storage::{KvAccess, StoreArray};
use veris_vm::IsolateApi;

/// Maximum positional arguments an event may declare.
const MAX_EVENT_ARGS: usize = 10;

/// Declared type of one event argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl EventType {
    /// Parse a declared type name. `"bool"` is accepted as an alias.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "string" => Ok(EventType::String),
            "number" => Ok(EventType::Number),
            "boolean" | "bool" => Ok(EventType::Boolean),
            "object" => Ok(EventType::Object),
            "array" => Ok(EventType::Array),
            other => Err(Error::Validation(format!(
                "unsupported event argument type {other:?}"
            ))),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            EventType::String => value.is_string(),
            // amounts travel as decimal strings, so Number accepts those
            EventType::Number => match value {
                Value::Number(_) => true,
                Value::String(s) => Amount::parse(s).is_ok(),
                _ => false,
            },
            EventType::Boolean => value.is_boolean(),
            EventType::Object => value.is_object(),
            EventType::Array => value.is_array(),
        }
    }
}

/// A pre-declared event signature.
pub struct EventSignature {
    name: String,
    types: Vec<EventType>,
}

impl EventSignature {
    /// Declare an event with up to [`MAX_EVENT_ARGS`] positional types.
    pub fn new(name: &str, types: &[EventType]) -> Result<Self> {
        if types.len() > MAX_EVENT_ARGS {
            return Err(Error::Validation(format!(
                "event can take only {MAX_EVENT_ARGS} arguments"
            )));
        }
        if name.is_empty() {
            return Err(Error::Validation("event name cannot be empty".into()));
        }
        Ok(EventSignature {
            name: name.to_string(),
            types: types.to_vec(),
        })
    }

    /// Declare an event from type names (`"string"`, `"number"`, ...).
    pub fn declare(name: &str, type_names: &[&str]) -> Result<Self> {
        let types = type_names
            .iter()
            .map(|n| EventType::from_name(n))
            .collect::<Result<Vec<_>>>()?;
        EventSignature::new(name, &types)
    }

    /// The declared event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate arguments against the declared signature.
    pub fn check(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.types.len() {
            return Err(Error::Validation(format!(
                "event {:?} takes {} arguments, got {}",
                self.name,
                self.types.len(),
                args.len()
            )));
        }
        for (position, (ty, value)) in self.types.iter().zip(args).enumerate() {
            if !ty.matches(value) {
                return Err(Error::Validation(format!(
                    "invalid argument type for argument no {position} of event {:?}: \
                     {ty:?} expected",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Validate and emit. Validation failures surface before any
    /// external emission occurs.
    pub fn emit(&self, api: &IsolateApi, args: Vec<Value>) -> Result<()> {
        self.check(&args)?;
        api.emit_event(&self.name, args)
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The declared event name.
    pub event: String,
    /// The validated arguments.
    pub args: Vec<Value>,
}

/// Host-side persistence of accepted events.
///
/// Each contract gets its own `sys.events.<address>` partition holding an
/// append-only array of records.
pub struct EventLog;

impl EventLog {
    fn partition(contract: &Address) -> String {
        format!("sys.events.{contract}")
    }

    /// Append an accepted event to `contract`'s log.
    pub fn append(
        kv: &mut dyn KvAccess,
        contract: &Address,
        event: &str,
        args: &[Value],
    ) -> Result<()> {
        let mut log = StoreArray::open_partition(kv, &Self::partition(contract));
        log.push(&json!({ "event": event, "args": args }))?;
        Ok(())
    }

    /// All records `contract` has emitted, oldest first.
    pub fn read(kv: &dyn KvAccess, contract: &Address) -> Result<Vec<EventRecord>> {
        // the array view only reads here, but its API is uniform
        let mut scratch = ReadOnly(kv);
        let log = StoreArray::open_partition(&mut scratch, &Self::partition(contract));
        let mut records = Vec::new();
        for item in log.to_vec()? {
            let record: EventRecord = serde_json::from_value(item)
                .map_err(|e| Error::Storage(format!("corrupt event record: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Records of one named event, oldest first.
    pub fn read_named(
        kv: &dyn KvAccess,
        contract: &Address,
        event: &str,
    ) -> Result<Vec<EventRecord>> {
        Ok(Self::read(kv, contract)?
            .into_iter()
            .filter(|r| r.event == event)
            .collect())
    }
}

/// Adapter giving read-only access the [`KvAccess`] shape.
struct ReadOnly<'a>(&'a dyn KvAccess);

impl KvAccess for ReadOnly<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.get(key)
    }

    fn put(&mut self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::Storage("event log queries are read-only".into()))
    }

    fn del(&mut self, _key: &str) -> Result<()> {
        Err(Error::Storage("event log queries are read-only".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use veris_storage::{MemoryKv, TransactionalKv};

    fn transfer_signature() -> EventSignature {
        EventSignature::declare("Transfer", &["string", "string", "number"]).unwrap()
    }

    #[test]
    fn test_declaration_limits() {
        assert!(EventSignature::declare("E", &["string"; 10]).is_ok());
        assert!(EventSignature::declare("E", &["string"; 11]).is_err());
        assert!(EventSignature::declare("E", &["float"]).is_err());
        assert!(EventSignature::declare("", &[]).is_err());
    }

    #[test]
    fn test_check_accepts_valid_args() {
        let sig = transfer_signature();
        assert!(sig.check(&[json!("alice"), json!("bob"), json!(5)]).is_ok());
        // amounts as decimal strings count as numbers
        assert!(sig.check(&[json!("alice"), json!("bob"), json!("5.25")]).is_ok());
    }

    #[test]
    fn test_check_rejects_type_mismatch() {
        let sig = transfer_signature();
        let err = sig
            .check(&[json!("alice"), json!(42), json!(5)])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_check_rejects_arity_mismatch() {
        let sig = transfer_signature();
        assert!(sig.check(&[json!("alice")]).is_err());
        assert!(sig
            .check(&[json!("a"), json!("b"), json!(1), json!(2)])
            .is_err());
    }

    #[test]
    fn test_log_round_trip() {
        let mut tx = TransactionalKv::new(Arc::new(MemoryKv::new()));
        let contract = Address::new("c1").unwrap();

        EventLog::append(&mut tx, &contract, "Transfer", &[json!("a"), json!("b")]).unwrap();
        EventLog::append(&mut tx, &contract, "Mint", &[json!("a")]).unwrap();

        let all = EventLog::read(&tx, &contract).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event, "Transfer");

        let mints = EventLog::read_named(&tx, &contract, "Mint").unwrap();
        assert_eq!(mints.len(), 1);
        assert_eq!(mints[0].args, vec![json!("a")]);
    }
}
