//! Storage abstraction layer for veris contracts.
//!
//! Contract code addresses persistent state as if it were in-memory
//! structures; this crate maps that view onto a namespaced key-value
//! store. The layers, bottom up:
//!
//! - [`KvBackend`]: the externally supplied persistent store
//!   (`get`/`put`/`del`). Persistence and sharding strategy are opaque to
//!   the core. [`MemoryKv`] is the reference implementation.
//! - [`TransactionalKv`]: a buffered overlay over a shared backend.
//!   Deploy calls commit it; rollback calls and failures discard it. This
//!   is where the platform's all-or-nothing write semantics live.
//! - [`NamespacedKv`]: key prefixing, composable with any [`KvAccess`].
//! - [`KeyValue`]: a string map scoped to one contract's
//!   `(address, store name)` partition. No cross-contract visibility.
//! - [`TypedKeyValue`]: structured values under canonical key-order
//!   independent encoding, so state hashes match across replicas.
//! - [`StoreMap`] / [`StoreArray`]: field- and index-addressable views
//!   with explicit accessor operations.
//!
//! # Partition layout
//!
//! One namespace per `(contractAddress, storeName)`, flattened as
//! `"<address>.<store>.<key>"`. Array stores keep their `length` entry
//! inside their own namespace.

mod array;
mod backend;
mod keyvalue;
mod map;
mod namespace;
mod transactional;
mod typed;

pub use array::StoreArray;
pub use backend::{KvBackend, MemoryKv};
pub use keyvalue::{KeyValue, KvAccess};
pub use map::StoreMap;
pub use namespace::NamespacedKv;
pub use transactional::TransactionalKv;
pub use typed::{canonical_json, TypedKeyValue};
