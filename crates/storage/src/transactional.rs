//! Buffered transactional overlay over a shared backend.
//!
//! Every invocation writes through a [`TransactionalKv`]. Reads consult
//! the buffer first (a buffered delete masks the backing value), writes
//! and deletes only touch the buffer, and nothing reaches the backend
//! until [`TransactionalKv::commit`]. Rollback calls never commit, so
//! their storage effects vanish on return regardless of outcome; deploy
//! calls commit exactly once, at the end of a fully successful
//! transaction. That single choke point is what makes ledger operations
//! all-or-nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use veris_common::Result;

use crate::keyvalue::KvAccess;
use crate::KvBackend;

/// A pending write set over a shared [`KvBackend`].
pub struct TransactionalKv {
    backend: Arc<dyn KvBackend>,
    /// Buffered operations; `None` marks a pending delete.
    pending: BTreeMap<String, Option<String>>,
}

impl TransactionalKv {
    /// Open an overlay over `backend` with an empty write set.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        TransactionalKv {
            backend,
            pending: BTreeMap::new(),
        }
    }

    /// Number of buffered operations.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when at least one write or delete is buffered.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Flush the buffered operations to the backend and clear the buffer.
    ///
    /// Writes land in sorted key order, so the backend sees the same
    /// sequence on every replica.
    pub fn commit(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (key, op) in pending {
            match op {
                Some(value) => self.backend.put(&key, &value),
                None => self.backend.del(&key),
            }
        }
        if count > 0 {
            debug!(writes = count, "committed transaction overlay");
        }
    }

    /// Copy the current write set, for nested speculative execution.
    ///
    /// A child rollback call snapshots the buffer before running and
    /// restores it afterwards, so the child's mutations vanish while the
    /// parent's survive.
    pub fn pending_snapshot(&self) -> BTreeMap<String, Option<String>> {
        self.pending.clone()
    }

    /// Replace the write set with a previously taken snapshot.
    pub fn restore_pending(&mut self, snapshot: BTreeMap<String, Option<String>>) {
        self.pending = snapshot;
    }

    /// Discard every buffered operation.
    pub fn rollback(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!(writes = dropped, "rolled back transaction overlay");
        }
    }
}

impl KvAccess for TransactionalKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(op) = self.pending.get(key) {
            return Ok(op.clone());
        }
        Ok(self.backend.get(key))
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.pending.insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<()> {
        self.pending.insert(key.to_string(), None);
        Ok(())
    }
}
