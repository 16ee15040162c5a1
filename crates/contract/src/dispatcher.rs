//! The calling convention dispatcher.
//!
//! One dispatcher exists per transaction. It owns the transaction's
//! storage overlay and the partition locks, threads the call context
//! through every invocation, and services the sandbox bridge: storage
//! requests are mapped into the executing contract's partition, events go
//! to the event log, and cross-contract calls recurse here with the
//! caller's remaining budget.
//!
//! Call modes: a **deploy** child call keeps its writes in the shared
//! overlay (they commit with the transaction); a **rollback** child call
//! snapshots the overlay first and restores it on return, success or
//! failure, so speculative execution can never leak writes. Errors from
//! deploy calls propagate and abort the whole transaction.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use tracing::debug;
use veris_common::{Address, Error, ResourceKind, Result};
use veris_storage::{KeyValue, TransactionalKv};
use veris_vm::{
    BudgetView, CallContext, CompiledContract, HostHandler, HostRequest, Sandbox, SandboxLimits,
};

use crate::engine::{read_record, ContractEngine};
use crate::event::EventLog;
use crate::metering::{RentTable, MINIMAL_RESOURCES};

/// Exclusive locks over storage partitions, keyed by contract address.
///
/// A transaction touching several contracts (a transfer crossing
/// contracts, a connector call chain) holds the union of the touched
/// partitions for its whole lifetime, so concurrent transactions over
/// disjoint address sets run in parallel without lost updates.
pub(crate) struct LockTable {
    held: Mutex<HashSet<Address>>,
    released: Condvar,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        LockTable {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Block until the partition is free, up to `timeout`.
    pub(crate) fn acquire(&self, address: &Address, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while held.contains(address) {
            if self.released.wait_until(&mut held, deadline).timed_out() {
                return Err(Error::resource(
                    ResourceKind::Time,
                    format!("lock contention on partition {address}"),
                ));
            }
        }
        held.insert(address.clone());
        Ok(())
    }

    pub(crate) fn release(&self, address: &Address) {
        let mut held = self.held.lock();
        held.remove(address);
        self.released.notify_all();
    }
}

/// Per-transaction dispatch state.
pub(crate) struct Dispatcher<'e> {
    engine: &'e ContractEngine,
    pub(crate) overlay: TransactionalKv,
    context: CallContext,
    depth: u32,
    held: Vec<Address>,
}

impl<'e> Dispatcher<'e> {
    pub(crate) fn new(
        engine: &'e ContractEngine,
        overlay: TransactionalKv,
        context: CallContext,
    ) -> Self {
        Dispatcher {
            engine,
            overlay,
            context,
            depth: 0,
            held: Vec::new(),
        }
    }

    /// Take the partition lock for `address` unless this transaction
    /// already holds it (re-entry through a call chain is fine; the lock
    /// is per transaction, not per invocation).
    pub(crate) fn lock(&mut self, address: &Address) -> Result<()> {
        if self.held.contains(address) {
            return Ok(());
        }
        let timeout = Duration::from_millis(self.engine.config().lock_timeout_ms);
        self.engine.locks().acquire(address, timeout)?;
        self.held.push(address.clone());
        Ok(())
    }

    /// Run one invocation in a fresh sandbox under `limits`.
    pub(crate) fn run(
        &mut self,
        handle: &CompiledContract,
        limits: SandboxLimits,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let mut sandbox = Sandbox::new(limits);
        sandbox.execute(handle).map_err(|f| f.into_error())?;
        let path = format!("contract.{method}");
        let ctx = self.context.clone();
        sandbox
            .invoke(handle, &path, args, &ctx, self)
            .map_err(|f| f.into_error())
    }

    /// Dispatch a cross-contract call issued from inside a method.
    fn dispatch_child(
        &mut self,
        address: Address,
        method: String,
        args: Vec<Value>,
        budget: BudgetView,
        rollback: bool,
    ) -> Result<Value> {
        // lifecycle guard: a callee must never re-trigger another
        // contract's constructor
        if method == "init" || method == "deploy" {
            return Err(Error::Deployment(format!(
                "you can't call {method} method of another contract"
            )));
        }
        let max_depth = self.engine.config().max_call_depth;
        if self.depth + 1 > max_depth {
            return Err(Error::Validation(format!(
                "maximum call depth {max_depth} exceeded"
            )));
        }

        let record = read_record(&self.overlay, &address)?.ok_or_else(|| {
            Error::Deployment(format!("contract {address} is not deployed"))
        })?;
        let handle = self.engine.compiled_handle(&record)?;

        // the callee spends the caller's remaining time and memory; its
        // call allowance comes from its own rent
        let callee_budget = RentTable::open(&mut self.overlay)
            .check_contract_limits(&address)?
            .unwrap_or(MINIMAL_RESOURCES);
        let limits = SandboxLimits {
            ram_bytes: budget.remaining_ram,
            time_limit: budget.remaining_time,
            call_limit: callee_budget.call_limit,
        };

        self.lock(&address)?;
        let snapshot = rollback.then(|| self.overlay.pending_snapshot());
        let child_context = self.context.child(address.clone());
        let parent_context = std::mem::replace(&mut self.context, child_context);
        self.depth += 1;
        debug!(
            caller = %parent_context.contract_address,
            callee = %address,
            method = %method,
            depth = self.depth,
            rollback,
            "child call"
        );

        let result = self.run(&handle, limits, &method, args);

        self.depth -= 1;
        self.context = parent_context;
        if let Some(snapshot) = snapshot {
            // speculative mutations vanish on return, success or failure
            self.overlay.restore_pending(snapshot);
        }
        result
    }

    /// Release every lock this transaction acquired.
    fn release_all(&mut self) {
        for address in self.held.drain(..) {
            self.engine.locks().release(&address);
        }
    }
}

impl Drop for Dispatcher<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl HostHandler for Dispatcher<'_> {
    fn handle(&mut self, request: HostRequest, budget: BudgetView) -> Result<Value> {
        match request {
            HostRequest::StorageGet { store, key } => {
                let contract = self.context.contract_address.clone();
                let kv = KeyValue::new(&mut self.overlay, &contract, &store)?;
                Ok(kv.get(&key)?.map(Value::String).unwrap_or(Value::Null))
            }
            HostRequest::StoragePut { store, key, value } => {
                let contract = self.context.contract_address.clone();
                KeyValue::new(&mut self.overlay, &contract, &store)?.put(&key, &value)?;
                Ok(Value::Null)
            }
            HostRequest::StorageDel { store, key } => {
                let contract = self.context.contract_address.clone();
                KeyValue::new(&mut self.overlay, &contract, &store)?.del(&key)?;
                Ok(Value::Null)
            }
            HostRequest::EmitEvent { event, args } => {
                let contract = self.context.contract_address.clone();
                EventLog::append(&mut self.overlay, &contract, &event, &args)?;
                debug!(contract = %contract, event = %event, "event recorded");
                Ok(Value::Null)
            }
            HostRequest::CallDeploy {
                address,
                method,
                args,
            } => self.dispatch_child(address, method, args, budget, false),
            HostRequest::CallRollback {
                address,
                method,
                args,
            } => self.dispatch_child(address, method, args, budget, true),
            HostRequest::GetProperty { address, property } => {
                self.engine
                    .property_value(&self.overlay, &address, &property)
            }
            HostRequest::Log { message } => {
                debug!(contract = %self.context.contract_address, "{message}");
                Ok(Value::Null)
            }
        }
    }
}
