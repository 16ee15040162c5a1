//! The call bridge between isolate and host.
//!
//! Nothing is shared across the isolation boundary. A program that wants
//! to touch storage, move tokens, emit an event, or call another contract
//! sends a [`HostRequest`] over the invocation's channel and blocks for
//! the host's reply; both request and reply travel by value. The host
//! services requests from its side of the channel while it enforces the
//! wall-clock budget (see [`crate::Sandbox`]).
//!
//! Every value crossing the boundary is charged against the invocation's
//! memory budget. Accounting boundary traffic instead of process RSS
//! keeps the ceiling deterministic: every replica charges exactly the
//! same bytes for the same transaction.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use serde_json::Value;
use veris_common::{Address, DeterministicRng, Error, ResourceKind, Result};
use veris_storage::KvAccess;

use crate::context::CallContext;

/// A request a sandboxed program sends to the host.
///
/// Storage requests name only the logical store; the host resolves them
/// into the executing contract's partition, so a program cannot address
/// another contract's state no matter what it sends.
#[derive(Debug, Clone)]
pub enum HostRequest {
    /// Read `key` from the named store.
    StorageGet { store: String, key: String },
    /// Overwrite `key` in the named store.
    StoragePut {
        store: String,
        key: String,
        value: String,
    },
    /// Delete `key` from the named store.
    StorageDel { store: String, key: String },
    /// Record a validated event.
    EmitEvent { event: String, args: Vec<Value> },
    /// Cross-contract deploy (state-committing) call.
    CallDeploy {
        address: Address,
        method: String,
        args: Vec<Value>,
    },
    /// Cross-contract rollback (speculative) call.
    CallRollback {
        address: Address,
        method: String,
        args: Vec<Value>,
    },
    /// Read declared contract metadata without invoking a method.
    GetProperty { address: Address, property: String },
    /// Forward a log line to the host's logger.
    Log { message: String },
}

impl HostRequest {
    /// Approximate marshaled size, charged against the memory budget.
    pub(crate) fn approximate_size(&self) -> u64 {
        fn values(args: &[Value]) -> u64 {
            args.iter().map(|v| v.to_string().len() as u64).sum()
        }
        let payload = match self {
            HostRequest::StorageGet { store, key } => store.len() + key.len(),
            HostRequest::StoragePut { store, key, value } => store.len() + key.len() + value.len(),
            HostRequest::StorageDel { store, key } => store.len() + key.len(),
            HostRequest::EmitEvent { event, args } => {
                return event.len() as u64 + values(args) + 16
            }
            HostRequest::CallDeploy {
                address,
                method,
                args,
            }
            | HostRequest::CallRollback {
                address,
                method,
                args,
            } => return (address.as_str().len() + method.len()) as u64 + values(args) + 16,
            HostRequest::GetProperty { address, property } => {
                address.as_str().len() + property.len()
            }
            HostRequest::Log { message } => message.len(),
        };
        payload as u64 + 16
    }
}

/// A bridge message: a request paired with its reply channel, or the
/// worker's final result.
pub(crate) enum IsolateMessage {
    Request {
        request: HostRequest,
        reply: mpsc::Sender<Result<Value>>,
    },
    Done(Result<Value>),
}

/// Deterministic byte accounting shared by both sides of the bridge.
pub(crate) struct RamMeter {
    used: AtomicU64,
    limit: u64,
}

impl RamMeter {
    pub(crate) fn new(limit: u64) -> Self {
        RamMeter {
            used: AtomicU64::new(0),
            limit,
        }
    }

    /// Charge `bytes`; fails once the ceiling is crossed.
    pub(crate) fn charge(&self, bytes: u64) -> Result<()> {
        let used = self.used.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if used > self.limit {
            return Err(Error::resource(
                ResourceKind::Ram,
                format!("used {used} of {} bytes", self.limit),
            ));
        }
        Ok(())
    }

    pub(crate) fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub(crate) fn limit(&self) -> u64 {
        self.limit
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }
}

/// The narrow host interface a program sees inside the isolate.
///
/// All methods marshal by value through the bridge channel. The API also
/// carries the invocation's [`CallContext`] copy and the deterministic
/// random stream.
pub struct IsolateApi {
    pub(crate) tx: mpsc::Sender<IsolateMessage>,
    pub(crate) meter: Arc<RamMeter>,
    pub(crate) kill: Arc<AtomicBool>,
    pub(crate) context: CallContext,
    rng: RefCell<DeterministicRng>,
}

impl IsolateApi {
    pub(crate) fn new(
        tx: mpsc::Sender<IsolateMessage>,
        meter: Arc<RamMeter>,
        kill: Arc<AtomicBool>,
        context: CallContext,
    ) -> Self {
        let rng = RefCell::new(DeterministicRng::new(context.random_seed));
        IsolateApi {
            tx,
            meter,
            kill,
            context,
            rng,
        }
    }

    /// The invocation's call context (copied into the isolate).
    pub fn state(&self) -> &CallContext {
        &self.context
    }

    /// Send one request and wait for the host's reply.
    pub fn request(&self, request: HostRequest) -> Result<Value> {
        if self.kill.load(Ordering::SeqCst) {
            // the host already gave up on this isolate
            return Err(Error::resource(ResourceKind::Time, "isolate terminated"));
        }
        self.meter.charge(request.approximate_size())?;
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(IsolateMessage::Request {
                request,
                reply: reply_tx,
            })
            .map_err(|_| Error::resource(ResourceKind::Time, "host channel closed"))?;
        reply_rx
            .recv()
            .map_err(|_| Error::resource(ResourceKind::Time, "host channel closed"))?
    }

    /// Key-value access to one of this contract's stores.
    pub fn store<'a>(&'a self, name: &str) -> BridgeKv<'a> {
        BridgeKv {
            api: self,
            store: name.to_string(),
        }
    }

    /// Record a pre-validated event.
    pub fn emit_event(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.request(HostRequest::EmitEvent {
            event: event.to_string(),
            args,
        })?;
        Ok(())
    }

    /// Issue a state-committing child call.
    pub fn call_method_deploy(
        &self,
        address: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.request(HostRequest::CallDeploy {
            address: address.clone(),
            method: method.to_string(),
            args,
        })
    }

    /// Issue a speculative child call; its writes are discarded.
    pub fn call_method_rollback(
        &self,
        address: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.request(HostRequest::CallRollback {
            address: address.clone(),
            method: method.to_string(),
            args,
        })
    }

    /// Read another contract's declared metadata.
    pub fn get_contract_property(&self, address: &Address, property: &str) -> Result<Value> {
        self.request(HostRequest::GetProperty {
            address: address.clone(),
            property: property.to_string(),
        })
    }

    /// Next value from the transaction's deterministic random stream.
    pub fn rng_next(&self) -> u64 {
        self.rng.borrow_mut().next_u64()
    }

    /// Deterministic fraction in `[0, 1)`.
    pub fn rng_fraction(&self) -> f64 {
        self.rng.borrow_mut().next_fraction()
    }

    /// Log through the host.
    pub fn log(&self, message: &str) {
        // logging is best-effort; a dead channel already fails elsewhere
        let _ = self.request(HostRequest::Log {
            message: message.to_string(),
        });
    }
}

/// [`KvAccess`] over the bridge, scoped to one named store.
///
/// This is what makes the storage structures ([`veris_storage::StoreMap`],
/// [`veris_storage::StoreArray`], the token register) usable unchanged
/// inside the isolate.
pub struct BridgeKv<'a> {
    api: &'a IsolateApi,
    store: String,
}

impl KvAccess for BridgeKv<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let response = self.api.request(HostRequest::StorageGet {
            store: self.store.clone(),
            key: key.to_string(),
        })?;
        match response {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(Error::Storage(format!(
                "unexpected storage response: {other}"
            ))),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.api.request(HostRequest::StoragePut {
            store: self.store.clone(),
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<()> {
        self.api.request(HostRequest::StorageDel {
            store: self.store.clone(),
            key: key.to_string(),
        })?;
        Ok(())
    }
}
