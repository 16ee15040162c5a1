//! The sandbox proper: worker-thread isolation, budget enforcement, and
//! the host-side service loop.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};
use veris_common::{Error, ResourceKind, Result};

use crate::bridge::{HostRequest, IsolateApi, IsolateMessage, RamMeter};
use crate::context::CallContext;
use crate::error::ExecutionFailure;
use crate::program::{ContractProgram, ProgramManifest};
use crate::registry::ProgramRegistry;

/// The resource budget one sandbox enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Memory ceiling in bytes, accounted over boundary traffic.
    pub ram_bytes: u64,
    /// Hard wall-clock limit for the whole invocation.
    pub time_limit: Duration,
    /// Cross-contract calls the invocation may issue.
    pub call_limit: u32,
}

impl SandboxLimits {
    /// Build limits from budget figures (ram in megabytes, time in
    /// milliseconds), the unit convention of the resource meter.
    pub fn new(ram_mb: u64, time_limit_ms: u64, call_limit: u32) -> Self {
        SandboxLimits {
            ram_bytes: ram_mb * 1024 * 1024,
            time_limit: Duration::from_millis(time_limit_ms),
            call_limit,
        }
    }
}

/// A reusable executable handle produced by the compile step.
///
/// Handles are cheap to clone and are cached per contract address by the
/// engine, mirroring how compiled isolates are reused between
/// invocations.
#[derive(Clone)]
pub struct CompiledContract {
    pub(crate) program: Arc<dyn ContractProgram>,
    /// The validated manifest the handle was compiled against.
    pub manifest: ProgramManifest,
}

impl std::fmt::Debug for CompiledContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledContract")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

/// Remaining budget the host hands to request handlers, so child calls
/// consume the caller's allowance rather than a fresh one.
#[derive(Debug, Clone, Copy)]
pub struct BudgetView {
    /// Wall-clock budget left for this invocation.
    pub remaining_time: Duration,
    /// Memory budget left, in bytes.
    pub remaining_ram: u64,
}

/// Host-side servicing of bridge requests.
///
/// Implemented by the dispatcher; the sandbox stays agnostic about what
/// storage, events, or cross-contract calls mean.
pub trait HostHandler {
    /// Service one request within the given remaining budget.
    fn handle(&mut self, request: HostRequest, budget: BudgetView) -> Result<Value>;
}

/// An isolated, budgeted execution environment for one invocation.
///
/// A sandbox is single-use in the failure direction: any
/// [`ExecutionFailure`] poisons it, and a poisoned sandbox refuses all
/// further work. Fresh invocations get fresh sandboxes.
pub struct Sandbox {
    limits: SandboxLimits,
    ready: bool,
    poisoned: bool,
}

impl Sandbox {
    /// Create a sandbox enforcing `limits`.
    pub fn new(limits: SandboxLimits) -> Self {
        Sandbox {
            limits,
            ready: false,
            poisoned: false,
        }
    }

    /// The budget this sandbox enforces.
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// True once a failure has terminated this sandbox.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Produce a reusable executable handle for a registered code hash.
    pub fn compile(
        &mut self,
        registry: &ProgramRegistry,
        hash: &str,
    ) -> std::result::Result<CompiledContract, ExecutionFailure> {
        let Some(factory) = registry.lookup(hash) else {
            self.poisoned = true;
            return Err(ExecutionFailure::Compile(format!(
                "unknown code hash {hash}"
            )));
        };
        let program: Arc<dyn ContractProgram> = Arc::from(factory.instantiate());
        let manifest = program.manifest();
        if let Err(error) = manifest.validate() {
            self.poisoned = true;
            return Err(ExecutionFailure::Compile(error.to_string()));
        }
        Ok(CompiledContract { program, manifest })
    }

    /// Run the handle's top-level registration once.
    ///
    /// Until this has succeeded the sandbox refuses to invoke methods,
    /// the same way an isolate refuses calls before its script ran.
    pub fn execute(&mut self, handle: &CompiledContract) -> std::result::Result<(), ExecutionFailure> {
        if self.poisoned {
            return Err(ExecutionFailure::Runtime(Error::Validation(
                "sandbox is poisoned".into(),
            )));
        }
        if let Err(error) = handle.manifest.validate() {
            self.poisoned = true;
            return Err(ExecutionFailure::Compile(error.to_string()));
        }
        self.ready = true;
        Ok(())
    }

    /// Resolve a dotted member path inside the isolate and call it.
    ///
    /// `args` and the returned value cross the boundary by value-copy.
    /// On failure the sandbox is poisoned and the error says whether the
    /// cause was resource exhaustion or the program itself.
    pub fn invoke(
        &mut self,
        handle: &CompiledContract,
        path: &str,
        args: Vec<Value>,
        context: &CallContext,
        host: &mut dyn HostHandler,
    ) -> std::result::Result<Value, ExecutionFailure> {
        if self.poisoned {
            return Err(ExecutionFailure::Runtime(Error::Validation(
                "sandbox is poisoned".into(),
            )));
        }
        if !self.ready {
            return Err(ExecutionFailure::Runtime(Error::Validation(
                "no contract executed in this sandbox".into(),
            )));
        }
        let method = resolve_member_path(&handle.manifest, path)
            .map_err(ExecutionFailure::Runtime)?
            .to_string();

        let meter = Arc::new(RamMeter::new(self.limits.ram_bytes));
        let args_size: u64 = args.iter().map(|v| v.to_string().len() as u64).sum();
        if meter.charge(args_size).is_err() {
            self.poisoned = true;
            return Err(ExecutionFailure::RamExceeded {
                used: meter.used(),
                limit: meter.limit(),
            });
        }

        let kill = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let api = IsolateApi::new(tx, meter.clone(), kill.clone(), context.clone());
        let program = handle.program.clone();
        let worker = thread::Builder::new()
            .name(format!("veris-isolate-{}", context.contract_address))
            .spawn(move || {
                let outcome =
                    std::panic::catch_unwind(AssertUnwindSafe(|| {
                        program.call(&method, &args, &api)
                    }))
                    .unwrap_or_else(|_| {
                        Err(Error::Validation("contract program panicked".into()))
                    });
                let _ = api.tx.send(IsolateMessage::Done(outcome));
            })
            .map_err(|e| ExecutionFailure::Runtime(Error::Validation(format!(
                "failed to start isolate thread: {e}"
            ))))?;

        let deadline = Instant::now() + self.limits.time_limit;
        let limit_ms = self.limits.time_limit.as_millis() as u64;
        let mut calls_used: u32 = 0;
        let mut worker_finished = false;

        let outcome = loop {
            let now = Instant::now();
            if now >= deadline {
                break Err(ExecutionFailure::TimeExceeded { limit_ms });
            }
            match rx.recv_timeout(deadline - now) {
                Ok(IsolateMessage::Request { request, reply }) => {
                    if matches!(
                        request,
                        HostRequest::CallDeploy { .. } | HostRequest::CallRollback { .. }
                    ) {
                        calls_used += 1;
                        if calls_used > self.limits.call_limit {
                            let error = Error::resource(
                                ResourceKind::Calls,
                                format!("call limit {} exceeded", self.limits.call_limit),
                            );
                            let _ = reply.send(Err(error.clone()));
                            break Err(ExecutionFailure::Runtime(error));
                        }
                    }
                    let budget = BudgetView {
                        remaining_time: deadline.saturating_duration_since(Instant::now()),
                        remaining_ram: meter.remaining(),
                    };
                    let mut result = host.handle(request, budget);
                    if let Ok(value) = &result {
                        // the reply crosses the boundary too
                        if let Err(error) = meter.charge(value.to_string().len() as u64) {
                            result = Err(error);
                        }
                    }
                    let fatal_ram = matches!(
                        &result,
                        Err(Error::ResourceExceeded {
                            kind: ResourceKind::Ram,
                            ..
                        })
                    );
                    let _ = reply.send(result);
                    if fatal_ram {
                        break Err(ExecutionFailure::RamExceeded {
                            used: meter.used(),
                            limit: meter.limit(),
                        });
                    }
                }
                Ok(IsolateMessage::Done(result)) => {
                    worker_finished = true;
                    break match result {
                        Ok(value) => match meter.charge(value.to_string().len() as u64) {
                            Ok(()) => Ok(value),
                            Err(_) => Err(ExecutionFailure::RamExceeded {
                                used: meter.used(),
                                limit: meter.limit(),
                            }),
                        },
                        Err(Error::ResourceExceeded {
                            kind: ResourceKind::Ram,
                            ..
                        }) => Err(ExecutionFailure::RamExceeded {
                            used: meter.used(),
                            limit: meter.limit(),
                        }),
                        Err(error) => Err(ExecutionFailure::Runtime(error)),
                    };
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    break Err(ExecutionFailure::TimeExceeded { limit_ms });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    worker_finished = true;
                    break Err(ExecutionFailure::Runtime(Error::Validation(
                        "isolate disconnected".into(),
                    )));
                }
            }
        };

        match outcome {
            Ok(value) => {
                let _ = worker.join();
                debug!(
                    contract = %context.contract_address,
                    ram_used = meter.used(),
                    "invocation finished"
                );
                Ok(value)
            }
            Err(failure) => {
                // terminate the isolate: flag it dead and leave the worker
                // to observe the flag at its next bridge call. A wedged
                // program cannot be preempted, so the thread is detached
                // rather than joined.
                kill.store(true, Ordering::SeqCst);
                self.poisoned = true;
                if worker_finished {
                    let _ = worker.join();
                }
                warn!(
                    contract = %context.contract_address,
                    error = %failure,
                    "invocation terminated"
                );
                Err(failure)
            }
        }
    }
}

/// Resolve `"contract.<method>"` against the manifest.
fn resolve_member_path<'m>(manifest: &'m ProgramManifest, path: &str) -> Result<&'m str> {
    let Some((root, member)) = path.split_once('.') else {
        return Err(Error::Validation(format!("invalid member path {path:?}")));
    };
    if root != "contract" {
        return Err(Error::Validation(format!(
            "unknown root object {root:?} in member path"
        )));
    }
    match manifest.method(member) {
        Some(decl) => Ok(decl.name.as_str()),
        None => Err(Error::Validation(format!("method {member:?} not found"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Capability, MethodDecl};
    use crate::registry::{code_hash, ProgramFactory};
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use veris_common::Address;
    use veris_storage::KvAccess;

    /// Test program exercising every sandbox path.
    struct Fixture;

    impl ContractProgram for Fixture {
        fn manifest(&self) -> ProgramManifest {
            ProgramManifest {
                name: "fixture".into(),
                methods: vec![
                    MethodDecl::mutating("init"),
                    MethodDecl::readonly("echo"),
                    MethodDecl::readonly("sleepy"),
                    MethodDecl::mutating("hog"),
                    MethodDecl::mutating("store_roundtrip"),
                    MethodDecl::readonly("chatty"),
                    MethodDecl::readonly("fail"),
                    MethodDecl::readonly("panicky"),
                ],
                capabilities: vec![
                    Capability::Init,
                    Capability::Deploy,
                    Capability::MetadataAccessor,
                ],
                properties: Map::new(),
            }
        }

        fn call(&self, method: &str, args: &[Value], api: &IsolateApi) -> Result<Value> {
            match method {
                "init" => Ok(Value::Null),
                "echo" => Ok(args.first().cloned().unwrap_or(Value::Null)),
                "sleepy" => {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(Value::Null)
                }
                "hog" => {
                    let mut kv = api.store("blob");
                    let big = "x".repeat(64 * 1024);
                    for i in 0..1024 {
                        kv.put(&i.to_string(), &big)?;
                    }
                    Ok(Value::Null)
                }
                "store_roundtrip" => {
                    let mut kv = api.store("data");
                    kv.put("k", "v")?;
                    let read = kv.get("k")?;
                    Ok(json!(read))
                }
                "chatty" => {
                    let target = Address::new("peer").unwrap();
                    api.call_method_rollback(&target, "ping", vec![])?;
                    api.call_method_rollback(&target, "ping", vec![])?;
                    Ok(Value::Null)
                }
                "fail" => Err(Error::InsufficientFunds("wallets:alice".into())),
                "panicky" => panic!("boom"),
                _ => Err(Error::Validation(format!("method {method:?} not found"))),
            }
        }
    }

    /// Host handler backed by a plain map.
    #[derive(Default)]
    struct MapHost {
        entries: HashMap<String, String>,
        calls: u32,
    }

    impl HostHandler for MapHost {
        fn handle(&mut self, request: HostRequest, _budget: BudgetView) -> Result<Value> {
            match request {
                HostRequest::StorageGet { store, key } => Ok(self
                    .entries
                    .get(&format!("{store}.{key}"))
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null)),
                HostRequest::StoragePut { store, key, value } => {
                    self.entries.insert(format!("{store}.{key}"), value);
                    Ok(Value::Null)
                }
                HostRequest::StorageDel { store, key } => {
                    self.entries.remove(&format!("{store}.{key}"));
                    Ok(Value::Null)
                }
                HostRequest::CallRollback { .. } | HostRequest::CallDeploy { .. } => {
                    self.calls += 1;
                    Ok(json!("pong"))
                }
                _ => Ok(Value::Null),
            }
        }
    }

    fn fixture_factory() -> Arc<dyn ProgramFactory> {
        Arc::new(|| Box::new(Fixture) as Box<dyn ContractProgram>)
    }

    fn compiled(sandbox: &mut Sandbox) -> CompiledContract {
        let registry = ProgramRegistry::new();
        let hash = code_hash(b"fixture");
        registry.register(&hash, fixture_factory()).unwrap();
        let handle = sandbox.compile(&registry, &hash).unwrap();
        sandbox.execute(&handle).unwrap();
        handle
    }

    fn ctx() -> CallContext {
        CallContext::root(
            Address::new("alice").unwrap(),
            Address::new("fixture-contract").unwrap(),
            7,
        )
    }

    fn generous() -> SandboxLimits {
        SandboxLimits::new(8, 2_000, 10)
    }

    #[test]
    fn test_invoke_marshals_by_value() {
        let mut sandbox = Sandbox::new(generous());
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let result = sandbox
            .invoke(&handle, "contract.echo", vec![json!({"a": 1})], &ctx(), &mut host)
            .unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let mut sandbox = Sandbox::new(generous());
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let err = sandbox
            .invoke(&handle, "contract.nope", vec![], &ctx(), &mut host)
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Runtime(Error::Validation(_))));
    }

    #[test]
    fn test_bad_member_path_rejected() {
        let mut sandbox = Sandbox::new(generous());
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        for path in ["echo", "global.echo", "contract."] {
            let err = sandbox
                .invoke(&handle, path, vec![], &ctx(), &mut host)
                .unwrap_err();
            assert!(matches!(err, ExecutionFailure::Runtime(Error::Validation(_))));
        }
    }

    #[test]
    fn test_storage_round_trips_through_bridge() {
        let mut sandbox = Sandbox::new(generous());
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let result = sandbox
            .invoke(&handle, "contract.store_roundtrip", vec![], &ctx(), &mut host)
            .unwrap();
        assert_eq!(result, json!("v"));
        assert_eq!(host.entries.get("data.k"), Some(&"v".to_string()));
    }

    #[test]
    fn test_time_limit_kills_invocation() {
        let mut sandbox = Sandbox::new(SandboxLimits::new(8, 50, 10));
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let err = sandbox
            .invoke(&handle, "contract.sleepy", vec![], &ctx(), &mut host)
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::TimeExceeded { .. }));
        assert!(sandbox.is_poisoned());
    }

    #[test]
    fn test_ram_limit_kills_invocation() {
        // 1 MB ceiling against a program writing ~64 MB
        let mut sandbox = Sandbox::new(SandboxLimits::new(1, 5_000, 10));
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let err = sandbox
            .invoke(&handle, "contract.hog", vec![], &ctx(), &mut host)
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::RamExceeded { .. }));
        assert!(sandbox.is_poisoned());
    }

    #[test]
    fn test_call_limit_enforced() {
        let mut sandbox = Sandbox::new(SandboxLimits::new(8, 2_000, 1));
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let err = sandbox
            .invoke(&handle, "contract.chatty", vec![], &ctx(), &mut host)
            .unwrap_err();
        match err {
            ExecutionFailure::Runtime(Error::ResourceExceeded { kind, .. }) => {
                assert_eq!(kind, ResourceKind::Calls)
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        // only the first call reached the host
        assert_eq!(host.calls, 1);
    }

    #[test]
    fn test_program_errors_keep_their_taxonomy() {
        let mut sandbox = Sandbox::new(generous());
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let err = sandbox
            .invoke(&handle, "contract.fail", vec![], &ctx(), &mut host)
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionFailure::Runtime(Error::InsufficientFunds(_))
        ));
    }

    #[test]
    fn test_panic_is_contained() {
        let mut sandbox = Sandbox::new(generous());
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        let err = sandbox
            .invoke(&handle, "contract.panicky", vec![], &ctx(), &mut host)
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Runtime(Error::Validation(_))));
    }

    #[test]
    fn test_poisoned_sandbox_refuses_further_work() {
        let mut sandbox = Sandbox::new(SandboxLimits::new(8, 50, 10));
        let handle = compiled(&mut sandbox);
        let mut host = MapHost::default();
        sandbox
            .invoke(&handle, "contract.sleepy", vec![], &ctx(), &mut host)
            .unwrap_err();
        let err = sandbox
            .invoke(&handle, "contract.echo", vec![json!(1)], &ctx(), &mut host)
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Runtime(Error::Validation(_))));
    }

    #[test]
    fn test_compile_unknown_hash_fails() {
        let registry = ProgramRegistry::new();
        let mut sandbox = Sandbox::new(generous());
        let err = sandbox.compile(&registry, "deadbeef").unwrap_err();
        assert!(matches!(err, ExecutionFailure::Compile(_)));
    }
}
