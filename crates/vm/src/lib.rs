//! Execution sandbox for veris contracts.
//!
//! Contract programs run isolated from the host process: each invocation
//! executes on its own worker thread with no ambient access to host
//! state, and everything crossing the boundary goes by value over a typed
//! call/response channel. The sandbox enforces the invocation's resource
//! budget:
//!
//! - a hard wall-clock time limit,
//! - a memory ceiling, accounted deterministically over every value that
//!   crosses the isolation boundary,
//! - a cross-contract call allowance.
//!
//! Breaching any of these terminates the isolate immediately; a failed
//! sandbox is poisoned and never resumed.
//!
//! # Programs
//!
//! Contract code implements [`ContractProgram`] and registers with a
//! [`ProgramRegistry`] keyed by code hash. Registration validates the
//! program's declared [`ProgramManifest`] against the required capability
//! set, replacing duck-typed contract classes with an explicit factory.
//! [`Sandbox::compile`] turns a registered hash into a reusable
//! [`CompiledContract`] handle; [`Sandbox::execute`] runs the top-level
//! registration once; [`Sandbox::invoke`] resolves a dotted member path
//! (`"contract.transfer"`) and calls it.
//!
//! # Determinism
//!
//! The only sources of nondeterminism a program can observe are the
//! transaction's [`CallContext`] and the seeded random stream exposed by
//! [`IsolateApi::rng_next`]; replaying a transaction therefore produces
//! the same sequence on every replica.

mod bridge;
mod context;
mod error;
mod program;
mod registry;
mod sandbox;

pub use bridge::{BridgeKv, HostRequest, IsolateApi};
pub use context::{CallContext, DeployState};
pub use error::ExecutionFailure;
pub use program::{Capability, ContractProgram, MethodDecl, ProgramManifest};
pub use registry::{code_hash, ProgramFactory, ProgramRegistry};
pub use sandbox::{BudgetView, CompiledContract, HostHandler, Sandbox, SandboxLimits};
