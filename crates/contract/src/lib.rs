//! Contract base protocol, calling convention and engine for veris.
//!
//! This crate assembles the platform's execution core on top of the
//! sandbox, storage and ledger layers:
//!
//! - [`ContractEngine`]: the exposed surface. Installs contract programs,
//!   processes deployment and call transactions, and answers metadata and
//!   event queries.
//! - The dispatcher (internal): resolves call mode (deploy vs rollback),
//!   tracks call depth and child flags, services sandbox bridge requests,
//!   and holds the partition locks for the transaction.
//! - [`TokenProgram`]: the token-flavored base contract with
//!   transfer/mint/burn, ownership checks and typed events.
//! - [`EventSignature`]: pre-declared event argument typing, validated
//!   before any emission.
//! - [`calculate_resources`] / [`RentTable`]: rent-to-budget conversion
//!   and the per-contract limit lookup.
//! - [`ContractConnector`] / [`TokenConnector`]: typed stubs for
//!   cross-contract calls from inside a program.
//!
//! # Calling convention
//!
//! A **deploy call** commits its overlay and becomes part of chain state;
//! any error aborts the whole transaction with zero persisted writes. A
//! **rollback call** executes against the same machinery but its overlay
//! is discarded on return, success or failure. Child calls (issued from
//! inside a method) run with `is_child == true`, which the lifecycle
//! guard uses to keep `init`/`deploy` unreachable from other contracts.

mod base;
mod config;
mod connector;
mod dispatcher;
mod engine;
mod event;
mod metering;
mod token;

pub use base::{assert_not_child, assert_ownership};
pub use config::{EngineConfig, GenesisAllocation};
pub use connector::{ContractConnector, TokenConnector};
pub use engine::{ContractEngine, ContractRecord, DeployRequest, TransactionInput};
pub use event::{EventLog, EventRecord, EventSignature, EventType};
pub use metering::{
    calculate_resources, RentTable, ResourceBudget, ResourcePrices, MAX_RESOURCES_COST,
    MINIMAL_RESOURCES, RESOURCES_PRICE,
};
pub use token::{TokenDefinition, TokenProgram};
