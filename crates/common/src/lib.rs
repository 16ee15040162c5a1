//! Common types for the veris contract platform.
//!
//! This crate provides the foundation shared by every other veris crate:
//!
//! - [`enum@Error`] and [`Result`]: the unified error taxonomy used across
//!   the platform (validation, authorization, funds, resources, deployment)
//! - [`Address`]: validated account and contract identities
//! - [`Amount`]: arbitrary-precision decimal amounts with a single fixed
//!   rounding rule, so independent replicas derive bit-identical balances
//! - [`DeterministicRng`]: the per-transaction pseudo-random stream that
//!   replays identically on every replica
//!
//! # Determinism
//!
//! Everything in this crate that can influence persisted state is
//! deterministic by construction: amount arithmetic normalizes to a fixed
//! scale with a documented rounding rule, and the random stream is a pure
//! function of the chain-assigned seed. Nothing here reads clocks,
//! thread ids, or process state.

mod address;
mod amount;
mod error;
mod rng;

pub use address::{Address, CONTRACT_ADDRESS_LEN};
pub use amount::{Amount, AMOUNT_SCALE};
pub use error::{Error, ResourceKind, Result};
pub use rng::DeterministicRng;
