//! Token ledger for the veris platform.
//!
//! This crate provides [`TokenRegister`], the balance and supply
//! bookkeeping that token contracts run over the storage layer. All
//! arithmetic goes through [`veris_common::Amount`], the platform's
//! fixed-scale arbitrary-precision decimal, so every replica derives
//! bit-identical balances from the same transaction history.
//!
//! # Invariants
//!
//! - No balance is ever negative.
//! - `total_supply() == Σ` of all balances at every commit point:
//!   deposits raise the supply, withdrawals lower it, transfers are
//!   supply-neutral.
//!
//! # Atomicity
//!
//! A register operates on an invocation's transactional overlay, never on
//! the backend directly. A `transfer` is a withdraw followed by a deposit;
//! the deposit is unreachable when the withdraw fails, and any error
//! discards the whole overlay, so partial application cannot reach
//! persistent state.

mod register;

pub use register::TokenRegister;
