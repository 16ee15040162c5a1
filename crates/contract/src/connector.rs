//! Typed stubs for cross-contract calls.
//!
//! A connector binds a remote contract's methods to local aliases so
//! program code reads like ordinary calls. Each bound method forwards
//! `(target address, method, args)` through the dispatcher in the
//! registered call mode and returns the dispatcher's result, or
//! propagates its error.

use std::collections::HashMap;

use serde_json::{json, Value};
use veris_common::{Address, Amount, Error, Result};
use veris_vm::IsolateApi;

/// How a bound method reaches the remote contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallMode {
    /// Speculative call; the callee's writes are discarded.
    Rollback,
    /// State-committing call.
    Deploy,
}

/// A typed stub for one remote contract.
pub struct ContractConnector<'a> {
    api: &'a IsolateApi,
    address: Address,
    methods: HashMap<String, (String, CallMode)>,
}

impl<'a> ContractConnector<'a> {
    /// Point a connector at `address`.
    pub fn new(api: &'a IsolateApi, address: Address) -> Self {
        ContractConnector {
            api,
            address,
            methods: HashMap::new(),
        }
    }

    /// The remote contract this stub targets.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Bind a read-only (rollback) method under `alias`.
    pub fn register_method(&mut self, method: &str, alias: Option<&str>) {
        self.methods.insert(
            alias.unwrap_or(method).to_string(),
            (method.to_string(), CallMode::Rollback),
        );
    }

    /// Bind a mutating (deploy) method under `alias`. The call creates a
    /// chain transaction when the enclosing transaction commits.
    pub fn register_deploy_method(&mut self, method: &str, alias: Option<&str>) {
        self.methods.insert(
            alias.unwrap_or(method).to_string(),
            (method.to_string(), CallMode::Deploy),
        );
    }

    /// Invoke a bound alias.
    pub fn call(&self, alias: &str, args: Vec<Value>) -> Result<Value> {
        let (method, mode) = self.methods.get(alias).ok_or_else(|| {
            Error::Validation(format!("no method registered under alias {alias:?}"))
        })?;
        match mode {
            CallMode::Rollback => self.api.call_method_rollback(&self.address, method, args),
            CallMode::Deploy => self.api.call_method_deploy(&self.address, method, args),
        }
    }

    /// Read a declared metadata property of the remote contract.
    pub fn get_property(&self, property: &str) -> Result<Value> {
        self.api.get_contract_property(&self.address, property)
    }
}

/// A connector pre-wired with the standard token methods.
pub struct TokenConnector<'a> {
    inner: ContractConnector<'a>,
}

impl<'a> TokenConnector<'a> {
    /// Point a token connector at `address`.
    pub fn new(api: &'a IsolateApi, address: Address) -> Self {
        let mut inner = ContractConnector::new(api, address);
        inner.register_method("balanceOf", None);
        inner.register_method("totalSupply", None);
        inner.register_deploy_method("transfer", None);
        inner.register_deploy_method("mint", None);
        inner.register_deploy_method("burn", None);
        TokenConnector { inner }
    }

    /// Balance of `address` on the remote token.
    pub fn balance_of(&self, address: &Address) -> Result<Amount> {
        let value = self.inner.call("balanceOf", vec![json!(address.as_str())])?;
        parse_amount_value(value)
    }

    /// The remote token's total supply.
    pub fn total_supply(&self) -> Result<Amount> {
        let value = self.inner.call("totalSupply", vec![])?;
        parse_amount_value(value)
    }

    /// Transfer from this contract's own balance on the remote token.
    pub fn transfer(&self, to: &Address, amount: &Amount) -> Result<()> {
        self.inner.call(
            "transfer",
            vec![json!(to.as_str()), json!(amount.to_plain_string())],
        )?;
        Ok(())
    }

    /// The remote token's ticker.
    pub fn ticker(&self) -> Result<Value> {
        self.inner.get_property("contract.ticker")
    }
}

fn parse_amount_value(value: Value) -> Result<Amount> {
    match value {
        Value::String(s) => Amount::parse(&s),
        Value::Number(n) => Amount::parse(&n.to_string()),
        other => Err(Error::Validation(format!(
            "expected an amount, got {other}"
        ))),
    }
}
