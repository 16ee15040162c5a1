//! The contract base protocol: lifecycle and ownership guards.
//!
//! Every well-behaved program calls these from its entry points. The
//! dispatcher enforces the same rules from the outside; the in-contract
//! asserts keep a program safe even against a future dispatcher bug.

use veris_common::{Error, Result};
use veris_vm::IsolateApi;

/// Refuse lifecycle entry points on child calls.
///
/// `init` and `deploy` run only on the contract's own deployment
/// transaction; a callee must never be able to re-trigger another
/// contract's constructor through a nested call.
pub fn assert_not_child(api: &IsolateApi, what: &str) -> Result<()> {
    if api.state().is_child {
        return Err(Error::Deployment(format!(
            "you can't call {what} method of another contract"
        )));
    }
    Ok(())
}

/// Compare the contract's declared owner against the call context's
/// top-level sender; mismatch fails with an authorization error.
pub fn assert_ownership(api: &IsolateApi, message: &str) -> Result<()> {
    let ctx = api.state();
    let owner = api.get_contract_property(&ctx.contract_address, "owner")?;
    let owner = owner.as_str().ok_or_else(|| {
        Error::Deployment(format!(
            "contract {} has no declared owner",
            ctx.contract_address
        ))
    })?;
    if owner != ctx.sender.as_str() {
        return Err(Error::Authorization(message.to_string()));
    }
    Ok(())
}
