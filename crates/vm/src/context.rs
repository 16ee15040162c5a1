//! The per-invocation call context.
//!
//! There is no ambient "current sender" anywhere in the platform: the
//! dispatcher builds a [`CallContext`] for every invocation and threads
//! it explicitly through the sandbox, which copies it into the isolate.
//! The context is never persisted and lives exactly as long as the
//! invocation.

use serde::{Deserialize, Serialize};
use veris_common::{Address, Amount};

/// Deployment parameters, present only on the transaction that
/// originates a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployState {
    /// The deployer paying the resource rent.
    pub from: Address,
    /// The one-time rent buying the contract's execution budget.
    pub resource_rent: Amount,
}

/// Everything an invocation knows about why it is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    /// The top-level transaction sender.
    pub sender: Address,
    /// The contract being invoked.
    pub contract_address: Address,
    /// The immediate caller contract, set on child calls.
    pub caller: Option<Address>,
    /// True for any call issued from inside another contract's method.
    pub is_child: bool,
    /// True only for the single transaction deploying this contract.
    pub is_deploy: bool,
    /// Deployment parameters when `is_deploy`.
    pub deploy_state: Option<DeployState>,
    /// Token value attached to the call, if any.
    pub value: Option<Amount>,
    /// Chain-assigned seed for the deterministic random stream.
    pub random_seed: u64,
}

impl CallContext {
    /// Context for a top-level (non-deploy) transaction call.
    pub fn root(sender: Address, contract_address: Address, random_seed: u64) -> Self {
        CallContext {
            sender,
            contract_address,
            caller: None,
            is_child: false,
            is_deploy: false,
            deploy_state: None,
            value: None,
            random_seed,
        }
    }

    /// Context for the transaction deploying `contract_address`.
    pub fn deploy(
        sender: Address,
        contract_address: Address,
        deploy_state: DeployState,
        random_seed: u64,
    ) -> Self {
        CallContext {
            sender,
            contract_address,
            caller: None,
            is_child: false,
            is_deploy: true,
            deploy_state: Some(deploy_state),
            value: None,
            random_seed,
        }
    }

    /// Derive the context a child call hands to `callee`.
    ///
    /// The top-level sender is preserved, the current contract becomes
    /// the caller, and deploy state never propagates into callees.
    pub fn child(&self, callee: Address) -> Self {
        CallContext {
            sender: self.sender.clone(),
            contract_address: callee,
            caller: Some(self.contract_address.clone()),
            is_child: true,
            is_deploy: false,
            deploy_state: None,
            value: None,
            random_seed: self.random_seed,
        }
    }

    /// The identity a contract treats as "who called me": the top-level
    /// sender, unless this is a child call, in which case the immediate
    /// caller contract's address.
    pub fn effective_sender(&self) -> &Address {
        if self.is_child {
            if let Some(caller) = &self.caller {
                return caller;
            }
        }
        &self.sender
    }
}
