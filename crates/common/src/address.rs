//! Account and contract identities.
//!
//! Two kinds of identity flow through the platform:
//!
//! - **Account identities**: opaque printable strings supplied by the
//!   transaction pipeline (wallet public keys in practice). The core does
//!   not interpret them beyond basic shape checks.
//! - **Contract addresses**: 40-character lowercase hex strings derived
//!   from the deployment transaction, so the address is a pure function of
//!   {deployer, program name, deploy seed} and every replica derives the
//!   same one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Length in characters of a derived contract address.
pub const CONTRACT_ADDRESS_LEN: usize = 40;

/// A validated account or contract identity.
///
/// The inner representation is the canonical string form. `Address` is
/// cheap to clone and hashes/compares by that string, which is also the
/// form used in storage partition keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validate and wrap an identity string.
    ///
    /// Rejects empty strings, strings with control characters, and strings
    /// containing `.` (the storage namespace separator).
    pub fn new(identity: impl Into<String>) -> Result<Self> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(Error::AddressFormat("identity cannot be empty".into()));
        }
        if identity.len() > 512 {
            return Err(Error::AddressFormat(format!(
                "identity too long: {} chars",
                identity.len()
            )));
        }
        if identity.chars().any(|c| c.is_control()) {
            return Err(Error::AddressFormat(
                "identity contains control characters".into(),
            ));
        }
        if identity.contains('.') {
            return Err(Error::AddressFormat(
                "identity cannot contain '.'".into(),
            ));
        }
        Ok(Address(identity))
    }

    /// Derive a contract address from its deployment transaction.
    ///
    /// The derivation is SHA-256 over the deployer identity, the program
    /// name, and the chain-assigned deploy seed, truncated to
    /// [`CONTRACT_ADDRESS_LEN`] hex characters.
    pub fn contract_from_deploy(deployer: &Address, program_name: &str, seed: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(deployer.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(program_name.as_bytes());
        hasher.update(b"|");
        hasher.update(seed.to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        Address(digest[..CONTRACT_ADDRESS_LEN].to_string())
    }

    /// True when the identity has the shape of a derived contract address.
    pub fn is_contract(&self) -> bool {
        self.0.len() == CONTRACT_ADDRESS_LEN
            && self.0.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_identities() {
        assert!(Address::new("").is_err());
        assert!(Address::new("has.dot").is_err());
        assert!(Address::new("ctl\nchar").is_err());
        assert!(Address::new("wallet-1").is_ok());
    }

    #[test]
    fn test_contract_derivation_is_deterministic() {
        let deployer = Address::new("alice").unwrap();
        let a = Address::contract_from_deploy(&deployer, "token", 7);
        let b = Address::contract_from_deploy(&deployer, "token", 7);
        assert_eq!(a, b);
        assert!(a.is_contract());
        assert_eq!(a.as_str().len(), CONTRACT_ADDRESS_LEN);
    }

    #[test]
    fn test_contract_derivation_varies_with_inputs() {
        let deployer = Address::new("alice").unwrap();
        let base = Address::contract_from_deploy(&deployer, "token", 7);
        assert_ne!(base, Address::contract_from_deploy(&deployer, "token", 8));
        assert_ne!(base, Address::contract_from_deploy(&deployer, "vote", 7));
    }

    #[test]
    fn test_account_identity_is_not_contract() {
        assert!(!Address::new("alice").unwrap().is_contract());
    }
}
