//! Engine configuration.
//!
//! The engine is configured programmatically or from a TOML document:
//!
//! ```toml
//! system_owner = "treasury"
//! max_call_depth = 8
//! lock_timeout_ms = 2000
//! instance_cache_size = 16
//!
//! [[genesis]]
//! address = "alice"
//! amount = "1000"
//! ```
//!
//! Genesis allocations seed the system token register once, when the
//! engine is created over an empty backend; deployers need system tokens
//! to pay resource rent.

use serde::{Deserialize, Serialize};
use veris_common::{Address, Amount, Error, Result};

/// One genesis credit on the system token register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// The credited account.
    pub address: String,
    /// The credited amount, as a decimal string.
    pub amount: String,
}

/// Tunables for the contract engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The system account receiving resource rent payments.
    pub system_owner: String,
    /// Maximum cross-contract call depth before a clean rejection.
    pub max_call_depth: u32,
    /// How long a transaction waits for a contended partition lock.
    pub lock_timeout_ms: u64,
    /// Compiled contract handles kept warm between invocations.
    pub instance_cache_size: usize,
    /// Initial system token credits.
    #[serde(rename = "genesis")]
    pub genesis_allocations: Vec<GenesisAllocation>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            system_owner: "system".to_string(),
            max_call_depth: 8,
            lock_timeout_ms: 2_000,
            instance_cache_size: 16,
            genesis_allocations: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)
            .map_err(|e| Error::Validation(format!("bad engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check configuration consistency.
    pub fn validate(&self) -> Result<()> {
        Address::new(&self.system_owner)?;
        if self.max_call_depth == 0 {
            return Err(Error::Validation(
                "max_call_depth must be at least 1".into(),
            ));
        }
        if self.instance_cache_size == 0 {
            return Err(Error::Validation(
                "instance_cache_size must be at least 1".into(),
            ));
        }
        for allocation in &self.genesis_allocations {
            Address::new(&allocation.address)?;
            let amount = Amount::parse(&allocation.amount)?;
            if !amount.is_positive() {
                return Err(Error::Validation(format!(
                    "genesis allocation for {} must be positive",
                    allocation.address
                )));
            }
        }
        Ok(())
    }

    /// The validated system owner address.
    pub fn system_owner_address(&self) -> Result<Address> {
        Address::new(&self.system_owner)
    }
}
