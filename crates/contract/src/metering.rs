//! Rent-to-budget conversion and per-contract limit lookup.
//!
//! Deployers pay a one-time resource rent; the rent amount converts
//! linearly into the contract's execution budget, floored at the minimal
//! zero-cost allowance and capped at [`MAX_RESOURCES_COST`] tokens. The
//! paid rent is recorded in a global table and re-read on every
//! subsequent invocation to derive the budget.

use serde::{Deserialize, Serialize};
use veris_common::{Address, Amount, Error, Result};
use veris_storage::{KeyValue, KvAccess};
use veris_vm::SandboxLimits;

/// Prices per rented token.
#[derive(Debug, Clone, Copy)]
pub struct ResourcePrices {
    /// Megabytes of sandbox memory per token.
    pub ram: u64,
    /// Milliseconds of wall-clock per token.
    pub time_limit: u64,
    /// Cross-contract calls per token.
    pub call_limit: u64,
}

/// Default resource prices.
pub const RESOURCES_PRICE: ResourcePrices = ResourcePrices {
    ram: 2,
    time_limit: 100,
    call_limit: 1,
};

/// The zero-cost floor every contract gets even without rent.
pub const MINIMAL_RESOURCES: ResourceBudget = ResourceBudget {
    ram: 8,
    time_limit: 500,
    call_limit: 1,
};

/// Maximum rent that buys resources; anything above is clamped.
pub const MAX_RESOURCES_COST: u64 = 120;

/// A derived execution budget.
///
/// Units: `ram` in megabytes, `time_limit` in milliseconds, `call_limit`
/// in cross-contract calls per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub ram: u64,
    pub time_limit: u64,
    pub call_limit: u32,
}

impl ResourceBudget {
    /// The sandbox limits enforcing this budget.
    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits::new(self.ram, self.time_limit, self.call_limit)
    }
}

/// Convert a rent amount into an execution budget.
///
/// The magnitude of `rent` is clamped to `[0, MAX_RESOURCES_COST]`; each
/// figure is `price × amount` rounded to the nearest integer (the
/// platform's half-up rule), floored at [`MINIMAL_RESOURCES`].
pub fn calculate_resources(rent: &Amount) -> ResourceBudget {
    let magnitude = rent.abs();
    let max = Amount::from_integer(MAX_RESOURCES_COST as i64);
    let amount = if magnitude > max { max } else { magnitude };

    let scaled = |price: u64| -> u64 {
        // clamped to 120 tokens, so the product always fits u64
        amount.mul_integer(price).to_u64_round().unwrap_or(0)
    };

    let ram = scaled(RESOURCES_PRICE.ram).max(MINIMAL_RESOURCES.ram);
    let time_limit = scaled(RESOURCES_PRICE.time_limit).max(MINIMAL_RESOURCES.time_limit);
    let call_limit = (scaled(RESOURCES_PRICE.call_limit) as u32).max(MINIMAL_RESOURCES.call_limit);

    ResourceBudget {
        ram,
        time_limit,
        call_limit,
    }
}

/// Validate a rent amount offered at deployment.
///
/// Unlike [`calculate_resources`], which clamps, deployment rejects rents
/// outside `[0, MAX_RESOURCES_COST]` outright, before any transfer.
pub fn check_rent_range(rent: &Amount) -> Result<()> {
    if rent.is_negative() {
        return Err(Error::Validation(format!(
            "resource rent cannot be negative: {rent}"
        )));
    }
    if *rent > Amount::from_integer(MAX_RESOURCES_COST as i64) {
        return Err(Error::Validation(format!(
            "you can't rent more than possible for {MAX_RESOURCES_COST} tokens"
        )));
    }
    Ok(())
}

/// Partition holding the global rent table.
const RENTS_PARTITION: &str = "sys.rents";

/// The global rent table: contract address to paid rent.
pub struct RentTable<S: KvAccess> {
    kv: KeyValue<S>,
}

impl<S: KvAccess> RentTable<S> {
    /// Open the rent table over the given access.
    pub fn open(inner: S) -> Self {
        RentTable {
            kv: KeyValue::open_partition(inner, RENTS_PARTITION),
        }
    }

    /// Record the rent paid for `address` at deploy time.
    pub fn set(&mut self, address: &Address, rent: &Amount) -> Result<()> {
        self.kv.put(address.as_str(), &rent.to_plain_string())
    }

    /// The rent `address` paid, if it ever rented.
    pub fn get(&self, address: &Address) -> Result<Option<Amount>> {
        match self.kv.get(address.as_str())? {
            Some(raw) => Ok(Some(Amount::parse(&raw).map_err(|e| {
                Error::Storage(format!("corrupt rent record for {address}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// The derived budget for a rented address, or `None` when the
    /// address never rented (callers fall back to minimal-only
    /// execution explicitly, never to a zero-valued budget).
    pub fn check_contract_limits(&self, address: &Address) -> Result<Option<ResourceBudget>> {
        Ok(self.get(address)?.map(|rent| calculate_resources(&rent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use veris_storage::{MemoryKv, TransactionalKv};

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn test_zero_rent_gets_minimal_budget() {
        assert_eq!(
            calculate_resources(&Amount::zero()),
            ResourceBudget {
                ram: 8,
                time_limit: 500,
                call_limit: 1
            }
        );
    }

    #[test]
    fn test_full_rent_budget() {
        assert_eq!(
            calculate_resources(&amt("120")),
            ResourceBudget {
                ram: 240,
                time_limit: 12000,
                call_limit: 120
            }
        );
    }

    #[test]
    fn test_rent_above_cap_is_clamped() {
        assert_eq!(calculate_resources(&amt("500")), calculate_resources(&amt("120")));
    }

    #[test]
    fn test_fractional_rent_rounds_half_up() {
        // 2 * 5.25 = 10.5 -> 11 MB; 100 * 5.25 = 525 ms; 1 * 5.25 -> 5 calls
        assert_eq!(
            calculate_resources(&amt("5.25")),
            ResourceBudget {
                ram: 11,
                time_limit: 525,
                call_limit: 5
            }
        );
    }

    #[test]
    fn test_small_rent_floors_at_minimal() {
        assert_eq!(calculate_resources(&amt("1")), ResourceBudget {
            ram: 8,
            time_limit: 500,
            call_limit: 1
        });
    }

    #[test]
    fn test_rent_range_validation() {
        assert!(check_rent_range(&Amount::zero()).is_ok());
        assert!(check_rent_range(&amt("120")).is_ok());
        assert!(matches!(
            check_rent_range(&amt("120.00000001")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            check_rent_range(&amt("-1")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rent_table_lookup() {
        let mut tx = TransactionalKv::new(Arc::new(MemoryKv::new()));
        let rented = Address::new("rented-contract").unwrap();
        let unrented = Address::new("unrented-contract").unwrap();

        RentTable::open(&mut tx).set(&rented, &amt("10")).unwrap();

        let table = RentTable::open(&mut tx);
        assert_eq!(
            table.check_contract_limits(&rented).unwrap(),
            Some(ResourceBudget {
                ram: 20,
                time_limit: 1000,
                call_limit: 10
            })
        );
        // never rented: no budget, not zero-valued limits
        assert_eq!(table.check_contract_limits(&unrented).unwrap(), None);
    }
}
