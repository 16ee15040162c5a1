//! Balance and supply bookkeeping over a storage partition.

use tracing::debug;
use veris_common::{Address, Amount, Error, Result};
use veris_storage::{KvAccess, NamespacedKv};

/// Key of the total-supply scalar inside the register's keyspace.
///
/// Balance keys carry a `balance.` prefix so no account identity can
/// collide with the supply scalar.
const SUPPLY_KEY: &str = "supply";

fn balance_key(address: &Address) -> String {
    format!("balance.{address}")
}

/// A token holders register over a storage keyspace.
///
/// Balances persist as canonical scale-8 decimal strings; absent entries
/// read as zero. The register is handed the invocation's overlay (or the
/// sandbox bridge, inside a contract), so its writes commit or vanish
/// together with everything else the invocation did.
pub struct TokenRegister<S: KvAccess> {
    kv: S,
    name: String,
}

impl<S: KvAccess> TokenRegister<S> {
    /// Open a register over an already-scoped keyspace.
    ///
    /// Inside a contract the sandbox bridge hands out pre-partitioned
    /// stores, so no further prefixing is wanted. `label` only decorates
    /// error messages.
    pub fn over(inner: S, label: &str) -> Self {
        TokenRegister {
            kv: inner,
            name: label.to_string(),
        }
    }

    /// Open the register stored under `(contract, store)`.
    pub fn new(inner: S, contract: &Address, store: &str) -> TokenRegister<NamespacedKv<S>> {
        TokenRegister {
            kv: NamespacedKv::new(inner, &format!("{contract}.{store}")),
            name: store.to_string(),
        }
    }

    /// Open a register over a raw partition (the system token register).
    pub fn open_partition(inner: S, partition: &str) -> TokenRegister<NamespacedKv<S>> {
        TokenRegister {
            kv: NamespacedKv::new(inner, partition),
            name: partition.to_string(),
        }
    }

    /// Balance of `address`; zero when the account has never been
    /// credited.
    pub fn balance_of(&self, address: &Address) -> Result<Amount> {
        match self.kv.get(&balance_key(address))? {
            Some(raw) => Amount::parse(&raw)
                .map_err(|e| Error::Storage(format!("corrupt balance for {address}: {e}"))),
            None => Ok(Amount::zero()),
        }
    }

    /// Total supply; zero before the first deposit.
    pub fn total_supply(&self) -> Result<Amount> {
        match self.kv.get(SUPPLY_KEY)? {
            Some(raw) => Amount::parse(&raw)
                .map_err(|e| Error::Storage(format!("corrupt total supply: {e}"))),
            None => Ok(Amount::zero()),
        }
    }

    fn set_balance(&mut self, address: &Address, balance: &Amount) -> Result<()> {
        self.kv.put(&balance_key(address), &balance.to_plain_string())
    }

    fn set_supply(&mut self, supply: &Amount) -> Result<()> {
        self.kv.put(SUPPLY_KEY, &supply.to_plain_string())
    }

    /// Remove `amount` from `address`, lowering the total supply.
    ///
    /// Fails with [`Error::InvalidAmount`] for non-positive amounts and
    /// [`Error::InsufficientFunds`] when the balance would go negative;
    /// on failure nothing is written.
    pub fn withdraw(&mut self, address: &Address, amount: &Amount) -> Result<Amount> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(
                "amount should be a positive non-zero value".into(),
            ));
        }
        let balance = self.balance_of(address)?.sub(amount);
        if balance.is_negative() {
            return Err(Error::InsufficientFunds(format!(
                "{}:{address}",
                self.name
            )));
        }
        let supply = self.total_supply()?.sub(amount);
        self.set_balance(address, &balance)?;
        self.set_supply(&supply)?;
        debug!(%address, amount = %amount, "withdraw");
        Ok(balance)
    }

    /// Credit `amount` to `address`, raising the total supply first.
    ///
    /// Fails with [`Error::InvalidAmount`] for non-positive amounts.
    pub fn deposit(&mut self, address: &Address, amount: &Amount) -> Result<Amount> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount(
                "amount should be a positive non-zero value".into(),
            ));
        }
        let supply = self.total_supply()?.add(amount);
        self.set_supply(&supply)?;
        let balance = self.balance_of(address)?.add(amount);
        self.set_balance(address, &balance)?;
        debug!(%address, amount = %amount, "deposit");
        Ok(balance)
    }

    /// Move `amount` between accounts: withdraw from `from`, then deposit
    /// to `to`. Supply-neutral. The deposit never executes when the
    /// withdraw fails.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: &Amount) -> Result<Amount> {
        self.withdraw(from, amount)?;
        self.deposit(to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use veris_storage::{MemoryKv, TransactionalKv};

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    fn fresh() -> TransactionalKv {
        TransactionalKv::new(Arc::new(MemoryKv::new()))
    }

    fn register(tx: &mut TransactionalKv) -> TokenRegister<NamespacedKv<&mut TransactionalKv>> {
        let contract = addr("token-contract");
        TokenRegister::new(tx, &contract, "wallets")
    }

    #[test]
    fn test_absent_accounts_read_zero() {
        let mut tx = fresh();
        let reg = register(&mut tx);
        assert_eq!(reg.balance_of(&addr("nobody")).unwrap(), Amount::zero());
        assert_eq!(reg.total_supply().unwrap(), Amount::zero());
    }

    #[test]
    fn test_deposit_withdraw_update_supply() {
        let mut tx = fresh();
        let mut reg = register(&mut tx);
        let alice = addr("alice");

        reg.deposit(&alice, &amt("100")).unwrap();
        assert_eq!(reg.balance_of(&alice).unwrap(), amt("100"));
        assert_eq!(reg.total_supply().unwrap(), amt("100"));

        reg.withdraw(&alice, &amt("30.5")).unwrap();
        assert_eq!(reg.balance_of(&alice).unwrap(), amt("69.5"));
        assert_eq!(reg.total_supply().unwrap(), amt("69.5"));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let mut tx = fresh();
        let mut reg = register(&mut tx);
        let alice = addr("alice");

        for bad in ["0", "-1"] {
            assert!(matches!(
                reg.deposit(&alice, &amt(bad)),
                Err(Error::InvalidAmount(_))
            ));
            assert!(matches!(
                reg.withdraw(&alice, &amt(bad)),
                Err(Error::InvalidAmount(_))
            ));
        }
        assert_eq!(reg.total_supply().unwrap(), Amount::zero());
    }

    #[test]
    fn test_underfunded_transfer_leaves_balances_unchanged() {
        let mut tx = fresh();
        let mut reg = register(&mut tx);
        let (alice, bob) = (addr("alice"), addr("bob"));

        reg.deposit(&alice, &amt("10")).unwrap();
        let err = reg.transfer(&alice, &bob, &amt("10.00000001")).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds(_)));
        assert_eq!(reg.balance_of(&alice).unwrap(), amt("10"));
        assert_eq!(reg.balance_of(&bob).unwrap(), Amount::zero());
        assert_eq!(reg.total_supply().unwrap(), amt("10"));
    }

    #[test]
    fn test_transfer_is_supply_neutral() {
        let mut tx = fresh();
        let mut reg = register(&mut tx);
        let (alice, bob) = (addr("alice"), addr("bob"));

        reg.deposit(&alice, &amt("7.25")).unwrap();
        reg.transfer(&alice, &bob, &amt("2.75")).unwrap();
        assert_eq!(reg.balance_of(&alice).unwrap(), amt("4.5"));
        assert_eq!(reg.balance_of(&bob).unwrap(), amt("2.75"));
        assert_eq!(reg.total_supply().unwrap(), amt("7.25"));
    }

    #[test]
    fn test_supply_matches_sum_of_balances() {
        let mut tx = fresh();
        let mut reg = register(&mut tx);
        let accounts = ["a", "b", "c", "d"];

        for (i, name) in accounts.iter().enumerate() {
            reg.deposit(&addr(name), &amt(&format!("{}.5", i + 1))).unwrap();
        }
        reg.withdraw(&addr("b"), &amt("0.5")).unwrap();
        reg.transfer(&addr("c"), &addr("a"), &amt("3")).unwrap();

        let mut sum = Amount::zero();
        for name in accounts {
            let balance = reg.balance_of(&addr(name)).unwrap();
            assert!(!balance.is_negative());
            sum = sum.add(&balance);
        }
        assert_eq!(reg.total_supply().unwrap(), sum);
    }

    #[test]
    fn test_exact_balance_transfer_empties_account() {
        let mut tx = fresh();
        let mut reg = register(&mut tx);
        let (alice, bob) = (addr("alice"), addr("bob"));

        reg.deposit(&alice, &amt("5")).unwrap();
        reg.transfer(&alice, &bob, &amt("5")).unwrap();
        assert_eq!(reg.balance_of(&alice).unwrap(), Amount::zero());
        assert_eq!(reg.balance_of(&bob).unwrap(), amt("5"));
    }

    #[test]
    fn test_rollback_discards_ledger_writes() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = TransactionalKv::new(backend.clone());
        let contract = addr("token-contract");
        let mut reg = TokenRegister::new(&mut tx, &contract, "wallets");
        reg.deposit(&addr("alice"), &amt("9")).unwrap();
        tx.rollback();
        assert!(backend.is_empty());
    }
}
