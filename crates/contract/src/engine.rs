//! The contract engine: the platform's exposed execution surface.
//!
//! The engine owns the storage backend, the program registry, the
//! partition lock table and the compiled-handle cache, and turns incoming
//! transactions into dispatched invocations:
//!
//! - [`ContractEngine::register_contract`] installs a contract program
//!   for the current execution context.
//! - [`ContractEngine::deploy_contract`] processes a deployment
//!   transaction: rent validation, rent transfer, record and rent-table
//!   writes, then the one-time `init` invocation, all committed
//!   atomically.
//! - [`ContractEngine::call_method_deploy`] /
//!   [`ContractEngine::call_method_rollback`] are the two call
//!   primitives.
//! - [`ContractEngine::get_contract_property`] reads declared metadata
//!   without invoking a method.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use veris_common::{Address, Amount, Error, Result};
use veris_ledger::TokenRegister;
use veris_storage::{canonical_json, KvAccess, KvBackend, MemoryKv, StoreArray, TransactionalKv};
use veris_vm::{
    code_hash, CallContext, CompiledContract, DeployState, ProgramFactory, ProgramRegistry,
    Sandbox,
};

use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, LockTable};
use crate::event::{EventLog, EventRecord};
use crate::metering::{check_rent_range, calculate_resources, RentTable, MINIMAL_RESOURCES};

/// Partition of the system token register (rent and payable value move
/// through it).
const SYSTEM_TOKEN_PARTITION: &str = "sys.token";

/// Partition of the deployed contract records.
const RECORDS_PARTITION: &str = "sys.contracts";

/// Partition listing deployed addresses in deployment order.
const DEPLOYED_PARTITION: &str = "sys.deployed";

/// Backend key marking that genesis allocations were applied.
const GENESIS_FLAG_KEY: &str = "sys.genesis.done";

/// A deployed contract's persistent record.
///
/// Created on deploy; immutable afterwards (code is immutable, the
/// Undeployed to Deployed transition is terminal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// Derived contract address.
    pub address: Address,
    /// Hash of the registered program code.
    pub code_hash: String,
    /// The deployer, owner of the contract.
    pub owner: Address,
    /// Whether the owner may mint (token contracts).
    pub mintable: bool,
    /// Deploy transaction marker (the chain-assigned seed).
    pub deployed_at: u64,
}

fn record_key(address: &Address) -> String {
    format!("{RECORDS_PARTITION}.{address}")
}

/// Read a contract record through any access (overlay or backend view).
pub(crate) fn read_record(
    kv: &dyn KvAccess,
    address: &Address,
) -> Result<Option<ContractRecord>> {
    match kv.get(&record_key(address))? {
        Some(raw) => {
            let record = serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("corrupt contract record: {e}")))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn write_record(kv: &mut dyn KvAccess, record: &ContractRecord) -> Result<()> {
    let value = serde_json::to_value(record)
        .map_err(|e| Error::Storage(format!("encode contract record: {e}")))?;
    kv.put(&record_key(&record.address), &canonical_json(&value))
}

/// A method-call transaction from the submission pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
    /// The transaction sender.
    pub sender: Address,
    /// The target contract.
    pub contract_address: Address,
    /// The method to invoke.
    pub method: String,
    /// Method arguments.
    pub args: Vec<Value>,
    /// Optional token value attached to the call.
    pub value: Option<Amount>,
    /// Chain-assigned random seed for this transaction.
    pub random_seed: u64,
}

/// A deployment transaction.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// The deployer (becomes the contract owner).
    pub sender: Address,
    /// Hash of the registered program to instantiate.
    pub code_hash: String,
    /// Arguments for the one-time `init` invocation.
    pub args: Vec<Value>,
    /// One-time resource rent, in system tokens.
    pub resource_rent: Amount,
    /// Chain-assigned random seed; also the deploy marker.
    pub random_seed: u64,
}

/// The assembled execution core.
pub struct ContractEngine {
    backend: Arc<dyn KvBackend>,
    registry: ProgramRegistry,
    config: EngineConfig,
    system_owner: Address,
    locks: LockTable,
    instances: Mutex<HashMap<Address, CompiledContract>>,
}

impl ContractEngine {
    /// Create an engine over a fresh in-memory backend.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(MemoryKv::new()))
    }

    /// Create an engine over an externally supplied backend.
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn KvBackend>) -> Result<Self> {
        config.validate()?;
        let system_owner = config.system_owner_address()?;
        let engine = ContractEngine {
            backend,
            registry: ProgramRegistry::new(),
            config,
            system_owner,
            locks: LockTable::new(),
            instances: Mutex::new(HashMap::new()),
        };
        engine.apply_genesis()?;
        Ok(engine)
    }

    /// Seed the system token register with the configured genesis
    /// allocations, once per backend.
    fn apply_genesis(&self) -> Result<()> {
        if self.config.genesis_allocations.is_empty() {
            return Ok(());
        }
        let mut overlay = TransactionalKv::new(self.backend.clone());
        if overlay.get(GENESIS_FLAG_KEY)?.is_some() {
            return Ok(());
        }
        {
            let mut register =
                TokenRegister::open_partition(&mut overlay, SYSTEM_TOKEN_PARTITION);
            for allocation in &self.config.genesis_allocations {
                let address = Address::new(&allocation.address)?;
                let amount = Amount::parse(&allocation.amount)?;
                register.deposit(&address, &amount)?;
            }
        }
        overlay.put(GENESIS_FLAG_KEY, "1")?;
        overlay.commit();
        info!(
            allocations = self.config.genesis_allocations.len(),
            "applied genesis allocations"
        );
        Ok(())
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Install a contract program; returns the code hash deployments
    /// refer to.
    pub fn register_contract(
        &self,
        code: &[u8],
        factory: Arc<dyn ProgramFactory>,
    ) -> Result<String> {
        let hash = code_hash(code);
        self.registry.register(&hash, factory)?;
        Ok(hash)
    }

    /// Fetch (or compile and cache) the executable handle for a record.
    pub(crate) fn compiled_handle(&self, record: &ContractRecord) -> Result<CompiledContract> {
        if let Some(handle) = self.instances.lock().get(&record.address) {
            return Ok(handle.clone());
        }
        let mut scratch = Sandbox::new(MINIMAL_RESOURCES.sandbox_limits());
        let handle = scratch
            .compile(&self.registry, &record.code_hash)
            .map_err(|f| f.into_error())?;
        let mut instances = self.instances.lock();
        if instances.len() >= self.config.instance_cache_size {
            // cache full: drop the cold handles and start over
            instances.clear();
        }
        instances.insert(record.address.clone(), handle.clone());
        Ok(handle)
    }

    /// Process a deployment transaction.
    ///
    /// Validates the rent range before any transfer, pays the rent to the
    /// system owner, records the contract and its rent, and runs the
    /// one-time `init` under the rented budget. Everything commits
    /// together or not at all.
    pub fn deploy_contract(&self, request: DeployRequest) -> Result<Address> {
        check_rent_range(&request.resource_rent)?;
        let factory = self.registry.lookup(&request.code_hash).ok_or_else(|| {
            Error::Deployment(format!("unknown code hash {}", request.code_hash))
        })?;
        let manifest = factory.instantiate().manifest();
        let address =
            Address::contract_from_deploy(&request.sender, &manifest.name, request.random_seed);
        let budget = calculate_resources(&request.resource_rent);

        let overlay = TransactionalKv::new(self.backend.clone());
        if read_record(&overlay, &address)?.is_some() {
            return Err(Error::Deployment(format!(
                "contract {address} is already deployed"
            )));
        }

        let context = CallContext::deploy(
            request.sender.clone(),
            address.clone(),
            DeployState {
                from: request.sender.clone(),
                resource_rent: request.resource_rent.clone(),
            },
            request.random_seed,
        );
        let mut dispatcher = Dispatcher::new(self, overlay, context);
        dispatcher.lock(&address)?;

        // rent is paid once, at deploy time, to the system owner
        if request.resource_rent.is_positive() {
            let mut register =
                TokenRegister::open_partition(&mut dispatcher.overlay, SYSTEM_TOKEN_PARTITION);
            register.transfer(&request.sender, &self.system_owner, &request.resource_rent)?;
        }
        RentTable::open(&mut dispatcher.overlay).set(&address, &request.resource_rent)?;

        let mintable = manifest
            .properties
            .get("mintable")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let record = ContractRecord {
            address: address.clone(),
            code_hash: request.code_hash.clone(),
            owner: request.sender.clone(),
            mintable,
            deployed_at: request.random_seed,
        };
        write_record(&mut dispatcher.overlay, &record)?;
        StoreArray::open_partition(&mut dispatcher.overlay, DEPLOYED_PARTITION)
            .push(&json!(address.as_str()))?;

        let handle = self.compiled_handle(&record)?;
        match dispatcher.run(&handle, budget.sandbox_limits(), "init", request.args) {
            Ok(_) => {
                dispatcher.overlay.commit();
                info!(
                    contract = %address,
                    program = %manifest.name,
                    rent = %request.resource_rent,
                    "contract deployed"
                );
                Ok(address)
            }
            Err(error) => {
                dispatcher.overlay.rollback();
                Err(error)
            }
        }
    }

    /// Execute a state-committing call. Mutations become chain state on
    /// success; any error aborts with zero persisted writes.
    pub fn call_method_deploy(&self, tx: TransactionInput) -> Result<Value> {
        self.transact(tx, true)
    }

    /// Execute a speculative call against a snapshot; all mutations are
    /// discarded on return, success or failure.
    pub fn call_method_rollback(&self, tx: TransactionInput) -> Result<Value> {
        self.transact(tx, false)
    }

    fn transact(&self, tx: TransactionInput, commit: bool) -> Result<Value> {
        if tx.method == "init" || tx.method == "deploy" {
            return Err(Error::Deployment(format!(
                "{} can only run on the deployment transaction",
                tx.method
            )));
        }

        let overlay = TransactionalKv::new(self.backend.clone());
        let record = read_record(&overlay, &tx.contract_address)?.ok_or_else(|| {
            Error::Deployment(format!("contract {} is not deployed", tx.contract_address))
        })?;

        let context =
            CallContext::root(tx.sender.clone(), tx.contract_address.clone(), tx.random_seed);
        let mut dispatcher = Dispatcher::new(self, overlay, context);
        dispatcher.lock(&tx.contract_address)?;

        let budget = RentTable::open(&mut dispatcher.overlay)
            .check_contract_limits(&tx.contract_address)?
            .unwrap_or(MINIMAL_RESOURCES);

        // attached value moves before the method body observes balances
        if commit {
            if let Some(value) = &tx.value {
                if value.is_positive() {
                    let mut register = TokenRegister::open_partition(
                        &mut dispatcher.overlay,
                        SYSTEM_TOKEN_PARTITION,
                    );
                    register.transfer(&tx.sender, &tx.contract_address, value)?;
                }
            }
        }

        let handle = self.compiled_handle(&record)?;
        let result = dispatcher.run(&handle, budget.sandbox_limits(), &tx.method, tx.args);
        match result {
            Ok(value) if commit => {
                dispatcher.overlay.commit();
                Ok(value)
            }
            Ok(value) => {
                dispatcher.overlay.rollback();
                Ok(value)
            }
            Err(error) => {
                dispatcher.overlay.rollback();
                Err(error)
            }
        }
    }

    /// Read declared contract metadata without invoking a method.
    pub fn get_contract_property(&self, address: &Address, property: &str) -> Result<Value> {
        let overlay = TransactionalKv::new(self.backend.clone());
        self.property_value(&overlay, address, property)
    }

    pub(crate) fn property_value(
        &self,
        kv: &dyn KvAccess,
        address: &Address,
        property: &str,
    ) -> Result<Value> {
        let record = read_record(kv, address)?.ok_or_else(|| {
            Error::Deployment(format!("contract {address} is not deployed"))
        })?;
        match property {
            "owner" => Ok(json!(record.owner.as_str())),
            "address" => Ok(json!(record.address.as_str())),
            "codeHash" => Ok(json!(record.code_hash)),
            "mintable" => Ok(json!(record.mintable)),
            "deployedAt" => Ok(json!(record.deployed_at)),
            other => {
                let name = other.strip_prefix("contract.").unwrap_or(other);
                let handle = self.compiled_handle(&record)?;
                handle
                    .manifest
                    .properties
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        Error::Validation(format!("unknown contract property {property:?}"))
                    })
            }
        }
    }

    /// The persisted record for `address`, if deployed.
    pub fn contract_record(&self, address: &Address) -> Result<Option<ContractRecord>> {
        let overlay = TransactionalKv::new(self.backend.clone());
        read_record(&overlay, address)
    }

    /// The derived execution budget for `address`, or `None` when it
    /// never rented.
    pub fn check_contract_limits(
        &self,
        address: &Address,
    ) -> Result<Option<crate::metering::ResourceBudget>> {
        let mut overlay = TransactionalKv::new(self.backend.clone());
        RentTable::open(&mut overlay).check_contract_limits(address)
    }

    /// Balance of `address` on the system token register.
    pub fn system_balance_of(&self, address: &Address) -> Result<Amount> {
        let mut overlay = TransactionalKv::new(self.backend.clone());
        TokenRegister::open_partition(&mut overlay, SYSTEM_TOKEN_PARTITION).balance_of(address)
    }

    /// Total supply of the system token register.
    pub fn system_total_supply(&self) -> Result<Amount> {
        let mut overlay = TransactionalKv::new(self.backend.clone());
        TokenRegister::open_partition(&mut overlay, SYSTEM_TOKEN_PARTITION).total_supply()
    }

    /// Events `contract` has emitted, optionally filtered by name.
    pub fn events_for(
        &self,
        contract: &Address,
        event: Option<&str>,
    ) -> Result<Vec<EventRecord>> {
        let overlay = TransactionalKv::new(self.backend.clone());
        match event {
            Some(name) => EventLog::read_named(&overlay, contract, name),
            None => EventLog::read(&overlay, contract),
        }
    }

    /// Addresses of every deployed contract, in deployment order.
    pub fn deployed_contracts(&self) -> Result<Vec<Address>> {
        let mut overlay = TransactionalKv::new(self.backend.clone());
        let list = StoreArray::open_partition(&mut overlay, DEPLOYED_PARTITION);
        list.to_vec()?
            .into_iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| Error::Storage("corrupt deployed list".into()))
                    .and_then(|s| Address::new(s))
            })
            .collect()
    }

    /// The backend this engine persists into (test inspection).
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }
}
