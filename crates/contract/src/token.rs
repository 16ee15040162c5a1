//! The token-flavored base contract.
//!
//! `TokenProgram` is the platform's standard token: balances and supply
//! live in the contract's `wallets` store through the ledger register,
//! `transfer`/`mint`/`burn` resolve their effective sender through the
//! call context, and every successful mutation emits a typed event.
//! Deployment mints the initial emission to the owner when the deploy
//! arguments ask for one.

use serde_json::{json, Value};
use veris_common::{Amount, Error, Result};
use veris_ledger::TokenRegister;
use veris_vm::{
    Capability, ContractProgram, IsolateApi, MethodDecl, ProgramManifest,
};

use crate::base::{assert_not_child, assert_ownership};
use crate::event::EventSignature;

/// The store holding this token's balances.
const WALLETS_STORE: &str = "wallets";

/// Static definition of a token contract: the part fixed at registration
/// rather than per deployment.
#[derive(Debug, Clone)]
pub struct TokenDefinition {
    /// Program name, also used in address derivation.
    pub name: String,
    /// Short ticker shown in connectors and events.
    pub ticker: String,
    /// Whether the owner may mint after deployment.
    pub mintable: bool,
}

/// The standard token contract program.
pub struct TokenProgram {
    definition: TokenDefinition,
}

impl TokenProgram {
    /// Build a program from its definition.
    pub fn new(definition: TokenDefinition) -> Self {
        TokenProgram { definition }
    }

    fn transfer_event() -> Result<EventSignature> {
        EventSignature::declare("Transfer", &["string", "string", "number"])
    }

    fn mint_event() -> Result<EventSignature> {
        EventSignature::declare("Mint", &["string", "number"])
    }

    fn burn_event() -> Result<EventSignature> {
        EventSignature::declare("Burn", &["string", "number"])
    }

    fn parse_amount(args: &[Value], position: usize) -> Result<Amount> {
        let raw = args.get(position).ok_or_else(|| {
            Error::Validation(format!("missing amount argument at position {position}"))
        })?;
        let amount = match raw {
            Value::String(s) => Amount::parse(s)?,
            Value::Number(n) => Amount::parse(&n.to_string())?,
            other => {
                return Err(Error::Validation(format!(
                    "amount must be a string or number, got {other}"
                )))
            }
        };
        Ok(amount)
    }

    fn parse_address(args: &[Value], position: usize) -> Result<veris_common::Address> {
        let raw = args.get(position).and_then(|v| v.as_str()).ok_or_else(|| {
            Error::Validation(format!("missing address argument at position {position}"))
        })?;
        veris_common::Address::new(raw)
    }

    /// The deploy-time constructor body: mint the initial emission.
    fn deploy(&self, args: &[Value], api: &IsolateApi) -> Result<Value> {
        assert_not_child(api, "deploy")?;
        let ctx = api.state();
        if !ctx.is_deploy {
            return Err(Error::Deployment(
                "deploy can only run on the deployment transaction".into(),
            ));
        }

        let emission = match args.first() {
            Some(Value::Null) | None => Amount::zero(),
            _ => Self::parse_amount(args, 0)?,
        };
        if emission.is_positive() {
            let owner = ctx
                .deploy_state
                .as_ref()
                .map(|d| d.from.clone())
                .unwrap_or_else(|| ctx.sender.clone());
            let mut wallets = TokenRegister::over(api.store(WALLETS_STORE), WALLETS_STORE);
            wallets.deposit(&owner, &emission)?;
            Self::mint_event()?.emit(
                api,
                vec![json!(owner.as_str()), json!(emission.to_plain_string())],
            )?;
        }
        Ok(Value::Null)
    }

    fn transfer(&self, args: &[Value], api: &IsolateApi) -> Result<Value> {
        let from = api.state().effective_sender().clone();
        let to = Self::parse_address(args, 0)?;
        let amount = Self::parse_amount(args, 1)?;

        let mut wallets = TokenRegister::over(api.store(WALLETS_STORE), WALLETS_STORE);
        wallets.transfer(&from, &to, &amount)?;
        Self::transfer_event()?.emit(
            api,
            vec![
                json!(from.as_str()),
                json!(to.as_str()),
                json!(amount.to_plain_string()),
            ],
        )?;
        Ok(Value::Null)
    }

    fn mint(&self, args: &[Value], api: &IsolateApi) -> Result<Value> {
        let to = api.state().effective_sender().clone();
        assert_ownership(api, "minting available only for contract owner")?;
        if !self.definition.mintable {
            return Err(Error::Authorization("token is not mintable".into()));
        }
        let amount = Self::parse_amount(args, 0)?;
        let mut wallets = TokenRegister::over(api.store(WALLETS_STORE), WALLETS_STORE);
        wallets.deposit(&to, &amount)?;
        Self::mint_event()?.emit(
            api,
            vec![json!(to.as_str()), json!(amount.to_plain_string())],
        )?;
        Ok(Value::Null)
    }

    fn burn(&self, args: &[Value], api: &IsolateApi) -> Result<Value> {
        let from = api.state().effective_sender().clone();
        let amount = Self::parse_amount(args, 0)?;
        let mut wallets = TokenRegister::over(api.store(WALLETS_STORE), WALLETS_STORE);
        wallets.withdraw(&from, &amount)?;
        Self::burn_event()?.emit(
            api,
            vec![json!(from.as_str()), json!(amount.to_plain_string())],
        )?;
        Ok(Value::Null)
    }

    fn balance_of(&self, args: &[Value], api: &IsolateApi) -> Result<Value> {
        let address = Self::parse_address(args, 0)?;
        let wallets = TokenRegister::over(api.store(WALLETS_STORE), WALLETS_STORE);
        Ok(json!(wallets.balance_of(&address)?.to_plain_string()))
    }

    fn total_supply(&self, api: &IsolateApi) -> Result<Value> {
        let wallets = TokenRegister::over(api.store(WALLETS_STORE), WALLETS_STORE);
        Ok(json!(wallets.total_supply()?.to_plain_string()))
    }
}

impl ContractProgram for TokenProgram {
    fn manifest(&self) -> ProgramManifest {
        let mut properties = serde_json::Map::new();
        properties.insert("name".into(), json!(self.definition.name));
        properties.insert("ticker".into(), json!(self.definition.ticker));
        properties.insert("mintable".into(), json!(self.definition.mintable));
        properties.insert("type".into(), json!("token"));

        ProgramManifest {
            name: self.definition.name.clone(),
            methods: vec![
                MethodDecl::mutating("init"),
                MethodDecl::mutating("deploy"),
                MethodDecl::mutating("transfer"),
                MethodDecl::mutating("mint"),
                MethodDecl::mutating("burn"),
                MethodDecl::readonly("balanceOf"),
                MethodDecl::readonly("totalSupply"),
            ],
            capabilities: vec![
                Capability::Init,
                Capability::Deploy,
                Capability::MetadataAccessor,
            ],
            properties,
        }
    }

    fn call(&self, method: &str, args: &[Value], api: &IsolateApi) -> Result<Value> {
        match method {
            "init" => {
                // runs exactly once, at deploy time
                assert_not_child(api, "init")?;
                if api.state().is_deploy {
                    self.deploy(args, api)
                } else {
                    Err(Error::Deployment(
                        "init can only run on the deployment transaction".into(),
                    ))
                }
            }
            "deploy" => self.deploy(args, api),
            "transfer" => self.transfer(args, api),
            "mint" => self.mint(args, api),
            "burn" => self.burn(args, api),
            "balanceOf" => self.balance_of(args, api),
            "totalSupply" => self.total_supply(api),
            other => Err(Error::Validation(format!("method {other:?} not found"))),
        }
    }
}
