//! Explicit program registry keyed by code hash.
//!
//! Deployment refers to contract code by hash; the registry maps each
//! hash to a factory producing instances of the program. Registration
//! validates the program's manifest, so a handle obtained later from
//! [`crate::Sandbox::compile`] is already known to carry the full
//! lifecycle capability set.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::info;
use veris_common::{Error, Result};

use crate::program::{ContractProgram, ProgramManifest};

/// Hash contract code bytes into the registry key format.
pub fn code_hash(code: &[u8]) -> String {
    hex::encode(Sha256::digest(code))
}

/// Produces program instances for the sandbox.
pub trait ProgramFactory: Send + Sync {
    /// Instantiate a fresh program.
    fn instantiate(&self) -> Box<dyn ContractProgram>;
}

impl<F> ProgramFactory for F
where
    F: Fn() -> Box<dyn ContractProgram> + Send + Sync,
{
    fn instantiate(&self) -> Box<dyn ContractProgram> {
        self()
    }
}

/// The installed contract programs, keyed by code hash.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: RwLock<HashMap<String, Arc<dyn ProgramFactory>>>,
}

impl ProgramRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a program under `hash`.
    ///
    /// A probe instance is built and its manifest validated; registration
    /// fails for programs with an incomplete capability set or an
    /// inconsistent method table. Re-registering a hash is rejected
    /// because deployed code is immutable.
    pub fn register(&self, hash: &str, factory: Arc<dyn ProgramFactory>) -> Result<ProgramManifest> {
        let manifest = factory.instantiate().manifest();
        manifest.validate()?;

        let mut programs = self.programs.write();
        if programs.contains_key(hash) {
            return Err(Error::Deployment(format!(
                "code hash {hash} is already registered"
            )));
        }
        programs.insert(hash.to_string(), factory);
        info!(program = %manifest.name, %hash, "registered contract program");
        Ok(manifest)
    }

    /// Look up the factory for `hash`.
    pub fn lookup(&self, hash: &str) -> Option<Arc<dyn ProgramFactory>> {
        self.programs.read().get(hash).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Capability, MethodDecl};
    use crate::IsolateApi;
    use serde_json::{Map, Value};

    struct Probe;

    impl ContractProgram for Probe {
        fn manifest(&self) -> ProgramManifest {
            ProgramManifest {
                name: "probe".into(),
                methods: vec![MethodDecl::mutating("init")],
                capabilities: vec![
                    Capability::Init,
                    Capability::Deploy,
                    Capability::MetadataAccessor,
                ],
                properties: Map::new(),
            }
        }

        fn call(&self, _method: &str, _args: &[Value], _api: &IsolateApi) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn probe_factory() -> Arc<dyn ProgramFactory> {
        Arc::new(|| Box::new(Probe) as Box<dyn ContractProgram>)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ProgramRegistry::new();
        let hash = code_hash(b"probe-source");
        let manifest = registry.register(&hash, probe_factory()).unwrap();
        assert_eq!(manifest.name, "probe");
        assert!(registry.lookup(&hash).is_some());
        assert!(registry.lookup("unknown").is_none());
    }

    #[test]
    fn test_reregistration_rejected() {
        let registry = ProgramRegistry::new();
        let hash = code_hash(b"probe-source");
        registry.register(&hash, probe_factory()).unwrap();
        assert!(matches!(
            registry.register(&hash, probe_factory()),
            Err(Error::Deployment(_))
        ));
    }

    #[test]
    fn test_code_hash_is_stable() {
        assert_eq!(code_hash(b"x"), code_hash(b"x"));
        assert_ne!(code_hash(b"x"), code_hash(b"y"));
        assert_eq!(code_hash(b"x").len(), 64);
    }
}
