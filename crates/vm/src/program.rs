//! The contract program ABI and its declared manifest.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use veris_common::{Error, Result};

use crate::bridge::IsolateApi;

/// Capabilities a program declares at registration.
///
/// The registry validates a program's declared set instead of trusting
/// inheritance: a handle is only produced for programs that carry the
/// full lifecycle surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    /// The program implements the one-time `init` entry point.
    Init,
    /// The program implements the deploy-time constructor body.
    Deploy,
    /// The program exposes its metadata properties for
    /// `getContractProperty` reads.
    MetadataAccessor,
}

/// A method a program exposes across the isolation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    /// Member name resolved by `invoke("contract.<name>")`.
    pub name: String,
    /// True for methods that mutate state and therefore only make sense
    /// in a deploy call.
    pub mutates: bool,
}

impl MethodDecl {
    /// A state-mutating method.
    pub fn mutating(name: &str) -> Self {
        MethodDecl {
            name: name.to_string(),
            mutates: true,
        }
    }

    /// A read-only method.
    pub fn readonly(name: &str) -> Self {
        MethodDecl {
            name: name.to_string(),
            mutates: false,
        }
    }
}

/// What a program declares about itself.
///
/// The `properties` map is the contract metadata surface (`name`,
/// `ticker`, `owner`, `mintable`, ...) readable without invoking a
/// method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramManifest {
    /// Program name, used in contract address derivation.
    pub name: String,
    /// Methods reachable through `invoke`.
    pub methods: Vec<MethodDecl>,
    /// Declared capability set, validated at registration.
    pub capabilities: Vec<Capability>,
    /// Declared metadata properties.
    pub properties: Map<String, Value>,
}

impl ProgramManifest {
    /// Look up a declared method.
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// True when the capability set contains `cap`.
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Validate the declaration.
    ///
    /// Deployable programs must carry the whole lifecycle capability set
    /// and a consistent method table.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Validation("program name cannot be empty".into()));
        }
        for required in [Capability::Init, Capability::Deploy, Capability::MetadataAccessor] {
            if !self.has_capability(required) {
                return Err(Error::Validation(format!(
                    "program {:?} is missing the {required:?} capability",
                    self.name
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for method in &self.methods {
            if method.name.is_empty() {
                return Err(Error::Validation(format!(
                    "program {:?} declares an unnamed method",
                    self.name
                )));
            }
            if !seen.insert(method.name.as_str()) {
                return Err(Error::Validation(format!(
                    "program {:?} declares method {:?} twice",
                    self.name, method.name
                )));
            }
        }
        if self.method("init").is_none() {
            return Err(Error::Validation(format!(
                "program {:?} does not declare init",
                self.name
            )));
        }
        Ok(())
    }
}

/// A contract program: the code the sandbox runs.
///
/// Programs hold no mutable state of their own; everything persistent
/// goes through the storage handles on [`IsolateApi`], and everything
/// contextual comes from the threaded [`crate::CallContext`]. The sandbox
/// may instantiate a program many times and call it from worker threads.
pub trait ContractProgram: Send + Sync {
    /// The program's declaration.
    fn manifest(&self) -> ProgramManifest;

    /// Execute one method. `args` arrive by value-copy from across the
    /// boundary; the returned value crosses back the same way.
    fn call(&self, method: &str, args: &[Value], api: &IsolateApi) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ProgramManifest {
        ProgramManifest {
            name: "token".into(),
            methods: vec![MethodDecl::mutating("init"), MethodDecl::readonly("balanceOf")],
            capabilities: vec![Capability::Init, Capability::Deploy, Capability::MetadataAccessor],
            properties: Map::new(),
        }
    }

    #[test]
    fn test_valid_manifest_passes() {
        assert!(manifest().validate().is_ok());
    }

    #[test]
    fn test_missing_capability_rejected() {
        let mut m = manifest();
        m.capabilities = vec![Capability::Init];
        assert!(matches!(m.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let mut m = manifest();
        m.methods.push(MethodDecl::readonly("balanceOf"));
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_missing_init_rejected() {
        let mut m = manifest();
        m.methods.retain(|d| d.name != "init");
        assert!(m.validate().is_err());
    }
}
