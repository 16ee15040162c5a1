//! Sandbox failure classification.

use thiserror::Error;
use veris_common::{Error as CoreError, ResourceKind};

/// Why a sandboxed invocation died.
///
/// Any of these terminates the isolate: the sandbox is poisoned, nothing
/// is resumable, and the invocation's storage overlay is rolled back by
/// the dispatcher. The first two variants are resource exhaustion and are
/// surfaced distinctly from business-logic rejections.
#[derive(Debug, Clone, Error)]
pub enum ExecutionFailure {
    /// The memory ceiling was breached.
    #[error("ram limit exceeded: used {used} of {limit} bytes")]
    RamExceeded {
        /// Bytes accounted when the ceiling broke.
        used: u64,
        /// The configured ceiling.
        limit: u64,
    },

    /// The wall-clock limit elapsed before the program finished.
    #[error("time limit exceeded: {limit_ms} ms")]
    TimeExceeded {
        /// The configured limit in milliseconds.
        limit_ms: u64,
    },

    /// The program handle could not be produced (unknown code hash,
    /// invalid manifest).
    #[error("compile failed: {0}")]
    Compile(String),

    /// The program raised. Carries the original platform error so the
    /// taxonomy survives the isolation boundary.
    #[error("runtime failure: {0}")]
    Runtime(#[source] CoreError),
}

impl ExecutionFailure {
    /// Fold into the platform error taxonomy for surfacing to callers.
    pub fn into_error(self) -> CoreError {
        match self {
            ExecutionFailure::RamExceeded { used, limit } => CoreError::resource(
                ResourceKind::Ram,
                format!("used {used} of {limit} bytes"),
            ),
            ExecutionFailure::TimeExceeded { limit_ms } => {
                CoreError::resource(ResourceKind::Time, format!("limit {limit_ms} ms"))
            }
            ExecutionFailure::Compile(message) => CoreError::Deployment(message),
            ExecutionFailure::Runtime(error) => error,
        }
    }

    /// True for the sandbox-fatal resource variants.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            ExecutionFailure::RamExceeded { .. } | ExecutionFailure::TimeExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        let ram = ExecutionFailure::RamExceeded { used: 10, limit: 8 };
        assert!(ram.into_error().is_resource_exhaustion());

        let runtime = ExecutionFailure::Runtime(CoreError::InsufficientFunds("w:alice".into()));
        assert_eq!(
            runtime.into_error(),
            CoreError::InsufficientFunds("w:alice".into())
        );

        let compile = ExecutionFailure::Compile("unknown code hash".into());
        assert!(matches!(compile.into_error(), CoreError::Deployment(_)));
    }
}
