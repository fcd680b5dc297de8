//! State cache error types.

use std::fmt;

use crate::backend::BackendError;
use crate::types::SlotKind;

/// Errors that can occur in the binding and streaming layer.
///
/// Every variant except [`StateError::Backend`] describes a violated calling
/// contract. They are never retried internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A null, uncreated, destroyed or foreign resource was passed in.
    InvalidArgument(String),
    /// A slot operation was requested for a kind without a registered table.
    UnsupportedTarget(SlotKind),
    /// The operation was invoked in the wrong context state.
    InvalidOperation(String),
    /// A hard device limit was reached.
    ResourceExhausted(String),
    /// The device backend reported a failure.
    Backend(BackendError),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::UnsupportedTarget(kind) => {
                write!(f, "unsupported target: no slot table registered for {kind:?}")
            }
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
            Self::Backend(err) => write!(f, "device error: {err}"),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for StateError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = StateError::InvalidArgument("resource not created".to_string());
        assert_eq!(err.to_string(), "invalid argument: resource not created");

        let err = StateError::UnsupportedTarget(SlotKind::ShaderStorage);
        assert_eq!(
            err.to_string(),
            "unsupported target: no slot table registered for ShaderStorage"
        );
    }

    #[test]
    fn test_backend_error_source() {
        let err: StateError = BackendError::OutOfMemory.into();
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "device error: out of device memory");
    }
}
