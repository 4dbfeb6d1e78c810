//! Error taxonomy.

use thiserror::Error;

use crate::{
    algorithm::AlgorithmName, dispatch::Operation, engine::EngineError, usage::Usage,
};

/// Errors from profile, provisioning, dispatch and export operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeysmithError {
    /// The key's algorithm is not in the operation's allow-list.
    #[error("{algorithm} keys cannot be used for {operation}")]
    UnsupportedAlgorithm {
        /// Algorithm of the offending key.
        algorithm: AlgorithmName,
        /// Operation that was requested.
        operation: Operation,
    },

    /// The key was not created with the usage the operation requires.
    #[error("{algorithm} key lacks the {usage} usage")]
    UsageDenied {
        /// Usage the operation requires.
        usage: Usage,
        /// Algorithm of the offending key.
        algorithm: AlgorithmName,
    },

    /// Export was requested for a non-extractable key.
    #[error("{algorithm} key is not extractable")]
    NotExtractable {
        /// Algorithm of the offending key.
        algorithm: AlgorithmName,
    },

    /// The engine rejected or failed the call.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),
}

impl KeysmithError {
    /// Returns true for failures detected locally before any engine call.
    ///
    /// Precondition failures depend only on the key and the request, so
    /// repeating the call unchanged fails the same way.
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::UnsupportedAlgorithm { .. }
            | Self::UsageDenied { .. }
            | Self::NotExtractable { .. } => true,

            Self::Engine(_) => false,
        }
    }

    /// The engine error, if this is one.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_failures_are_preconditions() {
        let err = KeysmithError::UsageDenied { usage: Usage::Sign, algorithm: AlgorithmName::Hmac };
        assert!(err.is_precondition());

        let err = KeysmithError::NotExtractable { algorithm: AlgorithmName::AesKw };
        assert!(err.is_precondition());
    }

    #[test]
    fn engine_failures_are_not_preconditions() {
        let err = KeysmithError::from(EngineError::Backend { reason: "device lost".to_string() });

        assert!(!err.is_precondition());
        assert_eq!(err.engine_error().map(EngineError::reason), Some("device lost"));
    }

    #[test]
    fn error_display() {
        let err = KeysmithError::UnsupportedAlgorithm {
            algorithm: AlgorithmName::Hmac,
            operation: Operation::Encrypt,
        };
        assert_eq!(err.to_string(), "HMAC keys cannot be used for encrypt");

        let err =
            KeysmithError::UsageDenied { usage: Usage::Sign, algorithm: AlgorithmName::RsaPss };
        assert_eq!(err.to_string(), "RSA-PSS key lacks the sign usage");
    }
}
