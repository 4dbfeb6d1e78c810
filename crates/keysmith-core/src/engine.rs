//! The cryptographic engine collaborator.
//!
//! The `Engine` trait is the only boundary this crate has. Everything that
//! touches key material or performs math lives behind it; this crate only
//! decides *whether* a call may be made and with which parameters.
//!
//! # Invariants
//!
//! Implementations MUST guarantee:
//!
//! - Authoritative keys: the descriptor, key type, extractability and usages
//!   stored in a [`Key`] are the ones the engine actually bound to the
//!   material
//! - Shape: `generate_key` returns [`GeneratedKey::Pair`] exactly for
//!   [`KeyShape::Pair`](crate::KeyShape::Pair) algorithms
//! - Format fidelity: `export_key(format, ..)` returns material tagged with
//!   `format`
//! - Isolation: no global state shared between calls

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    algorithm::AlgorithmParams,
    format::{KeyFormat, SerializedKey},
    key::{GeneratedKey, Key},
    options::OperationParams,
    usage::Usages,
};

/// Errors raised by an engine.
///
/// These are opaque to this crate: they are propagated unchanged and never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Key material is malformed for its format or algorithm.
    #[error("invalid key data: {reason}")]
    InvalidKeyData {
        /// What was wrong with the material.
        reason: String,
    },

    /// The engine does not accept this parameter combination.
    #[error("unsupported parameters: {reason}")]
    UnsupportedParameters {
        /// Which parameter was rejected.
        reason: String,
    },

    /// The requested usages are not valid for the key.
    #[error("invalid usages: {reason}")]
    InvalidUsages {
        /// Why the usage set was rejected.
        reason: String,
    },

    /// The operation itself failed (bad padding, tag mismatch, ...).
    #[error("operation failed: {reason}")]
    OperationFailed {
        /// Description of the failure.
        reason: String,
    },

    /// Hardware or backend fault.
    #[error("backend fault: {reason}")]
    Backend {
        /// Description of the fault.
        reason: String,
    },
}

impl EngineError {
    /// Human-readable reason carried by every variant.
    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidKeyData { reason }
            | Self::UnsupportedParameters { reason }
            | Self::InvalidUsages { reason }
            | Self::OperationFailed { reason }
            | Self::Backend { reason } => reason,
        }
    }
}

/// An engine performing the actual cryptography.
///
/// All methods are single-shot and may suspend while the engine computes.
/// Callers neither batch, cancel, time out nor retry them.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine-private key material stored inside each [`Key`].
    type Material: Send + Sync + 'static;

    /// Generate a key or key pair.
    async fn generate_key(
        &self,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<GeneratedKey<Self::Material>, EngineError>;

    /// Import serialized material.
    ///
    /// The key type is inferred from the material (e.g. SPKI is always
    /// public).
    async fn import_key(
        &self,
        material: SerializedKey,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<Key<Self::Material>, EngineError>;

    /// Serialize a key. Fails if the key is not extractable.
    async fn export_key(
        &self,
        format: KeyFormat,
        key: &Key<Self::Material>,
    ) -> Result<SerializedKey, EngineError>;

    /// Encrypt `data`.
    async fn encrypt(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Decrypt `data`.
    async fn decrypt(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Sign or MAC `data`.
    async fn sign(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Check `signature` over `data`.
    async fn verify(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, EngineError>;

    /// Key agreement between `private` and the peer's `public` key.
    ///
    /// `length` is in bits; `None` returns the full shared secret.
    async fn derive_bits(
        &self,
        params: &OperationParams,
        private: &Key<Self::Material>,
        public: &Key<Self::Material>,
        length: Option<u32>,
    ) -> Result<Vec<u8>, EngineError>;

    /// Wrap serialized key bytes under `wrapping_key`.
    async fn wrap(
        &self,
        params: &OperationParams,
        wrapping_key: &Key<Self::Material>,
        material: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Reverse of [`Engine::wrap`].
    async fn unwrap(
        &self,
        params: &OperationParams,
        unwrapping_key: &Key<Self::Material>,
        wrapped: &[u8],
    ) -> Result<Vec<u8>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_is_exposed_for_every_variant() {
        let errors = [
            EngineError::InvalidKeyData { reason: "a".to_string() },
            EngineError::UnsupportedParameters { reason: "a".to_string() },
            EngineError::InvalidUsages { reason: "a".to_string() },
            EngineError::OperationFailed { reason: "a".to_string() },
            EngineError::Backend { reason: "a".to_string() },
        ];

        for err in errors {
            assert_eq!(err.reason(), "a");
        }
    }

    #[test]
    fn error_display() {
        let err = EngineError::InvalidKeyData { reason: "truncated DER".to_string() };

        assert_eq!(err.to_string(), "invalid key data: truncated DER");
    }
}
