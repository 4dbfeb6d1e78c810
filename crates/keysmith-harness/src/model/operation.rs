//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest and applied to both the
//! model and the real façade. They address keys by slot: an index into the
//! table of keys created so far, wrapped around its length.

use arbitrary::Arbitrary;
use keysmith_core::{
    AesOptions, AesPurpose, AlgorithmName, AlgorithmProfile, EcOptions, EcPurpose, HmacOptions,
    KeyFormat, KeyType, KeysmithError, RsaOptions, RsaPurpose,
};

/// Index into the key table.
pub type Slot = u8;

/// Algorithm families keys are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelAlgorithm {
    /// RSA-OAEP.
    RsaOaep,
    /// RSA-PSS.
    RsaPss,
    /// ECDSA.
    Ecdsa,
    /// ECDH.
    Ecdh,
    /// AES-CTR.
    AesCtr,
    /// AES-CBC.
    AesCbc,
    /// AES-GCM.
    AesGcm,
    /// AES-KW.
    AesKw,
    /// HMAC.
    Hmac,
    /// Ed25519.
    Ed25519,
    /// X25519.
    X25519,
}

impl ModelAlgorithm {
    /// Every family.
    pub const ALL: [Self; 11] = [
        Self::RsaOaep,
        Self::RsaPss,
        Self::Ecdsa,
        Self::Ecdh,
        Self::AesCtr,
        Self::AesCbc,
        Self::AesGcm,
        Self::AesKw,
        Self::Hmac,
        Self::Ed25519,
        Self::X25519,
    ];

    /// Default profile of the family.
    pub fn profile(self) -> AlgorithmProfile {
        match self {
            Self::RsaOaep => AlgorithmProfile::rsa(RsaPurpose::Encrypting, RsaOptions::default()),
            Self::RsaPss => AlgorithmProfile::rsa(RsaPurpose::Signing, RsaOptions::default()),
            Self::Ecdsa => AlgorithmProfile::ec(EcPurpose::Signing, EcOptions::default()),
            Self::Ecdh => AlgorithmProfile::ec(EcPurpose::Encrypting, EcOptions::default()),
            Self::AesCtr => {
                AlgorithmProfile::aes(AesPurpose::VariableLengthEncryption, AesOptions::default())
            },
            Self::AesCbc => {
                AlgorithmProfile::aes(AesPurpose::FixedLengthEncryption, AesOptions::default())
            },
            Self::AesGcm => {
                AlgorithmProfile::aes(AesPurpose::IntegrityProtection, AesOptions::default())
            },
            Self::AesKw => AlgorithmProfile::aes(AesPurpose::Wrapping, AesOptions::default()),
            Self::Hmac => AlgorithmProfile::hmac(HmacOptions::default()),
            Self::Ed25519 => AlgorithmProfile::ed25519(),
            Self::X25519 => AlgorithmProfile::x25519(),
        }
    }

    /// Algorithm name keys of this family carry.
    pub fn name(self) -> AlgorithmName {
        match self {
            Self::RsaOaep => AlgorithmName::RsaOaep,
            Self::RsaPss => AlgorithmName::RsaPss,
            Self::Ecdsa => AlgorithmName::Ecdsa,
            Self::Ecdh => AlgorithmName::Ecdh,
            Self::AesCtr => AlgorithmName::AesCtr,
            Self::AesCbc => AlgorithmName::AesCbc,
            Self::AesGcm => AlgorithmName::AesGcm,
            Self::AesKw => AlgorithmName::AesKw,
            Self::Hmac => AlgorithmName::Hmac,
            Self::Ed25519 => AlgorithmName::Ed25519,
            Self::X25519 => AlgorithmName::X25519,
        }
    }
}

/// Export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelFormat {
    /// raw
    Raw,
    /// pkcs8
    Pkcs8,
    /// spki
    Spki,
    /// jwk
    Jwk,
}

impl ModelFormat {
    /// Runtime format tag.
    pub fn format(self) -> KeyFormat {
        match self {
            Self::Raw => KeyFormat::Raw,
            Self::Pkcs8 => KeyFormat::Pkcs8,
            Self::Spki => KeyFormat::Spki,
            Self::Jwk => KeyFormat::Jwk,
        }
    }
}

/// Role declared on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelRole {
    /// Public half.
    Public,
    /// Private half.
    Private,
    /// Secret key.
    Secret,
}

impl ModelRole {
    /// Runtime key type.
    pub fn key_type(self) -> KeyType {
        match self {
            Self::Public => KeyType::Public,
            Self::Private => KeyType::Private,
            Self::Secret => KeyType::Secret,
        }
    }
}

/// Operations that can be applied to the key table.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Generate a key or pair and append it (public half first).
    Generate {
        /// Family to generate.
        algorithm: ModelAlgorithm,
        /// Usage bits overriding the profile's defaults.
        usages: Option<u8>,
        /// Extractability of the secret or private key.
        extractable: bool,
    },

    /// Export a key and import the material again under `role`.
    Reimport {
        /// Key to copy.
        slot: Slot,
        /// Format to round-trip through.
        format: ModelFormat,
        /// Role declared on import.
        role: ModelRole,
    },

    /// Export a key.
    Export {
        /// Key to export.
        slot: Slot,
        /// Requested format.
        format: ModelFormat,
    },

    /// Encrypt a fixed message.
    Encrypt {
        /// Key to encrypt with.
        slot: Slot,
    },

    /// Decrypt bytes that are not a ciphertext.
    Decrypt {
        /// Key to decrypt with.
        slot: Slot,
    },

    /// Sign a fixed message.
    Sign {
        /// Key to sign with.
        slot: Slot,
    },

    /// Verify a signature that does not match.
    Verify {
        /// Key to verify with.
        slot: Slot,
    },

    /// Key agreement between two keys.
    DeriveBits {
        /// Our key.
        slot: Slot,
        /// Peer key.
        peer: Slot,
    },

    /// Wrap one key under another.
    Wrap {
        /// Key to wrap.
        slot: Slot,
        /// Wrapping key.
        wrapper: Slot,
        /// Format the wrapped key is exported in.
        format: ModelFormat,
    },
}

/// Result of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed.
    Error(OperationError),
}

/// Error classes compared between model and façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Algorithm not in the operation's allow-list, or a mismatched peer.
    UnsupportedAlgorithm,

    /// Key lacks the required usage.
    UsageDenied,

    /// Key is not extractable.
    NotExtractable,

    /// Engine rejected or failed the call.
    Engine,

    /// The key table is empty.
    NoKey,
}

impl OperationResult {
    /// Classify a façade result.
    pub fn of<T>(result: &Result<T, KeysmithError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(KeysmithError::UnsupportedAlgorithm { .. }) => {
                Self::Error(OperationError::UnsupportedAlgorithm)
            },
            Err(KeysmithError::UsageDenied { .. }) => Self::Error(OperationError::UsageDenied),
            Err(KeysmithError::NotExtractable { .. }) => {
                Self::Error(OperationError::NotExtractable)
            },
            Err(KeysmithError::Engine(_)) => Self::Error(OperationError::Engine),
        }
    }

    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Returns true for failures detected before the engine is called.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Error(
                OperationError::UnsupportedAlgorithm
                    | OperationError::UsageDenied
                    | OperationError::NotExtractable
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_profile_has_its_name() {
        for algorithm in ModelAlgorithm::ALL {
            assert_eq!(algorithm.profile().name(), algorithm.name());
        }
    }

    #[test]
    fn classification_matches_error_kinds() {
        let err: Result<(), _> =
            Err(KeysmithError::NotExtractable { algorithm: AlgorithmName::Hmac });

        assert_eq!(
            OperationResult::of(&err),
            OperationResult::Error(OperationError::NotExtractable)
        );
        assert!(OperationResult::of(&err).is_precondition());
        assert!(OperationResult::of(&Ok::<_, KeysmithError>(())).is_ok());
    }
}
