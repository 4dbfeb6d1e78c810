//! Operation Dispatcher
//!
//! Validates that a key may be used for an operation, then hands the call to
//! the engine.
//!
//! ## Validation protocol
//!
//! Every operation runs the same steps, in order:
//!
//! 1. Merge the caller's options onto a copy of the key's descriptor
//! 2. `UnsupportedAlgorithm` unless the key's algorithm is in the
//!    operation's allow-list
//! 3. `UsageDenied` unless the key's realized usages contain the usage the
//!    operation requires
//! 4. Normalize the payload to bytes
//! 5. Delegate to the engine
//!
//! Steps 2 and 3 run before any engine call. The engine is never reached
//! with a key that fails them.

use std::fmt;

use crate::{
    algorithm::AlgorithmName,
    engine::Engine,
    error::KeysmithError,
    export,
    format::{ExportFormat, SerializedKey},
    key::{Key, KeyType},
    options::{OperationOptions, OperationParams},
    profile::AlgorithmProfile,
    provision,
    usage::Usage,
};

const CIPHERS: &[AlgorithmName] = &[
    AlgorithmName::RsaOaep,
    AlgorithmName::AesCtr,
    AlgorithmName::AesCbc,
    AlgorithmName::AesGcm,
];

const SIGNERS: &[AlgorithmName] =
    &[AlgorithmName::RsaPss, AlgorithmName::Ecdsa, AlgorithmName::Hmac, AlgorithmName::Ed25519];

const AGREEMENTS: &[AlgorithmName] = &[AlgorithmName::Ecdh, AlgorithmName::X25519];

const WRAPPERS: &[AlgorithmName] = &[
    AlgorithmName::RsaOaep,
    AlgorithmName::AesCtr,
    AlgorithmName::AesCbc,
    AlgorithmName::AesGcm,
    AlgorithmName::AesKw,
];

const PAIRED: &[AlgorithmName] = &[
    AlgorithmName::RsaOaep,
    AlgorithmName::RsaPss,
    AlgorithmName::Ecdsa,
    AlgorithmName::Ecdh,
    AlgorithmName::Ed25519,
    AlgorithmName::X25519,
];

const SYMMETRIC: &[AlgorithmName] = &[
    AlgorithmName::AesCtr,
    AlgorithmName::AesCbc,
    AlgorithmName::AesGcm,
    AlgorithmName::AesKw,
    AlgorithmName::Hmac,
];

/// Operations subject to validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Encrypt data.
    Encrypt,
    /// Decrypt data.
    Decrypt,
    /// Sign data.
    Sign,
    /// Verify a signature.
    Verify,
    /// Derive raw bits by key agreement.
    DeriveBits,
    /// Derive a key by key agreement.
    DeriveKey,
    /// Wrap a key.
    WrapKey,
    /// Unwrap a key.
    UnwrapKey,
    /// Generate an asymmetric pair.
    GenerateKeyPair,
    /// Generate a symmetric key.
    GenerateSecretKey,
}

impl Operation {
    /// Algorithms a key may have for this operation.
    pub const fn allowed_algorithms(self) -> &'static [AlgorithmName] {
        match self {
            Self::Encrypt | Self::Decrypt => CIPHERS,
            Self::Sign | Self::Verify => SIGNERS,
            Self::DeriveBits | Self::DeriveKey => AGREEMENTS,
            Self::WrapKey | Self::UnwrapKey => WRAPPERS,
            Self::GenerateKeyPair => PAIRED,
            Self::GenerateSecretKey => SYMMETRIC,
        }
    }

    /// Usage the key must carry, if any.
    pub const fn required_usage(self) -> Option<Usage> {
        match self {
            Self::Encrypt => Some(Usage::Encrypt),
            Self::Decrypt => Some(Usage::Decrypt),
            Self::Sign => Some(Usage::Sign),
            Self::Verify => Some(Usage::Verify),
            Self::DeriveBits => Some(Usage::DeriveBits),
            Self::DeriveKey => Some(Usage::DeriveKey),
            Self::WrapKey => Some(Usage::WrapKey),
            Self::UnwrapKey => Some(Usage::UnwrapKey),
            Self::GenerateKeyPair | Self::GenerateSecretKey => None,
        }
    }

    /// Returns true if `algorithm` is in the allow-list.
    pub fn permits(self, algorithm: AlgorithmName) -> bool {
        self.allowed_algorithms().contains(&algorithm)
    }

    /// Canonical name string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::DeriveBits => "deriveBits",
            Self::DeriveKey => "deriveKey",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
            Self::GenerateKeyPair => "generateKeyPair",
            Self::GenerateSecretKey => "generateSecretKey",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data handed to an operation.
///
/// Text is normalized to its UTF-8 bytes; bytes pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Textual input.
    Text(&'a str),
    /// Binary input.
    Bytes(&'a [u8]),
}

impl<'a> Payload<'a> {
    /// Canonical binary encoding.
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for Payload<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::Bytes(bytes)
    }
}

/// Steps 1 to 3 of the validation protocol.
///
/// # Errors
///
/// `UnsupportedAlgorithm` or `UsageDenied`.
pub fn authorize<M>(
    operation: Operation,
    key: &Key<M>,
    options: &OperationOptions,
) -> Result<OperationParams, KeysmithError> {
    let params = options.merge_onto(key.algorithm());
    let algorithm = key.name();

    if !operation.permits(algorithm) {
        tracing::warn!(%algorithm, %operation, "algorithm not allowed for operation");
        return Err(KeysmithError::UnsupportedAlgorithm { algorithm, operation });
    }

    if let Some(usage) = operation.required_usage() {
        if !key.allows(usage) {
            tracing::warn!(%algorithm, %operation, %usage, usages = %key.usages(), "usage denied");
            return Err(KeysmithError::UsageDenied { usage, algorithm });
        }
    }

    Ok(params)
}

/// Encrypt `payload` with `key`.
///
/// # Errors
///
/// Validation failures, or the engine's error.
pub async fn encrypt<'a, E: Engine>(
    engine: &E,
    key: &Key<E::Material>,
    options: &OperationOptions,
    payload: impl Into<Payload<'a>>,
) -> Result<Vec<u8>, KeysmithError> {
    let params = authorize(Operation::Encrypt, key, options)?;
    let data = payload.into().as_bytes();

    tracing::debug!(algorithm = %key.name(), len = data.len(), "encrypt");
    Ok(engine.encrypt(&params, key, data).await?)
}

/// Decrypt `payload` with `key`.
///
/// # Errors
///
/// Validation failures, or the engine's error.
pub async fn decrypt<'a, E: Engine>(
    engine: &E,
    key: &Key<E::Material>,
    options: &OperationOptions,
    payload: impl Into<Payload<'a>>,
) -> Result<Vec<u8>, KeysmithError> {
    let params = authorize(Operation::Decrypt, key, options)?;
    let data = payload.into().as_bytes();

    tracing::debug!(algorithm = %key.name(), len = data.len(), "decrypt");
    Ok(engine.decrypt(&params, key, data).await?)
}

/// Sign `payload` with `key`.
///
/// # Errors
///
/// Validation failures, or the engine's error.
pub async fn sign<'a, E: Engine>(
    engine: &E,
    key: &Key<E::Material>,
    options: &OperationOptions,
    payload: impl Into<Payload<'a>>,
) -> Result<Vec<u8>, KeysmithError> {
    let params = authorize(Operation::Sign, key, options)?;
    let data = payload.into().as_bytes();

    tracing::debug!(algorithm = %key.name(), len = data.len(), "sign");
    Ok(engine.sign(&params, key, data).await?)
}

/// Verify `signature` over `payload` with `key`.
///
/// A signature that does not match is `Ok(false)`, not an error.
///
/// # Errors
///
/// Validation failures, or the engine's error.
pub async fn verify<'a, E: Engine>(
    engine: &E,
    key: &Key<E::Material>,
    options: &OperationOptions,
    signature: &[u8],
    payload: impl Into<Payload<'a>>,
) -> Result<bool, KeysmithError> {
    let params = authorize(Operation::Verify, key, options)?;
    let data = payload.into().as_bytes();

    tracing::debug!(algorithm = %key.name(), len = data.len(), "verify");
    Ok(engine.verify(&params, key, signature, data).await?)
}

/// The peer of a key agreement must be a public key of the same algorithm.
fn check_peer<M>(
    operation: Operation,
    private: &Key<M>,
    public: &Key<M>,
) -> Result<(), KeysmithError> {
    if public.key_type() != KeyType::Public || public.name() != private.name() {
        tracing::warn!(
            algorithm = %private.name(),
            peer = %public.name(),
            peer_type = %public.key_type(),
            "peer key does not match"
        );
        return Err(KeysmithError::UnsupportedAlgorithm { algorithm: public.name(), operation });
    }
    Ok(())
}

/// Derive `length` bits (or the full shared secret) from `private` and the
/// peer's `public` key.
///
/// # Errors
///
/// Validation failures on `private`, `UnsupportedAlgorithm` for a peer that
/// is not a public key of the same algorithm, or the engine's error.
pub async fn derive_bits<E: Engine>(
    engine: &E,
    private: &Key<E::Material>,
    public: &Key<E::Material>,
    length: Option<u32>,
) -> Result<Vec<u8>, KeysmithError> {
    let params = authorize(Operation::DeriveBits, private, &OperationOptions::default())?;
    check_peer(Operation::DeriveBits, private, public)?;

    tracing::debug!(algorithm = %private.name(), ?length, "deriveBits");
    Ok(engine.derive_bits(&params, private, public, length).await?)
}

/// Derive a secret key for `derived` from `private` and the peer's `public`
/// key.
///
/// # Errors
///
/// As [`derive_bits`], plus `UnsupportedAlgorithm` when `derived` is not a
/// symmetric profile.
pub async fn derive_key<E: Engine>(
    engine: &E,
    private: &Key<E::Material>,
    public: &Key<E::Material>,
    derived: &AlgorithmProfile,
) -> Result<Key<E::Material>, KeysmithError> {
    let params = authorize(Operation::DeriveKey, private, &OperationOptions::default())?;
    check_peer(Operation::DeriveKey, private, public)?;

    let Some(length) = derived.algorithm().secret_length_bits() else {
        return Err(KeysmithError::UnsupportedAlgorithm {
            algorithm: derived.name(),
            operation: Operation::DeriveKey,
        });
    };

    tracing::debug!(algorithm = %private.name(), derived = %derived.algorithm(), "deriveKey");
    let bits = engine.derive_bits(&params, private, public, Some(length)).await?;

    provision::import_serialized(engine, KeyType::Secret, SerializedKey::Raw(bits), derived, None)
        .await
}

/// Export `key` in `format` and wrap it under `wrapping_key`.
///
/// JWK material is wrapped as its JSON encoding.
///
/// # Errors
///
/// Validation failures on `wrapping_key`, `NotExtractable` for `key`, or the
/// engine's error.
pub async fn wrap_key<E: Engine, F: ExportFormat>(
    engine: &E,
    _format: F,
    key: &Key<E::Material>,
    wrapping_key: &Key<E::Material>,
    options: &OperationOptions,
) -> Result<Vec<u8>, KeysmithError> {
    let params = authorize(Operation::WrapKey, wrapping_key, options)?;

    let material = export::export_serialized(engine, F::FORMAT, key).await?.into_bytes()?;

    tracing::debug!(algorithm = %wrapping_key.name(), wrapped = %key.name(), "wrapKey");
    Ok(engine.wrap(&params, wrapping_key, &material).await?)
}

/// Unwrap `wrapped` with `unwrapping_key` and import the result as a key of
/// `profile`, in the role `role`.
///
/// # Errors
///
/// Validation failures on `unwrapping_key`, or the engine's error (including
/// unwrapped bytes that are not valid material for `format`).
pub async fn unwrap_key<E: Engine, F: ExportFormat>(
    engine: &E,
    _format: F,
    wrapped: &[u8],
    unwrapping_key: &Key<E::Material>,
    options: &OperationOptions,
    role: KeyType,
    profile: &AlgorithmProfile,
) -> Result<Key<E::Material>, KeysmithError> {
    let params = authorize(Operation::UnwrapKey, unwrapping_key, options)?;

    tracing::debug!(algorithm = %unwrapping_key.name(), unwrapped = %profile.name(), "unwrapKey");
    let bytes = engine.unwrap(&params, unwrapping_key, wrapped).await?;
    let material = SerializedKey::from_bytes(F::FORMAT, bytes)?;

    provision::import_serialized(engine, role, material, profile, None).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        algorithm::{AlgorithmParams, HashAlgorithm, HmacParams},
        usage::Usages,
    };

    fn hmac_key(usages: Usages) -> Key<()> {
        Key::new(
            AlgorithmParams::Hmac(HmacParams { hash: HashAlgorithm::Sha256, length: None }),
            KeyType::Secret,
            true,
            usages,
            (),
        )
    }

    #[test]
    fn allow_lists() {
        for name in [
            AlgorithmName::RsaOaep,
            AlgorithmName::AesCtr,
            AlgorithmName::AesCbc,
            AlgorithmName::AesGcm,
        ] {
            assert!(Operation::Encrypt.permits(name));
            assert!(Operation::Decrypt.permits(name));
            assert!(!Operation::Sign.permits(name));
        }

        for name in
            [AlgorithmName::RsaPss, AlgorithmName::Ecdsa, AlgorithmName::Hmac, AlgorithmName::Ed25519]
        {
            assert!(Operation::Sign.permits(name));
            assert!(Operation::Verify.permits(name));
            assert!(!Operation::Encrypt.permits(name));
        }

        assert!(!Operation::Encrypt.permits(AlgorithmName::AesKw));
        assert!(Operation::WrapKey.permits(AlgorithmName::AesKw));
        assert!(Operation::DeriveBits.permits(AlgorithmName::X25519));
    }

    #[test]
    fn generation_allow_lists_follow_key_shape() {
        for name in AlgorithmName::ALL {
            let pair = name.key_shape() == crate::key::KeyShape::Pair;

            assert_eq!(Operation::GenerateKeyPair.permits(name), pair);
            assert_eq!(Operation::GenerateSecretKey.permits(name), !pair);
        }
    }

    #[test]
    fn hmac_key_cannot_encrypt() {
        let key = hmac_key(Usages::SIGN | Usages::VERIFY);

        let result = authorize(Operation::Encrypt, &key, &OperationOptions::default());

        assert_eq!(
            result.unwrap_err(),
            KeysmithError::UnsupportedAlgorithm {
                algorithm: AlgorithmName::Hmac,
                operation: Operation::Encrypt
            }
        );
    }

    #[test]
    fn missing_usage_is_denied() {
        let key = hmac_key(Usages::VERIFY);

        let result = authorize(Operation::Sign, &key, &OperationOptions::default());

        assert_eq!(
            result.unwrap_err(),
            KeysmithError::UsageDenied { usage: Usage::Sign, algorithm: AlgorithmName::Hmac }
        );
    }

    #[test]
    fn algorithm_is_checked_before_usage() {
        let key = hmac_key(Usages::empty());

        let result = authorize(Operation::Decrypt, &key, &OperationOptions::default());

        assert!(matches!(result, Err(KeysmithError::UnsupportedAlgorithm { .. })));
    }

    #[test]
    fn authorized_params_keep_key_descriptor() {
        let key = hmac_key(Usages::SIGN);
        let options = OperationOptions::new().with_hash(HashAlgorithm::Sha512);

        let params = authorize(Operation::Sign, &key, &options).unwrap();

        assert_eq!(params.algorithm(), key.algorithm());
        assert_eq!(params.hash(), HashAlgorithm::Sha256);
    }

    #[test]
    fn payload_normalization() {
        let text = String::from("Hello World!");
        let bytes = vec![0xFF, 0x00];

        assert_eq!(Payload::from("Hello World!").as_bytes(), b"Hello World!");
        assert_eq!(Payload::from(&text).as_bytes(), text.as_bytes());
        assert_eq!(Payload::from(&bytes).as_bytes(), &[0xFF, 0x00]);
        assert_eq!(Payload::from(b"raw").as_bytes(), b"raw");
    }

    #[test]
    fn peer_must_be_public_and_same_algorithm() {
        let x25519 = |key_type| {
            Key::new(AlgorithmParams::X25519, key_type, true, Usages::DERIVE_BITS, ())
        };
        let private = x25519(KeyType::Private);

        assert!(check_peer(Operation::DeriveBits, &private, &x25519(KeyType::Public)).is_ok());
        assert!(check_peer(Operation::DeriveBits, &private, &x25519(KeyType::Private)).is_err());

        let ed = Key::new(AlgorithmParams::Ed25519, KeyType::Public, true, Usages::VERIFY, ());
        assert!(matches!(
            check_peer(Operation::DeriveBits, &private, &ed),
            Err(KeysmithError::UnsupportedAlgorithm { algorithm: AlgorithmName::Ed25519, .. })
        ));
    }
}
