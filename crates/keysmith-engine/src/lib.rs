//! Keysmith Engine
//!
//! [`SoftEngine`] is the production [`Engine`]: it adapts audited RustCrypto
//! and dalek implementations to the keysmith key model. No primitive is
//! implemented here.
//!
//! | Family | Formats |
//! |---|---|
//! | RSA-OAEP, RSA-PSS (SHA-256/384/512) | pkcs8, spki, jwk |
//! | ECDSA, ECDH (P-256) | raw (public), pkcs8, spki, jwk |
//! | Ed25519 | raw (public), pkcs8, spki, jwk |
//! | X25519 | raw (public), jwk |
//! | AES-CTR, AES-CBC, AES-GCM, AES-KW | raw, jwk |
//! | HMAC | raw, jwk |
//!
//! Key types are inferred from material: SPKI and raw asymmetric keys are
//! public, PKCS#8 is private, JWKs are private when they carry `d`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use async_trait::async_trait;
use keysmith_core::{
    AlgorithmName, AlgorithmParams, EcScheme, Engine, EngineError, GeneratedKey, HashAlgorithm,
    HmacParams, Key, KeyFormat, KeyPair, KeyType, OperationParams, RsaScheme, SerializedKey,
    Usages,
};
use sha2::Digest;

/// Run `$body` with `$d` bound to the `sha2` type for `$hash`.
macro_rules! with_digest {
    ($hash:expr, $d:ident => $body:expr) => {
        match $hash {
            keysmith_core::HashAlgorithm::Sha256 => {
                type $d = sha2::Sha256;
                $body
            },
            keysmith_core::HashAlgorithm::Sha384 => {
                type $d = sha2::Sha384;
                $body
            },
            keysmith_core::HashAlgorithm::Sha512 => {
                type $d = sha2::Sha512;
                $body
            },
        }
    };
}
pub(crate) use with_digest;

mod codec;
mod ec_keys;
mod material;
mod okp_keys;
mod rsa_keys;
mod symmetric;

pub use material::SoftMaterial;

use crate::codec::{check_for_key_type, check_jwk_metadata, check_supported, split_pair_usages};

/// Digest of `data`.
pub(crate) fn digest(hash: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    with_digest!(hash, D => D::digest(data).to_vec())
}

/// Engine limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftEngineConfig {
    /// Smallest RSA modulus generated, in bits.
    pub min_rsa_modulus_bits: u32,
    /// Largest RSA modulus generated, in bits.
    pub max_rsa_modulus_bits: u32,
    /// Generate RSA keys on tokio's blocking pool when a runtime is present.
    pub offload_blocking: bool,
}

impl Default for SoftEngineConfig {
    fn default() -> Self {
        Self { min_rsa_modulus_bits: 1024, max_rsa_modulus_bits: 4096, offload_blocking: true }
    }
}

/// Production engine over RustCrypto and dalek.
///
/// Stateless apart from its configuration; clones are interchangeable.
#[derive(Debug, Clone, Default)]
pub struct SoftEngine {
    config: SoftEngineConfig,
}

impl SoftEngine {
    /// Engine with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with explicit limits.
    #[must_use]
    pub fn with_config(config: SoftEngineConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &SoftEngineConfig {
        &self.config
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    {
        if !self.config.offload_blocking || tokio::runtime::Handle::try_current().is_err() {
            return work();
        }

        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| {
                tracing::error!("blocking task failed: {}", e);
                EngineError::Backend { reason: format!("blocking task failed: {e}") }
            })?
    }
}

type SoftKey = Key<SoftMaterial>;

fn unsupported(reason: impl Into<String>) -> EngineError {
    EngineError::UnsupportedParameters { reason: reason.into() }
}

/// Public halves of generated pairs are always extractable.
fn pair(
    algorithm: AlgorithmParams,
    extractable: bool,
    usages: Usages,
    public: SoftMaterial,
    private: SoftMaterial,
) -> Result<GeneratedKey<SoftMaterial>, EngineError> {
    let (public_usages, private_usages) = split_pair_usages(algorithm.name(), usages)?;

    Ok(GeneratedKey::Pair(KeyPair {
        public: Key::new(algorithm, KeyType::Public, true, public_usages, public),
        private: Key::new(algorithm, KeyType::Private, extractable, private_usages, private),
    }))
}

fn secret(
    algorithm: AlgorithmParams,
    extractable: bool,
    usages: Usages,
    bytes: &[u8],
) -> Result<GeneratedKey<SoftMaterial>, EngineError> {
    check_for_key_type(algorithm.name(), KeyType::Secret, usages)?;
    Ok(GeneratedKey::Secret(Key::new(
        algorithm,
        KeyType::Secret,
        extractable,
        usages,
        SoftMaterial::secret(bytes),
    )))
}

#[async_trait]
impl Engine for SoftEngine {
    type Material = SoftMaterial;

    async fn generate_key(
        &self,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<GeneratedKey<SoftMaterial>, EngineError> {
        check_supported(algorithm.name(), usages)?;

        let generated = match algorithm {
            AlgorithmParams::RsaHashed(params) => {
                rsa_keys::check_generation(params, &self.config)?;
                let requested = *params;
                let private = self.run_blocking(move || rsa_keys::generate(&requested)).await?;
                let descriptor = AlgorithmParams::RsaHashed(rsa_keys::describe(&private, params));
                let public = private.to_public_key();
                pair(
                    descriptor,
                    extractable,
                    usages,
                    SoftMaterial::RsaPublic(public),
                    SoftMaterial::RsaPrivate(private),
                )?
            },
            AlgorithmParams::Ec(params) => {
                ec_keys::check_curve(params)?;
                let private = ec_keys::generate();
                let public = private.public_key();
                pair(
                    *algorithm,
                    extractable,
                    usages,
                    SoftMaterial::EcPublic(public),
                    SoftMaterial::EcPrivate(private),
                )?
            },
            AlgorithmParams::Ed25519 => {
                let private = okp_keys::generate_ed25519();
                let public = private.verifying_key();
                pair(
                    *algorithm,
                    extractable,
                    usages,
                    SoftMaterial::Ed25519Public(public),
                    SoftMaterial::Ed25519Private(private),
                )?
            },
            AlgorithmParams::X25519 => {
                let private = okp_keys::generate_x25519();
                let public = x25519_dalek::PublicKey::from(&private);
                pair(
                    *algorithm,
                    extractable,
                    usages,
                    SoftMaterial::X25519Public(public),
                    SoftMaterial::X25519Private(private),
                )?
            },
            AlgorithmParams::Aes(params) => {
                symmetric::check_aes_length(params.length)?;
                let bytes = zeroize::Zeroizing::new(symmetric::random_bytes(params.length as usize / 8)?);
                secret(*algorithm, extractable, usages, &bytes)?
            },
            AlgorithmParams::Hmac(params) => {
                let len = symmetric::hmac_key_len(params)?;
                let bytes = zeroize::Zeroizing::new(symmetric::random_bytes(len)?);
                let descriptor = AlgorithmParams::Hmac(HmacParams {
                    length: u32::try_from(len * 8).ok(),
                    ..*params
                });
                secret(descriptor, extractable, usages, &bytes)?
            },
        };

        tracing::debug!(algorithm = %algorithm, shape = %generated.shape(), "generated key");
        Ok(generated)
    }

    async fn import_key(
        &self,
        material: SerializedKey,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<SoftKey, EngineError> {
        let name = algorithm.name();
        check_supported(name, usages)?;
        if let SerializedKey::Jwk(jwk) = &material {
            check_jwk_metadata(jwk, extractable, usages)?;
        }
        let format = material.format();

        let (material, descriptor) = match algorithm {
            AlgorithmParams::RsaHashed(params) => {
                let (material, params) = rsa_keys::import(material, params)?;
                (material, AlgorithmParams::RsaHashed(params))
            },
            AlgorithmParams::Ec(params) => {
                ec_keys::check_curve(params)?;
                (ec_keys::import(material)?, *algorithm)
            },
            AlgorithmParams::Ed25519 => (okp_keys::import_ed25519(material)?, *algorithm),
            AlgorithmParams::X25519 => (okp_keys::import_x25519(material)?, *algorithm),
            AlgorithmParams::Aes(params) => {
                let (material, params) = symmetric::import_aes(material, params)?;
                (material, AlgorithmParams::Aes(params))
            },
            AlgorithmParams::Hmac(params) => {
                let (material, params) = symmetric::import_hmac(material, params)?;
                (material, AlgorithmParams::Hmac(params))
            },
        };

        let key_type = material.key_type();
        check_for_key_type(name, key_type, usages)?;

        tracing::debug!(algorithm = %descriptor, %key_type, %format, "imported key");
        Ok(Key::new(descriptor, key_type, extractable, usages, material))
    }

    async fn export_key(&self, format: KeyFormat, key: &SoftKey) -> Result<SerializedKey, EngineError> {
        if !key.extractable() {
            return Err(EngineError::OperationFailed {
                reason: format!("{} key is not extractable", key.name()),
            });
        }

        let mut serialized = match key.algorithm() {
            AlgorithmParams::RsaHashed(params) => rsa_keys::export(format, key.material(), params)?,
            AlgorithmParams::Ec(_) => ec_keys::export(format, key.material())?,
            AlgorithmParams::Ed25519 => okp_keys::export_ed25519(format, key.material())?,
            AlgorithmParams::X25519 => okp_keys::export_x25519(format, key.material())?,
            AlgorithmParams::Aes(params) => symmetric::export_aes(format, key.material(), params)?,
            AlgorithmParams::Hmac(params) => symmetric::export_hmac(format, key.material(), params)?,
        };

        if let SerializedKey::Jwk(jwk) = &mut serialized {
            jwk.key_ops = Some(key.usages().tags());
            jwk.ext = Some(key.extractable());
        }
        Ok(serialized)
    }

    async fn encrypt(&self, params: &OperationParams, key: &SoftKey, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        match params.algorithm() {
            AlgorithmParams::RsaHashed(rsa) if rsa.scheme == RsaScheme::Oaep => {
                rsa_keys::encrypt(params, key.material(), data)
            },
            AlgorithmParams::Aes(aes) => {
                symmetric::aes_encrypt(params, aes.mode, key.material().secret_bytes()?, data)
            },
            other => Err(unsupported(format!("{} cannot encrypt", other.name()))),
        }
    }

    async fn decrypt(&self, params: &OperationParams, key: &SoftKey, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        match params.algorithm() {
            AlgorithmParams::RsaHashed(rsa) if rsa.scheme == RsaScheme::Oaep => {
                rsa_keys::decrypt(params, key.material(), data)
            },
            AlgorithmParams::Aes(aes) => {
                symmetric::aes_decrypt(params, aes.mode, key.material().secret_bytes()?, data)
            },
            other => Err(unsupported(format!("{} cannot decrypt", other.name()))),
        }
    }

    async fn sign(&self, params: &OperationParams, key: &SoftKey, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        match params.algorithm() {
            AlgorithmParams::RsaHashed(rsa) if rsa.scheme == RsaScheme::Pss => {
                rsa_keys::sign(params, key.material(), data)
            },
            AlgorithmParams::Ec(ec) if ec.scheme == EcScheme::Ecdsa => {
                ec_keys::sign(params, key.material(), data)
            },
            AlgorithmParams::Ed25519 => okp_keys::sign_ed25519(key.material(), data),
            AlgorithmParams::Hmac(_) => {
                symmetric::hmac_sign(params.hash(), key.material().secret_bytes()?, data)
            },
            other => Err(unsupported(format!("{} cannot sign", other.name()))),
        }
    }

    async fn verify(
        &self,
        params: &OperationParams,
        key: &SoftKey,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, EngineError> {
        match params.algorithm() {
            AlgorithmParams::RsaHashed(rsa) if rsa.scheme == RsaScheme::Pss => {
                rsa_keys::verify(params, key.material(), signature, data)
            },
            AlgorithmParams::Ec(ec) if ec.scheme == EcScheme::Ecdsa => {
                ec_keys::verify(params, key.material(), signature, data)
            },
            AlgorithmParams::Ed25519 => okp_keys::verify_ed25519(key.material(), signature, data),
            AlgorithmParams::Hmac(_) => {
                symmetric::hmac_verify(params.hash(), key.material().secret_bytes()?, signature, data)
            },
            other => Err(unsupported(format!("{} cannot verify", other.name()))),
        }
    }

    async fn derive_bits(
        &self,
        params: &OperationParams,
        private: &SoftKey,
        public: &SoftKey,
        length: Option<u32>,
    ) -> Result<Vec<u8>, EngineError> {
        if public.name() != params.name() {
            return Err(unsupported(format!(
                "{} cannot agree with a {} key",
                params.name(),
                public.name()
            )));
        }

        match params.name() {
            AlgorithmName::Ecdh => ec_keys::derive_bits(private.material(), public.material(), length),
            AlgorithmName::X25519 => {
                okp_keys::derive_x25519(private.material(), public.material(), length)
            },
            other => Err(unsupported(format!("{other} cannot derive bits"))),
        }
    }

    async fn wrap(
        &self,
        params: &OperationParams,
        wrapping_key: &SoftKey,
        material: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        match params.algorithm() {
            AlgorithmParams::Aes(aes) if aes.mode == keysmith_core::AesMode::Kw => {
                symmetric::kw_wrap(wrapping_key.material().secret_bytes()?, material)
            },
            _ => self.encrypt(params, wrapping_key, material).await,
        }
    }

    async fn unwrap(
        &self,
        params: &OperationParams,
        unwrapping_key: &SoftKey,
        wrapped: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        match params.algorithm() {
            AlgorithmParams::Aes(aes) if aes.mode == keysmith_core::AesMode::Kw => {
                symmetric::kw_unwrap(unwrapping_key.material().secret_bytes()?, wrapped)
            },
            _ => self.decrypt(params, unwrapping_key, wrapped).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_bounds() {
        let config = SoftEngineConfig::default();

        assert_eq!(config.min_rsa_modulus_bits, 1024);
        assert_eq!(config.max_rsa_modulus_bits, 4096);
        assert!(config.offload_blocking);
    }

    #[test]
    fn digest_lengths_follow_hash() {
        for hash in [HashAlgorithm::Sha256, HashAlgorithm::Sha384, HashAlgorithm::Sha512] {
            assert_eq!(digest(hash, b"abc").len(), hash.output_len());
        }
    }

    #[tokio::test]
    async fn run_blocking_honours_offload_setting() {
        let inline = SoftEngine::with_config(SoftEngineConfig {
            offload_blocking: false,
            ..SoftEngineConfig::default()
        });

        assert_eq!(inline.run_blocking(|| Ok(7)).await, Ok(7));
        assert_eq!(SoftEngine::new().run_blocking(|| Ok(8)).await, Ok(8));
    }
}
