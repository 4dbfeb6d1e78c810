//! Keysmith Core
//!
//! A typed façade over a cryptographic engine. This crate decides which
//! algorithm a purpose maps to, which usages a key gets, and whether a key may
//! be used for an operation. The engine (see [`Engine`]) does the math.
//!
//! # Components
//!
//! - [`profile`]: purpose → [`AlgorithmProfile`] (descriptor, usages,
//!   extractability)
//! - [`provision`]: generate and import keys, filtering usages by role
//! - [`dispatch`]: validate algorithm and usage, then encrypt, decrypt, sign,
//!   verify, derive, wrap or unwrap
//! - [`export`]: extractability-gated serialization
//!
//! [`Keysmith`] bundles an engine with all four.
//!
//! # Design
//!
//! Nothing here holds mutable state. Profiles and options are plain values;
//! keys are immutable shared handles whose recorded descriptor and usages are
//! re-checked on every call. Validation runs before the engine is called, so
//! a rejected request never reaches it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod export;
pub mod format;
pub mod key;
pub mod options;
pub mod profile;
pub mod provision;
pub mod usage;

pub use algorithm::{
    AesMode, AesParams, AlgorithmName, AlgorithmParams, EcParams, EcScheme, HashAlgorithm,
    HmacParams, NamedCurve, RsaHashedParams, RsaScheme,
};
pub use dispatch::{Operation, Payload};
pub use engine::{Engine, EngineError};
pub use error::KeysmithError;
pub use format::{ExportFormat, JsonWebKey, Jwk, KeyFormat, Pkcs8, Raw, SerializedKey, Spki};
pub use key::{GeneratedKey, Key, KeyPair, KeyShape, KeyType};
pub use options::{OperationOptions, OperationParams};
pub use profile::{
    AesOptions, AesPurpose, AlgorithmProfile, EcOptions, EcPurpose, HmacOptions, RsaOptions,
    RsaPurpose,
};
pub use usage::{Usage, Usages};

/// An engine bundled with the provisioning, dispatch and export operations.
///
/// Holds no state beyond the engine itself.
#[derive(Debug, Clone, Default)]
pub struct Keysmith<E> {
    engine: E,
}

impl<E: Engine> Keysmith<E> {
    /// Wrap an engine.
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// See [`provision::generate`].
    pub async fn generate(
        &self,
        profile: &AlgorithmProfile,
    ) -> Result<GeneratedKey<E::Material>, KeysmithError> {
        provision::generate(&self.engine, profile).await
    }

    /// See [`provision::generate_pair`].
    pub async fn generate_pair(
        &self,
        profile: &AlgorithmProfile,
    ) -> Result<KeyPair<E::Material>, KeysmithError> {
        provision::generate_pair(&self.engine, profile).await
    }

    /// See [`provision::generate_secret`].
    pub async fn generate_secret(
        &self,
        profile: &AlgorithmProfile,
    ) -> Result<Key<E::Material>, KeysmithError> {
        provision::generate_secret(&self.engine, profile).await
    }

    /// See [`provision::import`].
    pub async fn import<F: ExportFormat>(
        &self,
        format: F,
        role: KeyType,
        material: F::Output,
        profile: &AlgorithmProfile,
        extractable: Option<bool>,
    ) -> Result<Key<E::Material>, KeysmithError> {
        provision::import(&self.engine, format, role, material, profile, extractable).await
    }

    /// See [`export::export`].
    pub async fn export<F: ExportFormat>(
        &self,
        format: F,
        key: &Key<E::Material>,
    ) -> Result<F::Output, KeysmithError> {
        export::export(&self.engine, format, key).await
    }

    /// See [`dispatch::encrypt`].
    pub async fn encrypt<'a>(
        &self,
        key: &Key<E::Material>,
        options: &OperationOptions,
        payload: impl Into<Payload<'a>>,
    ) -> Result<Vec<u8>, KeysmithError> {
        dispatch::encrypt(&self.engine, key, options, payload).await
    }

    /// See [`dispatch::decrypt`].
    pub async fn decrypt<'a>(
        &self,
        key: &Key<E::Material>,
        options: &OperationOptions,
        payload: impl Into<Payload<'a>>,
    ) -> Result<Vec<u8>, KeysmithError> {
        dispatch::decrypt(&self.engine, key, options, payload).await
    }

    /// See [`dispatch::sign`].
    pub async fn sign<'a>(
        &self,
        key: &Key<E::Material>,
        options: &OperationOptions,
        payload: impl Into<Payload<'a>>,
    ) -> Result<Vec<u8>, KeysmithError> {
        dispatch::sign(&self.engine, key, options, payload).await
    }

    /// See [`dispatch::verify`].
    pub async fn verify<'a>(
        &self,
        key: &Key<E::Material>,
        options: &OperationOptions,
        signature: &[u8],
        payload: impl Into<Payload<'a>>,
    ) -> Result<bool, KeysmithError> {
        dispatch::verify(&self.engine, key, options, signature, payload).await
    }

    /// See [`dispatch::derive_bits`].
    pub async fn derive_bits(
        &self,
        private: &Key<E::Material>,
        public: &Key<E::Material>,
        length: Option<u32>,
    ) -> Result<Vec<u8>, KeysmithError> {
        dispatch::derive_bits(&self.engine, private, public, length).await
    }

    /// See [`dispatch::derive_key`].
    pub async fn derive_key(
        &self,
        private: &Key<E::Material>,
        public: &Key<E::Material>,
        derived: &AlgorithmProfile,
    ) -> Result<Key<E::Material>, KeysmithError> {
        dispatch::derive_key(&self.engine, private, public, derived).await
    }

    /// See [`dispatch::wrap_key`].
    pub async fn wrap_key<F: ExportFormat>(
        &self,
        format: F,
        key: &Key<E::Material>,
        wrapping_key: &Key<E::Material>,
        options: &OperationOptions,
    ) -> Result<Vec<u8>, KeysmithError> {
        dispatch::wrap_key(&self.engine, format, key, wrapping_key, options).await
    }

    /// See [`dispatch::unwrap_key`].
    pub async fn unwrap_key<F: ExportFormat>(
        &self,
        format: F,
        wrapped: &[u8],
        unwrapping_key: &Key<E::Material>,
        options: &OperationOptions,
        role: KeyType,
        profile: &AlgorithmProfile,
    ) -> Result<Key<E::Material>, KeysmithError> {
        dispatch::unwrap_key(&self.engine, format, wrapped, unwrapping_key, options, role, profile)
            .await
    }
}
