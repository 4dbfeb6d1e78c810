//! Profile Builder
//!
//! Turns a purpose ("Signing", "Wrapping", ...) into an [`AlgorithmProfile`]:
//! the descriptor to generate or import with, the default usage set, and the
//! extractability flag.
//!
//! ## Purpose table
//!
//! | Family | Purpose | Algorithm | Usages |
//! |---|---|---|---|
//! | EC | Signing | ECDSA | sign, verify |
//! | EC | Encrypting | ECDH | deriveKey, deriveBits |
//! | RSA | Signing | RSA-PSS | sign, verify |
//! | RSA | Encrypting | RSA-OAEP | encrypt, decrypt, wrapKey, unwrapKey |
//! | AES | Wrapping | AES-KW | wrapKey, unwrapKey |
//! | AES | Integrity protection | AES-GCM | encrypt, decrypt |
//! | AES | Fixed length encryption | AES-CBC | encrypt, decrypt |
//! | AES | Variable length encryption | AES-CTR | encrypt, decrypt |
//! | HMAC | | HMAC | sign, verify |
//! | Ed25519 | | Ed25519 | sign, verify |
//! | X25519 | | X25519 | deriveKey, deriveBits |
//!
//! Construction never fails. Tunables are not bounds-checked here; the
//! engine decides what it accepts.

use crate::{
    algorithm::{
        AesMode, AesParams, AlgorithmName, AlgorithmParams, EcParams, EcScheme, HashAlgorithm,
        HmacParams, NamedCurve, RsaHashedParams, RsaScheme,
    },
    key::{Key, KeyShape},
    usage::Usages,
};

/// Purposes for elliptic curve keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcPurpose {
    /// ECDSA.
    Signing,
    /// ECDH.
    Encrypting,
}

/// Purposes for RSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaPurpose {
    /// RSA-PSS.
    Signing,
    /// RSA-OAEP.
    Encrypting,
}

/// Purposes for AES keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesPurpose {
    /// AES-KW.
    Wrapping,
    /// AES-GCM.
    IntegrityProtection,
    /// AES-CBC.
    FixedLengthEncryption,
    /// AES-CTR.
    VariableLengthEncryption,
}

/// RSA tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaOptions {
    /// Modulus length in bits.
    pub modulus_length: u32,
    /// Public exponent.
    pub public_exponent: u32,
    /// Digest bound to the key.
    pub hash: HashAlgorithm,
}

impl Default for RsaOptions {
    fn default() -> Self {
        Self { modulus_length: 2048, public_exponent: 65537, hash: HashAlgorithm::Sha256 }
    }
}

/// Elliptic curve tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EcOptions {
    /// Curve to use.
    pub named_curve: NamedCurve,
}

/// AES tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesOptions {
    /// Key length in bits.
    pub length: u32,
}

impl Default for AesOptions {
    fn default() -> Self {
        Self { length: 256 }
    }
}

/// HMAC tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HmacOptions {
    /// Digest the MAC is built on.
    pub hash: HashAlgorithm,
    /// Key length in bits; `None` means the digest block size.
    pub length: Option<u32>,
}

/// Descriptor, default usages and extractability for one purpose.
///
/// Invariant: `usages` is non-empty and a subset of
/// `algorithm.name().supported_usages()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmProfile {
    algorithm: AlgorithmParams,
    extractable: bool,
    usages: Usages,
}

impl AlgorithmProfile {
    fn new(algorithm: AlgorithmParams, usages: Usages) -> Self {
        Self { algorithm, extractable: true, usages }
    }

    /// RSA profile for `purpose`.
    pub fn rsa(purpose: RsaPurpose, options: RsaOptions) -> Self {
        let (scheme, usages) = match purpose {
            RsaPurpose::Signing => (RsaScheme::Pss, Usages::SIGN | Usages::VERIFY),
            RsaPurpose::Encrypting => (
                RsaScheme::Oaep,
                Usages::ENCRYPT | Usages::DECRYPT | Usages::WRAP_KEY | Usages::UNWRAP_KEY,
            ),
        };

        Self::new(
            AlgorithmParams::RsaHashed(RsaHashedParams {
                scheme,
                modulus_length: options.modulus_length,
                public_exponent: options.public_exponent,
                hash: options.hash,
            }),
            usages,
        )
    }

    /// Elliptic curve profile for `purpose`.
    pub fn ec(purpose: EcPurpose, options: EcOptions) -> Self {
        let (scheme, usages) = match purpose {
            EcPurpose::Signing => (EcScheme::Ecdsa, Usages::SIGN | Usages::VERIFY),
            EcPurpose::Encrypting => (EcScheme::Ecdh, Usages::DERIVE_KEY | Usages::DERIVE_BITS),
        };

        Self::new(AlgorithmParams::Ec(EcParams { scheme, named_curve: options.named_curve }), usages)
    }

    /// AES profile for `purpose`.
    pub fn aes(purpose: AesPurpose, options: AesOptions) -> Self {
        let (mode, usages) = match purpose {
            AesPurpose::Wrapping => (AesMode::Kw, Usages::WRAP_KEY | Usages::UNWRAP_KEY),
            AesPurpose::IntegrityProtection => (AesMode::Gcm, Usages::ENCRYPT | Usages::DECRYPT),
            AesPurpose::FixedLengthEncryption => (AesMode::Cbc, Usages::ENCRYPT | Usages::DECRYPT),
            AesPurpose::VariableLengthEncryption => {
                (AesMode::Ctr, Usages::ENCRYPT | Usages::DECRYPT)
            },
        };

        Self::new(AlgorithmParams::Aes(AesParams { mode, length: options.length }), usages)
    }

    /// HMAC profile.
    pub fn hmac(options: HmacOptions) -> Self {
        Self::new(
            AlgorithmParams::Hmac(HmacParams { hash: options.hash, length: options.length }),
            Usages::SIGN | Usages::VERIFY,
        )
    }

    /// Ed25519 profile.
    pub fn ed25519() -> Self {
        Self::new(AlgorithmParams::Ed25519, Usages::SIGN | Usages::VERIFY)
    }

    /// X25519 profile.
    pub fn x25519() -> Self {
        Self::new(AlgorithmParams::X25519, Usages::DERIVE_KEY | Usages::DERIVE_BITS)
    }

    /// Profile that reproduces an existing key's descriptor, usages and
    /// extractability.
    pub fn of_key<M>(key: &Key<M>) -> Self {
        Self { algorithm: *key.algorithm(), extractable: key.extractable(), usages: key.usages() }
    }

    /// Override extractability.
    #[must_use]
    pub fn with_extractable(mut self, extractable: bool) -> Self {
        self.extractable = extractable;
        self
    }

    /// Override the usage set.
    ///
    /// Usages the algorithm does not support are dropped. If none remain the
    /// profile keeps its current usages.
    #[must_use]
    pub fn with_usages(mut self, usages: Usages) -> Self {
        let usages = usages & self.algorithm.name().supported_usages();
        if !usages.is_empty() {
            self.usages = usages;
        }
        self
    }

    /// Descriptor to generate or import with.
    pub fn algorithm(&self) -> &AlgorithmParams {
        &self.algorithm
    }

    /// Shorthand for `self.algorithm().name()`.
    pub fn name(&self) -> AlgorithmName {
        self.algorithm.name()
    }

    /// Whether keys from this profile may be exported.
    pub fn extractable(&self) -> bool {
        self.extractable
    }

    /// Requested usages.
    pub fn usages(&self) -> Usages {
        self.usages
    }

    /// What generation yields for this profile.
    pub fn shape(&self) -> KeyShape {
        self.algorithm.name().key_shape()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn table() -> Vec<(AlgorithmProfile, AlgorithmName, Usages)> {
        vec![
            (
                AlgorithmProfile::ec(EcPurpose::Signing, EcOptions::default()),
                AlgorithmName::Ecdsa,
                Usages::SIGN | Usages::VERIFY,
            ),
            (
                AlgorithmProfile::ec(EcPurpose::Encrypting, EcOptions::default()),
                AlgorithmName::Ecdh,
                Usages::DERIVE_KEY | Usages::DERIVE_BITS,
            ),
            (
                AlgorithmProfile::rsa(RsaPurpose::Signing, RsaOptions::default()),
                AlgorithmName::RsaPss,
                Usages::SIGN | Usages::VERIFY,
            ),
            (
                AlgorithmProfile::rsa(RsaPurpose::Encrypting, RsaOptions::default()),
                AlgorithmName::RsaOaep,
                Usages::ENCRYPT | Usages::DECRYPT | Usages::WRAP_KEY | Usages::UNWRAP_KEY,
            ),
            (
                AlgorithmProfile::aes(AesPurpose::Wrapping, AesOptions::default()),
                AlgorithmName::AesKw,
                Usages::WRAP_KEY | Usages::UNWRAP_KEY,
            ),
            (
                AlgorithmProfile::aes(AesPurpose::IntegrityProtection, AesOptions::default()),
                AlgorithmName::AesGcm,
                Usages::ENCRYPT | Usages::DECRYPT,
            ),
            (
                AlgorithmProfile::aes(AesPurpose::FixedLengthEncryption, AesOptions::default()),
                AlgorithmName::AesCbc,
                Usages::ENCRYPT | Usages::DECRYPT,
            ),
            (
                AlgorithmProfile::aes(AesPurpose::VariableLengthEncryption, AesOptions::default()),
                AlgorithmName::AesCtr,
                Usages::ENCRYPT | Usages::DECRYPT,
            ),
            (
                AlgorithmProfile::hmac(HmacOptions::default()),
                AlgorithmName::Hmac,
                Usages::SIGN | Usages::VERIFY,
            ),
            (AlgorithmProfile::ed25519(), AlgorithmName::Ed25519, Usages::SIGN | Usages::VERIFY),
            (
                AlgorithmProfile::x25519(),
                AlgorithmName::X25519,
                Usages::DERIVE_KEY | Usages::DERIVE_BITS,
            ),
        ]
    }

    #[test]
    fn purpose_table_matches() {
        for (profile, name, usages) in table() {
            assert_eq!(profile.name(), name);
            assert_eq!(profile.usages(), usages, "usages for {name}");
        }
    }

    #[test]
    fn every_profile_is_extractable_by_default() {
        for (profile, ..) in table() {
            assert!(profile.extractable(), "{} should default to extractable", profile.name());
        }
    }

    #[test]
    fn profile_usages_are_supported_by_their_algorithm() {
        for (profile, ..) in table() {
            assert!(!profile.usages().is_empty());
            assert!(profile.name().supported_usages().contains(profile.usages()));
        }
    }

    #[test]
    fn defaults_apply() {
        let rsa = AlgorithmProfile::rsa(RsaPurpose::Signing, RsaOptions::default());
        let AlgorithmParams::RsaHashed(params) = rsa.algorithm() else {
            panic!("expected RSA descriptor");
        };
        assert_eq!(params.modulus_length, 2048);
        assert_eq!(params.public_exponent, 65537);
        assert_eq!(params.hash, HashAlgorithm::Sha256);

        let ec = AlgorithmProfile::ec(EcPurpose::Signing, EcOptions::default());
        assert_eq!(
            ec.algorithm(),
            &AlgorithmParams::Ec(EcParams { scheme: EcScheme::Ecdsa, named_curve: NamedCurve::P256 })
        );

        let aes = AlgorithmProfile::aes(AesPurpose::Wrapping, AesOptions::default());
        assert_eq!(aes.algorithm().secret_length_bits(), Some(256));
    }

    #[test]
    fn tunables_flow_into_descriptor() {
        let options = RsaOptions { modulus_length: 4096, hash: HashAlgorithm::Sha512, ..RsaOptions::default() };
        let profile = AlgorithmProfile::rsa(RsaPurpose::Encrypting, options);

        assert_eq!(profile.algorithm().hash(), Some(HashAlgorithm::Sha512));
        assert_eq!(profile.shape(), KeyShape::Pair);
    }

    #[test]
    fn with_usages_drops_unsupported() {
        let profile = AlgorithmProfile::aes(AesPurpose::IntegrityProtection, AesOptions::default())
            .with_usages(Usages::ENCRYPT | Usages::SIGN | Usages::WRAP_KEY);

        assert_eq!(profile.usages(), Usages::ENCRYPT | Usages::WRAP_KEY);
    }

    #[test]
    fn with_usages_never_empties_the_set() {
        let profile = AlgorithmProfile::ed25519().with_usages(Usages::ENCRYPT);
        assert_eq!(profile.usages(), Usages::SIGN | Usages::VERIFY);

        let profile = AlgorithmProfile::hmac(HmacOptions::default()).with_usages(Usages::empty());
        assert_eq!(profile.usages(), Usages::SIGN | Usages::VERIFY);
    }

    #[test]
    fn with_extractable_overrides() {
        let profile = AlgorithmProfile::x25519().with_extractable(false);

        assert!(!profile.extractable());
    }
}
