//! Algorithm descriptors.
//!
//! [`AlgorithmParams`] is a tagged union over the supported algorithm
//! families. Each key carries one as its authoritative descriptor; profiles
//! carry one as the descriptor to generate or import with.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{key::KeyShape, usage::Usages};

/// The closed set of algorithm names this crate dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmName {
    /// RSA with OAEP padding.
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
    /// RSA probabilistic signature scheme.
    #[serde(rename = "RSA-PSS")]
    RsaPss,
    /// Elliptic curve DSA.
    #[serde(rename = "ECDSA")]
    Ecdsa,
    /// Elliptic curve Diffie-Hellman.
    #[serde(rename = "ECDH")]
    Ecdh,
    /// AES in counter mode.
    #[serde(rename = "AES-CTR")]
    AesCtr,
    /// AES in cipher block chaining mode.
    #[serde(rename = "AES-CBC")]
    AesCbc,
    /// AES in Galois/counter mode.
    #[serde(rename = "AES-GCM")]
    AesGcm,
    /// AES key wrap (RFC 3394).
    #[serde(rename = "AES-KW")]
    AesKw,
    /// Keyed-hash message authentication.
    #[serde(rename = "HMAC")]
    Hmac,
    /// Edwards-curve signatures over Curve25519.
    #[serde(rename = "Ed25519")]
    Ed25519,
    /// Diffie-Hellman over Curve25519.
    #[serde(rename = "X25519")]
    X25519,
}

impl AlgorithmName {
    /// Every algorithm name.
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

    /// Canonical name string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaPss => "RSA-PSS",
            Self::Ecdsa => "ECDSA",
            Self::Ecdh => "ECDH",
            Self::AesCtr => "AES-CTR",
            Self::AesCbc => "AES-CBC",
            Self::AesGcm => "AES-GCM",
            Self::AesKw => "AES-KW",
            Self::Hmac => "HMAC",
            Self::Ed25519 => "Ed25519",
            Self::X25519 => "X25519",
        }
    }

    /// Every usage an engine accepts for keys of this algorithm.
    ///
    /// This is wider than what a profile requests: an AES-GCM profile asks
    /// for encrypt and decrypt, but AES-GCM keys may also wrap keys.
    pub const fn supported_usages(self) -> Usages {
        match self {
            Self::RsaOaep | Self::AesCtr | Self::AesCbc | Self::AesGcm => Usages::ENCRYPT
                .union(Usages::DECRYPT)
                .union(Usages::WRAP_KEY)
                .union(Usages::UNWRAP_KEY),
            Self::RsaPss | Self::Ecdsa | Self::Hmac | Self::Ed25519 => {
                Usages::SIGN.union(Usages::VERIFY)
            },
            Self::Ecdh | Self::X25519 => Usages::DERIVE_KEY.union(Usages::DERIVE_BITS),
            Self::AesKw => Usages::WRAP_KEY.union(Usages::UNWRAP_KEY),
        }
    }

    /// Whether generation yields a single secret key or a key pair.
    pub const fn key_shape(self) -> KeyShape {
        match self {
            Self::AesCtr | Self::AesCbc | Self::AesGcm | Self::AesKw | Self::Hmac => {
                KeyShape::Secret
            },
            Self::RsaOaep | Self::RsaPss | Self::Ecdsa | Self::Ecdh | Self::Ed25519 | Self::X25519 => {
                KeyShape::Pair
            },
        }
    }
}

impl fmt::Display for AlgorithmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest used by hashed algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Canonical name string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Digest output length in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Internal block length in bytes.
    pub const fn block_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 | Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NIST curves usable with ECDSA and ECDH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NamedCurve {
    /// secp256r1.
    #[default]
    #[serde(rename = "P-256")]
    P256,
    /// secp384r1.
    #[serde(rename = "P-384")]
    P384,
    /// secp521r1.
    #[serde(rename = "P-521")]
    P521,
}

impl NamedCurve {
    /// Canonical name string, as used in JWK `crv`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }
}

impl fmt::Display for NamedCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RSA schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsaScheme {
    /// RSA-OAEP encryption.
    Oaep,
    /// RSA-PSS signatures.
    Pss,
}

/// Elliptic curve schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcScheme {
    /// ECDSA signatures.
    Ecdsa,
    /// ECDH key agreement.
    Ecdh,
}

/// AES modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AesMode {
    /// Counter mode.
    Ctr,
    /// Cipher block chaining with PKCS#7 padding.
    Cbc,
    /// Galois/counter mode.
    Gcm,
    /// RFC 3394 key wrap.
    Kw,
}

/// Parameters of the RSA family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RsaHashedParams {
    /// OAEP or PSS.
    pub scheme: RsaScheme,
    /// Modulus length in bits.
    pub modulus_length: u32,
    /// Public exponent.
    pub public_exponent: u32,
    /// Digest bound to the key.
    pub hash: HashAlgorithm,
}

/// Parameters of the elliptic curve family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcParams {
    /// ECDSA or ECDH.
    pub scheme: EcScheme,
    /// Curve the key lives on.
    pub named_curve: NamedCurve,
}

/// Parameters of the AES family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AesParams {
    /// Mode of operation.
    pub mode: AesMode,
    /// Key length in bits (128, 192 or 256).
    pub length: u32,
}

/// Parameters of HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HmacParams {
    /// Digest the MAC is built on.
    pub hash: HashAlgorithm,
    /// Key length in bits. `None` lets the engine pick the digest block size.
    pub length: Option<u32>,
}

/// Algorithm descriptor, tagged by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmParams {
    /// RSA-OAEP or RSA-PSS.
    RsaHashed(RsaHashedParams),
    /// ECDSA or ECDH.
    Ec(EcParams),
    /// AES in any supported mode.
    Aes(AesParams),
    /// HMAC.
    Hmac(HmacParams),
    /// Ed25519 (no parameters).
    Ed25519,
    /// X25519 (no parameters).
    X25519,
}

impl AlgorithmParams {
    /// The algorithm name this descriptor selects.
    pub const fn name(&self) -> AlgorithmName {
        match self {
            Self::RsaHashed(params) => match params.scheme {
                RsaScheme::Oaep => AlgorithmName::RsaOaep,
                RsaScheme::Pss => AlgorithmName::RsaPss,
            },
            Self::Ec(params) => match params.scheme {
                EcScheme::Ecdsa => AlgorithmName::Ecdsa,
                EcScheme::Ecdh => AlgorithmName::Ecdh,
            },
            Self::Aes(params) => match params.mode {
                AesMode::Ctr => AlgorithmName::AesCtr,
                AesMode::Cbc => AlgorithmName::AesCbc,
                AesMode::Gcm => AlgorithmName::AesGcm,
                AesMode::Kw => AlgorithmName::AesKw,
            },
            Self::Hmac(_) => AlgorithmName::Hmac,
            Self::Ed25519 => AlgorithmName::Ed25519,
            Self::X25519 => AlgorithmName::X25519,
        }
    }

    /// Digest bound to the key, for families that bind one.
    pub const fn hash(&self) -> Option<HashAlgorithm> {
        match self {
            Self::RsaHashed(params) => Some(params.hash),
            Self::Hmac(params) => Some(params.hash),
            Self::Ec(_) | Self::Aes(_) | Self::Ed25519 | Self::X25519 => None,
        }
    }

    /// Length in bits of a secret key described by this descriptor.
    ///
    /// `None` for asymmetric families. HMAC without an explicit length
    /// resolves to the digest block size.
    pub const fn secret_length_bits(&self) -> Option<u32> {
        match self {
            Self::Aes(params) => Some(params.length),
            Self::Hmac(params) => match params.length {
                Some(length) => Some(length),
                None => Some((params.hash.block_len() * 8) as u32),
            },
            Self::RsaHashed(_) | Self::Ec(_) | Self::Ed25519 | Self::X25519 => None,
        }
    }
}

impl fmt::Display for AlgorithmParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaHashed(params) => {
                write!(f, "{}({}, {} bits)", self.name(), params.hash, params.modulus_length)
            },
            Self::Ec(params) => write!(f, "{}({})", self.name(), params.named_curve),
            Self::Aes(params) => write!(f, "{}({} bits)", self.name(), params.length),
            Self::Hmac(params) => write!(f, "{}({})", self.name(), params.hash),
            Self::Ed25519 | Self::X25519 => f.write_str(self.name().as_str()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_names_match_family_tags() {
        let oaep = AlgorithmParams::RsaHashed(RsaHashedParams {
            scheme: RsaScheme::Oaep,
            modulus_length: 2048,
            public_exponent: 65537,
            hash: HashAlgorithm::Sha256,
        });
        let kw = AlgorithmParams::Aes(AesParams { mode: AesMode::Kw, length: 128 });

        assert_eq!(oaep.name(), AlgorithmName::RsaOaep);
        assert_eq!(kw.name(), AlgorithmName::AesKw);
        assert_eq!(AlgorithmParams::X25519.name(), AlgorithmName::X25519);
    }

    #[test]
    fn supported_usages_are_never_empty() {
        for name in AlgorithmName::ALL {
            assert!(!name.supported_usages().is_empty(), "{name} supports nothing");
        }
    }

    #[test]
    fn symmetric_algorithms_are_secret_shaped() {
        assert_eq!(AlgorithmName::AesGcm.key_shape(), KeyShape::Secret);
        assert_eq!(AlgorithmName::Hmac.key_shape(), KeyShape::Secret);
        assert_eq!(AlgorithmName::X25519.key_shape(), KeyShape::Pair);
        assert_eq!(AlgorithmName::RsaPss.key_shape(), KeyShape::Pair);
    }

    #[test]
    fn hmac_length_defaults_to_block_size() {
        let hmac = AlgorithmParams::Hmac(HmacParams { hash: HashAlgorithm::Sha512, length: None });
        let explicit =
            AlgorithmParams::Hmac(HmacParams { hash: HashAlgorithm::Sha256, length: Some(256) });

        assert_eq!(hmac.secret_length_bits(), Some(1024));
        assert_eq!(explicit.secret_length_bits(), Some(256));
        assert_eq!(AlgorithmParams::Ed25519.secret_length_bits(), None);
    }

    #[test]
    fn display_includes_tunables() {
        let ec = AlgorithmParams::Ec(EcParams { scheme: EcScheme::Ecdh, named_curve: NamedCurve::P384 });

        assert_eq!(ec.to_string(), "ECDH(P-384)");
        assert_eq!(AlgorithmName::Ed25519.to_string(), "Ed25519");
    }

    #[test]
    fn names_serialize_canonically() {
        let json = serde_json::to_string(&AlgorithmName::AesGcm).unwrap();

        assert_eq!(json, "\"AES-GCM\"");
    }
}
