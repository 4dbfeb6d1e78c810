//! Fuzz target for key import through [`SoftEngine`]
//!
//! Untrusted key material is the widest attack surface of the façade: every
//! byte of a raw key, DER document or JWK comes from outside.
//!
//! # Strategy
//!
//! - Material: arbitrary bytes, parsed as raw, PKCS#8, SPKI or JSON JWK
//! - Profiles: every algorithm family, with fuzzed usages and extractability
//! - Roles: public, private and secret declared independently of the bytes
//!
//! # Invariants
//!
//! - NEVER panic on malformed material
//! - An imported key never carries a usage the profile did not grant
//! - An imported key never carries a usage the declared role forbids
//! - A key that imports as extractable exports in the format it came from

#![no_main]

use arbitrary::Arbitrary;
use keysmith_core::{
    AesOptions, AesPurpose, AlgorithmProfile, EcOptions, EcPurpose, HmacOptions, KeyType,
    RsaOptions, RsaPurpose, SerializedKey, Usages, export, provision,
};
use keysmith_engine::SoftEngine;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Family {
    RsaOaep,
    RsaPss,
    Ecdsa,
    Ecdh,
    AesCtr,
    AesCbc,
    AesGcm,
    AesKw,
    Hmac,
    Ed25519,
    X25519,
}

impl Family {
    fn profile(self) -> AlgorithmProfile {
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
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Encoding {
    Raw,
    Pkcs8,
    Spki,
    Jwk,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Role {
    Public,
    Private,
    Secret,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    family: Family,
    encoding: Encoding,
    role: Role,
    usages: Option<u8>,
    extractable: Option<bool>,
    material: Vec<u8>,
}

fn serialized(encoding: Encoding, material: Vec<u8>) -> Option<SerializedKey> {
    Some(match encoding {
        Encoding::Raw => SerializedKey::Raw(material),
        Encoding::Pkcs8 => SerializedKey::Pkcs8(material),
        Encoding::Spki => SerializedKey::Spki(material),
        Encoding::Jwk => SerializedKey::Jwk(serde_json::from_slice(&material).ok()?),
    })
}

fuzz_target!(|input: FuzzInput| {
    let Some(material) = serialized(input.encoding, input.material) else {
        return;
    };
    let format = material.format();

    let mut profile = input.family.profile();
    if let Some(bits) = input.usages {
        profile = profile.with_usages(Usages::from_bits_truncate(bits));
    }
    let role = match input.role {
        Role::Public => KeyType::Public,
        Role::Private => KeyType::Private,
        Role::Secret => KeyType::Secret,
    };

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let engine = SoftEngine::new();

    runtime.block_on(async {
        let Ok(key) =
            provision::import_serialized(&engine, role, material, &profile, input.extractable)
                .await
        else {
            return;
        };

        let granted = profile.usages().for_role(role);
        assert_eq!(key.name(), profile.name());
        assert!(
            granted.contains(key.usages()),
            "import widened {granted} to {} for a {role} import",
            key.usages()
        );

        if key.extractable() {
            let exported = export::export_serialized(&engine, format, &key).await;
            assert!(exported.is_ok(), "reimported key failed to export: {exported:?}");
        }
    });
});
