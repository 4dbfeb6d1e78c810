//! Octet key pairs: Ed25519 signatures and X25519 agreement.

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
};
use keysmith_core::{EngineError, JsonWebKey, KeyFormat, SerializedKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::{
    codec::{b64, expect_kty, fixed_bytes, fixed_member, truncate_bits},
    material::SoftMaterial,
};

fn invalid(e: impl std::fmt::Display) -> EngineError {
    EngineError::InvalidKeyData { reason: e.to_string() }
}

fn okp_jwk(jwk: &JsonWebKey, crv: &str) -> Result<(), EngineError> {
    expect_kty(jwk, "OKP")?;
    if jwk.crv.as_deref() == Some(crv) {
        Ok(())
    } else {
        Err(EngineError::InvalidKeyData { reason: format!("expected crv {crv}, got {:?}", jwk.crv) })
    }
}

fn okp_public_jwk(crv: &str, x: &[u8]) -> JsonWebKey {
    JsonWebKey {
        kty: "OKP".to_string(),
        crv: Some(crv.to_string()),
        x: Some(b64(x)),
        ..JsonWebKey::default()
    }
}

fn unsupported(format: KeyFormat, material: &SoftMaterial) -> EngineError {
    EngineError::UnsupportedParameters { reason: format!("{material:?} cannot be exported as {format}") }
}

/// Fresh Ed25519 signing key.
pub(crate) fn generate_ed25519() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Fresh X25519 static secret.
pub(crate) fn generate_x25519() -> StaticSecret {
    StaticSecret::random_from_rng(OsRng)
}

/// Parse Ed25519 material.
pub(crate) fn import_ed25519(material: SerializedKey) -> Result<SoftMaterial, EngineError> {
    match material {
        SerializedKey::Raw(bytes) => {
            let bytes = fixed_bytes::<32>(&bytes, "Ed25519 public key")?;
            Ok(SoftMaterial::Ed25519Public(VerifyingKey::from_bytes(&bytes).map_err(invalid)?))
        },
        SerializedKey::Pkcs8(der) => {
            Ok(SoftMaterial::Ed25519Private(SigningKey::from_pkcs8_der(&der).map_err(invalid)?))
        },
        SerializedKey::Spki(der) => {
            Ok(SoftMaterial::Ed25519Public(VerifyingKey::from_public_key_der(&der).map_err(invalid)?))
        },
        SerializedKey::Jwk(jwk) => {
            okp_jwk(&jwk, "Ed25519")?;
            let x = fixed_member::<32>(&jwk, jwk.x.as_ref(), "x")?;
            let public = VerifyingKey::from_bytes(&x).map_err(invalid)?;
            if jwk.d.is_none() {
                return Ok(SoftMaterial::Ed25519Public(public));
            }

            let d = fixed_member::<32>(&jwk, jwk.d.as_ref(), "d")?;
            let signing = SigningKey::from_bytes(&d);
            if signing.verifying_key() != public {
                return Err(EngineError::InvalidKeyData {
                    reason: "JWK d does not match x".to_string(),
                });
            }
            Ok(SoftMaterial::Ed25519Private(signing))
        },
    }
}

/// Serialize Ed25519 material.
pub(crate) fn export_ed25519(
    format: KeyFormat,
    material: &SoftMaterial,
) -> Result<SerializedKey, EngineError> {
    match (format, material) {
        (KeyFormat::Raw, SoftMaterial::Ed25519Public(public)) => {
            Ok(SerializedKey::Raw(public.to_bytes().to_vec()))
        },
        (KeyFormat::Pkcs8, SoftMaterial::Ed25519Private(signing)) => {
            let der = signing.to_pkcs8_der().map_err(invalid)?;
            Ok(SerializedKey::Pkcs8(der.as_bytes().to_vec()))
        },
        (KeyFormat::Spki, SoftMaterial::Ed25519Public(public)) => {
            let der = public.to_public_key_der().map_err(invalid)?;
            Ok(SerializedKey::Spki(der.as_bytes().to_vec()))
        },
        (KeyFormat::Jwk, SoftMaterial::Ed25519Public(public)) => {
            Ok(SerializedKey::Jwk(okp_public_jwk("Ed25519", public.as_bytes())))
        },
        (KeyFormat::Jwk, SoftMaterial::Ed25519Private(signing)) => {
            let mut jwk = okp_public_jwk("Ed25519", signing.verifying_key().as_bytes());
            jwk.d = Some(b64(&signing.to_bytes()));
            Ok(SerializedKey::Jwk(jwk))
        },
        (format, material) => Err(unsupported(format, material)),
    }
}

/// Ed25519 signature over `data` itself.
pub(crate) fn sign_ed25519(material: &SoftMaterial, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::Ed25519Private(signing) = material else {
        return Err(material.mismatch("Ed25519 private"));
    };
    Ok(signing.sign(data).to_bytes().to_vec())
}

/// Ed25519 verification. A malformed signature is simply invalid.
pub(crate) fn verify_ed25519(
    material: &SoftMaterial,
    signature: &[u8],
    data: &[u8],
) -> Result<bool, EngineError> {
    let SoftMaterial::Ed25519Public(public) = material else {
        return Err(material.mismatch("Ed25519 public"));
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };
    Ok(public.verify(data, &signature).is_ok())
}

/// Parse X25519 material.
pub(crate) fn import_x25519(material: SerializedKey) -> Result<SoftMaterial, EngineError> {
    match material {
        SerializedKey::Raw(bytes) => {
            let bytes = fixed_bytes::<32>(&bytes, "X25519 public key")?;
            Ok(SoftMaterial::X25519Public(X25519Public::from(bytes)))
        },
        SerializedKey::Jwk(jwk) => {
            okp_jwk(&jwk, "X25519")?;
            let x = fixed_member::<32>(&jwk, jwk.x.as_ref(), "x")?;
            let public = X25519Public::from(x);
            if jwk.d.is_none() {
                return Ok(SoftMaterial::X25519Public(public));
            }

            let d = fixed_member::<32>(&jwk, jwk.d.as_ref(), "d")?;
            let secret = StaticSecret::from(d);
            if X25519Public::from(&secret) != public {
                return Err(EngineError::InvalidKeyData {
                    reason: "JWK d does not match x".to_string(),
                });
            }
            Ok(SoftMaterial::X25519Private(secret))
        },
        other => Err(EngineError::UnsupportedParameters {
            reason: format!("X25519 keys cannot be imported from {}", other.format()),
        }),
    }
}

/// Serialize X25519 material.
pub(crate) fn export_x25519(
    format: KeyFormat,
    material: &SoftMaterial,
) -> Result<SerializedKey, EngineError> {
    match (format, material) {
        (KeyFormat::Raw, SoftMaterial::X25519Public(public)) => {
            Ok(SerializedKey::Raw(public.as_bytes().to_vec()))
        },
        (KeyFormat::Jwk, SoftMaterial::X25519Public(public)) => {
            Ok(SerializedKey::Jwk(okp_public_jwk("X25519", public.as_bytes())))
        },
        (KeyFormat::Jwk, SoftMaterial::X25519Private(secret)) => {
            let mut jwk = okp_public_jwk("X25519", X25519Public::from(secret).as_bytes());
            jwk.d = Some(b64(secret.as_bytes()));
            Ok(SerializedKey::Jwk(jwk))
        },
        (format, material) => Err(unsupported(format, material)),
    }
}

/// X25519 agreement. Low-order peers are rejected.
pub(crate) fn derive_x25519(
    private: &SoftMaterial,
    public: &SoftMaterial,
    length: Option<u32>,
) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::X25519Private(secret) = private else {
        return Err(private.mismatch("X25519 private"));
    };
    let SoftMaterial::X25519Public(peer) = public else {
        return Err(public.mismatch("X25519 public"));
    };

    let shared = secret.diffie_hellman(peer);
    if !shared.was_contributory() {
        return Err(EngineError::OperationFailed {
            reason: "X25519 peer key is of low order".to_string(),
        });
    }
    truncate_bits(shared.as_bytes().to_vec(), length)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_sign_verify() {
        let signing = generate_ed25519();
        let public = SoftMaterial::Ed25519Public(signing.verifying_key());
        let private = SoftMaterial::Ed25519Private(signing);

        let signature = sign_ed25519(&private, b"payload").unwrap();

        assert!(verify_ed25519(&public, &signature, b"payload").unwrap());
        assert!(!verify_ed25519(&public, &signature, b"tampered").unwrap());
        assert!(!verify_ed25519(&public, &signature[..10], b"payload").unwrap());
    }

    #[test]
    fn ed25519_raw_requires_32_bytes() {
        let result = import_ed25519(SerializedKey::Raw(vec![0; 31]));

        assert!(matches!(result, Err(EngineError::InvalidKeyData { .. })));
    }

    #[test]
    fn x25519_rejects_all_zero_peer() {
        let private = SoftMaterial::X25519Private(generate_x25519());
        let peer = SoftMaterial::X25519Public(X25519Public::from([0u8; 32]));

        let result = derive_x25519(&private, &peer, None);

        assert!(matches!(result, Err(EngineError::OperationFailed { .. })));
    }

    #[test]
    fn x25519_has_no_der_forms() {
        let result = import_x25519(SerializedKey::Spki(vec![0x30]));

        assert!(matches!(result, Err(EngineError::UnsupportedParameters { .. })));
    }

    #[test]
    fn x25519_jwk_private_roundtrip() {
        let private = SoftMaterial::X25519Private(StaticSecret::from([9u8; 32]));
        let SerializedKey::Jwk(jwk) = export_x25519(KeyFormat::Jwk, &private).unwrap() else {
            panic!("jwk export must produce a JWK");
        };

        let reimported = import_x25519(SerializedKey::Jwk(jwk)).unwrap();

        assert_eq!(reimported.key_type(), keysmith_core::KeyType::Private);
    }
}
