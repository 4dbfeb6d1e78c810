//! ECDSA and ECDH on P-256.

use keysmith_core::{EcParams, EngineError, JsonWebKey, KeyFormat, NamedCurve, OperationParams, SerializedKey};
use p256::{
    PublicKey, SecretKey,
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::hazmat::{PrehashSigner, PrehashVerifier},
    },
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
};
use rand::rngs::OsRng;

use crate::{
    codec::{b64, expect_kty, fixed_member, truncate_bits},
    digest,
    material::SoftMaterial,
};

const CURVE: &str = "P-256";

fn invalid(e: impl std::fmt::Display) -> EngineError {
    EngineError::InvalidKeyData { reason: e.to_string() }
}

/// Only P-256 is backed by this engine.
pub(crate) fn check_curve(params: &EcParams) -> Result<(), EngineError> {
    match params.named_curve {
        NamedCurve::P256 => Ok(()),
        other => Err(EngineError::UnsupportedParameters {
            reason: format!("curve {other} is not supported"),
        }),
    }
}

/// Fresh private scalar.
pub(crate) fn generate() -> SecretKey {
    SecretKey::random(&mut OsRng)
}

/// Parse P-256 material.
pub(crate) fn import(material: SerializedKey) -> Result<SoftMaterial, EngineError> {
    match material {
        SerializedKey::Raw(bytes) => {
            Ok(SoftMaterial::EcPublic(PublicKey::from_sec1_bytes(&bytes).map_err(invalid)?))
        },
        SerializedKey::Pkcs8(der) => {
            Ok(SoftMaterial::EcPrivate(SecretKey::from_pkcs8_der(&der).map_err(invalid)?))
        },
        SerializedKey::Spki(der) => {
            Ok(SoftMaterial::EcPublic(PublicKey::from_public_key_der(&der).map_err(invalid)?))
        },
        SerializedKey::Jwk(jwk) => import_jwk(&jwk),
    }
}

fn import_jwk(jwk: &JsonWebKey) -> Result<SoftMaterial, EngineError> {
    expect_kty(jwk, "EC")?;
    if jwk.crv.as_deref() != Some(CURVE) {
        return Err(EngineError::InvalidKeyData {
            reason: format!("expected crv {CURVE}, got {:?}", jwk.crv),
        });
    }

    let x = fixed_member::<32>(jwk, jwk.x.as_ref(), "x")?;
    let y = fixed_member::<32>(jwk, jwk.y.as_ref(), "y")?;
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    let public = PublicKey::from_sec1_bytes(&sec1).map_err(invalid)?;

    if jwk.d.is_none() {
        return Ok(SoftMaterial::EcPublic(public));
    }

    let d = fixed_member::<32>(jwk, jwk.d.as_ref(), "d")?;
    let secret = SecretKey::from_slice(&d).map_err(invalid)?;
    if secret.public_key() != public {
        return Err(EngineError::InvalidKeyData {
            reason: "JWK d does not match its public point".to_string(),
        });
    }
    Ok(SoftMaterial::EcPrivate(secret))
}

/// Serialize P-256 material.
pub(crate) fn export(format: KeyFormat, material: &SoftMaterial) -> Result<SerializedKey, EngineError> {
    match (format, material) {
        (KeyFormat::Raw, SoftMaterial::EcPublic(public)) => {
            Ok(SerializedKey::Raw(public.to_encoded_point(false).as_bytes().to_vec()))
        },
        (KeyFormat::Pkcs8, SoftMaterial::EcPrivate(secret)) => {
            let der = secret.to_pkcs8_der().map_err(invalid)?;
            Ok(SerializedKey::Pkcs8(der.as_bytes().to_vec()))
        },
        (KeyFormat::Spki, SoftMaterial::EcPublic(public)) => {
            let der = public.to_public_key_der().map_err(invalid)?;
            Ok(SerializedKey::Spki(der.as_bytes().to_vec()))
        },
        (KeyFormat::Jwk, SoftMaterial::EcPublic(public)) => Ok(SerializedKey::Jwk(public_jwk(public))),
        (KeyFormat::Jwk, SoftMaterial::EcPrivate(secret)) => {
            let mut jwk = public_jwk(&secret.public_key());
            jwk.d = Some(b64(&secret.to_bytes()));
            Ok(SerializedKey::Jwk(jwk))
        },
        (format, material) => Err(EngineError::UnsupportedParameters {
            reason: format!("{material:?} cannot be exported as {format}"),
        }),
    }
}

fn public_jwk(public: &PublicKey) -> JsonWebKey {
    let point = public.to_encoded_point(false);

    JsonWebKey {
        kty: "EC".to_string(),
        crv: Some(CURVE.to_string()),
        x: point.x().map(|x| b64(x)),
        y: point.y().map(|y| b64(y)),
        ..JsonWebKey::default()
    }
}

/// ECDSA over the digest selected by the call. Signatures are raw `r || s`.
pub(crate) fn sign(
    params: &OperationParams,
    material: &SoftMaterial,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::EcPrivate(secret) = material else {
        return Err(material.mismatch("P-256 private"));
    };

    let hashed = digest(params.hash(), data);
    let signature: Signature = SigningKey::from(secret)
        .sign_prehash(&hashed)
        .map_err(|e| EngineError::OperationFailed { reason: e.to_string() })?;
    Ok(signature.to_bytes().to_vec())
}

/// ECDSA verification. A malformed signature is simply invalid.
pub(crate) fn verify(
    params: &OperationParams,
    material: &SoftMaterial,
    signature: &[u8],
    data: &[u8],
) -> Result<bool, EngineError> {
    let SoftMaterial::EcPublic(public) = material else {
        return Err(material.mismatch("P-256 public"));
    };

    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };
    let hashed = digest(params.hash(), data);
    Ok(VerifyingKey::from(public).verify_prehash(&hashed, &signature).is_ok())
}

/// ECDH shared secret (the x coordinate), truncated to `length` bits.
pub(crate) fn derive_bits(
    private: &SoftMaterial,
    public: &SoftMaterial,
    length: Option<u32>,
) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::EcPrivate(secret) = private else {
        return Err(private.mismatch("P-256 private"));
    };
    let SoftMaterial::EcPublic(peer) = public else {
        return Err(public.mismatch("P-256 public"));
    };

    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    truncate_bits(shared.raw_secret_bytes().to_vec(), length)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use keysmith_core::EcScheme;

    use super::*;

    #[test]
    fn only_p256_is_accepted() {
        let mut params = EcParams { scheme: EcScheme::Ecdsa, named_curve: NamedCurve::P256 };
        assert!(check_curve(&params).is_ok());

        params.named_curve = NamedCurve::P384;
        assert!(matches!(check_curve(&params), Err(EngineError::UnsupportedParameters { .. })));
    }

    #[test]
    fn raw_is_uncompressed_sec1() {
        let public = SoftMaterial::EcPublic(generate().public_key());

        let SerializedKey::Raw(bytes) = export(KeyFormat::Raw, &public).unwrap() else {
            panic!("raw export must produce raw bytes");
        };

        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[0], 0x04);
    }

    #[test]
    fn jwk_private_roundtrip() {
        let private = SoftMaterial::EcPrivate(generate());
        let SerializedKey::Jwk(jwk) = export(KeyFormat::Jwk, &private).unwrap() else {
            panic!("jwk export must produce a JWK");
        };

        let reimported = import(SerializedKey::Jwk(jwk)).unwrap();

        let (SoftMaterial::EcPrivate(a), SoftMaterial::EcPrivate(b)) = (&private, &reimported) else {
            panic!("expected private material");
        };
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn jwk_with_foreign_d_is_rejected() {
        let SerializedKey::Jwk(mut jwk) =
            export(KeyFormat::Jwk, &SoftMaterial::EcPrivate(generate())).unwrap()
        else {
            panic!("jwk export must produce a JWK");
        };
        jwk.d = Some(b64(&generate().to_bytes()));

        assert!(matches!(import(SerializedKey::Jwk(jwk)), Err(EngineError::InvalidKeyData { .. })));
    }

    #[test]
    fn private_key_cannot_export_raw() {
        let result = export(KeyFormat::Raw, &SoftMaterial::EcPrivate(generate()));

        assert!(matches!(result, Err(EngineError::UnsupportedParameters { .. })));
    }
}
