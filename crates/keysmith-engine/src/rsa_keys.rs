//! RSA-OAEP and RSA-PSS.

use keysmith_core::{
    EngineError, HashAlgorithm, JsonWebKey, KeyFormat, OperationParams, RsaHashedParams, RsaScheme,
    SerializedKey,
};
use rand::rngs::OsRng;
use rsa::{
    BigUint, Oaep, Pss, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    traits::{PrivateKeyParts, PublicKeyParts},
};

use crate::{
    SoftEngineConfig,
    codec::{b64, expect_kty, member},
    digest,
    material::SoftMaterial,
};

fn invalid(e: impl std::fmt::Display) -> EngineError {
    EngineError::InvalidKeyData { reason: e.to_string() }
}

fn failed(e: impl std::fmt::Display) -> EngineError {
    EngineError::OperationFailed { reason: e.to_string() }
}

/// Reject parameters the engine will not generate.
pub(crate) fn check_generation(
    params: &RsaHashedParams,
    config: &SoftEngineConfig,
) -> Result<(), EngineError> {
    let bits = params.modulus_length;
    if bits < config.min_rsa_modulus_bits || bits > config.max_rsa_modulus_bits {
        return Err(EngineError::UnsupportedParameters {
            reason: format!(
                "modulus length {bits} outside {}..={}",
                config.min_rsa_modulus_bits, config.max_rsa_modulus_bits
            ),
        });
    }

    let e = params.public_exponent;
    if e < 3 || e % 2 == 0 {
        return Err(EngineError::UnsupportedParameters {
            reason: format!("public exponent {e} must be odd and at least 3"),
        });
    }

    Ok(())
}

/// Generate a private key. CPU-heavy; callers offload it.
pub(crate) fn generate(params: &RsaHashedParams) -> Result<RsaPrivateKey, EngineError> {
    RsaPrivateKey::new_with_exp(
        &mut OsRng,
        params.modulus_length as usize,
        &BigUint::from(params.public_exponent),
    )
    .map_err(|e| EngineError::UnsupportedParameters { reason: e.to_string() })
}

/// Descriptor for a concrete key: scheme and hash from the request, sizes
/// from the material.
pub(crate) fn describe(key: &impl PublicKeyParts, requested: &RsaHashedParams) -> RsaHashedParams {
    let exponent = key
        .e()
        .to_bytes_be()
        .iter()
        .fold(0u64, |acc, byte| acc.saturating_mul(256).saturating_add(u64::from(*byte)));

    RsaHashedParams {
        modulus_length: u32::try_from(key.n().bits()).unwrap_or(u32::MAX),
        public_exponent: u32::try_from(exponent).unwrap_or(u32::MAX),
        ..*requested
    }
}

fn jwk_alg(params: &RsaHashedParams) -> &'static str {
    match (params.scheme, params.hash) {
        (RsaScheme::Oaep, HashAlgorithm::Sha256) => "RSA-OAEP-256",
        (RsaScheme::Oaep, HashAlgorithm::Sha384) => "RSA-OAEP-384",
        (RsaScheme::Oaep, HashAlgorithm::Sha512) => "RSA-OAEP-512",
        (RsaScheme::Pss, HashAlgorithm::Sha256) => "PS256",
        (RsaScheme::Pss, HashAlgorithm::Sha384) => "PS384",
        (RsaScheme::Pss, HashAlgorithm::Sha512) => "PS512",
    }
}

/// Parse material into a key plus its concrete descriptor.
pub(crate) fn import(
    material: SerializedKey,
    requested: &RsaHashedParams,
) -> Result<(SoftMaterial, RsaHashedParams), EngineError> {
    match material {
        SerializedKey::Pkcs8(der) => {
            let key = RsaPrivateKey::from_pkcs8_der(&der).map_err(invalid)?;
            let params = describe(&key, requested);
            Ok((SoftMaterial::RsaPrivate(key), params))
        },
        SerializedKey::Spki(der) => {
            let key = RsaPublicKey::from_public_key_der(&der).map_err(invalid)?;
            let params = describe(&key, requested);
            Ok((SoftMaterial::RsaPublic(key), params))
        },
        SerializedKey::Jwk(jwk) => import_jwk(&jwk, requested),
        SerializedKey::Raw(_) => Err(EngineError::UnsupportedParameters {
            reason: "RSA keys cannot be imported from raw".to_string(),
        }),
    }
}

fn import_jwk(
    jwk: &JsonWebKey,
    requested: &RsaHashedParams,
) -> Result<(SoftMaterial, RsaHashedParams), EngineError> {
    expect_kty(jwk, "RSA")?;
    if let Some(alg) = &jwk.alg {
        let expected = jwk_alg(requested);
        if alg != expected {
            return Err(EngineError::InvalidKeyData {
                reason: format!("JWK alg {alg} does not match {expected}"),
            });
        }
    }

    let big = |value: Option<&String>, name: &str| -> Result<BigUint, EngineError> {
        Ok(BigUint::from_bytes_be(&member(jwk, value, name)?))
    };
    let n = big(jwk.n.as_ref(), "n")?;
    let e = big(jwk.e.as_ref(), "e")?;

    if jwk.d.is_none() {
        let key = RsaPublicKey::new(n, e).map_err(invalid)?;
        let params = describe(&key, requested);
        return Ok((SoftMaterial::RsaPublic(key), params));
    }

    let d = big(jwk.d.as_ref(), "d")?;
    let p = big(jwk.p.as_ref(), "p")?;
    let q = big(jwk.q.as_ref(), "q")?;
    let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(invalid)?;
    key.validate().map_err(invalid)?;
    key.precompute().map_err(invalid)?;

    let params = describe(&key, requested);
    Ok((SoftMaterial::RsaPrivate(key), params))
}

/// Serialize a key.
pub(crate) fn export(
    format: KeyFormat,
    material: &SoftMaterial,
    params: &RsaHashedParams,
) -> Result<SerializedKey, EngineError> {
    match (format, material) {
        (KeyFormat::Pkcs8, SoftMaterial::RsaPrivate(key)) => {
            let der = key.to_pkcs8_der().map_err(failed)?;
            Ok(SerializedKey::Pkcs8(der.as_bytes().to_vec()))
        },
        (KeyFormat::Spki, SoftMaterial::RsaPublic(key)) => {
            let der = key.to_public_key_der().map_err(failed)?;
            Ok(SerializedKey::Spki(der.as_bytes().to_vec()))
        },
        (KeyFormat::Jwk, SoftMaterial::RsaPublic(key)) => Ok(SerializedKey::Jwk(public_jwk(key, params))),
        (KeyFormat::Jwk, SoftMaterial::RsaPrivate(key)) => {
            let mut jwk = public_jwk(key, params);
            let [p, q] = key.primes() else {
                return Err(EngineError::UnsupportedParameters {
                    reason: "multi-prime RSA keys cannot be exported as JWK".to_string(),
                });
            };
            jwk.d = Some(b64(&key.d().to_bytes_be()));
            jwk.p = Some(b64(&p.to_bytes_be()));
            jwk.q = Some(b64(&q.to_bytes_be()));
            jwk.dp = key.dp().map(|dp| b64(&dp.to_bytes_be()));
            jwk.dq = key.dq().map(|dq| b64(&dq.to_bytes_be()));
            jwk.qi = key.crt_coefficient().map(|qi| b64(&qi.to_bytes_be()));
            Ok(SerializedKey::Jwk(jwk))
        },
        (format, material) => Err(EngineError::UnsupportedParameters {
            reason: format!("{material:?} cannot be exported as {format}"),
        }),
    }
}

fn public_jwk(key: &impl PublicKeyParts, params: &RsaHashedParams) -> JsonWebKey {
    JsonWebKey {
        kty: "RSA".to_string(),
        alg: Some(jwk_alg(params).to_string()),
        n: Some(b64(&key.n().to_bytes_be())),
        e: Some(b64(&key.e().to_bytes_be())),
        ..JsonWebKey::default()
    }
}

fn oaep(params: &OperationParams) -> Result<Oaep, EngineError> {
    let label = params
        .label()
        .filter(|label| !label.is_empty())
        .map(|label| String::from_utf8(label.to_vec()))
        .transpose()
        .map_err(|_| EngineError::UnsupportedParameters {
            reason: "OAEP labels must be UTF-8".to_string(),
        })?;

    Ok(with_digest!(params.hash(), D => match label {
        Some(label) => Oaep::new_with_label::<D, String>(label),
        None => Oaep::new::<D>(),
    }))
}

fn pss(params: &OperationParams) -> Pss {
    let salt = params.salt_length().unwrap_or_else(|| params.hash().output_len());
    with_digest!(params.hash(), D => Pss::new_with_salt::<D>(salt))
}

/// RSA-OAEP encryption with a public key.
pub(crate) fn encrypt(
    params: &OperationParams,
    material: &SoftMaterial,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::RsaPublic(key) = material else {
        return Err(material.mismatch("RSA public"));
    };
    key.encrypt(&mut OsRng, oaep(params)?, data).map_err(failed)
}

/// RSA-OAEP decryption with a private key.
pub(crate) fn decrypt(
    params: &OperationParams,
    material: &SoftMaterial,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::RsaPrivate(key) = material else {
        return Err(material.mismatch("RSA private"));
    };
    key.decrypt(oaep(params)?, data).map_err(failed)
}

/// RSA-PSS signature over the digest of `data`.
pub(crate) fn sign(
    params: &OperationParams,
    material: &SoftMaterial,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let SoftMaterial::RsaPrivate(key) = material else {
        return Err(material.mismatch("RSA private"));
    };
    let hashed = digest(params.hash(), data);
    key.sign_with_rng(&mut OsRng, pss(params), &hashed).map_err(failed)
}

/// RSA-PSS verification. A malformed signature is simply invalid.
pub(crate) fn verify(
    params: &OperationParams,
    material: &SoftMaterial,
    signature: &[u8],
    data: &[u8],
) -> Result<bool, EngineError> {
    let SoftMaterial::RsaPublic(key) = material else {
        return Err(material.mismatch("RSA public"));
    };
    let hashed = digest(params.hash(), data);
    Ok(key.verify(pss(params), &hashed, signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oaep_params(bits: u32, e: u32) -> RsaHashedParams {
        RsaHashedParams {
            scheme: RsaScheme::Oaep,
            modulus_length: bits,
            public_exponent: e,
            hash: HashAlgorithm::Sha256,
        }
    }

    #[test]
    fn generation_bounds_follow_config() {
        let config = SoftEngineConfig::default();

        assert!(check_generation(&oaep_params(2048, 65537), &config).is_ok());
        assert!(check_generation(&oaep_params(512, 65537), &config).is_err());
        assert!(check_generation(&oaep_params(2048, 4), &config).is_err());
        assert!(check_generation(&oaep_params(2048, 1), &config).is_err());
    }

    #[test]
    fn jwk_alg_names() {
        assert_eq!(jwk_alg(&oaep_params(2048, 65537)), "RSA-OAEP-256");
        let pss = RsaHashedParams { scheme: RsaScheme::Pss, hash: HashAlgorithm::Sha512, ..oaep_params(2048, 3) };
        assert_eq!(jwk_alg(&pss), "PS512");
    }

    #[test]
    fn raw_import_is_rejected() {
        let result = import(SerializedKey::Raw(vec![0; 32]), &oaep_params(2048, 65537));

        assert!(matches!(result, Err(EngineError::UnsupportedParameters { .. })));
    }

    #[test]
    fn jwk_without_modulus_is_invalid() {
        let jwk = JsonWebKey { kty: "RSA".to_string(), e: Some(b64(&[1, 0, 1])), ..JsonWebKey::default() };

        let result = import(SerializedKey::Jwk(jwk), &oaep_params(2048, 65537));

        assert!(matches!(result, Err(EngineError::InvalidKeyData { .. })));
    }
}
