//! Helpers shared by the algorithm families: base64url members, usage
//! acceptance rules and JWK metadata checks.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use keysmith_core::{AlgorithmName, EngineError, JsonWebKey, KeyType, Usage, Usages};

/// Encode a JWK member.
pub(crate) fn b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a required JWK member.
pub(crate) fn member(jwk: &JsonWebKey, value: Option<&String>, name: &str) -> Result<Vec<u8>, EngineError> {
    let value = value.ok_or_else(|| EngineError::InvalidKeyData {
        reason: format!("{} JWK is missing \"{name}\"", jwk.kty),
    })?;

    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| EngineError::InvalidKeyData { reason: format!("JWK member \"{name}\": {e}") })
}

/// Decode a member that must be exactly `N` bytes.
pub(crate) fn fixed_member<const N: usize>(
    jwk: &JsonWebKey,
    value: Option<&String>,
    name: &str,
) -> Result<[u8; N], EngineError> {
    let bytes = member(jwk, value, name)?;
    bytes.as_slice().try_into().map_err(|_| EngineError::InvalidKeyData {
        reason: format!("JWK member \"{name}\" must be {N} bytes, got {}", bytes.len()),
    })
}

/// Copy exactly `N` bytes out of raw material.
pub(crate) fn fixed_bytes<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], EngineError> {
    bytes.try_into().map_err(|_| EngineError::InvalidKeyData {
        reason: format!("{what} must be {N} bytes, got {}", bytes.len()),
    })
}

/// Usages must be ones the algorithm supports at all.
pub(crate) fn check_supported(name: AlgorithmName, usages: Usages) -> Result<(), EngineError> {
    let unsupported = usages.difference(name.supported_usages());
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(EngineError::InvalidUsages { reason: format!("{name} keys cannot have {unsupported}") })
    }
}

/// Usages must make sense for the key's role, and secret or private keys
/// must have at least one.
pub(crate) fn check_for_key_type(
    name: AlgorithmName,
    key_type: KeyType,
    usages: Usages,
) -> Result<(), EngineError> {
    let misplaced = usages.difference(key_type.permitted_usages());
    if !misplaced.is_empty() {
        return Err(EngineError::InvalidUsages {
            reason: format!("{key_type} {name} keys cannot have {misplaced}"),
        });
    }

    if usages.is_empty() && key_type != KeyType::Public {
        return Err(EngineError::InvalidUsages {
            reason: format!("{key_type} {name} keys need at least one usage"),
        });
    }

    Ok(())
}

/// Split requested usages between the halves of a generated pair.
pub(crate) fn split_pair_usages(
    name: AlgorithmName,
    usages: Usages,
) -> Result<(Usages, Usages), EngineError> {
    let public = usages.for_role(KeyType::Public);
    let private = usages.for_role(KeyType::Private);

    if private.is_empty() {
        return Err(EngineError::InvalidUsages {
            reason: format!("generated {name} private key would have no usages"),
        });
    }

    Ok((public, private))
}

/// JWK `ext` and `key_ops` must not grant less than the import asks for.
pub(crate) fn check_jwk_metadata(
    jwk: &JsonWebKey,
    extractable: bool,
    usages: Usages,
) -> Result<(), EngineError> {
    if extractable && jwk.ext == Some(false) {
        return Err(EngineError::InvalidKeyData {
            reason: "JWK is marked non-extractable".to_string(),
        });
    }

    if let Some(key_ops) = &jwk.key_ops {
        let granted: Usages = key_ops.iter().filter_map(|op| Usage::from_tag(op)).collect();
        let missing = usages.difference(granted);
        if !missing.is_empty() {
            return Err(EngineError::InvalidKeyData {
                reason: format!("JWK key_ops does not grant {missing}"),
            });
        }
    }

    Ok(())
}

/// Require the JWK to have the given `kty`.
pub(crate) fn expect_kty(jwk: &JsonWebKey, kty: &str) -> Result<(), EngineError> {
    if jwk.kty == kty {
        Ok(())
    } else {
        Err(EngineError::InvalidKeyData {
            reason: format!("expected a {kty} JWK, got {}", jwk.kty),
        })
    }
}

/// Truncate derived bits to `length` bits, masking a trailing partial byte.
pub(crate) fn truncate_bits(mut secret: Vec<u8>, length: Option<u32>) -> Result<Vec<u8>, EngineError> {
    let Some(length) = length else {
        return Ok(secret);
    };

    let available = secret.len() * 8;
    let length = length as usize;
    if length > available {
        return Err(EngineError::OperationFailed {
            reason: format!("requested {length} bits but only {available} are available"),
        });
    }

    secret.truncate(length.div_ceil(8));
    let spare = secret.len() * 8 - length;
    if spare > 0 {
        if let Some(last) = secret.last_mut() {
            *last &= 0xFF << spare;
        }
    }
    Ok(secret)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn truncate_masks_partial_byte() {
        let bits = truncate_bits(vec![0xFF, 0xFF, 0xFF], Some(12)).unwrap();

        assert_eq!(bits, vec![0xFF, 0xF0]);
    }

    #[test]
    fn truncate_rejects_overlong_request() {
        let result = truncate_bits(vec![0; 4], Some(40));

        assert!(matches!(result, Err(EngineError::OperationFailed { .. })));
    }

    #[test]
    fn truncate_without_length_is_identity() {
        assert_eq!(truncate_bits(vec![1, 2, 3], None).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn public_keys_may_have_no_usages() {
        assert!(check_for_key_type(AlgorithmName::Ecdsa, KeyType::Public, Usages::empty()).is_ok());
        assert!(
            check_for_key_type(AlgorithmName::Ecdsa, KeyType::Private, Usages::empty()).is_err()
        );
    }

    #[test]
    fn public_keys_cannot_sign() {
        let result = check_for_key_type(AlgorithmName::Ed25519, KeyType::Public, Usages::SIGN);

        assert!(matches!(result, Err(EngineError::InvalidUsages { .. })));
    }

    #[test]
    fn jwk_ext_false_blocks_extractable_import() {
        let jwk = JsonWebKey { kty: "oct".to_string(), ext: Some(false), ..JsonWebKey::default() };

        assert!(check_jwk_metadata(&jwk, true, Usages::SIGN).is_err());
        assert!(check_jwk_metadata(&jwk, false, Usages::SIGN).is_ok());
    }

    #[test]
    fn jwk_key_ops_must_cover_usages() {
        let jwk = JsonWebKey {
            kty: "oct".to_string(),
            key_ops: Some(vec!["sign".to_string()]),
            ..JsonWebKey::default()
        };

        assert!(check_jwk_metadata(&jwk, false, Usages::SIGN).is_ok());
        assert!(check_jwk_metadata(&jwk, false, Usages::SIGN | Usages::VERIFY).is_err());
    }

    #[test]
    fn member_roundtrip() {
        let jwk = JsonWebKey { kty: "oct".to_string(), k: Some(b64(&[1, 2, 3])), ..JsonWebKey::default() };

        assert_eq!(member(&jwk, jwk.k.as_ref(), "k").unwrap(), vec![1, 2, 3]);
        assert!(member(&jwk, jwk.d.as_ref(), "d").is_err());
        assert!(fixed_member::<32>(&jwk, jwk.k.as_ref(), "k").is_err());
    }
}
