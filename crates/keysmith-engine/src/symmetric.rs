//! Secret-key families: AES in CTR, CBC, GCM and KW modes, and HMAC.

use aes::cipher::generic_array::GenericArray;
use aes_gcm::{
    AesGcm,
    aead::{Aead, KeyInit, Payload, consts::U12},
};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use keysmith_core::{
    AesMode, AesParams, EngineError, HashAlgorithm, HmacParams, JsonWebKey, KeyFormat,
    OperationParams, SerializedKey,
};

use crate::{
    codec::{b64, expect_kty, member},
    material::SoftMaterial,
};

/// Run `$body` with `$cipher` bound to the AES variant matching the key.
macro_rules! with_aes {
    ($key:expr, $cipher:ident => $body:expr) => {
        match $key.len() {
            16 => {
                type $cipher = aes::Aes128;
                $body
            },
            24 => {
                type $cipher = aes::Aes192;
                $body
            },
            32 => {
                type $cipher = aes::Aes256;
                $body
            },
            other => {
                return Err(EngineError::InvalidKeyData {
                    reason: format!("AES keys are 16, 24 or 32 bytes, got {other}"),
                })
            },
        }
    };
}

const GCM_IV_LEN: usize = 12;
const GCM_TAG_BITS: u32 = 128;
const BLOCK_LEN: usize = 16;

fn failed(reason: impl Into<String>) -> EngineError {
    EngineError::OperationFailed { reason: reason.into() }
}

fn unsupported(reason: impl Into<String>) -> EngineError {
    EngineError::UnsupportedParameters { reason: reason.into() }
}

/// Fresh key bytes from the OS.
pub(crate) fn random_bytes(len: usize) -> Result<Vec<u8>, EngineError> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(|e| {
        tracing::error!("getrandom failed: {}", e);
        EngineError::Backend { reason: format!("getrandom failed: {e}") }
    })?;
    Ok(bytes)
}

/// Key bytes from raw or `oct` JWK material.
fn secret_from(material: SerializedKey, expected_alg: &str) -> Result<Vec<u8>, EngineError> {
    match material {
        SerializedKey::Raw(bytes) => Ok(bytes),
        SerializedKey::Jwk(jwk) => {
            expect_kty(&jwk, "oct")?;
            if let Some(alg) = &jwk.alg {
                if alg != expected_alg {
                    return Err(EngineError::InvalidKeyData {
                        reason: format!("JWK alg {alg} does not match {expected_alg}"),
                    });
                }
            }
            member(&jwk, jwk.k.as_ref(), "k")
        },
        other => Err(unsupported(format!("secret keys cannot be imported from {}", other.format()))),
    }
}

fn secret_to(format: KeyFormat, bytes: &[u8], alg: String) -> Result<SerializedKey, EngineError> {
    match format {
        KeyFormat::Raw => Ok(SerializedKey::Raw(bytes.to_vec())),
        KeyFormat::Jwk => Ok(SerializedKey::Jwk(JsonWebKey {
            kty: "oct".to_string(),
            alg: Some(alg),
            k: Some(b64(bytes)),
            ..JsonWebKey::default()
        })),
        other => Err(unsupported(format!("secret keys cannot be exported as {other}"))),
    }
}

fn aes_alg(params: &AesParams) -> String {
    let suffix = match params.mode {
        AesMode::Ctr => "CTR",
        AesMode::Cbc => "CBC",
        AesMode::Gcm => "GCM",
        AesMode::Kw => "KW",
    };
    format!("A{}{suffix}", params.length)
}

/// AES key lengths the engine accepts.
pub(crate) fn check_aes_length(length: u32) -> Result<(), EngineError> {
    match length {
        128 | 192 | 256 => Ok(()),
        other => Err(unsupported(format!("AES key length {other} is not 128, 192 or 256"))),
    }
}

/// Parse AES key bytes; the descriptor length follows the material.
pub(crate) fn import_aes(
    material: SerializedKey,
    requested: &AesParams,
) -> Result<(SoftMaterial, AesParams), EngineError> {
    let bytes = secret_from(material, &aes_alg(requested))?;
    let length = u32::try_from(bytes.len() * 8).unwrap_or(u32::MAX);
    check_aes_length(length).map_err(|e| EngineError::InvalidKeyData { reason: e.reason().to_string() })?;

    Ok((SoftMaterial::secret(&bytes), AesParams { length, ..*requested }))
}

/// Serialize AES key bytes.
pub(crate) fn export_aes(
    format: KeyFormat,
    material: &SoftMaterial,
    params: &AesParams,
) -> Result<SerializedKey, EngineError> {
    secret_to(format, material.secret_bytes()?, aes_alg(params))
}

/// Encrypt with AES-CTR, AES-CBC or AES-GCM.
pub(crate) fn aes_encrypt(
    params: &OperationParams,
    mode: AesMode,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    match mode {
        AesMode::Gcm => {
            let iv = gcm_iv(params)?;
            let payload = Payload { msg: data, aad: params.additional_data().unwrap_or_default() };
            with_aes!(key, A => {
                let cipher = AesGcm::<A, U12>::new_from_slice(key).map_err(|e| failed(e.to_string()))?;
                cipher
                    .encrypt(GenericArray::from_slice(iv), payload)
                    .map_err(|_| failed("AES-GCM encryption failed"))
            })
        },
        AesMode::Cbc => {
            let iv = cbc_iv(params)?;
            with_aes!(key, A => {
                let cipher = cbc::Encryptor::<A>::new_from_slices(key, iv)
                    .map_err(|e| failed(e.to_string()))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
            })
        },
        AesMode::Ctr => ctr_apply(params, key, data),
        AesMode::Kw => Err(unsupported("AES-KW only wraps keys")),
    }
}

/// Decrypt with AES-CTR, AES-CBC or AES-GCM.
pub(crate) fn aes_decrypt(
    params: &OperationParams,
    mode: AesMode,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    match mode {
        AesMode::Gcm => {
            let iv = gcm_iv(params)?;
            let payload = Payload { msg: data, aad: params.additional_data().unwrap_or_default() };
            with_aes!(key, A => {
                let cipher = AesGcm::<A, U12>::new_from_slice(key).map_err(|e| failed(e.to_string()))?;
                cipher
                    .decrypt(GenericArray::from_slice(iv), payload)
                    .map_err(|_| failed("AES-GCM authentication failed"))
            })
        },
        AesMode::Cbc => {
            let iv = cbc_iv(params)?;
            with_aes!(key, A => {
                let cipher = cbc::Decryptor::<A>::new_from_slices(key, iv)
                    .map_err(|e| failed(e.to_string()))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| failed("AES-CBC padding is invalid"))
            })
        },
        AesMode::Ctr => ctr_apply(params, key, data),
        AesMode::Kw => Err(unsupported("AES-KW only unwraps keys")),
    }
}

fn gcm_iv(params: &OperationParams) -> Result<&[u8], EngineError> {
    if let Some(tag) = params.tag_length() {
        if tag != GCM_TAG_BITS {
            return Err(unsupported(format!("AES-GCM tag length {tag} is not {GCM_TAG_BITS}")));
        }
    }

    match params.iv() {
        Some(iv) if iv.len() == GCM_IV_LEN => Ok(iv),
        Some(iv) => Err(unsupported(format!("AES-GCM needs a {GCM_IV_LEN}-byte IV, got {}", iv.len()))),
        None => Err(unsupported("AES-GCM needs an IV")),
    }
}

fn cbc_iv(params: &OperationParams) -> Result<&[u8], EngineError> {
    match params.iv() {
        Some(iv) if iv.len() == BLOCK_LEN => Ok(iv),
        Some(iv) => Err(unsupported(format!("AES-CBC needs a {BLOCK_LEN}-byte IV, got {}", iv.len()))),
        None => Err(unsupported("AES-CBC needs an IV")),
    }
}

/// CTR is its own inverse. Only the rightmost `counter_length` bits of the
/// counter block increment.
fn ctr_apply(params: &OperationParams, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let counter = match params.counter() {
        Some(counter) if counter.len() == BLOCK_LEN => counter,
        Some(counter) => {
            return Err(unsupported(format!(
                "AES-CTR needs a {BLOCK_LEN}-byte counter, got {}",
                counter.len()
            )));
        },
        None => return Err(unsupported("AES-CTR needs a counter block")),
    };

    let mut buf = data.to_vec();
    let counter_length = params.counter_length().unwrap_or(64);
    let wrapped = |_| failed("AES-CTR counter would wrap");
    with_aes!(key, A => {
        match counter_length {
            32 => ctr::Ctr32BE::<A>::new_from_slices(key, counter)
                .map_err(|e| failed(e.to_string()))?
                .try_apply_keystream(&mut buf)
                .map_err(wrapped)?,
            64 => ctr::Ctr64BE::<A>::new_from_slices(key, counter)
                .map_err(|e| failed(e.to_string()))?
                .try_apply_keystream(&mut buf)
                .map_err(wrapped)?,
            128 => ctr::Ctr128BE::<A>::new_from_slices(key, counter)
                .map_err(|e| failed(e.to_string()))?
                .try_apply_keystream(&mut buf)
                .map_err(wrapped)?,
            other => {
                return Err(unsupported(format!(
                    "AES-CTR counter length {other} is not 32, 64 or 128"
                )));
            },
        }
    });
    Ok(buf)
}

/// RFC 3394 key wrap.
pub(crate) fn kw_wrap(key: &[u8], data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut out = vec![0u8; data.len() + 8];
    with_aes!(key, A => {
        aes_kw::Kek::<A>::new(GenericArray::from_slice(key))
            .wrap(data, &mut out)
            .map_err(|e| failed(format!("AES-KW wrap failed: {e}")))?;
    });
    Ok(out)
}

/// RFC 3394 key unwrap; fails on integrity check mismatch.
pub(crate) fn kw_unwrap(key: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, EngineError> {
    let len = wrapped
        .len()
        .checked_sub(8)
        .ok_or_else(|| failed("AES-KW input is shorter than one semiblock"))?;
    let mut out = vec![0u8; len];
    with_aes!(key, A => {
        aes_kw::Kek::<A>::new(GenericArray::from_slice(key))
            .unwrap(wrapped, &mut out)
            .map_err(|e| failed(format!("AES-KW unwrap failed: {e}")))?;
    });
    Ok(out)
}

fn hmac_alg(hash: HashAlgorithm) -> String {
    format!("HS{}", hash.output_len() * 8)
}

/// HMAC key lengths must be a positive whole number of bytes.
pub(crate) fn hmac_key_len(params: &HmacParams) -> Result<usize, EngineError> {
    let bits = params.length.unwrap_or_else(|| u32::try_from(params.hash.block_len() * 8).unwrap_or(512));
    if bits == 0 || bits % 8 != 0 {
        return Err(unsupported(format!("HMAC key length {bits} is not a positive multiple of 8")));
    }
    Ok(bits as usize / 8)
}

/// Parse HMAC key bytes. An explicit requested length must match.
pub(crate) fn import_hmac(
    material: SerializedKey,
    requested: &HmacParams,
) -> Result<(SoftMaterial, HmacParams), EngineError> {
    let bytes = secret_from(material, &hmac_alg(requested.hash))?;
    if bytes.is_empty() {
        return Err(EngineError::InvalidKeyData { reason: "HMAC key is empty".to_string() });
    }

    let length = u32::try_from(bytes.len() * 8).unwrap_or(u32::MAX);
    if let Some(requested_length) = requested.length {
        if requested_length != length {
            return Err(EngineError::InvalidKeyData {
                reason: format!("HMAC key is {length} bits, expected {requested_length}"),
            });
        }
    }

    Ok((SoftMaterial::secret(&bytes), HmacParams { length: Some(length), ..*requested }))
}

/// Serialize HMAC key bytes.
pub(crate) fn export_hmac(
    format: KeyFormat,
    material: &SoftMaterial,
    params: &HmacParams,
) -> Result<SerializedKey, EngineError> {
    secret_to(format, material.secret_bytes()?, hmac_alg(params.hash))
}

/// HMAC tag over `data`.
pub(crate) fn hmac_sign(hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, EngineError> {
    with_digest!(hash, D => {
        let mut mac = <Hmac<D> as Mac>::new_from_slice(key).map_err(|e| failed(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    })
}

/// Constant-time HMAC tag check.
pub(crate) fn hmac_verify(
    hash: HashAlgorithm,
    key: &[u8],
    tag: &[u8],
    data: &[u8],
) -> Result<bool, EngineError> {
    with_digest!(hash, D => {
        let mut mac = <Hmac<D> as Mac>::new_from_slice(key).map_err(|e| failed(e.to_string()))?;
        mac.update(data);
        Ok(mac.verify_slice(tag).is_ok())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keysmith_core::{AlgorithmParams, OperationOptions};

    use super::*;

    fn params(mode: AesMode, options: &OperationOptions) -> OperationParams {
        options.merge_onto(&AlgorithmParams::Aes(AesParams { mode, length: 128 }))
    }

    #[test]
    fn kw_matches_rfc3394_vector() {
        // RFC 3394 section 4.1
        let kek: Vec<u8> = (0u8..16).collect();
        let data = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let expected = [
            0x1F, 0xA6, 0x8B, 0x0A, 0x81, 0x12, 0xB4, 0x47, 0xAE, 0xF3, 0x4B, 0xD8, 0xFB, 0x5A,
            0x7B, 0x82, 0x9D, 0x3E, 0x86, 0x23, 0x71, 0xD2, 0xCF, 0xE5,
        ];

        let wrapped = kw_wrap(&kek, &data).unwrap();

        assert_eq!(wrapped, expected);
        assert_eq!(kw_unwrap(&kek, &wrapped).unwrap(), data);
    }

    #[test]
    fn kw_unwrap_detects_tampering() {
        let kek = [7u8; 32];
        let mut wrapped = kw_wrap(&kek, &[1u8; 32]).unwrap();
        wrapped[5] ^= 1;

        assert!(matches!(kw_unwrap(&kek, &wrapped), Err(EngineError::OperationFailed { .. })));
    }

    #[test]
    fn gcm_requires_96_bit_iv() {
        let key = [1u8; 16];
        let short = params(AesMode::Gcm, &OperationOptions::new().with_iv(vec![0u8; 8]));

        let result = aes_encrypt(&short, AesMode::Gcm, &key, b"data");

        assert!(matches!(result, Err(EngineError::UnsupportedParameters { .. })));
    }

    #[test]
    fn gcm_rejects_short_tags() {
        let key = [1u8; 16];
        let options = OperationOptions::new().with_iv(vec![0u8; 12]).with_tag_length(96);

        let result = aes_encrypt(&params(AesMode::Gcm, &options), AesMode::Gcm, &key, b"data");

        assert!(matches!(result, Err(EngineError::UnsupportedParameters { .. })));
    }

    #[test]
    fn gcm_binds_additional_data() {
        let key = [3u8; 32];
        let sealed_with = OperationOptions::new().with_iv(vec![9u8; 12]).with_additional_data(b"header".to_vec());
        let opened_with = OperationOptions::new().with_iv(vec![9u8; 12]).with_additional_data(b"other".to_vec());

        let ciphertext = aes_encrypt(&params(AesMode::Gcm, &sealed_with), AesMode::Gcm, &key, b"body").unwrap();

        assert_eq!(ciphertext.len(), 4 + 16);
        assert!(aes_decrypt(&params(AesMode::Gcm, &opened_with), AesMode::Gcm, &key, &ciphertext).is_err());
        assert_eq!(
            aes_decrypt(&params(AesMode::Gcm, &sealed_with), AesMode::Gcm, &key, &ciphertext).unwrap(),
            b"body"
        );
    }

    #[test]
    fn cbc_pads_to_block() {
        let key = [5u8; 24];
        let options = OperationOptions::new().with_iv(vec![0u8; 16]);
        let p = params(AesMode::Cbc, &options);

        let ciphertext = aes_encrypt(&p, AesMode::Cbc, &key, &[0u8; 16]).unwrap();

        assert_eq!(ciphertext.len(), 32);
        assert_eq!(aes_decrypt(&p, AesMode::Cbc, &key, &ciphertext).unwrap(), vec![0u8; 16]);
    }

    #[test]
    fn ctr_is_length_preserving_and_self_inverse() {
        let key = [8u8; 16];
        let options = OperationOptions::new().with_counter(vec![0u8; 16], 64);
        let p = params(AesMode::Ctr, &options);

        let ciphertext = aes_encrypt(&p, AesMode::Ctr, &key, b"seventeen bytes!!").unwrap();

        assert_eq!(ciphertext.len(), 17);
        assert_eq!(aes_decrypt(&p, AesMode::Ctr, &key, &ciphertext).unwrap(), b"seventeen bytes!!");
    }

    #[test]
    fn ctr_rejects_odd_counter_length() {
        let options = OperationOptions::new().with_counter(vec![0u8; 16], 48);

        let result = aes_encrypt(&params(AesMode::Ctr, &options), AesMode::Ctr, &[0u8; 16], b"x");

        assert!(matches!(result, Err(EngineError::UnsupportedParameters { .. })));
    }

    #[test]
    fn bad_key_length_is_invalid_key_data() {
        let options = OperationOptions::new().with_iv(vec![0u8; 16]);

        let result = aes_encrypt(&params(AesMode::Cbc, &options), AesMode::Cbc, &[0u8; 20], b"x");

        assert!(matches!(result, Err(EngineError::InvalidKeyData { .. })));
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let tag = hmac_sign(HashAlgorithm::Sha256, b"Jefe", b"what do ya want for nothing?").unwrap();

        assert_eq!(
            tag[..8],
            [0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e]
        );
        assert!(hmac_verify(HashAlgorithm::Sha256, b"Jefe", &tag, b"what do ya want for nothing?").unwrap());
        assert!(!hmac_verify(HashAlgorithm::Sha256, b"Jefe", &tag, b"what do ya want for something?").unwrap());
    }

    #[test]
    fn hmac_default_length_is_block_size() {
        let sha512 = HmacParams { hash: HashAlgorithm::Sha512, length: None };

        assert_eq!(hmac_key_len(&sha512).unwrap(), 128);
        assert!(hmac_key_len(&HmacParams { hash: HashAlgorithm::Sha256, length: Some(12) }).is_err());
    }

    #[test]
    fn hmac_import_length_must_match() {
        let requested = HmacParams { hash: HashAlgorithm::Sha256, length: Some(256) };

        assert!(import_hmac(SerializedKey::Raw(vec![1; 32]), &requested).is_ok());
        assert!(import_hmac(SerializedKey::Raw(vec![1; 16]), &requested).is_err());
    }

    #[test]
    fn aes_jwk_alg_is_checked() {
        let requested = AesParams { mode: AesMode::Gcm, length: 128 };
        let jwk = JsonWebKey {
            kty: "oct".to_string(),
            alg: Some("A128CBC".to_string()),
            k: Some(b64(&[0u8; 16])),
            ..JsonWebKey::default()
        };

        assert!(import_aes(SerializedKey::Jwk(jwk), &requested).is_err());
    }

    #[test]
    fn aes_import_takes_length_from_material() {
        let requested = AesParams { mode: AesMode::Ctr, length: 128 };

        let (_, params) = import_aes(SerializedKey::Raw(vec![0u8; 32]), &requested).unwrap();

        assert_eq!(params.length, 256);
    }
}
