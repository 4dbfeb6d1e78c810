//! Key serialization formats.
//!
//! The runtime tag is [`KeyFormat`]; serialized material travels as a
//! [`SerializedKey`], which carries its format with it. Callers pick the
//! shape they expect with one of the marker types ([`Raw`], [`Pkcs8`],
//! [`Spki`], [`Jwk`]); each fixes its output type through [`ExportFormat`],
//! so an export never has to be inspected for shape at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Serialization format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFormat {
    /// Unstructured bytes: symmetric key bytes or an encoded public point.
    Raw,
    /// PKCS#8 `PrivateKeyInfo`, DER.
    Pkcs8,
    /// X.509 `SubjectPublicKeyInfo`, DER.
    Spki,
    /// JSON Web Key.
    Jwk,
}

impl KeyFormat {
    /// Every format.
    pub const ALL: [Self; 4] = [Self::Raw, Self::Pkcs8, Self::Spki, Self::Jwk];

    /// Canonical name string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Pkcs8 => "pkcs8",
            Self::Spki => "spki",
            Self::Jwk => "jwk",
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON Web Key (RFC 7517) members used by the supported key types.
///
/// Binary members are base64url without padding, as on the wire.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type: `RSA`, `EC`, `OKP` or `oct`.
    pub kty: String,
    /// Curve name for `EC` and `OKP` keys.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crv: Option<String>,
    /// Intended algorithm.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alg: Option<String>,
    /// Public point x coordinate, or the OKP public key.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x: Option<String>,
    /// Public point y coordinate.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub y: Option<String>,
    /// Private scalar or RSA private exponent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub d: Option<String>,
    /// RSA modulus.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub n: Option<String>,
    /// RSA public exponent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub e: Option<String>,
    /// RSA first prime factor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub p: Option<String>,
    /// RSA second prime factor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub q: Option<String>,
    /// RSA first factor CRT exponent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dp: Option<String>,
    /// RSA second factor CRT exponent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dq: Option<String>,
    /// RSA CRT coefficient.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub qi: Option<String>,
    /// Symmetric key value.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub k: Option<String>,
    /// Permitted operations.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key_ops: Option<Vec<String>>,
    /// Extractability of the key this JWK was exported from.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ext: Option<bool>,
}

impl JsonWebKey {
    /// Returns true if the JWK carries private or secret members.
    pub fn has_private_members(&self) -> bool {
        self.d.is_some() || self.k.is_some()
    }
}

fn redact(member: &Option<String>) -> Option<&'static str> {
    member.as_ref().map(|_| "<redacted>")
}

// Private members are never printed.
impl fmt::Debug for JsonWebKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebKey")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("alg", &self.alg)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("n", &self.n)
            .field("e", &self.e)
            .field("d", &redact(&self.d))
            .field("p", &redact(&self.p))
            .field("q", &redact(&self.q))
            .field("dp", &redact(&self.dp))
            .field("dq", &redact(&self.dq))
            .field("qi", &redact(&self.qi))
            .field("k", &redact(&self.k))
            .field("key_ops", &self.key_ops)
            .field("ext", &self.ext)
            .finish()
    }
}

/// Serialized key material, tagged with its format.
#[derive(Clone, PartialEq, Eq)]
pub enum SerializedKey {
    /// Raw bytes.
    Raw(Vec<u8>),
    /// PKCS#8 DER.
    Pkcs8(Vec<u8>),
    /// SPKI DER.
    Spki(Vec<u8>),
    /// Structured JWK.
    Jwk(JsonWebKey),
}

impl SerializedKey {
    /// The format this material is in.
    pub fn format(&self) -> KeyFormat {
        match self {
            Self::Raw(_) => KeyFormat::Raw,
            Self::Pkcs8(_) => KeyFormat::Pkcs8,
            Self::Spki(_) => KeyFormat::Spki,
            Self::Jwk(_) => KeyFormat::Jwk,
        }
    }

    /// Flatten to bytes. JWKs become their JSON encoding.
    pub fn into_bytes(self) -> Result<Vec<u8>, EngineError> {
        match self {
            Self::Raw(bytes) | Self::Pkcs8(bytes) | Self::Spki(bytes) => Ok(bytes),
            Self::Jwk(jwk) => serde_json::to_vec(&jwk)
                .map_err(|e| EngineError::InvalidKeyData { reason: format!("JWK encoding: {e}") }),
        }
    }

    /// Rebuild from bytes produced by [`SerializedKey::into_bytes`].
    pub fn from_bytes(format: KeyFormat, bytes: Vec<u8>) -> Result<Self, EngineError> {
        match format {
            KeyFormat::Raw => Ok(Self::Raw(bytes)),
            KeyFormat::Pkcs8 => Ok(Self::Pkcs8(bytes)),
            KeyFormat::Spki => Ok(Self::Spki(bytes)),
            KeyFormat::Jwk => serde_json::from_slice(&bytes)
                .map(Self::Jwk)
                .map_err(|e| EngineError::InvalidKeyData { reason: format!("JWK decoding: {e}") }),
        }
    }
}

impl fmt::Debug for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(bytes) | Self::Pkcs8(bytes) | Self::Spki(bytes) => {
                write!(f, "SerializedKey::{}(<{} bytes>)", self.format(), bytes.len())
            },
            Self::Jwk(jwk) => f.debug_tuple("SerializedKey::jwk").field(jwk).finish(),
        }
    }
}

/// A format marker that fixes the Rust type of its material.
pub trait ExportFormat: Copy + Send + Sync + 'static {
    /// Runtime tag of this format.
    const FORMAT: KeyFormat;

    /// Material type for this format.
    type Output: Send + Sync;

    /// Tag material with this format.
    fn into_serialized(material: Self::Output) -> SerializedKey;

    /// Take material back out, if it is in this format.
    fn from_serialized(serialized: SerializedKey) -> Option<Self::Output>;
}

macro_rules! binary_format {
    ($marker:ident, $variant:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $marker;

        impl ExportFormat for $marker {
            const FORMAT: KeyFormat = KeyFormat::$variant;
            type Output = Vec<u8>;

            fn into_serialized(material: Vec<u8>) -> SerializedKey {
                SerializedKey::$variant(material)
            }

            fn from_serialized(serialized: SerializedKey) -> Option<Vec<u8>> {
                match serialized {
                    SerializedKey::$variant(bytes) => Some(bytes),
                    _ => None,
                }
            }
        }
    };
}

binary_format!(Raw, Raw, "Raw format marker; material is `Vec<u8>`.");
binary_format!(Pkcs8, Pkcs8, "PKCS#8 format marker; material is `Vec<u8>`.");
binary_format!(Spki, Spki, "SPKI format marker; material is `Vec<u8>`.");

/// JWK format marker; material is a [`JsonWebKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Jwk;

impl ExportFormat for Jwk {
    const FORMAT: KeyFormat = KeyFormat::Jwk;
    type Output = JsonWebKey;

    fn into_serialized(material: JsonWebKey) -> SerializedKey {
        SerializedKey::Jwk(material)
    }

    fn from_serialized(serialized: SerializedKey) -> Option<JsonWebKey> {
        match serialized {
            SerializedKey::Jwk(jwk) => Some(jwk),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn oct_jwk() -> JsonWebKey {
        JsonWebKey {
            kty: "oct".to_string(),
            k: Some("c2VjcmV0".to_string()),
            alg: Some("A256GCM".to_string()),
            ..JsonWebKey::default()
        }
    }

    #[test]
    fn markers_accept_only_their_own_format() {
        assert_eq!(Spki::from_serialized(SerializedKey::Spki(vec![1, 2])), Some(vec![1, 2]));
        assert_eq!(Spki::from_serialized(SerializedKey::Pkcs8(vec![1, 2])), None);
        assert!(Jwk::from_serialized(SerializedKey::Raw(vec![])).is_none());
        assert_eq!(Raw::into_serialized(vec![7]).format(), KeyFormat::Raw);
    }

    #[test]
    fn jwk_bytes_are_json() {
        let bytes = SerializedKey::Jwk(oct_jwk()).into_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["kty"], "oct");
        assert!(json.get("d").is_none(), "absent members must be skipped");

        let back = SerializedKey::from_bytes(KeyFormat::Jwk, bytes).unwrap();
        assert_eq!(back, SerializedKey::Jwk(oct_jwk()));
    }

    #[test]
    fn malformed_jwk_bytes_are_invalid_key_data() {
        let result = SerializedKey::from_bytes(KeyFormat::Jwk, b"not json".to_vec());

        assert!(matches!(result, Err(EngineError::InvalidKeyData { .. })));
    }

    #[test]
    fn debug_redacts_secret_members() {
        let printed = format!("{:?}", oct_jwk());

        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("c2VjcmV0"));
    }

    #[test]
    fn binary_debug_prints_length_only() {
        let printed = format!("{:?}", SerializedKey::Pkcs8(vec![0xAA; 5]));

        assert_eq!(printed, "SerializedKey::pkcs8(<5 bytes>)");
    }
}
