//! Key material held inside each [`Key`](keysmith_core::Key) produced by
//! [`SoftEngine`](crate::SoftEngine).

use std::fmt;

use keysmith_core::{EngineError, KeyType};
use zeroize::Zeroizing;

/// Parsed, ready-to-use key material.
///
/// Secret bytes are zeroized on drop. `Debug` never prints key bytes.
pub enum SoftMaterial {
    /// RSA private key (carries the public half).
    RsaPrivate(rsa::RsaPrivateKey),
    /// RSA public key.
    RsaPublic(rsa::RsaPublicKey),
    /// P-256 private scalar.
    EcPrivate(p256::SecretKey),
    /// P-256 public point.
    EcPublic(p256::PublicKey),
    /// Ed25519 signing key.
    Ed25519Private(ed25519_dalek::SigningKey),
    /// Ed25519 verifying key.
    Ed25519Public(ed25519_dalek::VerifyingKey),
    /// X25519 static secret.
    X25519Private(x25519_dalek::StaticSecret),
    /// X25519 public key.
    X25519Public(x25519_dalek::PublicKey),
    /// Symmetric key bytes (AES or HMAC).
    Secret(Zeroizing<Vec<u8>>),
}

impl SoftMaterial {
    /// Symmetric bytes from a slice.
    pub fn secret(bytes: &[u8]) -> Self {
        Self::Secret(Zeroizing::new(bytes.to_vec()))
    }

    /// Role implied by the material.
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::RsaPrivate(_)
            | Self::EcPrivate(_)
            | Self::Ed25519Private(_)
            | Self::X25519Private(_) => KeyType::Private,
            Self::RsaPublic(_) | Self::EcPublic(_) | Self::Ed25519Public(_) | Self::X25519Public(_) => {
                KeyType::Public
            },
            Self::Secret(_) => KeyType::Secret,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::RsaPrivate(_) => "RSA private",
            Self::RsaPublic(_) => "RSA public",
            Self::EcPrivate(_) => "P-256 private",
            Self::EcPublic(_) => "P-256 public",
            Self::Ed25519Private(_) => "Ed25519 private",
            Self::Ed25519Public(_) => "Ed25519 public",
            Self::X25519Private(_) => "X25519 private",
            Self::X25519Public(_) => "X25519 public",
            Self::Secret(_) => "secret",
        }
    }

    /// Symmetric bytes, or an error naming what the key actually holds.
    pub(crate) fn secret_bytes(&self) -> Result<&[u8], EngineError> {
        match self {
            Self::Secret(bytes) => Ok(bytes),
            other => Err(other.mismatch("secret")),
        }
    }

    /// Error for material that does not fit the requested operation.
    pub(crate) fn mismatch(&self, expected: &str) -> EngineError {
        EngineError::OperationFailed {
            reason: format!("expected {expected} key material, found {}", self.kind()),
        }
    }
}

impl fmt::Debug for SoftMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(bytes) => write!(f, "SoftMaterial::Secret({} bytes)", bytes.len()),
            other => write!(f, "SoftMaterial({})", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret_bytes() {
        let material = SoftMaterial::secret(&[0xAB; 16]);

        let printed = format!("{material:?}");

        assert_eq!(printed, "SoftMaterial::Secret(16 bytes)");
        assert!(!printed.contains("171"));
    }

    #[test]
    fn key_type_follows_material() {
        let secret = x25519_dalek::StaticSecret::from([7u8; 32]);
        let public = x25519_dalek::PublicKey::from(&secret);

        assert_eq!(SoftMaterial::X25519Private(secret).key_type(), KeyType::Private);
        assert_eq!(SoftMaterial::X25519Public(public).key_type(), KeyType::Public);
        assert_eq!(SoftMaterial::secret(&[1]).key_type(), KeyType::Secret);
    }

    #[test]
    fn mismatch_names_both_sides() {
        let err = SoftMaterial::secret(&[1]).mismatch("RSA private");

        assert!(err.reason().contains("RSA private"));
        assert!(err.reason().contains("secret"));
    }
}
