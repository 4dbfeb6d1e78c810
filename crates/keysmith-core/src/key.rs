//! Key handles.
//!
//! A [`Key`] is an opaque handle produced by an [`Engine`](crate::Engine).
//! The descriptor, key type, extractability flag and realized usage set it
//! carries are fixed at creation and are what every later operation is
//! checked against. Handles are immutable and cheap to clone, so one key can
//! be shared by any number of in-flight operations.

use std::{fmt, sync::Arc};

use crate::{
    algorithm::{AlgorithmName, AlgorithmParams},
    usage::{Usage, Usages},
};

/// The role a key plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Public half of an asymmetric pair.
    Public,
    /// Private half of an asymmetric pair.
    Private,
    /// Symmetric secret.
    Secret,
}

impl KeyType {
    /// Usages that are meaningful for this role.
    pub const fn permitted_usages(self) -> Usages {
        match self {
            Self::Public => Usages::all().difference(Usages::PRIVATE_ONLY),
            Self::Private => Usages::all().difference(Usages::PUBLIC_ONLY),
            Self::Secret => Usages::all(),
        }
    }

    /// Canonical name string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What key generation yields for an algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyShape {
    /// A single secret key.
    Secret,
    /// A public/private key pair.
    Pair,
}

impl fmt::Display for KeyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret => f.write_str("secret key"),
            Self::Pair => f.write_str("key pair"),
        }
    }
}

struct KeyInner<M> {
    algorithm: AlgorithmParams,
    key_type: KeyType,
    extractable: bool,
    usages: Usages,
    material: M,
}

/// Opaque key handle.
///
/// `M` is the engine's private key material type. Callers never need to
/// name it beyond `E::Material`.
pub struct Key<M> {
    inner: Arc<KeyInner<M>>,
}

impl<M> Key<M> {
    /// Create a key handle.
    ///
    /// Only engines should call this: the values passed here become the
    /// authoritative record every operation is validated against.
    pub fn new(
        algorithm: AlgorithmParams,
        key_type: KeyType,
        extractable: bool,
        usages: Usages,
        material: M,
    ) -> Self {
        Self { inner: Arc::new(KeyInner { algorithm, key_type, extractable, usages, material }) }
    }

    /// The key's algorithm descriptor.
    pub fn algorithm(&self) -> &AlgorithmParams {
        &self.inner.algorithm
    }

    /// Shorthand for `self.algorithm().name()`.
    pub fn name(&self) -> AlgorithmName {
        self.inner.algorithm.name()
    }

    /// Public, private or secret.
    pub fn key_type(&self) -> KeyType {
        self.inner.key_type
    }

    /// Whether the key may be exported.
    pub fn extractable(&self) -> bool {
        self.inner.extractable
    }

    /// Usages realized at creation.
    pub fn usages(&self) -> Usages {
        self.inner.usages
    }

    /// Returns true if the key was created with `usage`.
    pub fn allows(&self, usage: Usage) -> bool {
        self.inner.usages.has(usage)
    }

    /// Engine material backing this handle.
    pub fn material(&self) -> &M {
        &self.inner.material
    }

    /// Returns true if both handles refer to the same key.
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<M> Clone for Key<M> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

// Material is never printed.
impl<M> fmt::Debug for Key<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("algorithm", &self.inner.algorithm)
            .field("key_type", &self.inner.key_type)
            .field("extractable", &self.inner.extractable)
            .field("usages", &self.inner.usages)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// A co-generated public/private pair.
///
/// Nothing links the halves after creation; each may be dropped
/// independently.
pub struct KeyPair<M> {
    /// Public half.
    pub public: Key<M>,
    /// Private half.
    pub private: Key<M>,
}

impl<M> Clone for KeyPair<M> {
    fn clone(&self) -> Self {
        Self { public: self.public.clone(), private: self.private.clone() }
    }
}

impl<M> fmt::Debug for KeyPair<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &self.private)
            .finish()
    }
}

/// Result of key generation, tagged by shape.
pub enum GeneratedKey<M> {
    /// Symmetric families.
    Secret(Key<M>),
    /// Asymmetric families.
    Pair(KeyPair<M>),
}

impl<M> GeneratedKey<M> {
    /// Which variant this is.
    pub fn shape(&self) -> KeyShape {
        match self {
            Self::Secret(_) => KeyShape::Secret,
            Self::Pair(_) => KeyShape::Pair,
        }
    }

    /// The secret key, if this is one.
    pub fn into_secret(self) -> Option<Key<M>> {
        match self {
            Self::Secret(key) => Some(key),
            Self::Pair(_) => None,
        }
    }

    /// The key pair, if this is one.
    pub fn into_pair(self) -> Option<KeyPair<M>> {
        match self {
            Self::Pair(pair) => Some(pair),
            Self::Secret(_) => None,
        }
    }
}

impl<M> fmt::Debug for GeneratedKey<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(key) => f.debug_tuple("Secret").field(key).finish(),
            Self::Pair(pair) => f.debug_tuple("Pair").field(pair).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmac_key(usages: Usages) -> Key<Vec<u8>> {
        Key::new(
            AlgorithmParams::Hmac(crate::algorithm::HmacParams {
                hash: crate::algorithm::HashAlgorithm::Sha256,
                length: None,
            }),
            KeyType::Secret,
            false,
            usages,
            vec![0x42; 64],
        )
    }

    #[test]
    fn clones_share_one_handle() {
        let key = hmac_key(Usages::SIGN);
        let clone = key.clone();

        assert!(key.same_handle(&clone));
        assert!(!key.same_handle(&hmac_key(Usages::SIGN)));
    }

    #[test]
    fn debug_redacts_material() {
        let key = hmac_key(Usages::SIGN | Usages::VERIFY);
        let printed = format!("{key:?}");

        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("66"), "material bytes leaked: {printed}");
    }

    #[test]
    fn allows_reflects_realized_usages() {
        let key = hmac_key(Usages::VERIFY);

        assert!(key.allows(Usage::Verify));
        assert!(!key.allows(Usage::Sign));
    }

    #[test]
    fn permitted_usages_are_disjoint_for_roles() {
        let public = KeyType::Public.permitted_usages();
        let private = KeyType::Private.permitted_usages();

        assert_eq!(public & private, Usages::SHARED);
        assert_eq!(public | private, Usages::all());
    }

    #[test]
    fn generated_key_accessors() {
        let generated = GeneratedKey::Secret(hmac_key(Usages::SIGN));

        assert_eq!(generated.shape(), KeyShape::Secret);
        assert!(generated.into_pair().is_none());
    }
}
