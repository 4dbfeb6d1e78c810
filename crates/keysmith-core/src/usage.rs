//! Key usage tags.
//!
//! A [`Usage`] names one capability a key may be exercised for. A set of
//! usages is a [`Usages`] bitset, which is what keys and profiles carry.
//!
//! # Role partition
//!
//! Usages are partitioned by the half of a key pair they make sense for:
//!
//! - Private-only: `sign`, `unwrapKey`, `decrypt`
//! - Public-only: `verify`, `wrapKey`, `encrypt`
//! - Shared: `deriveKey`, `deriveBits`
//!
//! Filtering a requested set for a role is a single intersection with
//! [`KeyType::permitted_usages`].

use std::fmt;

use bitflags::bitflags;

use crate::key::KeyType;

/// A single capability a key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    /// Encrypt data.
    Encrypt,
    /// Decrypt data.
    Decrypt,
    /// Produce signatures or MACs.
    Sign,
    /// Check signatures or MACs.
    Verify,
    /// Derive a new key through key agreement.
    DeriveKey,
    /// Derive raw bits through key agreement.
    DeriveBits,
    /// Wrap (encrypt) another key.
    WrapKey,
    /// Unwrap (decrypt) another key.
    UnwrapKey,
}

impl Usage {
    /// Every usage, in canonical order.
    pub const ALL: [Self; 8] = [
        Self::Encrypt,
        Self::Decrypt,
        Self::Sign,
        Self::Verify,
        Self::DeriveKey,
        Self::DeriveBits,
        Self::WrapKey,
        Self::UnwrapKey,
    ];

    /// The bitset containing only this usage.
    pub const fn flag(self) -> Usages {
        match self {
            Self::Encrypt => Usages::ENCRYPT,
            Self::Decrypt => Usages::DECRYPT,
            Self::Sign => Usages::SIGN,
            Self::Verify => Usages::VERIFY,
            Self::DeriveKey => Usages::DERIVE_KEY,
            Self::DeriveBits => Usages::DERIVE_BITS,
            Self::WrapKey => Usages::WRAP_KEY,
            Self::UnwrapKey => Usages::UNWRAP_KEY,
        }
    }

    /// Canonical tag, as used in JWK `key_ops`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::DeriveKey => "deriveKey",
            Self::DeriveBits => "deriveBits",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
        }
    }

    /// Parse a canonical tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|usage| usage.as_str() == tag)
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// A set of [`Usage`] tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Usages: u8 {
        /// See [`Usage::Encrypt`].
        const ENCRYPT = 1 << 0;
        /// See [`Usage::Decrypt`].
        const DECRYPT = 1 << 1;
        /// See [`Usage::Sign`].
        const SIGN = 1 << 2;
        /// See [`Usage::Verify`].
        const VERIFY = 1 << 3;
        /// See [`Usage::DeriveKey`].
        const DERIVE_KEY = 1 << 4;
        /// See [`Usage::DeriveBits`].
        const DERIVE_BITS = 1 << 5;
        /// See [`Usage::WrapKey`].
        const WRAP_KEY = 1 << 6;
        /// See [`Usage::UnwrapKey`].
        const UNWRAP_KEY = 1 << 7;
    }
}

impl Usages {
    /// Usages only meaningful on the private half of a pair.
    pub const PRIVATE_ONLY: Self =
        Self::SIGN.union(Self::UNWRAP_KEY).union(Self::DECRYPT);

    /// Usages only meaningful on the public half of a pair.
    pub const PUBLIC_ONLY: Self = Self::VERIFY.union(Self::WRAP_KEY).union(Self::ENCRYPT);

    /// Usages meaningful on either half.
    pub const SHARED: Self = Self::DERIVE_KEY.union(Self::DERIVE_BITS);

    /// Returns true if `usage` is in the set.
    pub const fn has(self, usage: Usage) -> bool {
        self.contains(usage.flag())
    }

    /// Restrict this set to the usages permitted for `role`.
    ///
    /// Usages inconsistent with the role are dropped, never rejected.
    #[must_use]
    pub const fn for_role(self, role: KeyType) -> Self {
        self.intersection(role.permitted_usages())
    }

    /// Iterate the usages in the set, in canonical order.
    pub fn usages(self) -> impl Iterator<Item = Usage> {
        Usage::ALL.into_iter().filter(move |usage| self.has(*usage))
    }

    /// Canonical tags of the usages in the set.
    pub fn tags(self) -> Vec<String> {
        self.usages().map(|usage| usage.as_str().to_string()).collect()
    }
}

impl From<Usage> for Usages {
    fn from(usage: Usage) -> Self {
        usage.flag()
    }
}

impl FromIterator<Usage> for Usages {
    fn from_iter<I: IntoIterator<Item = Usage>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, usage| set | usage.flag())
    }
}

impl fmt::Display for Usages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, usage) in self.usages().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(usage.as_str())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn role_partition_covers_every_usage_once() {
        let partition = [Usages::PRIVATE_ONLY, Usages::PUBLIC_ONLY, Usages::SHARED];

        for usage in Usage::ALL {
            let owners = partition.iter().filter(|set| set.has(usage)).count();
            assert_eq!(owners, 1, "{usage} must belong to exactly one partition");
        }
    }

    #[test]
    fn public_role_drops_private_usages() {
        let requested = Usages::SIGN | Usages::VERIFY | Usages::ENCRYPT;

        assert_eq!(requested.for_role(KeyType::Public), Usages::VERIFY | Usages::ENCRYPT);
    }

    #[test]
    fn private_role_drops_public_usages() {
        let requested = Usages::SIGN | Usages::VERIFY | Usages::ENCRYPT;

        assert_eq!(requested.for_role(KeyType::Private), Usages::SIGN);
    }

    #[test]
    fn derive_usages_survive_either_role() {
        let requested = Usages::DERIVE_KEY | Usages::DERIVE_BITS;

        assert_eq!(requested.for_role(KeyType::Public), requested);
        assert_eq!(requested.for_role(KeyType::Private), requested);
    }

    #[test]
    fn secret_role_keeps_everything() {
        assert_eq!(Usages::all().for_role(KeyType::Secret), Usages::all());
    }

    #[test]
    fn tags_roundtrip() {
        for usage in Usage::ALL {
            assert_eq!(Usage::from_tag(usage.as_str()), Some(usage));
        }
        assert_eq!(Usage::from_tag("Sign"), None);
    }

    #[test]
    fn collects_from_iterator() {
        let set: Usages = [Usage::WrapKey, Usage::UnwrapKey].into_iter().collect();

        assert_eq!(set, Usages::WRAP_KEY | Usages::UNWRAP_KEY);
        assert_eq!(set.usages().collect::<Vec<_>>(), vec![Usage::WrapKey, Usage::UnwrapKey]);
    }

    proptest! {
        #[test]
        fn role_filter_only_removes(bits in any::<u8>()) {
            let requested = Usages::from_bits_truncate(bits);

            for role in [KeyType::Public, KeyType::Private, KeyType::Secret] {
                let realized = requested.for_role(role);

                prop_assert!(requested.contains(realized));
                prop_assert_eq!(realized.for_role(role), realized);
                prop_assert_eq!(requested.difference(realized) & role.permitted_usages(), Usages::empty());
            }
        }
    }

    #[test]
    fn display_lists_tags() {
        let set = Usages::DECRYPT | Usages::ENCRYPT;

        assert_eq!(set.to_string(), "[encrypt, decrypt]");
        assert_eq!(Usages::empty().to_string(), "[]");
    }
}
