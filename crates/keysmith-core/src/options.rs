//! Per-call operation options.
//!
//! [`OperationOptions`] is a partial overlay of tunable parameters (IV, salt
//! length, ...). It is merged onto a copy of the key's own descriptor to
//! produce the [`OperationParams`] handed to the engine. Options have no
//! algorithm name field, so a merge can never change which algorithm runs.

use std::fmt;

use crate::algorithm::{AlgorithmName, AlgorithmParams, HashAlgorithm};

/// Tunable parameters supplied by the caller for one operation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// RSA-PSS salt length in bytes.
    pub salt_length: Option<usize>,
    /// AES-CBC / AES-GCM initialization vector.
    pub iv: Option<Vec<u8>>,
    /// AES-CTR initial counter block.
    pub counter: Option<Vec<u8>>,
    /// AES-CTR counter width in bits.
    pub counter_length: Option<u32>,
    /// AES-GCM additional authenticated data.
    pub additional_data: Option<Vec<u8>>,
    /// AES-GCM tag length in bits.
    pub tag_length: Option<u32>,
    /// RSA-OAEP label.
    pub label: Option<Vec<u8>>,
    /// ECDSA digest. Ignored for families that bind a digest to the key.
    pub hash: Option<HashAlgorithm>,
}

impl OperationOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the RSA-PSS salt length.
    #[must_use]
    pub fn with_salt_length(mut self, salt_length: usize) -> Self {
        self.salt_length = Some(salt_length);
        self
    }

    /// Set the initialization vector.
    #[must_use]
    pub fn with_iv(mut self, iv: impl Into<Vec<u8>>) -> Self {
        self.iv = Some(iv.into());
        self
    }

    /// Set the AES-CTR counter block and counter width.
    #[must_use]
    pub fn with_counter(mut self, counter: impl Into<Vec<u8>>, counter_length: u32) -> Self {
        self.counter = Some(counter.into());
        self.counter_length = Some(counter_length);
        self
    }

    /// Set AES-GCM additional data.
    #[must_use]
    pub fn with_additional_data(mut self, additional_data: impl Into<Vec<u8>>) -> Self {
        self.additional_data = Some(additional_data.into());
        self
    }

    /// Set the AES-GCM tag length.
    #[must_use]
    pub fn with_tag_length(mut self, tag_length: u32) -> Self {
        self.tag_length = Some(tag_length);
        self
    }

    /// Set the RSA-OAEP label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Vec<u8>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the ECDSA digest.
    #[must_use]
    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Merge onto a copy of `base`.
    ///
    /// Key-bound digests (RSA, HMAC) win over `self.hash`.
    pub fn merge_onto(&self, base: &AlgorithmParams) -> OperationParams {
        let hash = base.hash().or(self.hash).unwrap_or_default();

        OperationParams {
            algorithm: *base,
            hash,
            salt_length: self.salt_length,
            iv: self.iv.clone(),
            counter: self.counter.clone(),
            counter_length: self.counter_length,
            additional_data: self.additional_data.clone(),
            tag_length: self.tag_length,
            label: self.label.clone(),
        }
    }
}

// Byte options are printed by length only.
impl fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationOptions")
            .field("salt_length", &self.salt_length)
            .field("iv", &self.iv.as_ref().map(Vec::len))
            .field("counter", &self.counter.as_ref().map(Vec::len))
            .field("counter_length", &self.counter_length)
            .field("additional_data", &self.additional_data.as_ref().map(Vec::len))
            .field("tag_length", &self.tag_length)
            .field("label", &self.label.as_ref().map(Vec::len))
            .field("hash", &self.hash)
            .finish()
    }
}

/// Fully resolved parameters for one engine call.
///
/// Only produced by [`OperationOptions::merge_onto`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationParams {
    algorithm: AlgorithmParams,
    hash: HashAlgorithm,
    salt_length: Option<usize>,
    iv: Option<Vec<u8>>,
    counter: Option<Vec<u8>>,
    counter_length: Option<u32>,
    additional_data: Option<Vec<u8>>,
    tag_length: Option<u32>,
    label: Option<Vec<u8>>,
}

impl OperationParams {
    /// The key's descriptor.
    pub fn algorithm(&self) -> &AlgorithmParams {
        &self.algorithm
    }

    /// Shorthand for `self.algorithm().name()`.
    pub fn name(&self) -> AlgorithmName {
        self.algorithm.name()
    }

    /// Effective digest: the key's own, else the requested one, else SHA-256.
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// RSA-PSS salt length.
    pub fn salt_length(&self) -> Option<usize> {
        self.salt_length
    }

    /// Initialization vector.
    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    /// AES-CTR counter block.
    pub fn counter(&self) -> Option<&[u8]> {
        self.counter.as_deref()
    }

    /// AES-CTR counter width in bits.
    pub fn counter_length(&self) -> Option<u32> {
        self.counter_length
    }

    /// AES-GCM additional data.
    pub fn additional_data(&self) -> Option<&[u8]> {
        self.additional_data.as_deref()
    }

    /// AES-GCM tag length in bits.
    pub fn tag_length(&self) -> Option<u32> {
        self.tag_length
    }

    /// RSA-OAEP label.
    pub fn label(&self) -> Option<&[u8]> {
        self.label.as_deref()
    }
}
