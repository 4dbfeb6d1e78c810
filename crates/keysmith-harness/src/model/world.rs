//! Model world.
//!
//! A table of key records and the rules the façade (over [`SimEngine`]) is
//! expected to follow. Allow-lists, usage requirements and role filtering
//! are restated here as plain tables rather than borrowed from the core
//! crate, so a regression there shows up as a divergence.
//!
//! [`SimEngine`]: crate::sim_engine::SimEngine

use keysmith_core::{AlgorithmName, KeyFormat, KeyType, Usages};

use super::operation::{
    ModelAlgorithm, ModelFormat, ModelRole, Operation, OperationError, OperationResult, Slot,
};

/// What the model knows about one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelKey {
    /// Algorithm name.
    pub algorithm: AlgorithmName,
    /// Public, private or secret.
    pub key_type: KeyType,
    /// Realized usages.
    pub usages: Usages,
    /// Whether the key may be exported.
    pub extractable: bool,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Every key created so far, in creation order.
    pub keys: Vec<ModelKey>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone, Default)]
pub struct ModelWorld {
    keys: Vec<ModelKey>,
}

fn private_only() -> Usages {
    Usages::SIGN | Usages::DECRYPT | Usages::UNWRAP_KEY
}

fn public_only() -> Usages {
    Usages::VERIFY | Usages::ENCRYPT | Usages::WRAP_KEY
}

fn permitted(key_type: KeyType) -> Usages {
    match key_type {
        KeyType::Public => Usages::all() - private_only(),
        KeyType::Private => Usages::all() - public_only(),
        KeyType::Secret => Usages::all(),
    }
}

fn supported(algorithm: AlgorithmName) -> Usages {
    use AlgorithmName::{
        AesCbc, AesCtr, AesGcm, AesKw, Ecdh, Ecdsa, Ed25519, Hmac, RsaOaep, RsaPss, X25519,
    };
    match algorithm {
        RsaOaep | AesCtr | AesCbc | AesGcm => {
            Usages::ENCRYPT | Usages::DECRYPT | Usages::WRAP_KEY | Usages::UNWRAP_KEY
        },
        AesKw => Usages::WRAP_KEY | Usages::UNWRAP_KEY,
        RsaPss | Ecdsa | Hmac | Ed25519 => Usages::SIGN | Usages::VERIFY,
        Ecdh | X25519 => Usages::DERIVE_KEY | Usages::DERIVE_BITS,
    }
}

fn is_pair(algorithm: AlgorithmName) -> bool {
    !matches!(
        algorithm,
        AlgorithmName::AesCtr
            | AlgorithmName::AesCbc
            | AlgorithmName::AesGcm
            | AlgorithmName::AesKw
            | AlgorithmName::Hmac
    )
}

fn can_encrypt(algorithm: AlgorithmName) -> bool {
    matches!(
        algorithm,
        AlgorithmName::RsaOaep
            | AlgorithmName::AesCtr
            | AlgorithmName::AesCbc
            | AlgorithmName::AesGcm
    )
}

fn can_wrap(algorithm: AlgorithmName) -> bool {
    can_encrypt(algorithm) || algorithm == AlgorithmName::AesKw
}

fn can_sign(algorithm: AlgorithmName) -> bool {
    matches!(
        algorithm,
        AlgorithmName::RsaPss
            | AlgorithmName::Ecdsa
            | AlgorithmName::Hmac
            | AlgorithmName::Ed25519
    )
}

fn can_agree(algorithm: AlgorithmName) -> bool {
    matches!(algorithm, AlgorithmName::Ecdh | AlgorithmName::X25519)
}

/// Formats the simulated engine serializes each role in.
fn exportable(key_type: KeyType, format: KeyFormat) -> bool {
    matches!(
        (key_type, format),
        (KeyType::Secret, KeyFormat::Raw | KeyFormat::Jwk)
            | (KeyType::Public, KeyFormat::Raw | KeyFormat::Spki | KeyFormat::Jwk)
            | (KeyType::Private, KeyFormat::Pkcs8 | KeyFormat::Jwk)
    )
}

const fn error(error: OperationError) -> OperationResult {
    OperationResult::Error(error)
}

impl ModelWorld {
    /// Empty key table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys created so far.
    pub fn keys(&self) -> &[ModelKey] {
        &self.keys
    }

    /// Table index a slot refers to, if the table is not empty.
    pub fn index(&self, slot: Slot) -> Option<usize> {
        if self.keys.is_empty() { None } else { Some(usize::from(slot) % self.keys.len()) }
    }

    fn key(&self, slot: Slot) -> Option<ModelKey> {
        self.index(slot).map(|index| self.keys[index])
    }

    /// Apply an operation and return the result the façade must produce.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Generate { algorithm, usages, extractable } => {
                self.apply_generate(algorithm, usages, extractable)
            },
            Operation::Reimport { slot, format, role } => self.apply_reimport(slot, format, role),
            Operation::Export { slot, format } => {
                self.with_key(slot, |key| export(key, format.format()))
            },
            Operation::Encrypt { slot } => self.with_key(slot, |key| {
                authorize(key, can_encrypt, Usages::ENCRYPT).unwrap_or(OperationResult::Ok)
            }),
            Operation::Decrypt { slot } => self.with_key(slot, |key| {
                // The input is never a valid ciphertext.
                authorize(key, can_encrypt, Usages::DECRYPT)
                    .unwrap_or(error(OperationError::Engine))
            }),
            Operation::Sign { slot } => self.with_key(slot, |key| {
                authorize(key, can_sign, Usages::SIGN).unwrap_or(OperationResult::Ok)
            }),
            Operation::Verify { slot } => self.with_key(slot, |key| {
                authorize(key, can_sign, Usages::VERIFY).unwrap_or(OperationResult::Ok)
            }),
            Operation::DeriveBits { slot, peer } => self.apply_derive_bits(slot, peer),
            Operation::Wrap { slot, wrapper, format } => self.apply_wrap(slot, wrapper, format),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState { keys: self.keys.clone() }
    }

    fn with_key(&self, slot: Slot, f: impl FnOnce(ModelKey) -> OperationResult) -> OperationResult {
        self.key(slot).map_or(error(OperationError::NoKey), f)
    }

    fn apply_generate(
        &mut self,
        algorithm: ModelAlgorithm,
        usages: Option<u8>,
        extractable: bool,
    ) -> OperationResult {
        let name = algorithm.name();
        let defaults = algorithm.profile().usages();
        let requested = match usages {
            Some(bits) => match Usages::from_bits_truncate(bits) & supported(name) {
                narrowed if narrowed.is_empty() => defaults,
                narrowed => narrowed,
            },
            None => defaults,
        };

        if !is_pair(name) {
            if requested.is_empty() {
                return error(OperationError::Engine);
            }
            self.keys.push(ModelKey {
                algorithm: name,
                key_type: KeyType::Secret,
                usages: requested,
                extractable,
            });
            return OperationResult::Ok;
        }

        let private = requested & permitted(KeyType::Private);
        if private.is_empty() {
            return error(OperationError::Engine);
        }
        self.keys.push(ModelKey {
            algorithm: name,
            key_type: KeyType::Public,
            usages: requested & permitted(KeyType::Public),
            extractable: true,
        });
        self.keys.push(ModelKey {
            algorithm: name,
            key_type: KeyType::Private,
            usages: private,
            extractable,
        });
        OperationResult::Ok
    }

    fn apply_reimport(
        &mut self,
        slot: Slot,
        format: ModelFormat,
        role: ModelRole,
    ) -> OperationResult {
        let Some(key) = self.key(slot) else {
            return error(OperationError::NoKey);
        };
        let exported = export(key, format.format());
        if exported.is_err() {
            return exported;
        }

        // The material determines the key type; the declared role only
        // filters usages.
        let usages = key.usages & permitted(role.key_type());
        if !permitted(key.key_type).contains(usages)
            || (usages.is_empty() && key.key_type != KeyType::Public)
        {
            return error(OperationError::Engine);
        }

        self.keys.push(ModelKey { usages, ..key });
        OperationResult::Ok
    }

    fn apply_derive_bits(&self, slot: Slot, peer: Slot) -> OperationResult {
        let (Some(key), Some(peer)) = (self.key(slot), self.key(peer)) else {
            return error(OperationError::NoKey);
        };
        if let Some(rejected) = authorize(key, can_agree, Usages::DERIVE_BITS) {
            return rejected;
        }
        if peer.key_type != KeyType::Public || peer.algorithm != key.algorithm {
            return error(OperationError::UnsupportedAlgorithm);
        }
        // Public halves carry deriveBits too, but only a private key agrees.
        if key.key_type != KeyType::Private {
            return error(OperationError::Engine);
        }
        OperationResult::Ok
    }

    fn apply_wrap(&self, slot: Slot, wrapper: Slot, format: ModelFormat) -> OperationResult {
        let (Some(key), Some(wrapper)) = (self.key(slot), self.key(wrapper)) else {
            return error(OperationError::NoKey);
        };
        if let Some(rejected) = authorize(wrapper, can_wrap, Usages::WRAP_KEY) {
            return rejected;
        }
        export(key, format.format())
    }
}

/// Allow-list then usage check. `None` means the engine is reached.
fn authorize(
    key: ModelKey,
    allowed: fn(AlgorithmName) -> bool,
    required: Usages,
) -> Option<OperationResult> {
    if !allowed(key.algorithm) {
        Some(error(OperationError::UnsupportedAlgorithm))
    } else if !key.usages.contains(required) {
        Some(error(OperationError::UsageDenied))
    } else {
        None
    }
}

fn export(key: ModelKey, format: KeyFormat) -> OperationResult {
    if !key.extractable {
        error(OperationError::NotExtractable)
    } else if !exportable(key.key_type, format) {
        error(OperationError::Engine)
    } else {
        OperationResult::Ok
    }
}
