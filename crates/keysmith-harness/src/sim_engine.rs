//! Deterministic stand-in engine.
//!
//! [`SimEngine`] implements [`Engine`] with a seeded ChaCha stream in place
//! of real cryptography. Keys are random byte strings drawn from the seeded
//! RNG, and both halves of a pair share one seed, so anything the public
//! half produces can be checked by the private half. Given the same seed
//! and the same sequence of calls, every output is identical. None of it is
//! secure.
//!
//! Every call is recorded. Tests use the log to assert which engine methods
//! a façade call reached, and that a rejected request reached none.
//!
//! # Material formats
//!
//! | Role    | raw        | pkcs8                  | spki                  | jwk                     |
//! |---------|------------|------------------------|-----------------------|-------------------------|
//! | secret  | key bytes  | -                      | -                     | `oct`, hex `k`          |
//! | public  | pair seed  | -                      | `sim-spki:` + seed    | `SIM`, hex `x`          |
//! | private | -          | `sim-pkcs8:` + seed    | -                     | `SIM`, hex `x` and `d`  |

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use keysmith_core::{
    AesParams, AlgorithmName, AlgorithmParams, Engine, EngineError, GeneratedKey, HmacParams,
    JsonWebKey, Key, KeyFormat, KeyPair, KeyShape, KeyType, OperationParams, SerializedKey,
    Usages,
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

const PAIR_SEED_LEN: usize = 32;
const TAG_LEN: usize = 16;
const SIGNATURE_LEN: usize = 32;
const PKCS8_PREFIX: &[u8] = b"sim-pkcs8:";
const SPKI_PREFIX: &[u8] = b"sim-spki:";

/// Simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimConfig {
    /// Seed for every random value the engine draws.
    pub seed: u64,
}

/// Engine trait methods, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineMethod {
    /// [`Engine::generate_key`].
    GenerateKey,
    /// [`Engine::import_key`].
    ImportKey,
    /// [`Engine::export_key`].
    ExportKey,
    /// [`Engine::encrypt`].
    Encrypt,
    /// [`Engine::decrypt`].
    Decrypt,
    /// [`Engine::sign`].
    Sign,
    /// [`Engine::verify`].
    Verify,
    /// [`Engine::derive_bits`].
    DeriveBits,
    /// [`Engine::wrap`].
    Wrap,
    /// [`Engine::unwrap`].
    Unwrap,
}

impl EngineMethod {
    /// Method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerateKey => "generate_key",
            Self::ImportKey => "import_key",
            Self::ExportKey => "export_key",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::DeriveBits => "derive_bits",
            Self::Wrap => "wrap",
            Self::Unwrap => "unwrap",
        }
    }
}

impl fmt::Display for EngineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCall {
    /// Which method was called.
    pub method: EngineMethod,
    /// Algorithm of the descriptor or key the call was made with.
    pub algorithm: AlgorithmName,
}

/// Key material held by [`SimEngine`] keys.
#[derive(Clone, PartialEq, Eq)]
pub struct SimMaterial {
    kind: KeyType,
    seed: Vec<u8>,
}

impl SimMaterial {
    /// Role the material was created or parsed as.
    pub fn kind(&self) -> KeyType {
        self.kind
    }

    fn require(&self, kinds: &[KeyType], what: &str) -> Result<&[u8], EngineError> {
        if kinds.contains(&self.kind) {
            Ok(&self.seed)
        } else {
            Err(EngineError::OperationFailed {
                reason: format!("{what} needs a {} key, got {}", kinds_str(kinds), self.kind),
            })
        }
    }
}

fn kinds_str(kinds: &[KeyType]) -> String {
    kinds.iter().map(|kind| kind.as_str()).collect::<Vec<_>>().join(" or ")
}

impl fmt::Debug for SimMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimMaterial({}, {} bytes)", self.kind, self.seed.len())
    }
}

#[derive(Debug)]
struct SimState {
    rng: ChaCha8Rng,
    calls: Vec<EngineCall>,
}

/// Seeded, call-recording engine for tests.
#[derive(Debug)]
pub struct SimEngine {
    config: SimConfig,
    state: Mutex<SimState>,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimEngine {
    /// Create an engine from `config`.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SimState {
                rng: ChaCha8Rng::seed_from_u64(config.seed),
                calls: Vec::new(),
            }),
        }
    }

    /// Shorthand for `SimEngine::new(SimConfig { seed })`.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(SimConfig { seed })
    }

    /// The settings this engine was built with.
    pub fn config(&self) -> SimConfig {
        self.config
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    /// Number of calls recorded so far.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Forget all recorded calls. The RNG is not reset.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    // A panicking test thread must not hide the log from the others.
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, method: EngineMethod, algorithm: AlgorithmName) {
        tracing::trace!(%method, %algorithm, "sim engine call");
        self.state().calls.push(EngineCall { method, algorithm });
    }

    fn random(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0; len];
        self.state().rng.fill_bytes(&mut bytes);
        bytes
    }
}

/// Deterministic byte stream keyed by `seed` and `nonce`.
#[allow(clippy::cast_possible_truncation)]
fn keystream(seed: &[u8], nonce: &[u8], len: usize) -> Vec<u8> {
    let mut folded = [0u8; 32];
    for (i, byte) in seed.iter().chain([0xff].iter()).chain(nonce).enumerate() {
        let slot = &mut folded[i % 32];
        *slot = slot.rotate_left(3) ^ byte ^ (i as u8);
    }

    let mut out = vec![0; len];
    ChaCha8Rng::from_seed(folded).fill_bytes(&mut out);
    out
}

fn xor_in_place(data: &mut [u8], stream: &[u8]) {
    for (byte, key) in data.iter_mut().zip(stream) {
        *byte ^= key;
    }
}

fn tag(seed: &[u8], nonce: &[u8], associated: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(nonce.len() + associated.len() + ciphertext.len() + 2);
    input.extend_from_slice(nonce);
    input.push(0);
    input.extend_from_slice(associated);
    input.push(0);
    input.extend_from_slice(ciphertext);
    keystream(seed, &input, TAG_LEN)
}

/// XOR with the keystream, then append a tag over nonce, associated data
/// and ciphertext.
fn seal(seed: &[u8], params: &OperationParams, data: &[u8]) -> Vec<u8> {
    let nonce = params.iv().or(params.counter()).unwrap_or_default();
    let associated = params.additional_data().or(params.label()).unwrap_or_default();

    let mut sealed = data.to_vec();
    xor_in_place(&mut sealed, &keystream(seed, nonce, data.len()));
    let tag = tag(seed, nonce, associated, &sealed);
    sealed.extend_from_slice(&tag);
    sealed
}

fn open(seed: &[u8], params: &OperationParams, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let nonce = params.iv().or(params.counter()).unwrap_or_default();
    let associated = params.additional_data().or(params.label()).unwrap_or_default();

    let Some(split) = data.len().checked_sub(TAG_LEN) else {
        return Err(EngineError::OperationFailed {
            reason: format!("ciphertext of {} bytes is shorter than the tag", data.len()),
        });
    };
    let (ciphertext, received) = data.split_at(split);
    if tag(seed, nonce, associated, ciphertext) != received {
        return Err(EngineError::OperationFailed { reason: "tag mismatch".to_string() });
    }

    let mut plaintext = ciphertext.to_vec();
    xor_in_place(&mut plaintext, &keystream(seed, nonce, ciphertext.len()));
    Ok(plaintext)
}

fn mac(seed: &[u8], data: &[u8]) -> Vec<u8> {
    let mut input = b"mac:".to_vec();
    input.extend_from_slice(data);
    keystream(seed, &input, SIGNATURE_LEN)
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidKeyData { reason: reason.into() }
}

fn hex_member(value: Option<&String>, member: &str) -> Result<Vec<u8>, EngineError> {
    let value = value.ok_or_else(|| invalid(format!("JWK is missing {member}")))?;
    from_hex(value, member)
}

fn from_hex(text: &str, member: &str) -> Result<Vec<u8>, EngineError> {
    hex::decode(text).map_err(|e| invalid(format!("JWK {member} is not hex: {e}")))
}

fn pair_seed(bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
    if bytes.len() == PAIR_SEED_LEN {
        Ok(bytes.to_vec())
    } else {
        Err(invalid(format!("expected {PAIR_SEED_LEN} bytes of pair seed, got {}", bytes.len())))
    }
}

fn strip<'a>(bytes: &'a [u8], prefix: &[u8], format: KeyFormat) -> Result<&'a [u8], EngineError> {
    bytes.strip_prefix(prefix).ok_or_else(|| invalid(format!("not simulated {format} material")))
}

/// Descriptor of a secret key, with its length taken from the material.
fn secret_params(algorithm: &AlgorithmParams, len: usize) -> Result<AlgorithmParams, EngineError> {
    let bits = u32::try_from(len * 8).map_err(|_| invalid("secret too long"))?;
    match *algorithm {
        AlgorithmParams::Aes(params) => match bits {
            128 | 192 | 256 => Ok(AlgorithmParams::Aes(AesParams { length: bits, ..params })),
            _ => Err(invalid(format!("AES key of {bits} bits"))),
        },
        AlgorithmParams::Hmac(params) => match params.length {
            _ if bits == 0 => Err(invalid("empty HMAC key")),
            Some(requested) if requested != bits => {
                Err(invalid(format!("HMAC key is {bits} bits, {requested} requested")))
            },
            _ => Ok(AlgorithmParams::Hmac(HmacParams { length: Some(bits), ..params })),
        },
        other => Ok(other),
    }
}

fn parse(
    material: SerializedKey,
    algorithm: &AlgorithmParams,
) -> Result<(SimMaterial, AlgorithmParams), EngineError> {
    let shape = algorithm.name().key_shape();
    let (kind, seed) = match (shape, material) {
        (KeyShape::Secret, SerializedKey::Raw(bytes)) => (KeyType::Secret, bytes),
        (KeyShape::Secret, SerializedKey::Jwk(jwk)) if jwk.kty == "oct" => {
            (KeyType::Secret, hex_member(jwk.k.as_ref(), "k")?)
        },
        (KeyShape::Pair, SerializedKey::Raw(bytes)) => (KeyType::Public, pair_seed(&bytes)?),
        (KeyShape::Pair, SerializedKey::Pkcs8(der)) => {
            (KeyType::Private, pair_seed(strip(&der, PKCS8_PREFIX, KeyFormat::Pkcs8)?)?)
        },
        (KeyShape::Pair, SerializedKey::Spki(der)) => {
            (KeyType::Public, pair_seed(strip(&der, SPKI_PREFIX, KeyFormat::Spki)?)?)
        },
        (KeyShape::Pair, SerializedKey::Jwk(jwk)) if jwk.kty == "SIM" => {
            let x = pair_seed(&hex_member(jwk.x.as_ref(), "x")?)?;
            match jwk.d.as_ref() {
                None => (KeyType::Public, x),
                Some(d) if from_hex(d, "d")? == x => (KeyType::Private, x),
                Some(_) => return Err(invalid("JWK d does not match x")),
            }
        },
        (_, SerializedKey::Jwk(jwk)) => {
            return Err(invalid(format!("unexpected JWK kty {} for {}", jwk.kty, algorithm.name())));
        },
        (shape, other) => {
            return Err(EngineError::UnsupportedParameters {
                reason: format!("{} material cannot hold a {shape}", other.format()),
            });
        },
    };

    let algorithm =
        if kind == KeyType::Secret { secret_params(algorithm, seed.len())? } else { *algorithm };
    Ok((SimMaterial { kind, seed }, algorithm))
}

fn check_usages(
    algorithm: &AlgorithmParams,
    key_type: KeyType,
    usages: Usages,
) -> Result<(), EngineError> {
    let supported = algorithm.name().supported_usages();
    if !supported.contains(usages) {
        return Err(EngineError::InvalidUsages {
            reason: format!("{} does not support {}", algorithm.name(), usages - supported),
        });
    }
    if !key_type.permitted_usages().contains(usages) {
        return Err(EngineError::InvalidUsages {
            reason: format!("{usages} is not valid for a {key_type} key"),
        });
    }
    if usages.is_empty() && key_type != KeyType::Public {
        return Err(EngineError::InvalidUsages {
            reason: format!("a {key_type} key needs at least one usage"),
        });
    }
    Ok(())
}

fn jwk(kty: &str, key: &Key<SimMaterial>) -> JsonWebKey {
    JsonWebKey {
        kty: kty.to_string(),
        alg: Some(key.name().as_str().to_string()),
        key_ops: Some(key.usages().tags()),
        ext: Some(key.extractable()),
        ..JsonWebKey::default()
    }
}

fn serialize(format: KeyFormat, key: &Key<SimMaterial>) -> Result<SerializedKey, EngineError> {
    let material = key.material();
    let seed = material.seed.as_slice();
    match (format, material.kind) {
        (KeyFormat::Raw, KeyType::Secret | KeyType::Public) => Ok(SerializedKey::Raw(seed.to_vec())),
        (KeyFormat::Pkcs8, KeyType::Private) => {
            Ok(SerializedKey::Pkcs8([PKCS8_PREFIX, seed].concat()))
        },
        (KeyFormat::Spki, KeyType::Public) => Ok(SerializedKey::Spki([SPKI_PREFIX, seed].concat())),
        (KeyFormat::Jwk, KeyType::Secret) => {
            Ok(SerializedKey::Jwk(JsonWebKey { k: Some(hex::encode(seed)), ..jwk("oct", key) }))
        },
        (KeyFormat::Jwk, KeyType::Public) => {
            Ok(SerializedKey::Jwk(JsonWebKey { x: Some(hex::encode(seed)), ..jwk("SIM", key) }))
        },
        (KeyFormat::Jwk, KeyType::Private) => Ok(SerializedKey::Jwk(JsonWebKey {
            x: Some(hex::encode(seed)),
            d: Some(hex::encode(seed)),
            ..jwk("SIM", key)
        })),
        (format, kind) => Err(EngineError::UnsupportedParameters {
            reason: format!("{kind} keys cannot be exported as {format}"),
        }),
    }
}

#[async_trait]
impl Engine for SimEngine {
    type Material = SimMaterial;

    async fn generate_key(
        &self,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<GeneratedKey<SimMaterial>, EngineError> {
        self.record(EngineMethod::GenerateKey, algorithm.name());

        match algorithm.name().key_shape() {
            KeyShape::Secret => {
                check_usages(algorithm, KeyType::Secret, usages)?;
                let bits = algorithm.secret_length_bits().unwrap_or_default();
                let algorithm = secret_params(algorithm, bits.div_ceil(8) as usize)?;
                let seed = self.random(bits.div_ceil(8) as usize);
                let material = SimMaterial { kind: KeyType::Secret, seed };
                Ok(GeneratedKey::Secret(Key::new(
                    algorithm,
                    KeyType::Secret,
                    extractable,
                    usages,
                    material,
                )))
            },
            KeyShape::Pair => {
                let private_usages = usages.for_role(KeyType::Private);
                check_usages(algorithm, KeyType::Private, private_usages)?;
                let seed = self.random(PAIR_SEED_LEN);

                Ok(GeneratedKey::Pair(KeyPair {
                    public: Key::new(
                        *algorithm,
                        KeyType::Public,
                        true,
                        usages.for_role(KeyType::Public),
                        SimMaterial { kind: KeyType::Public, seed: seed.clone() },
                    ),
                    private: Key::new(
                        *algorithm,
                        KeyType::Private,
                        extractable,
                        private_usages,
                        SimMaterial { kind: KeyType::Private, seed },
                    ),
                }))
            },
        }
    }

    async fn import_key(
        &self,
        material: SerializedKey,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<Key<SimMaterial>, EngineError> {
        self.record(EngineMethod::ImportKey, algorithm.name());

        let (material, algorithm) = parse(material, algorithm)?;
        check_usages(&algorithm, material.kind, usages)?;
        Ok(Key::new(algorithm, material.kind, extractable, usages, material))
    }

    async fn export_key(
        &self,
        format: KeyFormat,
        key: &Key<SimMaterial>,
    ) -> Result<SerializedKey, EngineError> {
        self.record(EngineMethod::ExportKey, key.name());

        if !key.extractable() {
            return Err(EngineError::OperationFailed {
                reason: format!("{} key is not extractable", key.name()),
            });
        }
        serialize(format, key)
    }

    async fn encrypt(
        &self,
        params: &OperationParams,
        key: &Key<SimMaterial>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.record(EngineMethod::Encrypt, key.name());
        let seed = key.material().require(&[KeyType::Public, KeyType::Secret], "encrypt")?;
        Ok(seal(seed, params, data))
    }

    async fn decrypt(
        &self,
        params: &OperationParams,
        key: &Key<SimMaterial>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.record(EngineMethod::Decrypt, key.name());
        let seed = key.material().require(&[KeyType::Private, KeyType::Secret], "decrypt")?;
        open(seed, params, data)
    }

    async fn sign(
        &self,
        _params: &OperationParams,
        key: &Key<SimMaterial>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.record(EngineMethod::Sign, key.name());
        let seed = key.material().require(&[KeyType::Private, KeyType::Secret], "sign")?;
        Ok(mac(seed, data))
    }

    async fn verify(
        &self,
        _params: &OperationParams,
        key: &Key<SimMaterial>,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, EngineError> {
        self.record(EngineMethod::Verify, key.name());
        let seed = key.material().require(&[KeyType::Public, KeyType::Secret], "verify")?;
        Ok(mac(seed, data) == signature)
    }

    async fn derive_bits(
        &self,
        _params: &OperationParams,
        private: &Key<SimMaterial>,
        public: &Key<SimMaterial>,
        length: Option<u32>,
    ) -> Result<Vec<u8>, EngineError> {
        self.record(EngineMethod::DeriveBits, private.name());
        let ours = private.material().require(&[KeyType::Private], "derive_bits")?;
        let theirs = public.material().require(&[KeyType::Public], "derive_bits peer")?;

        // XOR is symmetric, so both sides of a pairing derive the same bits.
        let mixed: Vec<u8> = ours.iter().zip(theirs).map(|(a, b)| a ^ b).collect();
        let bits = length.unwrap_or(256);
        let mut shared = keystream(&mixed, b"agree", bits.div_ceil(8) as usize);
        if bits % 8 != 0 {
            if let Some(last) = shared.last_mut() {
                *last &= 0xff << (8 - bits % 8);
            }
        }
        Ok(shared)
    }

    async fn wrap(
        &self,
        params: &OperationParams,
        wrapping_key: &Key<SimMaterial>,
        material: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.record(EngineMethod::Wrap, wrapping_key.name());
        let seed = wrapping_key.material().require(&[KeyType::Public, KeyType::Secret], "wrap")?;
        Ok(seal(seed, params, material))
    }

    async fn unwrap(
        &self,
        params: &OperationParams,
        unwrapping_key: &Key<SimMaterial>,
        wrapped: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.record(EngineMethod::Unwrap, unwrapping_key.name());
        let seed =
            unwrapping_key.material().require(&[KeyType::Private, KeyType::Secret], "unwrap")?;
        open(seed, params, wrapped)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keysmith_core::{AesOptions, AesPurpose, AlgorithmProfile, OperationOptions};

    use super::*;

    #[test]
    fn keystream_depends_on_seed_and_nonce() {
        let a = keystream(b"seed", b"nonce", 32);

        assert_eq!(a, keystream(b"seed", b"nonce", 32));
        assert_ne!(a, keystream(b"seed", b"other", 32));
        assert_ne!(a, keystream(b"other", b"nonce", 32));
    }

    #[test]
    fn seal_then_open() {
        let profile = AlgorithmProfile::aes(AesPurpose::IntegrityProtection, AesOptions::default());
        let params = OperationOptions::new().with_iv(vec![7; 12]).merge_onto(profile.algorithm());

        let sealed = seal(b"key", &params, b"plaintext");

        assert_eq!(sealed.len(), b"plaintext".len() + TAG_LEN);
        assert_eq!(open(b"key", &params, &sealed).unwrap(), b"plaintext");
        assert!(matches!(
            open(b"other", &params, &sealed),
            Err(EngineError::OperationFailed { .. })
        ));
        assert!(matches!(
            open(b"key", &params, &sealed[..4]),
            Err(EngineError::OperationFailed { .. })
        ));
    }

    #[test]
    fn hex_roundtrip_and_rejects_garbage() {
        let bytes: Vec<u8> = vec![0, 1, 0xab, 0xff];
        assert_eq!(from_hex(&hex::encode(&bytes), "k").unwrap(), bytes);
        assert!(from_hex("abc", "k").is_err());
        assert!(from_hex("zz", "k").is_err());
        assert!(from_hex("é0", "k").is_err());
    }

    #[test]
    fn aes_length_comes_from_material() {
        let requested = AlgorithmProfile::aes(AesPurpose::Wrapping, AesOptions { length: 256 });

        let params = secret_params(requested.algorithm(), 16).unwrap();

        assert_eq!(params.secret_length_bits(), Some(128));
        assert!(secret_params(requested.algorithm(), 20).is_err());
    }

    #[test]
    fn debug_does_not_print_seed() {
        let material = SimMaterial { kind: KeyType::Secret, seed: vec![0x41; 8] };

        assert_eq!(format!("{material:?}"), "SimMaterial(secret, 8 bytes)");
    }

    #[test]
    fn same_seed_draws_same_bytes() {
        let a = SimEngine::with_seed(7);
        let b = SimEngine::with_seed(7);

        assert_eq!(a.random(16), b.random(16));
        assert_ne!(a.random(16), SimEngine::with_seed(8).random(16));
    }
}
