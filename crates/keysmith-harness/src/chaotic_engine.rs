//! Fault injection.
//!
//! [`ChaoticEngine`] wraps another engine and fails a seeded fraction of
//! calls with [`EngineError::Backend`] before they reach it. Faults are drawn
//! from a ChaCha RNG, so a failing run replays exactly from its seed.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use keysmith_core::{
    AlgorithmParams, Engine, EngineError, GeneratedKey, Key, KeyFormat, OperationParams,
    SerializedKey, Usages,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::sim_engine::EngineMethod;

/// Fault injection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Seed for the fault RNG.
    pub seed: u64,
    /// Probability in `[0, 1]` that any single call fails.
    pub failure_rate: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self { seed: 0, failure_rate: 0.1 }
    }
}

/// Engine wrapper that injects backend faults.
#[derive(Debug)]
pub struct ChaoticEngine<E> {
    inner: E,
    failure_rate: f64,
    rng: Mutex<ChaCha8Rng>,
    injected: AtomicUsize,
}

impl<E> ChaoticEngine<E> {
    /// Wrap `inner`. Rates outside `[0, 1]` are clamped; NaN disables faults.
    pub fn new(inner: E, config: FaultConfig) -> Self {
        let failure_rate =
            if config.failure_rate.is_nan() { 0.0 } else { config.failure_rate.clamp(0.0, 1.0) };

        Self {
            inner,
            failure_rate,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed)),
            injected: AtomicUsize::new(0),
        }
    }

    /// The wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Effective failure rate after clamping.
    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Number of faults injected so far.
    pub fn injected_faults(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }

    fn roll(&self, method: EngineMethod) -> Result<(), EngineError> {
        let fail = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(self.failure_rate);
        if !fail {
            return Ok(());
        }

        let count = self.injected.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::error!(%method, count, "injected backend fault");
        Err(EngineError::Backend { reason: format!("injected fault in {method}") })
    }
}

#[async_trait]
impl<E: Engine> Engine for ChaoticEngine<E> {
    type Material = E::Material;

    async fn generate_key(
        &self,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<GeneratedKey<Self::Material>, EngineError> {
        self.roll(EngineMethod::GenerateKey)?;
        self.inner.generate_key(algorithm, extractable, usages).await
    }

    async fn import_key(
        &self,
        material: SerializedKey,
        algorithm: &AlgorithmParams,
        extractable: bool,
        usages: Usages,
    ) -> Result<Key<Self::Material>, EngineError> {
        self.roll(EngineMethod::ImportKey)?;
        self.inner.import_key(material, algorithm, extractable, usages).await
    }

    async fn export_key(
        &self,
        format: KeyFormat,
        key: &Key<Self::Material>,
    ) -> Result<SerializedKey, EngineError> {
        self.roll(EngineMethod::ExportKey)?;
        self.inner.export_key(format, key).await
    }

    async fn encrypt(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.roll(EngineMethod::Encrypt)?;
        self.inner.encrypt(params, key, data).await
    }

    async fn decrypt(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.roll(EngineMethod::Decrypt)?;
        self.inner.decrypt(params, key, data).await
    }

    async fn sign(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        data: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.roll(EngineMethod::Sign)?;
        self.inner.sign(params, key, data).await
    }

    async fn verify(
        &self,
        params: &OperationParams,
        key: &Key<Self::Material>,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, EngineError> {
        self.roll(EngineMethod::Verify)?;
        self.inner.verify(params, key, signature, data).await
    }

    async fn derive_bits(
        &self,
        params: &OperationParams,
        private: &Key<Self::Material>,
        public: &Key<Self::Material>,
        length: Option<u32>,
    ) -> Result<Vec<u8>, EngineError> {
        self.roll(EngineMethod::DeriveBits)?;
        self.inner.derive_bits(params, private, public, length).await
    }

    async fn wrap(
        &self,
        params: &OperationParams,
        wrapping_key: &Key<Self::Material>,
        material: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.roll(EngineMethod::Wrap)?;
        self.inner.wrap(params, wrapping_key, material).await
    }

    async fn unwrap(
        &self,
        params: &OperationParams,
        unwrapping_key: &Key<Self::Material>,
        wrapped: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.roll(EngineMethod::Unwrap)?;
        self.inner.unwrap(params, unwrapping_key, wrapped).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_clamped() {
        let engine = ChaoticEngine::new((), FaultConfig { seed: 1, failure_rate: 3.0 });
        assert!((engine.failure_rate() - 1.0).abs() < f64::EPSILON);

        let engine = ChaoticEngine::new((), FaultConfig { seed: 1, failure_rate: f64::NAN });
        assert!(engine.failure_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn zero_rate_never_fails() {
        let engine = ChaoticEngine::new((), FaultConfig { seed: 9, failure_rate: 0.0 });

        for _ in 0..1000 {
            assert!(engine.roll(EngineMethod::Sign).is_ok());
        }
        assert_eq!(engine.injected_faults(), 0);
    }

    #[test]
    fn full_rate_always_fails_with_backend_error() {
        let engine = ChaoticEngine::new((), FaultConfig { seed: 9, failure_rate: 1.0 });

        let err = engine.roll(EngineMethod::Decrypt).unwrap_err();

        assert_eq!(err, EngineError::Backend { reason: "injected fault in decrypt".to_string() });
        assert_eq!(engine.injected_faults(), 1);
    }

    #[test]
    fn faults_replay_from_seed() {
        let pattern = |seed| {
            let engine = ChaoticEngine::new((), FaultConfig { seed, failure_rate: 0.5 });
            (0..64).map(|_| engine.roll(EngineMethod::Encrypt).is_err()).collect::<Vec<_>>()
        };

        assert_eq!(pattern(42), pattern(42));
        assert_ne!(pattern(42), pattern(43));
    }
}
