//! Fault injection tests.
//!
//! `ChaoticEngine` fails a seeded fraction of engine calls with a backend
//! fault. These tests check that the façade surfaces every injected fault as
//! `KeysmithError::Engine(EngineError::Backend)`, unchanged and unretried,
//! and that local validation still runs first.

use keysmith_core::{
    AesOptions, AesPurpose, AlgorithmProfile, EngineError, HmacOptions, Keysmith, KeysmithError,
    OperationOptions, Usages,
};
use keysmith_engine::SoftEngine;
use keysmith_harness::{ChaoticEngine, FaultConfig, SimEngine, init_test_tracing};

fn is_backend(err: &KeysmithError) -> bool {
    matches!(err, KeysmithError::Engine(EngineError::Backend { .. }))
}

#[tokio::test]
async fn every_call_fails_at_full_rate() {
    init_test_tracing();
    let ks = Keysmith::new(ChaoticEngine::new(
        SimEngine::with_seed(1),
        FaultConfig { seed: 1, failure_rate: 1.0 },
    ));

    let err = ks.generate(&AlgorithmProfile::ed25519()).await.unwrap_err();

    assert!(is_backend(&err));
    assert_eq!(
        err.engine_error().map(EngineError::reason),
        Some("injected fault in generate_key")
    );
    assert!(!err.is_precondition());
    assert_eq!(ks.engine().inner().call_count(), 0);
}

#[tokio::test]
async fn preconditions_run_before_faults() {
    init_test_tracing();
    let profile = AlgorithmProfile::hmac(HmacOptions::default()).with_usages(Usages::VERIFY);
    let key = {
        let ks = Keysmith::new(SimEngine::with_seed(2));
        ks.generate_secret(&profile).await.unwrap()
    };
    let ks = Keysmith::new(ChaoticEngine::new(
        SimEngine::with_seed(2),
        FaultConfig { seed: 2, failure_rate: 1.0 },
    ));

    let err = ks.sign(&key, &OperationOptions::new(), b"data").await.unwrap_err();

    assert!(matches!(err, KeysmithError::UsageDenied { .. }));
    assert_eq!(ks.engine().injected_faults(), 0);
}

#[tokio::test]
async fn faults_surface_unchanged_over_soft_engine() {
    init_test_tracing();
    let profile = AlgorithmProfile::hmac(HmacOptions::default());
    let key = Keysmith::new(SoftEngine::new()).generate_secret(&profile).await.unwrap();
    let ks = Keysmith::new(ChaoticEngine::new(
        SoftEngine::new(),
        FaultConfig { seed: 42, failure_rate: 0.3 },
    ));
    let options = OperationOptions::new();

    let mut faults = 0;
    for i in 0..200u32 {
        let data = i.to_be_bytes();
        match ks.sign(&key, &options, &data).await {
            Ok(tag) => assert_eq!(tag.len(), 32),
            Err(err) => {
                assert!(is_backend(&err), "unexpected error: {err}");
                faults += 1;
            },
        }
    }

    assert_eq!(faults, ks.engine().injected_faults());
    assert!(faults > 20 && faults < 100, "{faults} faults at a 30% rate");
}

#[tokio::test]
async fn faults_replay_from_seed() {
    init_test_tracing();
    let profile =
        AlgorithmProfile::aes(AesPurpose::VariableLengthEncryption, AesOptions::default());

    let mut runs = Vec::new();
    for _ in 0..2 {
        let ks = Keysmith::new(ChaoticEngine::new(
            SimEngine::with_seed(5),
            FaultConfig { seed: 5, failure_rate: 0.5 },
        ));
        let mut pattern = Vec::new();
        for _ in 0..32 {
            pattern.push(ks.generate_secret(&profile).await.is_ok());
        }
        runs.push(pattern);
    }

    assert_eq!(runs[0], runs[1]);
}
