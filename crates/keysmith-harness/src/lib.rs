//! Test harness for keysmith.
//!
//! Deterministic stand-ins for the cryptographic engine, so the façade's
//! validation logic can be tested quickly and reproducibly:
//!
//! - [`SimEngine`]: seeded, call-recording engine with fake but consistent
//!   crypto. Every algorithm and format combination is accepted.
//! - [`ChaoticEngine`]: wraps any engine and fails a seeded fraction of
//!   calls with a backend fault.
//!
//! # Model-Based Testing
//!
//! The [`model`] module provides a reference implementation of the façade's
//! rules. Operations are applied to both the model and the real façade, and
//! their results and key tables are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chaotic_engine;
pub mod model;
pub mod sim_engine;

pub use chaotic_engine::{ChaoticEngine, FaultConfig};
pub use model::{ModelKey, ModelWorld, ObservableState, OperationError, OperationResult};
pub use sim_engine::{EngineCall, EngineMethod, SimConfig, SimEngine, SimMaterial};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Send `tracing` output to the test writer.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Only the first
/// call in a process installs a subscriber.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter)
        .try_init();
}
