//! Reference model for model-based testing.
//!
//! The model tracks what each key is (algorithm, role, usages,
//! extractability) and predicts how the façade answers each request, with
//! no key material at all. It is the oracle the real façade over
//! [`SimEngine`](crate::SimEngine) is checked against.
//!
//! # Design Principles
//!
//! - Simplicity: the model should be obviously correct
//! - Independence: rules are restated, not imported from the core crate
//! - Deterministic: same operations produce same results

pub mod operation;
mod world;

pub use operation::{
    ModelAlgorithm, ModelFormat, ModelRole, Operation, OperationError, OperationResult, Slot,
};
pub use world::{ModelKey, ModelWorld, ObservableState};
