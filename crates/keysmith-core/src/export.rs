//! Key Exporter
//!
//! Serializes extractable keys through the engine. The extractability gate
//! is checked here, before the engine is asked, and the engine's answer must
//! be in the requested format.

use crate::{
    engine::{Engine, EngineError},
    error::KeysmithError,
    format::{ExportFormat, KeyFormat, SerializedKey},
    key::Key,
};

/// Export `key` in the format selected by the `format` marker.
///
/// # Errors
///
/// - `NotExtractable` if the key was created non-extractable
/// - `Engine` if serialization fails or the engine returns another format
pub async fn export<E: Engine, F: ExportFormat>(
    engine: &E,
    _format: F,
    key: &Key<E::Material>,
) -> Result<F::Output, KeysmithError> {
    let serialized = export_serialized(engine, F::FORMAT, key).await?;

    let actual = serialized.format();
    F::from_serialized(serialized).ok_or_else(|| {
        EngineError::OperationFailed {
            reason: format!("engine returned {actual} material for a {} export", F::FORMAT),
        }
        .into()
    })
}

/// Untyped form of [`export`].
///
/// # Errors
///
/// As [`export`].
pub async fn export_serialized<E: Engine>(
    engine: &E,
    format: KeyFormat,
    key: &Key<E::Material>,
) -> Result<SerializedKey, KeysmithError> {
    if !key.extractable() {
        tracing::warn!(algorithm = %key.name(), %format, "refusing to export non-extractable key");
        return Err(KeysmithError::NotExtractable { algorithm: key.name() });
    }

    tracing::debug!(algorithm = %key.name(), key_type = %key.key_type(), %format, "exporting key");

    let serialized = engine.export_key(format, key).await?;
    if serialized.format() != format {
        return Err(EngineError::OperationFailed {
            reason: format!("engine returned {} material for a {format} export", serialized.format()),
        }
        .into());
    }

    Ok(serialized)
}
