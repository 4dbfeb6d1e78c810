//! Key Provisioner
//!
//! Generates and imports keys through the engine.
//!
//! Generation hands the profile to the engine verbatim. Import narrows the
//! profile's usages to what the declared role permits before the engine sees
//! them: a `sign` usage on a public import is dropped, not rejected.

use crate::{
    dispatch::Operation,
    engine::{Engine, EngineError},
    error::KeysmithError,
    format::{ExportFormat, SerializedKey},
    key::{GeneratedKey, Key, KeyPair, KeyShape, KeyType},
    profile::AlgorithmProfile,
};

/// Generate a key or key pair for `profile`.
///
/// # Errors
///
/// Engine failures propagate unchanged. An engine that answers with the
/// wrong shape for the profile's family is reported as an engine failure.
pub async fn generate<E: Engine>(
    engine: &E,
    profile: &AlgorithmProfile,
) -> Result<GeneratedKey<E::Material>, KeysmithError> {
    tracing::debug!(
        algorithm = %profile.algorithm(),
        extractable = profile.extractable(),
        usages = %profile.usages(),
        "generating key"
    );

    let generated =
        engine.generate_key(profile.algorithm(), profile.extractable(), profile.usages()).await?;

    if generated.shape() != profile.shape() {
        return Err(EngineError::OperationFailed {
            reason: format!(
                "engine generated a {} for {}, expected a {}",
                generated.shape(),
                profile.name(),
                profile.shape()
            ),
        }
        .into());
    }

    Ok(generated)
}

/// Generate a key pair.
///
/// # Errors
///
/// `UnsupportedAlgorithm` if the profile describes a symmetric algorithm;
/// otherwise as [`generate`].
pub async fn generate_pair<E: Engine>(
    engine: &E,
    profile: &AlgorithmProfile,
) -> Result<KeyPair<E::Material>, KeysmithError> {
    expect_shape(profile, KeyShape::Pair, Operation::GenerateKeyPair)?;

    match generate(engine, profile).await? {
        GeneratedKey::Pair(pair) => Ok(pair),
        GeneratedKey::Secret(_) => Err(unsupported(profile, Operation::GenerateKeyPair)),
    }
}

/// Generate a single secret key.
///
/// # Errors
///
/// `UnsupportedAlgorithm` if the profile describes an asymmetric algorithm;
/// otherwise as [`generate`].
pub async fn generate_secret<E: Engine>(
    engine: &E,
    profile: &AlgorithmProfile,
) -> Result<Key<E::Material>, KeysmithError> {
    expect_shape(profile, KeyShape::Secret, Operation::GenerateSecretKey)?;

    match generate(engine, profile).await? {
        GeneratedKey::Secret(key) => Ok(key),
        GeneratedKey::Pair(_) => Err(unsupported(profile, Operation::GenerateSecretKey)),
    }
}

fn expect_shape(
    profile: &AlgorithmProfile,
    shape: KeyShape,
    operation: Operation,
) -> Result<(), KeysmithError> {
    if profile.shape() == shape { Ok(()) } else { Err(unsupported(profile, operation)) }
}

fn unsupported(profile: &AlgorithmProfile, operation: Operation) -> KeysmithError {
    KeysmithError::UnsupportedAlgorithm { algorithm: profile.name(), operation }
}

/// Import `material` as a key of `profile`'s algorithm.
///
/// The realized usages are `profile.usages()` restricted to `role`.
/// `extractable`, when set, takes precedence over `profile.extractable()`.
///
/// # Errors
///
/// Engine rejections (malformed material, wrong key type for the format)
/// propagate unchanged.
pub async fn import<E: Engine, F: ExportFormat>(
    engine: &E,
    _format: F,
    role: KeyType,
    material: F::Output,
    profile: &AlgorithmProfile,
    extractable: Option<bool>,
) -> Result<Key<E::Material>, KeysmithError> {
    import_serialized(engine, role, F::into_serialized(material), profile, extractable).await
}

/// Untyped form of [`import`], for material whose format is only known at
/// runtime.
///
/// # Errors
///
/// As [`import`].
pub async fn import_serialized<E: Engine>(
    engine: &E,
    role: KeyType,
    material: SerializedKey,
    profile: &AlgorithmProfile,
    extractable: Option<bool>,
) -> Result<Key<E::Material>, KeysmithError> {
    let usages = profile.usages().for_role(role);
    let extractable = extractable.unwrap_or(profile.extractable());

    if usages != profile.usages() {
        tracing::debug!(
            algorithm = %profile.name(),
            %role,
            requested = %profile.usages(),
            realized = %usages,
            "dropped usages not permitted for role"
        );
    }

    tracing::debug!(
        algorithm = %profile.algorithm(),
        format = %material.format(),
        %role,
        extractable,
        "importing key"
    );

    Ok(engine.import_key(material, profile.algorithm(), extractable, usages).await?)
}
