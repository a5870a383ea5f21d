//! Error types for the Ventus attestation pipeline

use std::fmt;

use thiserror::Error;

/// Top-level error type for one attestation run
///
/// Every stage failure surfaces as exactly one of these. Use
/// [`AttestError::kind`] to get the flat failure kind recorded by the
/// run state machine.
#[derive(Debug, Error)]
pub enum AttestError {
    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Proving error: {0}")]
    Proving(#[from] ProvingError),

    #[error("Invalid input shape for {field}: expected {expected} bytes, got {actual}")]
    InvalidInputShape {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Media could not be canonically encoded: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by a [`KeyStore`](crate::traits::KeyStore)
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Secure hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Key generation policy rejected: {0}")]
    PolicyRejected(String),

    #[error("User authorization required before using key {0}")]
    AuthRequired(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Key not found: {0}")]
    NotFound(String),
}

/// Errors raised by the biometric gate stage
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization denied")]
    Denied,

    #[error("Biometric authorization unavailable")]
    Unavailable,
}

/// Errors raised by the signature and public key decoders
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed DER signature: {0}")]
    MalformedSignature(&'static str),

    #[error("Malformed public key: {0}")]
    MalformedPublicKey(&'static str),
}

/// Errors raised by a [`ProvingBackend`](crate::traits::ProvingBackend)
#[derive(Debug, Error)]
pub enum ProvingError {
    #[error("Circuit load failed: {0}")]
    CircuitLoad(String),

    #[error("Witness generation failed: {0}")]
    WitnessGeneration(String),

    #[error("Proof construction failed: {0}")]
    Proving(String),

    #[error("Verification could not run: {0}")]
    Verification(String),
}

/// Flat failure taxonomy recorded in [`RunState::Failed`](crate::state::RunState)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    HardwareUnavailable,
    PolicyRejected,
    AuthDenied,
    AuthUnavailable,
    SigningFailed,
    MalformedSignature,
    MalformedPublicKey,
    InvalidInputShape,
    CircuitLoadError,
    WitnessGenerationError,
    ProvingError,
    VerificationError,
    /// Media bytes could not be decoded into their canonical form
    MalformedMedia,
    /// Construction-time misconfiguration, never produced mid-run
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::HardwareUnavailable => "hardware_unavailable",
            ErrorKind::PolicyRejected => "policy_rejected",
            ErrorKind::AuthDenied => "auth_denied",
            ErrorKind::AuthUnavailable => "auth_unavailable",
            ErrorKind::SigningFailed => "signing_failed",
            ErrorKind::MalformedSignature => "malformed_signature",
            ErrorKind::MalformedPublicKey => "malformed_public_key",
            ErrorKind::InvalidInputShape => "invalid_input_shape",
            ErrorKind::CircuitLoadError => "circuit_load_error",
            ErrorKind::WitnessGenerationError => "witness_generation_error",
            ErrorKind::ProvingError => "proving_error",
            ErrorKind::VerificationError => "verification_error",
            ErrorKind::MalformedMedia => "malformed_media",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

impl AttestError {
    /// Map this error onto the flat failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestError::KeyStore(e) => match e {
                KeyStoreError::HardwareUnavailable(_) => ErrorKind::HardwareUnavailable,
                KeyStoreError::PolicyRejected(_) => ErrorKind::PolicyRejected,
                // The gate runs before every sign call, so a store that still
                // demands authorization is treated as a denied prompt.
                KeyStoreError::AuthRequired(_) => ErrorKind::AuthDenied,
                KeyStoreError::SigningFailed(_) | KeyStoreError::NotFound(_) => {
                    ErrorKind::SigningFailed
                }
            },
            AttestError::Auth(AuthError::Denied) => ErrorKind::AuthDenied,
            AttestError::Auth(AuthError::Unavailable) => ErrorKind::AuthUnavailable,
            AttestError::Codec(CodecError::MalformedSignature(_)) => ErrorKind::MalformedSignature,
            AttestError::Codec(CodecError::MalformedPublicKey(_)) => ErrorKind::MalformedPublicKey,
            AttestError::Proving(e) => match e {
                ProvingError::CircuitLoad(_) => ErrorKind::CircuitLoadError,
                ProvingError::WitnessGeneration(_) => ErrorKind::WitnessGenerationError,
                ProvingError::Proving(_) => ErrorKind::ProvingError,
                ProvingError::Verification(_) => ErrorKind::VerificationError,
            },
            AttestError::InvalidInputShape { .. } => ErrorKind::InvalidInputShape,
            AttestError::Media(_) => ErrorKind::MalformedMedia,
            AttestError::Config(_) => ErrorKind::Configuration,
        }
    }
}

/// Result type alias for attestation operations
pub type AttestResult<T> = Result<T, AttestError>;
