//! # Ventus Core
//!
//! Core traits, types, and errors for the Ventus attestation pipeline.
//!
//! This crate provides the foundational abstractions that let the same
//! signing and proving logic run against real secure hardware and a real
//! prover, or against software stand-ins in tests.
//!
//! ## Key Traits
//!
//! - [`BiometricGate`]: Asynchronous user-presence decision
//! - [`KeyStore`]: Hardware-backed, non-exportable key custody
//! - [`ProvingBackend`]: Opaque zero-knowledge prover and verifier
//!
//! ## Key Types
//!
//! - [`KeyHandle`]: Opaque reference to a stored keypair
//! - [`ImageDigest`]: SHA-256 digest of the canonical media encoding
//! - [`RawSignature`] / [`RawPublicKey`]: Fixed-width forms for the circuit
//! - [`CircuitInputs`]: Named input assignment handed to the prover
//! - [`RunState`]: Stage of one attestation run

pub mod error;
pub mod mock;
pub mod state;
pub mod traits;
pub mod types;

// Re-export main types
pub use error::*;
pub use mock::*;
pub use state::*;
pub use traits::*;
pub use types::*;
