//! # Ventus Attest
//!
//! Stateful components of the Ventus attestation pipeline.
//!
//! ## Components
//!
//! - [`KeyCustodian`]: get-or-create lifecycle for the signing key
//! - [`Signer`]: hashing plus biometric-gated signing
//! - [`ProofOrchestrator`]: circuit input assembly and proving
//! - [`AttestationPipeline`]: one observable, cancellable run end to end
//! - [`AttestConfig`]: TOML-loadable run configuration
//!
//! Concurrency is resource-keyed: key operations are serialized per key
//! tag and proofs per circuit manifest, never globally.

pub mod config;
pub mod custodian;
pub mod locks;
pub mod orchestrator;
pub mod pipeline;
pub mod signer;

pub use config::{AttestConfig, DEFAULT_AUTH_REASON, DEFAULT_CIRCUIT_MANIFEST};
pub use custodian::KeyCustodian;
pub use locks::KeyedLocks;
pub use orchestrator::{ProofOrchestrator, build_inputs, inputs_from_signed};
pub use pipeline::{AttestOutcome, AttestationPipeline, AttestationRun, RunControl};
pub use signer::Signer;
