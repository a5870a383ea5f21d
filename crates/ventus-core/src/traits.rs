//! Collaborator traits for the attestation pipeline
//!
//! The pipeline never talks to platform facilities directly. Everything
//! outside the core is reached through one of these seams, so tests can
//! swap in the mocks from [`crate::mock`] or a software key store.
//!
//! ## Key Traits
//!
//! - [`BiometricGate`]: asynchronous user-presence decision
//! - [`KeyStore`]: hardware-backed key custody and signing
//! - [`ProvingBackend`]: opaque zero-knowledge prover/verifier

use std::path::Path;

use async_trait::async_trait;

use crate::error::{KeyStoreError, ProvingError};
use crate::types::{
    CircuitInputs, DerSignature, KeyHandle, KeyPolicy, KeyTag, Proof, RawPublicKey,
    SignatureAlgorithm,
};

/// Outcome of a biometric prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Granted,
    Denied,
    /// No biometric hardware, or biometry is not enrolled
    Unavailable,
}

/// Authorization oracle consulted before every private-key operation
///
/// Dropping the returned future is how callers dismiss the prompt; the
/// pipeline treats that exactly like [`AuthDecision::Denied`].
#[async_trait]
pub trait BiometricGate: Send + Sync {
    /// Ask the user to authorize, showing `reason` in the prompt
    async fn authorize(&self, reason: &str) -> AuthDecision;
}

/// Hardware-backed key store
///
/// Private keys never leave the store. Callers only ever hold a
/// [`KeyHandle`] and ask the store to use it.
pub trait KeyStore: Send + Sync {
    /// Generate a new keypair under `tag`
    fn create_key(&self, tag: &KeyTag, policy: &KeyPolicy) -> Result<KeyHandle, KeyStoreError>;

    /// Look up an existing keypair
    fn find_key(&self, tag: &KeyTag) -> Result<Option<KeyHandle>, KeyStoreError>;

    /// Sign `message` with the private half of `handle`
    fn sign(
        &self,
        handle: &KeyHandle,
        algorithm: SignatureAlgorithm,
        message: &[u8],
    ) -> Result<DerSignature, KeyStoreError>;

    /// Export the public half in uncompressed SEC1 form
    fn export_public_key(&self, handle: &KeyHandle) -> Result<RawPublicKey, KeyStoreError>;

    /// Permanently remove the key stored under `tag`
    ///
    /// Returns `false` if no key existed.
    fn delete_key(&self, tag: &KeyTag) -> Result<bool, KeyStoreError>;
}

/// Opaque zero-knowledge proving backend
///
/// Implementations are not assumed to be reentrant for a given circuit;
/// the orchestrator serializes calls per circuit.
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    /// Loaded circuit handle
    type Circuit: Send + Sync;

    /// Load the circuit described by the manifest at `manifest`
    ///
    /// `srs` points at a local structured reference string; `None` lets
    /// the backend pick its default.
    async fn load_circuit(
        &self,
        manifest: &Path,
        srs: Option<&Path>,
    ) -> Result<Self::Circuit, ProvingError>;

    /// Derive a witness from `inputs` and produce a proof
    async fn prove(&self, circuit: &Self::Circuit, inputs: &CircuitInputs) -> Result<Proof, ProvingError>;

    /// Check a proof; `Ok(false)` means it ran and rejected
    async fn verify(&self, circuit: &Self::Circuit, proof: &Proof) -> Result<bool, ProvingError>;
}
