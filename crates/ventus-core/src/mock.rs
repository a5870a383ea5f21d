//! Mock collaborators for testing
//!
//! In-memory stand-ins for the biometric gate, the key store and the
//! proving backend, so pipeline logic can be exercised without secure
//! hardware or a real prover. Every mock counts its calls so tests can
//! assert that a stage was (or was not) reached.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ventus_core::{AuthDecision, MockBiometricGate, MockProvingBackend};
//!
//! let gate = MockBiometricGate::new(AuthDecision::Denied);
//! let backend = MockProvingBackend::new().with_manifest("circuit.json");
//!
//! // ... run the pipeline ...
//! assert_eq!(gate.calls(), 1);
//! assert_eq!(backend.prove_calls(), 0);
//! ```

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{KeyStoreError, ProvingError};
use crate::traits::{AuthDecision, BiometricGate, KeyStore, ProvingBackend};
use crate::types::{
    CircuitInputs, DerSignature, KeyHandle, KeyPolicy, KeyTag, Proof, RawPublicKey,
    SignatureAlgorithm,
};

/// Prefix of every proof the mock backend emits
const MOCK_PROOF_PREFIX: &[u8] = b"ventus-mock-proof:";

/// Scripted biometric gate
///
/// Answers from a queue of scripted decisions, then falls back to a
/// default decision. Can also be told to never answer, to model a prompt
/// the user walks away from.
pub struct MockBiometricGate {
    default: AuthDecision,
    scripted: Mutex<VecDeque<AuthDecision>>,
    delay: Option<Duration>,
    never_resolve: bool,
    calls: AtomicUsize,
    reasons: Mutex<Vec<String>>,
}

impl MockBiometricGate {
    /// Gate that always answers `decision`
    pub fn new(decision: AuthDecision) -> Self {
        Self {
            default: decision,
            scripted: Mutex::new(VecDeque::new()),
            delay: None,
            never_resolve: false,
            calls: AtomicUsize::new(0),
            reasons: Mutex::new(Vec::new()),
        }
    }

    pub fn granting() -> Self {
        Self::new(AuthDecision::Granted)
    }

    pub fn denying() -> Self {
        Self::new(AuthDecision::Denied)
    }

    /// Gate whose prompt stays open until the caller gives up
    pub fn never_resolving() -> Self {
        Self {
            never_resolve: true,
            ..Self::new(AuthDecision::Denied)
        }
    }

    /// Answer with these decisions first, in order
    pub fn with_script(self, decisions: impl IntoIterator<Item = AuthDecision>) -> Self {
        Self {
            scripted: Mutex::new(decisions.into_iter().collect()),
            ..self
        }
    }

    /// Wait this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt reasons received so far
    pub async fn reasons(&self) -> Vec<String> {
        self.reasons.lock().await.clone()
    }
}

#[async_trait]
impl BiometricGate for MockBiometricGate {
    async fn authorize(&self, reason: &str) -> AuthDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reasons.lock().await.push(reason.to_string());

        if self.never_resolve {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.scripted.lock().await.pop_front().unwrap_or(self.default)
    }
}

/// Key store wrapper that counts calls and injects failures
///
/// Wraps any real [`KeyStore`] (usually the software store) and forwards
/// to it unless a failure has been injected for that operation.
pub struct InstrumentedKeyStore<K> {
    inner: K,
    create_calls: AtomicUsize,
    find_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    create_failure: Option<fn(String) -> KeyStoreError>,
    sign_failure: Option<fn(String) -> KeyStoreError>,
}

impl<K: KeyStore> InstrumentedKeyStore<K> {
    pub fn new(inner: K) -> Self {
        Self {
            inner,
            create_calls: AtomicUsize::new(0),
            find_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            create_failure: None,
            sign_failure: None,
        }
    }

    /// Make every `create_key` fail with the given error constructor
    pub fn fail_create_with(mut self, make: fn(String) -> KeyStoreError) -> Self {
        self.create_failure = Some(make);
        self
    }

    /// Make every `sign` fail with the given error constructor
    pub fn fail_sign_with(mut self, make: fn(String) -> KeyStoreError) -> Self {
        self.sign_failure = Some(make);
        self
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

impl<K: KeyStore> KeyStore for InstrumentedKeyStore<K> {
    fn create_key(&self, tag: &KeyTag, policy: &KeyPolicy) -> Result<KeyHandle, KeyStoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = self.create_failure {
            return Err(make(format!("injected failure creating {}", tag)));
        }
        self.inner.create_key(tag, policy)
    }

    fn find_key(&self, tag: &KeyTag) -> Result<Option<KeyHandle>, KeyStoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_key(tag)
    }

    fn sign(
        &self,
        handle: &KeyHandle,
        algorithm: SignatureAlgorithm,
        message: &[u8],
    ) -> Result<DerSignature, KeyStoreError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = self.sign_failure {
            return Err(make("injected signing failure".to_string()));
        }
        self.inner.sign(handle, algorithm, message)
    }

    fn export_public_key(&self, handle: &KeyHandle) -> Result<RawPublicKey, KeyStoreError> {
        self.inner.export_public_key(handle)
    }

    fn delete_key(&self, tag: &KeyTag) -> Result<bool, KeyStoreError> {
        self.inner.delete_key(tag)
    }
}

/// Circuit handle produced by [`MockProvingBackend`]
#[derive(Debug, Clone)]
pub struct MockCircuit {
    pub manifest: PathBuf,
    pub srs: Option<PathBuf>,
}

type WitnessRule = Arc<dyn Fn(&CircuitInputs) -> bool + Send + Sync>;

/// Failure injected into one backend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFault {
    None,
    Load,
    Prove,
    Verify,
    /// Verifier runs but rejects every proof
    Reject,
}

/// In-memory proving backend
///
/// Only manifests registered with [`with_manifest`](Self::with_manifest)
/// load. Proofs are the serialized inputs behind a fixed prefix, and only
/// proofs this backend produced verify as `true`.
pub struct MockProvingBackend {
    manifests: HashSet<PathBuf>,
    witness_rule: Option<WitnessRule>,
    fault: BackendFault,
    prove_delay: Option<Duration>,
    issued: DashMap<Vec<u8>, ()>,
    in_flight: DashMap<PathBuf, usize>,
    max_in_flight: AtomicUsize,
    load_calls: AtomicUsize,
    prove_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl Default for MockProvingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvingBackend {
    pub fn new() -> Self {
        Self {
            manifests: HashSet::new(),
            witness_rule: None,
            fault: BackendFault::None,
            prove_delay: None,
            issued: DashMap::new(),
            in_flight: DashMap::new(),
            max_in_flight: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            prove_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Register a manifest path as loadable
    pub fn with_manifest(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.manifests.insert(manifest.into());
        self
    }

    /// Reject witnesses for which `rule` returns false
    pub fn with_witness_rule(
        mut self,
        rule: impl Fn(&CircuitInputs) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.witness_rule = Some(Arc::new(rule));
        self
    }

    pub fn with_fault(mut self, fault: BackendFault) -> Self {
        self.fault = fault;
        self
    }

    /// Make each prove call take at least this long
    pub fn with_prove_delay(mut self, delay: Duration) -> Self {
        self.prove_delay = Some(delay);
        self
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn prove_calls(&self) -> usize {
        self.prove_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls seen against a single circuit
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, manifest: &Path) {
        let mut count = self.in_flight.entry(manifest.to_path_buf()).or_insert(0);
        *count += 1;
        self.max_in_flight.fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, manifest: &Path) {
        if let Some(mut count) = self.in_flight.get_mut(manifest) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl ProvingBackend for MockProvingBackend {
    type Circuit = MockCircuit;

    async fn load_circuit(&self, manifest: &Path, srs: Option<&Path>) -> Result<MockCircuit, ProvingError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fault == BackendFault::Load {
            return Err(ProvingError::CircuitLoad("injected load failure".to_string()));
        }
        if !self.manifests.contains(manifest) {
            return Err(ProvingError::CircuitLoad(format!(
                "manifest not found: {}",
                manifest.display()
            )));
        }
        Ok(MockCircuit {
            manifest: manifest.to_path_buf(),
            srs: srs.map(Path::to_path_buf),
        })
    }

    async fn prove(&self, circuit: &MockCircuit, inputs: &CircuitInputs) -> Result<Proof, ProvingError> {
        self.prove_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(&circuit.manifest);

        if let Some(delay) = self.prove_delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.witness_rule.as_ref().is_some_and(|rule| !rule(inputs)) {
            Err(ProvingError::WitnessGeneration(
                "inputs do not satisfy circuit constraints".to_string(),
            ))
        } else if self.fault == BackendFault::Prove {
            Err(ProvingError::Proving("injected prover failure".to_string()))
        } else {
            serde_json::to_vec(inputs)
                .map(|body| {
                    let mut bytes = MOCK_PROOF_PREFIX.to_vec();
                    bytes.extend_from_slice(&body);
                    self.issued.insert(bytes.clone(), ());
                    Proof::new(bytes)
                })
                .map_err(|e| ProvingError::Proving(e.to_string()))
        };

        self.leave(&circuit.manifest);
        result
    }

    async fn verify(&self, circuit: &MockCircuit, proof: &Proof) -> Result<bool, ProvingError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.fault == BackendFault::Verify {
            return Err(ProvingError::Verification("injected verifier failure".to_string()));
        }
        self.enter(&circuit.manifest);
        let valid = self.fault != BackendFault::Reject
            && proof.as_bytes().starts_with(MOCK_PROOF_PREFIX)
            && self.issued.contains_key(proof.as_bytes());
        self.leave(&circuit.manifest);
        Ok(valid)
    }
}
