//! Circuit input assembly and proof generation
//!
//! The orchestrator owns the proving backend and a cache of loaded
//! circuits keyed by manifest path. Each cached circuit sits behind its
//! own async mutex, so proofs against one circuit run one at a time while
//! other circuits stay available.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ventus_core::{AttestResult, CircuitInputs, Proof, ProvingBackend, SignedMedia};
use ventus_crypto::{der_to_raw, split_pubkey};

/// Cache slot for one manifest; `None` until the circuit first loads
type CircuitSlot<C> = Arc<Mutex<Option<C>>>;

/// Assemble circuit inputs, checking every field width
///
/// Widths are 32 (X), 32 (Y), 64 (`r || s`) and 32 (digest).
pub fn build_inputs(
    x: &[u8],
    y: &[u8],
    signature: &[u8],
    digest: &[u8],
) -> AttestResult<CircuitInputs> {
    CircuitInputs::try_from_slices(x, y, signature, digest)
}

/// Decode a signing result into circuit inputs
pub fn inputs_from_signed(signed: &SignedMedia) -> AttestResult<CircuitInputs> {
    let raw = der_to_raw(signed.signature.as_bytes())?;
    let coords = split_pubkey(signed.public_key.as_bytes())?;
    build_inputs(&coords.x, &coords.y, raw.as_bytes(), signed.digest.as_bytes())
}

/// Drives a [`ProvingBackend`] for attestation proofs
pub struct ProofOrchestrator<B: ProvingBackend> {
    backend: Arc<B>,
    srs: Option<PathBuf>,
    circuits: DashMap<PathBuf, CircuitSlot<B::Circuit>>,
}

impl<B: ProvingBackend> ProofOrchestrator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            srs: None,
            circuits: DashMap::new(),
        }
    }

    /// Pass this structured reference string to every circuit load
    pub fn with_srs(mut self, srs: Option<PathBuf>) -> Self {
        self.srs = srs;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Number of manifests with a cache slot
    pub fn cached_circuits(&self) -> usize {
        self.circuits.len()
    }

    /// Produce a proof over `inputs` with the circuit at `manifest`
    pub async fn generate(&self, inputs: &CircuitInputs, manifest: &Path) -> AttestResult<Proof> {
        let slot = self.slot(manifest);
        let mut guard = slot.lock().await;
        let circuit = self.loaded(&mut *guard, manifest).await?;

        let started = Instant::now();
        let proof = self.backend.prove(circuit, inputs).await?;
        info!(
            manifest = %manifest.display(),
            proof_len = proof.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated proof"
        );
        Ok(proof)
    }

    /// Check `proof` against the circuit at `manifest`
    ///
    /// `Ok(false)` means the verifier ran and rejected the proof.
    pub async fn verify(&self, proof: &Proof, manifest: &Path) -> AttestResult<bool> {
        let slot = self.slot(manifest);
        let mut guard = slot.lock().await;
        let circuit = self.loaded(&mut *guard, manifest).await?;

        let valid = self.backend.verify(circuit, proof).await?;
        if valid {
            debug!(manifest = %manifest.display(), "Proof verified");
        } else {
            warn!(manifest = %manifest.display(), "Proof rejected by verifier");
        }
        Ok(valid)
    }

    fn slot(&self, manifest: &Path) -> CircuitSlot<B::Circuit> {
        self.circuits
            .entry(manifest.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<B::Circuit>,
        manifest: &Path,
    ) -> AttestResult<&'a B::Circuit> {
        let circuit = match slot.take() {
            Some(circuit) => circuit,
            None => {
                let started = Instant::now();
                let circuit = self
                    .backend
                    .load_circuit(manifest, self.srs.as_deref())
                    .await?;
                info!(
                    manifest = %manifest.display(),
                    srs = self.srs.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Loaded circuit"
                );
                circuit
            }
        };
        Ok(&*slot.insert(circuit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ventus_core::{
        AttestError, BackendFault, DerSignature, ErrorKind, ImageDigest, MockProvingBackend,
        PublicKeyCoords, RawPublicKey, RawSignature,
    };

    const MANIFEST: &str = "noircircuits.json";

    fn inputs() -> CircuitInputs {
        let coords = PublicKeyCoords {
            x: [1u8; 32],
            y: [2u8; 32],
        };
        CircuitInputs::from_parts(&coords, &RawSignature::new([3u8; 64]), &ImageDigest::new([4u8; 32]))
    }

    fn orchestrator(backend: MockProvingBackend) -> ProofOrchestrator<MockProvingBackend> {
        ProofOrchestrator::new(Arc::new(backend.with_manifest(MANIFEST)))
    }

    #[test]
    fn test_build_inputs_checks_widths() {
        let ok = build_inputs(&[1u8; 32], &[2u8; 32], &[3u8; 64], &[4u8; 32]);
        assert_eq!(ok.unwrap(), inputs());

        let cases: [(&[u8], &[u8], &[u8], &[u8], &str); 4] = [
            (&[1u8; 31], &[2u8; 32], &[3u8; 64], &[4u8; 32], "pub_key_x"),
            (&[1u8; 32], &[2u8; 33], &[3u8; 64], &[4u8; 32], "pub_key_y"),
            (&[1u8; 32], &[2u8; 32], &[3u8; 63], &[4u8; 32], "signature"),
            (&[1u8; 32], &[2u8; 32], &[3u8; 64], &[], "data_hash"),
        ];
        for (x, y, sig, digest, name) in cases {
            let err = build_inputs(x, y, sig, digest).unwrap_err();
            assert!(
                matches!(err, AttestError::InvalidInputShape { field, .. } if field == name),
                "{err}"
            );
        }
    }

    #[test]
    fn test_inputs_from_signed_rejects_bad_encodings() {
        let mut public = [0u8; 65];
        public[0] = 0x04;
        let signed = SignedMedia {
            digest: ImageDigest::new([4u8; 32]),
            signature: DerSignature::new(vec![0x30, 0x02, 0x02, 0x00]),
            public_key: RawPublicKey::new(public),
        };
        let err = inputs_from_signed(&signed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);

        let mut der = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
        let signed = SignedMedia {
            signature: DerSignature::new(der.clone()),
            public_key: RawPublicKey::new([0x02; 65]),
            ..signed
        };
        let err = inputs_from_signed(&signed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPublicKey);

        der[4] = 0x05;
        let signed = SignedMedia {
            signature: DerSignature::new(der),
            public_key: RawPublicKey::new(public),
            ..signed
        };
        let inputs = inputs_from_signed(&signed).unwrap();
        assert_eq!(inputs.signature()[31], 0x05);
        assert_eq!(inputs.signature()[63], 0x02);
        assert_eq!(inputs.data_hash(), &[4u8; 32]);
    }

    #[tokio::test]
    async fn test_generate_and_verify() {
        let orchestrator = orchestrator(MockProvingBackend::new());
        let proof = orchestrator.generate(&inputs(), Path::new(MANIFEST)).await.unwrap();
        assert!(!proof.is_empty());
        assert!(orchestrator.verify(&proof, Path::new(MANIFEST)).await.unwrap());

        let forged = Proof::new(b"not a proof".to_vec());
        assert!(!orchestrator.verify(&forged, Path::new(MANIFEST)).await.unwrap());
    }

    #[tokio::test]
    async fn test_circuit_loaded_once_per_manifest() {
        let orchestrator = orchestrator(MockProvingBackend::new());
        for _ in 0..3 {
            orchestrator.generate(&inputs(), Path::new(MANIFEST)).await.unwrap();
        }
        assert_eq!(orchestrator.backend().load_calls(), 1);
        assert_eq!(orchestrator.backend().prove_calls(), 3);
        assert_eq!(orchestrator.cached_circuits(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_next_call() {
        let orchestrator = orchestrator(MockProvingBackend::new());
        let err = orchestrator
            .generate(&inputs(), Path::new("missing.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircuitLoadError);

        let _ = orchestrator.generate(&inputs(), Path::new("missing.json")).await;
        assert_eq!(orchestrator.backend().load_calls(), 2);
    }

    #[tokio::test]
    async fn test_backend_errors_keep_their_kind() {
        let orchestrator = orchestrator(MockProvingBackend::new().with_witness_rule(|_| false));
        let err = orchestrator.generate(&inputs(), Path::new(MANIFEST)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WitnessGenerationError);

        let orchestrator = orchestrator_with_fault(BackendFault::Prove);
        let err = orchestrator.generate(&inputs(), Path::new(MANIFEST)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProvingError);

        let orchestrator = orchestrator_with_fault(BackendFault::Verify);
        let proof = orchestrator.generate(&inputs(), Path::new(MANIFEST)).await.unwrap();
        let err = orchestrator.verify(&proof, Path::new(MANIFEST)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VerificationError);
    }

    fn orchestrator_with_fault(fault: BackendFault) -> ProofOrchestrator<MockProvingBackend> {
        orchestrator(MockProvingBackend::new().with_fault(fault))
    }

    #[tokio::test]
    async fn test_srs_passed_to_backend() {
        let backend = Arc::new(MockProvingBackend::new().with_manifest(MANIFEST));
        let orchestrator =
            ProofOrchestrator::new(backend.clone()).with_srs(Some(PathBuf::from("srs.local")));
        orchestrator.generate(&inputs(), Path::new(MANIFEST)).await.unwrap();

        let slot = orchestrator.slot(Path::new(MANIFEST));
        let guard = slot.lock().await;
        let circuit = guard.as_ref().unwrap();
        assert_eq!(circuit.srs.as_deref(), Some(Path::new("srs.local")));
    }

    #[tokio::test]
    async fn test_proofs_serialized_per_circuit() {
        let backend = MockProvingBackend::new()
            .with_manifest("other.json")
            .with_prove_delay(Duration::from_millis(5));
        let orchestrator = Arc::new(orchestrator(backend));

        let mut tasks = Vec::new();
        for i in 0..6 {
            let orchestrator = orchestrator.clone();
            let manifest = if i % 2 == 0 { MANIFEST } else { "other.json" };
            tasks.push(tokio::spawn(async move {
                orchestrator.generate(&inputs(), Path::new(manifest)).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(orchestrator.backend().max_in_flight(), 1);
        assert_eq!(orchestrator.backend().load_calls(), 2);
    }
}
