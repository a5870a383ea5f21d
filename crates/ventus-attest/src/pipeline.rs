//! End-to-end attestation runs
//!
//! An [`AttestationPipeline`] takes media bytes through every stage:
//! hash, authorize, sign, decode, build inputs, prove and optionally
//! verify. Each run publishes its [`RunState`] on a watch channel and can
//! be cancelled from a [`RunControl`] while it waits on the user or the
//! prover.
//!
//! ```rust,ignore
//! let pipeline = AttestationPipeline::new(store, gate, backend, config)?;
//! let (run, control) = AttestationRun::new();
//!
//! let mut states = control.subscribe();
//! let task = tokio::spawn(async move { pipeline.execute(run, &media).await });
//!
//! // later, if the user navigates away
//! control.cancel();
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use ventus_core::{
    AttestError, AttestResult, AuthError, BiometricGate, CircuitInputs, ImageDigest, KeyStore,
    Proof, ProvingBackend, ProvingError, RawPublicKey, RunState,
};

use crate::config::AttestConfig;
use crate::custodian::KeyCustodian;
use crate::orchestrator::{ProofOrchestrator, inputs_from_signed};
use crate::signer::Signer;

/// Result of a run that reached [`RunState::Proved`]
#[derive(Debug, Clone)]
pub struct AttestOutcome {
    pub run_id: Uuid,
    pub digest: ImageDigest,
    pub public_key: RawPublicKey,
    pub inputs: CircuitInputs,
    pub proof: Proof,
    /// Verifier result; `None` when verification after proving is off
    pub verified: Option<bool>,
}

/// Caller side of a run: observe its state and cancel it
#[derive(Debug, Clone)]
pub struct RunControl {
    id: Uuid,
    state: watch::Receiver<RunState>,
    cancel: watch::Sender<bool>,
}

impl RunControl {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state of the run
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Abandon the run
    ///
    /// A run waiting on the biometric prompt fails as denied; a run that
    /// is proving or verifying fails with a proving error.
    pub fn cancel(&self) {
        // send_replace never fails, even after the run has finished
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Wait until the run reaches `Proved` or `Failed`
    pub async fn finished(&self) -> RunState {
        let mut rx = self.state.clone();
        let result = rx.wait_for(RunState::is_terminal).await.map(|state| *state);
        result.unwrap_or_else(|_| *rx.borrow())
    }
}

/// Pipeline side of a run, consumed by [`AttestationPipeline::execute`]
pub struct AttestationRun {
    id: Uuid,
    state: watch::Sender<RunState>,
    cancel: watch::Receiver<bool>,
}

impl AttestationRun {
    /// Create a run and the control handle that observes it
    pub fn new() -> (Self, RunControl) {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run = Self {
            id,
            state: state_tx,
            cancel: cancel_rx,
        };
        let control = RunControl {
            id,
            state: state_rx,
            cancel: cancel_tx,
        };
        (run, control)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn advance(&self, next: RunState) {
        let current = *self.state.borrow();
        debug_assert!(
            current.can_advance_to(next),
            "illegal transition {current} -> {next}"
        );
        debug!(from = %current, to = %next, "Run state changed");
        self.state.send_replace(next);
    }

    fn fail(&self, err: &AttestError) {
        let kind = err.kind();
        warn!(kind = %kind, error = %err, "Run failed");
        self.advance(RunState::Failed(kind));
    }

    /// Resolve when the caller cancels; never resolves otherwise
    async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            // Control handle dropped without cancelling
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the caller cancels first
    async fn unless_cancelled<T>(
        &self,
        fut: impl Future<Output = AttestResult<T>>,
        on_cancel: impl FnOnce() -> AttestError,
    ) -> AttestResult<T> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(on_cancel()),
            result = fut => result,
        }
    }
}

/// Composes signing, decoding and proving into observable runs
pub struct AttestationPipeline<K, G, B: ProvingBackend> {
    signer: Signer<K, G>,
    orchestrator: ProofOrchestrator<B>,
    manifest: PathBuf,
    verify_after_prove: bool,
}

impl<K, G, B> AttestationPipeline<K, G, B>
where
    K: KeyStore,
    G: BiometricGate,
    B: ProvingBackend,
{
    /// Build a pipeline over the given collaborators
    pub fn new(store: Arc<K>, gate: Arc<G>, backend: Arc<B>, config: AttestConfig) -> AttestResult<Self> {
        let custodian = KeyCustodian::new(store, config.key_tag.clone(), config.key_policy());
        let signer = Signer::new(custodian, gate, &config)?;
        let orchestrator = ProofOrchestrator::new(backend).with_srs(config.srs_path.clone());
        Ok(Self::from_parts(signer, orchestrator, &config))
    }

    /// Build a pipeline from components that are already set up
    pub fn from_parts(signer: Signer<K, G>, orchestrator: ProofOrchestrator<B>, config: &AttestConfig) -> Self {
        Self {
            signer,
            orchestrator,
            manifest: config.circuit_manifest.clone(),
            verify_after_prove: config.verify_after_prove,
        }
    }

    pub fn signer(&self) -> &Signer<K, G> {
        &self.signer
    }

    pub fn orchestrator(&self) -> &ProofOrchestrator<B> {
        &self.orchestrator
    }

    /// Run one attestation with a fresh, uncancellable run
    pub async fn attest(&self, media: &[u8]) -> AttestResult<AttestOutcome> {
        let (run, _control) = AttestationRun::new();
        self.execute(run, media).await
    }

    /// Drive `run` over `media` until it is proved or fails
    ///
    /// Exactly one terminal state is published, and the returned error's
    /// kind always matches the published `Failed` kind.
    pub async fn execute(&self, run: AttestationRun, media: &[u8]) -> AttestResult<AttestOutcome> {
        let span = info_span!("attest", run_id = %run.id, tag = %self.signer.custodian().tag());
        async move {
            match self.drive(&run, media).await {
                Ok(outcome) => {
                    run.advance(RunState::Proved);
                    info!(
                        proof_len = outcome.proof.len(),
                        verified = ?outcome.verified,
                        "Attestation complete"
                    );
                    Ok(outcome)
                }
                Err(err) => {
                    run.fail(&err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, run: &AttestationRun, media: &[u8]) -> AttestResult<AttestOutcome> {
        let digest = self.signer.digest(media)?;

        run.advance(RunState::AwaitingBiometric);
        run.unless_cancelled(self.signer.authorize(), || AuthError::Denied.into())
            .await?;

        run.advance(RunState::Signing);
        let signed = self.signer.sign_digest(digest).await?;
        run.advance(RunState::Signed);

        run.advance(RunState::Decoding);
        let inputs = inputs_from_signed(&signed)?;
        run.advance(RunState::InputsBuilt);

        run.advance(RunState::Proving);
        let proof = run
            .unless_cancelled(self.orchestrator.generate(&inputs, &self.manifest), || {
                ProvingError::Proving("run cancelled while proving".to_string()).into()
            })
            .await?;

        let verified = if self.verify_after_prove {
            run.advance(RunState::Verifying);
            let valid = run
                .unless_cancelled(self.orchestrator.verify(&proof, &self.manifest), || {
                    ProvingError::Verification("run cancelled while verifying".to_string()).into()
                })
                .await?;
            Some(valid)
        } else {
            None
        };

        Ok(AttestOutcome {
            run_id: run.id,
            digest,
            public_key: signed.public_key,
            inputs,
            proof,
            verified,
        })
    }
}
