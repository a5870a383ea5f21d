//! Gated signing of media digests
//!
//! The [`Signer`] hashes media, waits for the biometric gate, and only
//! then asks the key store to sign. A denied or unavailable prompt never
//! reaches the key store.

use std::sync::Arc;

use tracing::{debug, info, warn};
use ventus_core::{
    AttestError, AttestResult, AuthDecision, AuthError, BiometricGate, DerSignature,
    ImageDigest, KeyStore, SignatureAlgorithm, SignedMedia,
};
use ventus_crypto::MediaDigester;

use crate::config::AttestConfig;
use crate::custodian::KeyCustodian;

/// Hashes media and produces a user-authorized signature over the digest
pub struct Signer<K, G> {
    custodian: KeyCustodian<K>,
    gate: Arc<G>,
    digester: MediaDigester,
    algorithm: SignatureAlgorithm,
    auth_reason: String,
}

impl<K: KeyStore, G: BiometricGate> Signer<K, G> {
    /// Build a signer from a custodian, a gate and the run configuration
    ///
    /// Fails if the configured signature scheme cannot sign digests of the
    /// configured digest algorithm.
    pub fn new(custodian: KeyCustodian<K>, gate: Arc<G>, config: &AttestConfig) -> AttestResult<Self> {
        config.validate()?;
        if custodian.tag() != &config.key_tag {
            return Err(AttestError::Config(format!(
                "custodian holds {} but config names {}",
                custodian.tag(),
                config.key_tag
            )));
        }

        Ok(Self {
            custodian,
            gate,
            digester: MediaDigester::new(config.media_encoding, config.digest_algorithm),
            algorithm: config.signature_algorithm,
            auth_reason: config.auth_reason.clone(),
        })
    }

    pub fn custodian(&self) -> &KeyCustodian<K> {
        &self.custodian
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Hash the canonical encoding of `media`
    pub fn digest(&self, media: &[u8]) -> AttestResult<ImageDigest> {
        let digest = self.digester.digest(media)?;
        debug!(media_len = media.len(), encoding = ?self.digester.encoding(), "Computed media digest");
        Ok(digest)
    }

    /// Ask the user to authorize one signature
    pub async fn authorize(&self) -> AttestResult<()> {
        match self.gate.authorize(&self.auth_reason).await {
            AuthDecision::Granted => {
                debug!(tag = %self.custodian.tag(), "Signature authorized");
                Ok(())
            }
            AuthDecision::Denied => {
                info!(tag = %self.custodian.tag(), "Signature denied by user");
                Err(AuthError::Denied.into())
            }
            AuthDecision::Unavailable => {
                warn!(tag = %self.custodian.tag(), "Biometric authorization unavailable");
                Err(AuthError::Unavailable.into())
            }
        }
    }

    /// Sign an already authorized digest and export the public key
    ///
    /// Only call this after [`authorize`](Self::authorize) succeeded.
    pub async fn sign_digest(&self, digest: ImageDigest) -> AttestResult<SignedMedia> {
        let _guard = self.custodian.locks().lock(self.custodian.tag()).await;

        let handle = self.custodian.get_or_create_locked()?;
        let store = self.custodian.store();
        let signature: DerSignature = store.sign(&handle, self.algorithm, digest.as_bytes())?;
        let public_key = store.export_public_key(&handle)?;

        debug!(
            tag = %self.custodian.tag(),
            signature_len = signature.len(),
            "Signed media digest"
        );
        Ok(SignedMedia {
            digest,
            signature,
            public_key,
        })
    }

    /// Hash, authorize and sign in one call
    pub async fn sign(&self, media: &[u8]) -> AttestResult<SignedMedia> {
        let digest = self.digest(media)?;
        self.authorize().await?;
        self.sign_digest(digest).await
    }
}
