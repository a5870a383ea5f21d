//! Subcommand handlers
//!
//! Each handler returns the text to print on stdout so the binary only
//! deals with parsing, logging and exit status.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::info;
use ventus_attest::{AttestConfig, KeyCustodian, Signer, inputs_from_signed};
use ventus_core::{BiometricGate, KeyStore};
use ventus_crypto::split_pubkey;

use crate::config::Command;

/// Signing identity plus gate for one CLI invocation
pub struct Session<K, G> {
    signer: Signer<K, G>,
}

impl<K: KeyStore, G: BiometricGate> Session<K, G> {
    pub fn new(store: Arc<K>, gate: Arc<G>, config: &AttestConfig) -> anyhow::Result<Self> {
        let custodian = KeyCustodian::new(store, config.key_tag.clone(), config.key_policy());
        let signer = Signer::new(custodian, gate, config)?;
        Ok(Self { signer })
    }

    fn custodian(&self) -> &KeyCustodian<K> {
        self.signer.custodian()
    }

    /// Run `command` and return its output
    pub async fn run(&self, command: &Command) -> anyhow::Result<String> {
        match command {
            Command::Pubkey => self.pubkey().await,
            Command::Digest { image } => self.digest(&read_media(image)?),
            Command::Sign { image, .. } => self.sign(&read_media(image)?).await,
            Command::Inputs { image, .. } => self.inputs(&read_media(image)?).await,
            Command::ResetKey => self.reset_key().await,
        }
    }

    /// Public key as base64 plus its hex coordinates
    pub async fn pubkey(&self) -> anyhow::Result<String> {
        let key = self.custodian().public_key().await?;
        let coords = split_pubkey(key.as_bytes())?;
        Ok(format!(
            "public_key: {}\nx: {}\ny: {}",
            BASE64.encode(key.as_bytes()),
            hex::encode(coords.x),
            hex::encode(coords.y)
        ))
    }

    pub fn digest(&self, media: &[u8]) -> anyhow::Result<String> {
        Ok(self.signer.digest(media)?.to_hex())
    }

    /// DER signature and public key for an authorized signature over `media`
    pub async fn sign(&self, media: &[u8]) -> anyhow::Result<String> {
        let signed = self.signer.sign(media).await?;
        info!(tag = %self.custodian().tag(), "Signed media");
        Ok(format!(
            "digest: {}\nsignature: {}\npublic_key: {}",
            signed.digest.to_hex(),
            hex::encode(signed.signature.as_bytes()),
            BASE64.encode(signed.public_key.as_bytes())
        ))
    }

    /// Circuit input map for an authorized signature over `media`
    pub async fn inputs(&self, media: &[u8]) -> anyhow::Result<String> {
        let signed = self.signer.sign(media).await?;
        let inputs = inputs_from_signed(&signed)?;
        Ok(inputs.to_json()?)
    }

    pub async fn reset_key(&self) -> anyhow::Result<String> {
        let tag = self.custodian().tag();
        Ok(if self.custodian().reset().await? {
            format!("deleted key {tag}")
        } else {
            format!("no key under {tag}")
        })
    }
}

fn read_media(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}
