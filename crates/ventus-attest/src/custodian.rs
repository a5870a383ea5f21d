//! Key custody
//!
//! [`KeyCustodian`] owns the tag and policy for one signing identity and
//! resolves it to a [`KeyHandle`], generating the key on first use.

use std::sync::{Arc, LazyLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info};
use ventus_core::{AttestResult, KeyHandle, KeyPolicy, KeyStore, KeyTag, RawPublicKey};

use crate::locks::KeyedLocks;

/// Tag locks shared by every custodian in the process
///
/// A tag names one key no matter which custodian, signer or pipeline
/// reaches it, so exclusion is per tag rather than per instance.
static TAG_LOCKS: LazyLock<Arc<KeyedLocks<KeyTag>>> = LazyLock::new(|| Arc::new(KeyedLocks::new()));

/// Get-or-create lifecycle for one hardware-bound keypair
pub struct KeyCustodian<K> {
    store: Arc<K>,
    tag: KeyTag,
    policy: KeyPolicy,
    locks: Arc<KeyedLocks<KeyTag>>,
}

impl<K> Clone for KeyCustodian<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tag: self.tag.clone(),
            policy: self.policy,
            locks: self.locks.clone(),
        }
    }
}

impl<K: KeyStore> KeyCustodian<K> {
    pub fn new(store: Arc<K>, tag: KeyTag, policy: KeyPolicy) -> Self {
        Self {
            store,
            tag,
            policy,
            locks: TAG_LOCKS.clone(),
        }
    }

    /// Use a private lock registry instead of the process-wide one
    ///
    /// Custodians for the same tag must share a registry, or they will not
    /// exclude each other.
    pub fn with_locks(mut self, locks: Arc<KeyedLocks<KeyTag>>) -> Self {
        self.locks = locks;
        self
    }

    pub fn tag(&self) -> &KeyTag {
        &self.tag
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<K> {
        &self.store
    }

    pub(crate) fn locks(&self) -> &Arc<KeyedLocks<KeyTag>> {
        &self.locks
    }

    /// Resolve the key for this tag, creating it if absent
    pub async fn get_or_create(&self) -> AttestResult<KeyHandle> {
        let _guard = self.locks.lock(&self.tag).await;
        self.get_or_create_locked()
    }

    /// Same as [`get_or_create`](Self::get_or_create); caller holds the tag lock
    pub(crate) fn get_or_create_locked(&self) -> AttestResult<KeyHandle> {
        if let Some(handle) = self.store.find_key(&self.tag)? {
            debug!(tag = %self.tag, "Found existing key");
            return Ok(handle);
        }

        let handle = self.store.create_key(&self.tag, &self.policy)?;
        info!(
            tag = %self.tag,
            hardware_only = self.policy.hardware_only,
            user_presence = self.policy.require_user_presence,
            "Generated signing key"
        );
        Ok(handle)
    }

    /// Public key in uncompressed SEC1 form
    pub async fn public_key(&self) -> AttestResult<RawPublicKey> {
        let _guard = self.locks.lock(&self.tag).await;
        let handle = self.get_or_create_locked()?;
        Ok(self.store.export_public_key(&handle)?)
    }

    /// Public key as standard base64, for sharing with a verifier
    pub async fn public_key_base64(&self) -> AttestResult<String> {
        let key = self.public_key().await?;
        Ok(BASE64.encode(key.as_bytes()))
    }

    /// Delete the key for this tag; the next use generates a fresh one
    pub async fn reset(&self) -> AttestResult<bool> {
        let _guard = self.locks.lock(&self.tag).await;
        let removed = self.store.delete_key(&self.tag)?;
        if removed {
            info!(tag = %self.tag, "Deleted signing key");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventus_core::{AttestError, ErrorKind, InstrumentedKeyStore, KeyStoreError};
    use ventus_crypto::SoftwareKeyStore;

    fn custodian() -> KeyCustodian<InstrumentedKeyStore<SoftwareKeyStore>> {
        KeyCustodian::new(
            Arc::new(InstrumentedKeyStore::new(SoftwareKeyStore::in_memory())),
            KeyTag::default(),
            KeyPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let custodian = custodian();
        let first = custodian.get_or_create().await.unwrap();
        let second = custodian.get_or_create().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(custodian.store().create_calls(), 1);
        assert_eq!(custodian.store().find_calls(), 2);
    }

    #[tokio::test]
    async fn test_public_key_is_stable() {
        let custodian = custodian();
        let a = custodian.public_key().await.unwrap();
        let b = custodian.public_key().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes()[0], 0x04);

        let encoded = custodian.public_key_base64().await.unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), a.as_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_reset_regenerates() {
        let custodian = custodian();
        let before = custodian.public_key().await.unwrap();
        assert!(custodian.reset().await.unwrap());
        assert!(!custodian.reset().await.unwrap());

        let after = custodian.public_key().await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_creation_failure_is_typed() {
        let store = InstrumentedKeyStore::new(SoftwareKeyStore::in_memory())
            .fail_create_with(KeyStoreError::HardwareUnavailable);
        let custodian = KeyCustodian::new(Arc::new(store), KeyTag::default(), KeyPolicy::default());

        let err = custodian.get_or_create().await.unwrap_err();
        assert!(matches!(err, AttestError::KeyStore(KeyStoreError::HardwareUnavailable(_))));
        assert_eq!(err.kind(), ErrorKind::HardwareUnavailable);
    }

    #[tokio::test]
    async fn test_separate_custodians_share_tag_lock() {
        let store = Arc::new(InstrumentedKeyStore::new(SoftwareKeyStore::in_memory()));
        let tag = KeyTag::new("custodian.shared.lock").unwrap();
        let a = KeyCustodian::new(store.clone(), tag.clone(), KeyPolicy::default());
        let b = KeyCustodian::new(store, tag.clone(), KeyPolicy::default());

        let held = a.locks().lock(&tag).await;
        let blocked = tokio::time::timeout(std::time::Duration::from_millis(20), b.get_or_create()).await;
        assert!(blocked.is_err());

        drop(held);
        assert_eq!(b.get_or_create().await.unwrap(), a.get_or_create().await.unwrap());
        assert_eq!(b.store().create_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_create_one_key() {
        let custodian = custodian();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let custodian = custodian.clone();
            tasks.push(tokio::spawn(async move { custodian.get_or_create().await.unwrap() }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(custodian.store().create_calls(), 1);
        assert!(handles.windows(2).all(|w| w[0] == w[1]));
    }
}
