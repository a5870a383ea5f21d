//! Software P-256 key store
//!
//! Implements [`KeyStore`] with keys held in process memory, optionally
//! backed by a directory of PKCS#8 files so an identity survives restarts.
//! It stands in for a secure element in tests and on hosts without one.
//!
//! ## Security
//!
//! This store is not hardware. Key bytes live in ordinary memory and on
//! disk; they are zeroized on drop, but nothing stops a process with the
//! same privileges from reading them. Use it only where that is acceptable.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand::RngCore;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use ventus_core::{
    DIGEST_LEN, DerSignature, KeyHandle, KeyPolicy, KeyStore, KeyStoreError, KeyTag,
    RAW_PUBLIC_KEY_LEN, RawPublicKey, SCALAR_LEN, SignatureAlgorithm,
};

/// File extension for persisted keys
const KEY_FILE_EXT: &str = "p8";

/// Secure byte container that zeroizes on drop
///
/// Holds serialized private key material between disk and the key type.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SecureBytes(Vec<u8>);

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A stored keypair plus the reference handed out in its handle
struct StoredKey {
    signing_key: SigningKey,
    reference: String,
}

impl StoredKey {
    fn new(signing_key: SigningKey) -> Self {
        let point = signing_key.verifying_key().to_encoded_point(false);
        // Fingerprint from the X coordinate; never derived from secret bytes
        let reference = hex::encode(&point.as_bytes()[1..9]);
        Self {
            signing_key,
            reference,
        }
    }

    fn handle(&self, tag: &KeyTag) -> KeyHandle {
        KeyHandle::new(tag.clone(), self.reference.clone())
    }
}

/// Software-emulated secure key store for P-256 ECDSA keys
pub struct SoftwareKeyStore {
    keys: DashMap<KeyTag, StoredKey>,
    directory: Option<PathBuf>,
    emulate_secure_hardware: bool,
}

impl SoftwareKeyStore {
    /// Store that forgets its keys when dropped
    pub fn in_memory() -> Self {
        Self {
            keys: DashMap::new(),
            directory: None,
            emulate_secure_hardware: true,
        }
    }

    /// Store that persists keys as PKCS#8 files under `directory`
    ///
    /// The directory is created on first key generation.
    pub fn open(directory: impl Into<PathBuf>) -> Self {
        Self {
            keys: DashMap::new(),
            directory: Some(directory.into()),
            emulate_secure_hardware: true,
        }
    }

    /// Behave like a host without a secure element
    ///
    /// Key generation under a hardware-only policy then fails with
    /// [`KeyStoreError::HardwareUnavailable`].
    pub fn without_secure_hardware(mut self) -> Self {
        self.emulate_secure_hardware = false;
        self
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    fn key_path(&self, tag: &KeyTag) -> Option<PathBuf> {
        // Tags are arbitrary strings, so hex them into a safe file name
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", hex::encode(tag.as_str()), KEY_FILE_EXT)))
    }

    fn load_from_disk(&self, tag: &KeyTag) -> Result<Option<SigningKey>, KeyStoreError> {
        let Some(path) = self.key_path(tag) else {
            return Ok(None);
        };
        let bytes = match fs::read(&path) {
            Ok(bytes) => SecureBytes(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KeyStoreError::HardwareUnavailable(e.to_string())),
        };
        let key = SigningKey::from_pkcs8_der(bytes.as_ref()).map_err(|e| {
            KeyStoreError::HardwareUnavailable(format!("corrupt key file {}: {}", path.display(), e))
        })?;
        Ok(Some(key))
    }

    fn key_file_exists(&self, tag: &KeyTag) -> bool {
        self.key_path(tag).is_some_and(|path| path.exists())
    }

    /// Publish a new key file; fails if one already exists for `tag`
    ///
    /// The key is written to a temporary file and hard-linked into place,
    /// so readers never see a partial file.
    fn persist_new(&self, tag: &KeyTag, stored: &StoredKey) -> Result<(), KeyStoreError> {
        let Some(path) = self.key_path(tag) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeyStoreError::HardwareUnavailable(e.to_string()))?;
        }
        let document = stored
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| KeyStoreError::PolicyRejected(e.to_string()))?;

        let staging = path.with_extension(format!("{}.{}.tmp", KEY_FILE_EXT, stored.reference));
        fs::write(&staging, document.as_bytes())
            .map_err(|e| KeyStoreError::HardwareUnavailable(e.to_string()))?;
        let linked = fs::hard_link(&staging, &path);
        let _ = fs::remove_file(&staging);

        match linked {
            Ok(()) => {
                debug!(tag = %tag, path = %path.display(), "Persisted software key");
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => Err(already_exists(tag)),
            Err(e) => Err(KeyStoreError::HardwareUnavailable(e.to_string())),
        }
    }

    fn with_key<T>(
        &self,
        handle: &KeyHandle,
        f: impl FnOnce(&SigningKey) -> Result<T, KeyStoreError>,
    ) -> Result<T, KeyStoreError> {
        let stored = self
            .keys
            .get(handle.tag())
            .ok_or_else(|| KeyStoreError::NotFound(handle.tag().to_string()))?;
        // A handle outliving a delete/recreate must not reach the new key
        if stored.reference != handle.reference() {
            return Err(KeyStoreError::NotFound(format!(
                "stale handle for {}",
                handle.tag()
            )));
        }
        f(&stored.signing_key)
    }
}

fn already_exists(tag: &KeyTag) -> KeyStoreError {
    KeyStoreError::PolicyRejected(format!("a key already exists under {}", tag))
}

/// Draw a uniformly random valid P-256 scalar
fn generate_signing_key() -> SigningKey {
    let mut seed = [0u8; SCALAR_LEN];
    loop {
        rand::rng().fill_bytes(&mut seed);
        // Rejection sampling: zero or >= n fails, with negligible probability
        if let Ok(key) = SigningKey::from_slice(&seed) {
            seed.zeroize();
            return key;
        }
    }
}

impl KeyStore for SoftwareKeyStore {
    fn create_key(&self, tag: &KeyTag, policy: &KeyPolicy) -> Result<KeyHandle, KeyStoreError> {
        if policy.hardware_only && !self.emulate_secure_hardware {
            return Err(KeyStoreError::HardwareUnavailable(
                "no secure element on this host".to_string(),
            ));
        }

        if self.keys.contains_key(tag) || self.key_file_exists(tag) {
            return Err(already_exists(tag));
        }

        // Generate and write outside the map so other tags in the shard never wait on I/O
        let stored = StoredKey::new(generate_signing_key());
        self.persist_new(tag, &stored)?;

        match self.keys.entry(tag.clone()) {
            // A concurrent find may already have loaded the file we just wrote
            Entry::Occupied(existing) if existing.get().reference == stored.reference => {
                Ok(existing.get().handle(tag))
            }
            Entry::Occupied(_) => Err(already_exists(tag)),
            Entry::Vacant(slot) => {
                let stored = slot.insert(stored);
                debug!(tag = %tag, reference = %stored.reference, "Generated software key");
                Ok(stored.handle(tag))
            }
        }
    }

    fn find_key(&self, tag: &KeyTag) -> Result<Option<KeyHandle>, KeyStoreError> {
        if let Some(stored) = self.keys.get(tag) {
            return Ok(Some(stored.handle(tag)));
        }
        match self.load_from_disk(tag)? {
            Some(key) => {
                let stored = self
                    .keys
                    .entry(tag.clone())
                    .or_insert_with(|| StoredKey::new(key));
                Ok(Some(stored.handle(tag)))
            }
            None => Ok(None),
        }
    }

    fn sign(
        &self,
        handle: &KeyHandle,
        algorithm: SignatureAlgorithm,
        message: &[u8],
    ) -> Result<DerSignature, KeyStoreError> {
        self.with_key(handle, |key| {
            let signed: Result<Signature, p256::ecdsa::Error> = match algorithm {
                SignatureAlgorithm::EcdsaP256Sha256Digest => {
                    if message.len() != DIGEST_LEN {
                        return Err(KeyStoreError::SigningFailed(format!(
                            "digest signing expects {} bytes, got {}",
                            DIGEST_LEN,
                            message.len()
                        )));
                    }
                    PrehashSigner::<Signature>::sign_prehash(key, message)
                }
                SignatureAlgorithm::EcdsaP256Sha256Message => {
                    Signer::<Signature>::try_sign(key, message)
                }
            };
            let signature = signed.map_err(|e| KeyStoreError::SigningFailed(e.to_string()))?;

            Ok(DerSignature::new(signature.to_der().as_bytes().to_vec()))
        })
    }

    fn export_public_key(&self, handle: &KeyHandle) -> Result<RawPublicKey, KeyStoreError> {
        self.with_key(handle, |key| {
            let point = key.verifying_key().to_encoded_point(false);
            let bytes: [u8; RAW_PUBLIC_KEY_LEN] = point.as_bytes().try_into().map_err(|_| {
                KeyStoreError::SigningFailed("unexpected public key encoding".to_string())
            })?;
            Ok(RawPublicKey::new(bytes))
        })
    }

    fn delete_key(&self, tag: &KeyTag) -> Result<bool, KeyStoreError> {
        let in_memory = self.keys.remove(tag).is_some();
        let on_disk = match self.key_path(tag) {
            Some(path) => match fs::remove_file(&path) {
                Ok(()) => true,
                Err(e) if e.kind() == IoErrorKind::NotFound => false,
                Err(e) => return Err(KeyStoreError::HardwareUnavailable(e.to_string())),
            },
            None => false,
        };
        Ok(in_memory || on_disk)
    }
}
