//! # Ventus Crypto
//!
//! Byte-level building blocks for the Ventus attestation pipeline.
//!
//! ## Features
//!
//! - Strict DER to fixed-width `r || s` signature conversion
//! - Uncompressed SEC1 public key splitting into X and Y
//! - Canonical media digests that survive lossless re-encoding
//! - A software P-256 key store for hosts without a secure element
//!
//! ## Example
//!
//! ```rust,ignore
//! use ventus_core::{KeyPolicy, KeyStore, KeyTag, SignatureAlgorithm};
//! use ventus_crypto::{MediaDigester, SoftwareKeyStore, der_to_raw, split_pubkey};
//!
//! let digest = MediaDigester::default().digest(&png_bytes)?;
//!
//! let store = SoftwareKeyStore::in_memory();
//! let handle = store.create_key(&KeyTag::default(), &KeyPolicy::default())?;
//! let der = store.sign(&handle, SignatureAlgorithm::default(), digest.as_bytes())?;
//!
//! let raw = der_to_raw(der.as_bytes())?;
//! let coords = split_pubkey(store.export_public_key(&handle)?.as_bytes())?;
//! ```

pub mod codec;
pub mod digest;
pub mod software_store;

pub use codec::{MIN_DER_SIGNATURE_LEN, der_to_raw, split_pubkey};
pub use digest::MediaDigester;
pub use software_store::SoftwareKeyStore;
