//! Value types flowing through one attestation run
//!
//! Fixed-width values are stored as arrays so their width is part of the
//! type. Only [`DerSignature`] and [`Proof`] are variable length.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{AttestError, AttestResult};

/// Length of an [`ImageDigest`] in bytes
pub const DIGEST_LEN: usize = 32;

/// Length of one P-256 scalar or coordinate in bytes
pub const SCALAR_LEN: usize = 32;

/// Length of a raw `r || s` signature in bytes
pub const RAW_SIGNATURE_LEN: usize = 64;

/// Length of an uncompressed SEC1 public key in bytes
pub const RAW_PUBLIC_KEY_LEN: usize = 65;

/// SEC1 tag byte for an uncompressed point
pub const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

/// Default application tag for the device identity key
pub const DEFAULT_KEY_TAG: &str = "com.ventus.securekey";

/// Stable identifier under which a hardware key is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTag(String);

impl KeyTag {
    /// Create a tag, rejecting empty strings
    pub fn new(tag: impl Into<String>) -> AttestResult<Self> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(AttestError::Config("key tag must not be empty".to_string()));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KeyTag {
    fn default() -> Self {
        Self(DEFAULT_KEY_TAG.to_string())
    }
}

impl fmt::Display for KeyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a keypair held by a [`KeyStore`](crate::traits::KeyStore)
///
/// A handle never carries private key material. The `reference` is
/// assigned by the store and only meaningful to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle {
    tag: KeyTag,
    reference: String,
}

impl KeyHandle {
    pub fn new(tag: KeyTag, reference: impl Into<String>) -> Self {
        Self {
            tag,
            reference: reference.into(),
        }
    }

    pub fn tag(&self) -> &KeyTag {
        &self.tag
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

/// Attributes requested when generating a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    /// Key must live in secure hardware (never a software fallback)
    pub hardware_only: bool,
    /// Every private-key use must be gated by user presence
    pub require_user_presence: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            hardware_only: true,
            require_user_presence: true,
        }
    }
}

/// Hash function used to compute an [`ImageDigest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
}

/// Signature scheme requested from the key store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    /// ECDSA P-256 where the message is already a SHA-256 digest
    #[default]
    EcdsaP256Sha256Digest,
    /// ECDSA P-256 where the store hashes the message with SHA-256 first
    EcdsaP256Sha256Message,
}

impl SignatureAlgorithm {
    /// Digest algorithm this scheme expects its input to be produced with
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            SignatureAlgorithm::EcdsaP256Sha256Digest
            | SignatureAlgorithm::EcdsaP256Sha256Message => DigestAlgorithm::Sha256,
        }
    }
}

/// How media bytes are turned into the canonical form that gets hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaEncoding {
    /// Decode the image and hash its RGBA8 pixel buffer with a size header
    #[default]
    DecodedPixels,
    /// Hash the bytes exactly as supplied
    Verbatim,
}

/// 32-byte digest of the canonical media encoding
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDigest([u8; DIGEST_LEN]);

impl ImageDigest {
    pub fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageDigest({}..)", &self.to_hex()[..8])
    }
}

/// ASN.1 DER encoded ECDSA signature as emitted by the key store
#[derive(Clone, PartialEq, Eq)]
pub struct DerSignature(Vec<u8>);

impl DerSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for DerSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerSignature({} bytes)", self.0.len())
    }
}

/// Fixed-width `r || s` signature, each half left-padded to 32 bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSignature([u8; RAW_SIGNATURE_LEN]);

impl RawSignature {
    pub fn new(bytes: [u8; RAW_SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RAW_SIGNATURE_LEN] {
        &self.0
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..SCALAR_LEN]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[SCALAR_LEN..]
    }
}

impl fmt::Debug for RawSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSignature(64 bytes)")
    }
}

/// Uncompressed SEC1 public key: `0x04 || X || Y`
///
/// Construction does not validate the tag byte; that is the decoder's job.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawPublicKey([u8; RAW_PUBLIC_KEY_LEN]);

impl RawPublicKey {
    pub fn new(bytes: [u8; RAW_PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RAW_PUBLIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for RawPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPublicKey({}..)", hex::encode(&self.0[..9]))
    }
}

/// Affine coordinates of a P-256 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeyCoords {
    pub x: [u8; SCALAR_LEN],
    pub y: [u8; SCALAR_LEN],
}

/// Output of a successful signing stage
#[derive(Debug, Clone)]
pub struct SignedMedia {
    pub digest: ImageDigest,
    pub signature: DerSignature,
    pub public_key: RawPublicKey,
}

/// Named input assignment handed to the proving circuit
///
/// Fields are private and only set at construction, so a built value is
/// immutable. Serializes to the circuit's input map:
/// `pub_key_x`, `pub_key_y`, `signature`, `data_hash`.
#[derive(Clone, PartialEq, Eq)]
pub struct CircuitInputs {
    pub_key_x: [u8; SCALAR_LEN],
    pub_key_y: [u8; SCALAR_LEN],
    signature: [u8; RAW_SIGNATURE_LEN],
    data_hash: [u8; DIGEST_LEN],
}

impl CircuitInputs {
    /// Assemble inputs from already fixed-width values
    pub fn from_parts(coords: &PublicKeyCoords, signature: &RawSignature, digest: &ImageDigest) -> Self {
        Self {
            pub_key_x: coords.x,
            pub_key_y: coords.y,
            signature: *signature.as_bytes(),
            data_hash: *digest.as_bytes(),
        }
    }

    /// Assemble inputs from byte slices, checking each declared width
    pub fn try_from_slices(x: &[u8], y: &[u8], signature: &[u8], digest: &[u8]) -> AttestResult<Self> {
        Ok(Self {
            pub_key_x: fixed::<SCALAR_LEN>("pub_key_x", x)?,
            pub_key_y: fixed::<SCALAR_LEN>("pub_key_y", y)?,
            signature: fixed::<RAW_SIGNATURE_LEN>("signature", signature)?,
            data_hash: fixed::<DIGEST_LEN>("data_hash", digest)?,
        })
    }

    pub fn pub_key_x(&self) -> &[u8; SCALAR_LEN] {
        &self.pub_key_x
    }

    pub fn pub_key_y(&self) -> &[u8; SCALAR_LEN] {
        &self.pub_key_y
    }

    pub fn signature(&self) -> &[u8; RAW_SIGNATURE_LEN] {
        &self.signature
    }

    pub fn data_hash(&self) -> &[u8; DIGEST_LEN] {
        &self.data_hash
    }

    /// Render the input map as JSON, the format external provers accept
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> AttestResult<[u8; N]> {
    bytes.try_into().map_err(|_| AttestError::InvalidInputShape {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

impl Serialize for CircuitInputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("pub_key_x", &self.pub_key_x[..])?;
        map.serialize_entry("pub_key_y", &self.pub_key_y[..])?;
        map.serialize_entry("signature", &self.signature[..])?;
        map.serialize_entry("data_hash", &self.data_hash[..])?;
        map.end()
    }
}

impl fmt::Debug for CircuitInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitInputs")
            .field("pub_key_x", &hex::encode(&self.pub_key_x[..4]))
            .field("pub_key_y", &hex::encode(&self.pub_key_y[..4]))
            .finish_non_exhaustive()
    }
}

/// Opaque proof blob produced by the proving backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(Vec<u8>);

impl Proof {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proof({} bytes)", self.0.len())
    }
}
