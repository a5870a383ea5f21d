//! Canonical media encoding and digest computation
//!
//! Encoded image formats are not a stable thing to hash: re-encoding the
//! same picture twice can produce different bytes. The default encoding
//! therefore decodes the image and hashes its pixels behind a small
//! header, which is reproducible for a given logical image.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use ventus_core::{AttestError, AttestResult, DigestAlgorithm, ImageDigest, MediaEncoding};

/// Domain separator prefixed to decoded pixel buffers
const PIXEL_DOMAIN: &[u8] = b"ventus-rgba8";

/// Computes [`ImageDigest`]s from media bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaDigester {
    encoding: MediaEncoding,
    algorithm: DigestAlgorithm,
}

impl MediaDigester {
    pub fn new(encoding: MediaEncoding, algorithm: DigestAlgorithm) -> Self {
        Self { encoding, algorithm }
    }

    pub fn encoding(&self) -> MediaEncoding {
        self.encoding
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hash the canonical encoding of `media`
    pub fn digest(&self, media: &[u8]) -> AttestResult<ImageDigest> {
        if media.is_empty() {
            return Err(AttestError::Media("media is empty".to_string()));
        }

        match self.algorithm {
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                match self.encoding {
                    MediaEncoding::Verbatim => hasher.update(media),
                    MediaEncoding::DecodedPixels => hash_pixels(&mut hasher, media)?,
                }
                Ok(ImageDigest::new(hasher.finalize().into()))
            }
        }
    }
}

fn hash_pixels(hasher: &mut Sha256, media: &[u8]) -> AttestResult<()> {
    let decoded =
        image::load_from_memory(media).map_err(|e| AttestError::Media(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    hasher.update(PIXEL_DOMAIN);
    hasher.update(width.to_be_bytes());
    hasher.update(height.to_be_bytes());

    let mut pixels = rgba.into_raw();
    hasher.update(&pixels);
    pixels.zeroize();
    Ok(())
}
