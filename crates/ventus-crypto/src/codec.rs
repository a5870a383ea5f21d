//! Decoders from platform key/signature encodings to circuit widths
//!
//! Both decoders are pure and total: any byte input, however truncated or
//! hostile, yields either a value or a [`CodecError`]. No index is taken
//! without a bounds check first.

use ventus_core::{
    CodecError, PublicKeyCoords, RAW_PUBLIC_KEY_LEN, RAW_SIGNATURE_LEN, RawSignature, SCALAR_LEN,
    UNCOMPRESSED_POINT_TAG,
};

/// ASN.1 SEQUENCE tag
const TAG_SEQUENCE: u8 = 0x30;

/// ASN.1 INTEGER tag
const TAG_INTEGER: u8 = 0x02;

/// Shortest DER input worth parsing: two one-byte integers plus headers
pub const MIN_DER_SIGNATURE_LEN: usize = 8;

/// Longest long-form length prefix accepted (two bytes covers 64 KiB)
const MAX_LENGTH_OCTETS: usize = 2;

/// Bounds-checked forward reader over a byte slice
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn byte(&mut self, what: &'static str) -> Result<u8, CodecError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(CodecError::MalformedSignature(what))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::MalformedSignature(what));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a DER length in short or long form
    fn length(&mut self) -> Result<usize, CodecError> {
        let first = self.byte("truncated length field")?;
        if first < 0x80 {
            return Ok(usize::from(first));
        }

        let octets = usize::from(first & 0x7f);
        if octets == 0 {
            return Err(CodecError::MalformedSignature("indefinite length"));
        }
        if octets > MAX_LENGTH_OCTETS {
            return Err(CodecError::MalformedSignature("length field too wide"));
        }

        let mut len = 0usize;
        for _ in 0..octets {
            len = (len << 8) | usize::from(self.byte("truncated length field")?);
        }
        Ok(len)
    }

    /// Read one INTEGER and return its content octets
    fn integer(&mut self) -> Result<&'a [u8], CodecError> {
        if self.byte("missing INTEGER")? != TAG_INTEGER {
            return Err(CodecError::MalformedSignature("expected INTEGER tag"));
        }
        let len = self.length()?;
        if len == 0 {
            return Err(CodecError::MalformedSignature("empty INTEGER"));
        }
        self.take(len, "INTEGER length exceeds input")
    }
}

/// Normalize a DER INTEGER body to exactly 32 big-endian bytes
fn scalar_to_fixed(int: &[u8]) -> Result<[u8; SCALAR_LEN], CodecError> {
    let int = match int {
        [0x00, rest @ ..] if int.len() == SCALAR_LEN + 1 => rest,
        _ => int,
    };
    if int.len() > SCALAR_LEN {
        return Err(CodecError::MalformedSignature("INTEGER wider than 32 bytes"));
    }
    if int.iter().all(|b| *b == 0) {
        return Err(CodecError::MalformedSignature("INTEGER is zero"));
    }

    let mut out = [0u8; SCALAR_LEN];
    out[SCALAR_LEN - int.len()..].copy_from_slice(int);
    Ok(out)
}

/// Convert a DER ECDSA signature into fixed-width `r || s`
///
/// Accepts `SEQUENCE { INTEGER r, INTEGER s }`. Each integer may carry a
/// single leading zero sign byte and is left-padded to 32 bytes. Trailing
/// bytes inside or after the sequence are rejected.
pub fn der_to_raw(der: &[u8]) -> Result<RawSignature, CodecError> {
    if der.len() < MIN_DER_SIGNATURE_LEN {
        return Err(CodecError::MalformedSignature("input shorter than 8 bytes"));
    }

    let mut outer = Reader::new(der);
    if outer.byte("empty input")? != TAG_SEQUENCE {
        return Err(CodecError::MalformedSignature("expected SEQUENCE tag"));
    }
    let seq_len = outer.length()?;
    let body = outer.take(seq_len, "SEQUENCE length exceeds input")?;
    if outer.remaining() != 0 {
        return Err(CodecError::MalformedSignature("trailing bytes after SEQUENCE"));
    }

    let mut inner = Reader::new(body);
    let r = scalar_to_fixed(inner.integer()?)?;
    let s = scalar_to_fixed(inner.integer()?)?;
    if inner.remaining() != 0 {
        return Err(CodecError::MalformedSignature("trailing bytes inside SEQUENCE"));
    }

    let mut raw = [0u8; RAW_SIGNATURE_LEN];
    raw[..SCALAR_LEN].copy_from_slice(&r);
    raw[SCALAR_LEN..].copy_from_slice(&s);
    Ok(RawSignature::new(raw))
}

/// Split an uncompressed SEC1 public key into its X and Y coordinates
///
/// Coordinates are returned byte-for-byte; the point is not checked to
/// be on the curve.
pub fn split_pubkey(raw: &[u8]) -> Result<PublicKeyCoords, CodecError> {
    if raw.len() != RAW_PUBLIC_KEY_LEN {
        return Err(CodecError::MalformedPublicKey("expected 65 bytes"));
    }
    if raw[0] != UNCOMPRESSED_POINT_TAG {
        return Err(CodecError::MalformedPublicKey("expected uncompressed point tag 0x04"));
    }

    let mut coords = PublicKeyCoords {
        x: [0u8; SCALAR_LEN],
        y: [0u8; SCALAR_LEN],
    };
    coords.x.copy_from_slice(&raw[1..1 + SCALAR_LEN]);
    coords.y.copy_from_slice(&raw[1 + SCALAR_LEN..]);
    Ok(coords)
}
