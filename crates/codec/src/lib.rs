//! Length-prefixed binary codec primitives for persistent records.
//!
//! Every stored record uses the same small vocabulary: fixed-width
//! little-endian integers, CompactSize varuints, and varuint-prefixed byte
//! strings. The helpers here operate on [`std::io::Read`]/[`std::io::Write`]
//! so record types can call them from hand-written borsh impls.
//!
//! Decoding enforces minimal varuint encodings, so a record re-encodes to the
//! exact bytes it was read from.

use std::io::{Read, Write};

use thiserror::Error;

/// Upper bound on a single decoded byte-string allocation.
///
/// Stored records are small (a UTXO set or a signature table), so anything
/// claiming a larger payload is a corrupt or hostile length prefix.
pub const MAX_DECODE_ALLOC: u64 = 1 << 22;

/// Errors raised while encoding or decoding record primitives.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended before the declared field was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A varuint used a wider form than its value requires.
    #[error("non-minimal varuint encoding for value {0}")]
    NonMinimal(u64),

    /// A length prefix exceeded [`MAX_DECODE_ALLOC`].
    #[error("declared length {0} exceeds decode allocation limit")]
    OversizedAllocation(u64),

    /// A string field held invalid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// Underlying reader or writer failure.
    #[error("io: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Io(e)
        }
    }
}

impl From<CodecError> for std::io::Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(inner) => inner,
            CodecError::UnexpectedEof => {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e.to_string())
            }
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

/// Writes `value` as a CompactSize varuint.
///
/// Values below `0xFD` are a single byte; larger values get a one-byte marker
/// followed by the little-endian u16/u32/u64 form.
pub fn write_varuint<W: Write>(w: &mut W, value: u64) -> Result<(), CodecError> {
    match value {
        0..=0xFC => w.write_all(&[value as u8])?,
        0xFD..=0xFFFF => {
            w.write_all(&[0xFD])?;
            w.write_all(&(value as u16).to_le_bytes())?;
        }
        0x1_0000..=0xFFFF_FFFF => {
            w.write_all(&[0xFE])?;
            w.write_all(&(value as u32).to_le_bytes())?;
        }
        _ => {
            w.write_all(&[0xFF])?;
            w.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Reads a CompactSize varuint, rejecting non-minimal encodings.
pub fn read_varuint<R: Read>(r: &mut R) -> Result<u64, CodecError> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    match tag[0] {
        n @ 0..=0xFC => Ok(n as u64),
        0xFD => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            let v = u16::from_le_bytes(buf) as u64;
            if v < 0xFD {
                return Err(CodecError::NonMinimal(v));
            }
            Ok(v)
        }
        0xFE => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            let v = u32::from_le_bytes(buf) as u64;
            if v <= 0xFFFF {
                return Err(CodecError::NonMinimal(v));
            }
            Ok(v)
        }
        0xFF => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            let v = u64::from_le_bytes(buf);
            if v <= 0xFFFF_FFFF {
                return Err(CodecError::NonMinimal(v));
            }
            Ok(v)
        }
    }
}

/// Returns the encoded size in bytes of `value` as a varuint.
pub fn varuint_len(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Writes a varuint length prefix followed by the payload.
pub fn write_var_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    write_varuint(w, bytes.len() as u64)?;
    w.write_all(bytes)?;
    Ok(())
}

/// Reads a varuint-prefixed byte string.
pub fn read_var_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>, CodecError> {
    let len = read_varuint(r)?;
    if len > MAX_DECODE_ALLOC {
        return Err(CodecError::OversizedAllocation(len));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes a string as varuint-prefixed UTF-8 bytes.
pub fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), CodecError> {
    write_var_bytes(w, s.as_bytes())
}

/// Reads a varuint-prefixed UTF-8 string.
pub fn read_string<R: Read>(r: &mut R) -> Result<String, CodecError> {
    let bytes = read_var_bytes(r)?;
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}
