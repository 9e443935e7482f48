//! Variable code width LZW as used by GIF.
//!
//! Codes are packed least significant bit first. Code widths start at `min_code_size + 1`
//! and grow up to 12 bits; the clear code (`1 << min_code_size`) resets the table and the
//! code after it (`clear + 1`) ends the data.
//!
//! The [`compress`] and [`decompress`] functions work on raw, unframed code streams. The
//! image encoder and decoder drive the same state machines through sub-block framing.

mod bits;
mod decode;
mod encode;
mod table;

use alloc::vec::Vec;
use core::convert::Infallible;

pub(crate) use self::bits::{BitReader, BitWriter};
pub(crate) use self::decode::LzwDecoder;
pub(crate) use self::encode::LzwEncoder;

use crate::reader::{DecodeWarning, DecodingError, DecodingFormatError};

/// Widest code GIF allows.
pub const MAX_CODE_SIZE: u8 = 12;
/// Number of codes addressable with [`MAX_CODE_SIZE`] bits.
pub const MAX_ENTRIES: usize = 1 << MAX_CODE_SIZE;

/// A source of single bytes for the bit reader.
pub(crate) trait ByteSource {
    /// The next byte, or `None` when the data is exhausted.
    fn next_byte(&mut self) -> Result<Option<u8>, DecodingError>;
}

impl ByteSource for &[u8] {
    #[inline]
    fn next_byte(&mut self) -> Result<Option<u8>, DecodingError> {
        Ok(self.split_first().map(|(&b, rest)| {
            *self = rest;
            b
        }))
    }
}

/// A destination for the bytes produced by the bit writer.
pub(crate) trait ByteSink {
    type Error;

    fn put_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
}

impl ByteSink for Vec<u8> {
    type Error = Infallible;

    #[inline]
    fn put_byte(&mut self, byte: u8) -> Result<(), Infallible> {
        self.push(byte);
        Ok(())
    }
}

/// The minimum code size the decoder uses for a given code size byte.
///
/// Sizes outside `1..=8` are rejected. A size of 1 leaves no room for the clear and end
/// codes next to the literals and is widened to 2.
pub(crate) fn effective_min_code_size(byte: u8) -> Result<u8, DecodingFormatError> {
    match byte {
        1 => Ok(2),
        2..=8 => Ok(byte),
        _ => Err(DecodingFormatError::InvalidCodeSize(byte)),
    }
}

/// Compresses `data` into a raw LZW code stream.
///
/// Every byte of `data` must be below `1 << min_code_size`. `min_code_size` is clamped to
/// `2..=8`.
#[must_use]
pub fn compress(data: &[u8], min_code_size: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 4);
    match compress_into(data, min_code_size.clamp(2, 8), &mut out) {
        Ok(()) => out,
        Err(never) => match never {},
    }
}

fn compress_into(data: &[u8], min_code_size: u8, out: &mut Vec<u8>) -> Result<(), Infallible> {
    let mut encoder = LzwEncoder::new(min_code_size);
    let mut bits = BitWriter::new(out);
    encoder.start(&mut bits)?;
    encoder.push_all(data, &mut bits)?;
    encoder.finish(&mut bits)?;
    bits.flush()
}

/// Result of [`decompress`].
#[derive(Debug, Default)]
pub struct Decompressed {
    /// The expanded bytes.
    pub data: Vec<u8>,
    /// Recoverable irregularities met on the way.
    pub warnings: Vec<DecodeWarning>,
}

/// Expands a raw LZW code stream produced with `min_code_size`.
///
/// Decoding stops at the end code or when the input runs out.
pub fn decompress(mut data: &[u8], min_code_size: u8) -> Result<Decompressed, DecodingError> {
    let min_code_size = effective_min_code_size(min_code_size)?;
    let mut decoder = LzwDecoder::new(min_code_size);
    let mut bits = BitReader::new(&mut data);
    let mut out = Decompressed::default();
    while let Some(run) = decoder.next_run(&mut bits)? {
        out.data.extend_from_slice(run);
    }
    out.warnings = decoder.take_warnings();
    Ok(out)
}

#[test]
fn code_size_validation() {
    assert_eq!(effective_min_code_size(1), Ok(2));
    assert_eq!(effective_min_code_size(8), Ok(8));
    assert_eq!(
        effective_min_code_size(0),
        Err(DecodingFormatError::InvalidCodeSize(0))
    );
    assert_eq!(
        effective_min_code_size(9),
        Err(DecodingFormatError::InvalidCodeSize(9))
    );
}
