//! Wire codec
//!
//! Every entity is encoded as an ASCII string of fixed-width, lowercase,
//! zero-padded hexadecimal fields. Each blob starts with a one-byte type tag
//! and a one-byte version (two hex characters each). Variable-length lists
//! are prefixed by a fixed-width count.
//!
//! Decoding is total: any malformed input yields a [`FormatError`], never a
//! panic. The [`Reader`] refuses non-ASCII input up front so that every
//! subsequent slice lands on a character boundary.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use thiserror::Error;

/// Entity type tags
pub mod tags {
    pub const OUTPUT: u8 = 0x01;
    pub const INPUT: u8 = 0x02;
    pub const TRANSACTION: u8 = 0x03;
    pub const MINING_TRANSACTION: u8 = 0x04;
    pub const HEADER: u8 = 0x05;
    pub const BLOCK: u8 = 0x06;
}

/// Current encoding version written by this node
pub const CURRENT_VERSION: u8 = 0x01;

/// Versions this node can decode
pub const ACCEPTED_VERSIONS: &[u8] = &[0x01];

/// Field widths in hex characters
pub mod widths {
    pub const TAG: usize = 2;
    pub const VERSION: usize = 2;
    pub const HASH: usize = 64;
    pub const AMOUNT: usize = 16;
    pub const HEIGHT: usize = 16;
    pub const OUTPUT_INDEX: usize = 8;
    pub const COUNT: usize = 4;
    pub const NONCE: usize = 6;
    pub const TIMESTAMP: usize = 8;
    pub const TARGET_COEFFICIENT: usize = 6;
    pub const TARGET_EXPONENT: usize = 2;
    pub const ADDRESS_LEN: usize = 2;
    pub const PUBLIC_KEY: usize = 66;
    pub const SCALAR: usize = 64;
}

/// Largest value a field of `width` hex characters can hold
pub const fn max_for_width(width: usize) -> u64 {
    if width >= 16 {
        u64::MAX
    } else {
        (1u64 << (4 * width)) - 1
    }
}

/// Decoding failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Input is not ASCII")]
    NonAscii,
    #[error("Unexpected end of input at offset {offset}: needed {needed} more characters")]
    Truncated { offset: usize, needed: usize },
    #[error("Invalid hex field at offset {offset}")]
    InvalidHex { offset: usize },
    #[error("Wrong type tag: expected {expected:#04x}, found {found:#04x}")]
    WrongTag { expected: u8, found: u8 },
    #[error("Unsupported version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("Value {value} out of range for {field}")]
    OutOfRange { field: &'static str, value: u64 },
    #[error("{0} trailing characters after entity")]
    TrailingData(usize),
    #[error("Merkle root does not match the block's transactions")]
    MerkleMismatch,
}

/// Fixed-width hex encoding for one entity type
pub trait WireFormat: Sized {
    /// Type tag written before the version byte
    const TAG: u8;

    /// Write the fields after the tag/version prefix
    fn write_body(&self, w: &mut Writer);

    /// Read the fields after the tag/version prefix
    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError>;

    /// Write tag, version and body
    fn write_to(&self, w: &mut Writer) {
        w.put_u8(Self::TAG);
        w.put_u8(CURRENT_VERSION);
        self.write_body(w);
    }

    /// Read and check tag and version, then the body
    fn read_from(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        r.expect_prefix(Self::TAG)?;
        Self::read_body(r)
    }

    /// Canonical hex encoding
    fn encode(&self) -> String {
        let mut w = Writer::new();
        self.write_to(&mut w);
        w.finish()
    }

    /// Decode a complete blob; trailing characters are an error
    fn decode(input: &str) -> Result<Self, FormatError> {
        let mut r = Reader::new(input)?;
        let value = Self::read_from(&mut r)?;
        r.finish()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_for_width() {
        assert_eq!(max_for_width(widths::NONCE), 0xff_ffff);
        assert_eq!(max_for_width(widths::TIMESTAMP), u32::MAX as u64);
        assert_eq!(max_for_width(widths::AMOUNT), u64::MAX);
    }
}
