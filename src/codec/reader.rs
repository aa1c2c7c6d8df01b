use super::{widths, FormatError, ACCEPTED_VERSIONS};
use crate::crypto::Hash;

/// Cursor over an ASCII hex blob
#[derive(Debug)]
pub struct Reader<'a> {
    input: &'a str,
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Wrap `input`, refusing anything that is not pure ASCII
    pub fn new(input: &'a str) -> Result<Self, FormatError> {
        if !input.is_ascii() {
            return Err(FormatError::NonAscii);
        }
        Ok(Self { input, offset: 0 })
    }

    /// Characters consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a str, FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.input[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn take_hex(&mut self, n: usize) -> Result<&'a str, FormatError> {
        let offset = self.offset;
        let field = self.take(n)?;
        if !field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(FormatError::InvalidHex { offset });
        }
        Ok(field)
    }

    /// Read an unsigned field of `width` hex characters (at most 16)
    pub fn uint(&mut self, width: usize) -> Result<u64, FormatError> {
        debug_assert!(width <= 16);
        let offset = self.offset;
        let field = self.take_hex(width)?;
        u64::from_str_radix(field, 16).map_err(|_| FormatError::InvalidHex { offset })
    }

    pub fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.uint(2)? as u8)
    }

    pub fn u32(&mut self, width: usize, field: &'static str) -> Result<u32, FormatError> {
        let value = self.uint(width)?;
        u32::try_from(value).map_err(|_| FormatError::OutOfRange { field, value })
    }

    pub fn count(&mut self) -> Result<usize, FormatError> {
        Ok(self.uint(widths::COUNT)? as usize)
    }

    pub fn hash(&mut self) -> Result<Hash, FormatError> {
        let offset = self.offset;
        let field = self.take_hex(widths::HASH)?;
        Hash::from_hex(field).map_err(|_| FormatError::InvalidHex { offset })
    }

    /// Read `N` raw bytes written as `2 * N` hex characters
    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let offset = self.offset;
        let field = self.take_hex(2 * N)?;
        let mut out = [0u8; N];
        hex::decode_to_slice(field, &mut out).map_err(|_| FormatError::InvalidHex { offset })?;
        Ok(out)
    }

    /// Length-prefixed ASCII text
    pub fn text(&mut self) -> Result<String, FormatError> {
        let len = self.uint(widths::ADDRESS_LEN)? as usize;
        Ok(self.take(len)?.to_string())
    }

    /// Check the tag and version prefix of an entity
    pub fn expect_prefix(&mut self, tag: u8) -> Result<(), FormatError> {
        let found = self.u8()?;
        if found != tag {
            return Err(FormatError::WrongTag { expected: tag, found });
        }
        let version = self.u8()?;
        if !ACCEPTED_VERSIONS.contains(&version) {
            return Err(FormatError::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// Require that the whole input was consumed
    pub fn finish(&self) -> Result<(), FormatError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FormatError::TrailingData(n)),
        }
    }
}
