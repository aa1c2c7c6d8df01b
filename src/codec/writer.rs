use super::{max_for_width, widths};
use crate::crypto::Hash;

/// Accumulates fixed-width hex fields
#[derive(Debug, Default)]
pub struct Writer {
    out: String,
}

impl Writer {
    pub fn new() -> Self {
        Self { out: String::new() }
    }

    /// Write `value` as exactly `width` lowercase hex characters.
    ///
    /// Bits above the field width are dropped.
    pub fn put_uint(&mut self, value: u64, width: usize) {
        let masked = value & max_for_width(width);
        self.out.push_str(&format!("{masked:0width$x}"));
    }

    pub fn put_u8(&mut self, value: u8) {
        self.put_uint(value as u64, 2);
    }

    pub fn put_count(&mut self, count: usize) {
        self.put_uint(count as u64, widths::COUNT);
    }

    pub fn put_hash(&mut self, hash: &Hash) {
        self.out.push_str(&hash.to_hex());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.out.push_str(&hex::encode(bytes));
    }

    /// Length-prefixed ASCII text
    pub fn put_text(&mut self, text: &str) {
        self.put_uint(text.len() as u64, widths::ADDRESS_LEN);
        self.out.push_str(text);
    }

    pub fn finish(self) -> String {
        self.out
    }
}
