//! Raw bit I/O for packet headers (ISO/IEC 15444-1, B.10.1).
//!
//! Bits are packed MSB first. Whenever a byte equal to 0xFF is produced, the
//! following byte carries only seven bits and its most significant bit is a
//! stuffed zero, so no marker code can appear inside a packet header.

use crate::error::J2kError;

pub struct J2kBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u8,
    bits_left: u8,
    last_byte: u8,
    base_offset: usize,
}

impl<'a> J2kBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    /// `base_offset` is added to positions reported in errors.
    pub fn with_offset(data: &'a [u8], base_offset: usize) -> Self {
        Self {
            data,
            pos: 0,
            bit_buffer: 0,
            bits_left: 0,
            last_byte: 0,
            base_offset,
        }
    }

    pub fn read_bit(&mut self) -> Result<u8, J2kError> {
        if self.bits_left == 0 {
            let b = *self
                .data
                .get(self.pos)
                .ok_or(J2kError::TruncatedPacketHeader {
                    offset: self.base_offset + self.pos,
                })?;
            self.pos += 1;
            self.bits_left = if self.last_byte == 0xFF { 7 } else { 8 };
            self.bit_buffer = b;
            self.last_byte = b;
        }

        let bit = (self.bit_buffer >> (self.bits_left - 1)) & 1;
        self.bits_left -= 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32, J2kError> {
        debug_assert!(count <= 32);
        let mut bits = 0u32;
        for _ in 0..count {
            bits = (bits << 1) | self.read_bit()? as u32;
        }
        Ok(bits)
    }

    /// Drops the remaining bits of the current byte and, if that byte was
    /// 0xFF, the stuffed byte that follows it. Returns the byte position of the
    /// first byte after the header.
    pub fn align(&mut self) -> usize {
        self.bits_left = 0;
        if self.last_byte == 0xFF && self.pos < self.data.len() {
            self.pos += 1;
            self.last_byte = 0;
        }
        self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

#[derive(Debug)]
pub struct J2kBitWriter {
    data: Vec<u8>,
    bit_buffer: u8,
    bits_count: u8,
    byte_capacity: u8,
}

impl Default for J2kBitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl J2kBitWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_buffer: 0,
            bits_count: 0,
            byte_capacity: 8,
        }
    }

    pub fn write_bit(&mut self, bit: u8) {
        self.bit_buffer = (self.bit_buffer << 1) | (bit & 1);
        self.bits_count += 1;
        if self.bits_count == self.byte_capacity {
            self.flush_byte();
        }
    }

    /// Writes the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.write_bit(((value >> i) & 1) as u8);
        }
    }

    fn flush_byte(&mut self) {
        let b = self.bit_buffer;
        self.data.push(b);
        self.byte_capacity = if b == 0xFF { 7 } else { 8 };
        self.bit_buffer = 0;
        self.bits_count = 0;
    }

    /// Pads the last byte with zeros. A trailing 0xFF is followed by a zero
    /// byte so the reader's `align` stays in step.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bits_count > 0 {
            self.bit_buffer <<= self.byte_capacity - self.bits_count;
            self.flush_byte();
        }
        if self.data.last() == Some(&0xFF) {
            self.data.push(0x00);
        }
        self.data
    }
}
