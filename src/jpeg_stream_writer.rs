//! Codestream writer utilities.
//!
//! `JpegStreamWriter` owns a growable buffer and emits big-endian values and
//! markers. Tile-part lengths are back-patched once the tile data is known.

use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};

#[derive(Debug, Default)]
pub struct JpegStreamWriter {
    destination: Vec<u8>,
}

impl JpegStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            destination: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.destination.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destination.is_empty()
    }

    pub fn write_byte(&mut self, value: u8) {
        self.destination.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.destination.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.destination.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.destination.extend_from_slice(bytes);
    }

    pub fn write_marker(&mut self, marker: JpegMarkerCode) {
        self.write_byte(JPEG_MARKER_START_BYTE);
        self.write_byte(marker.into());
    }

    /// Overwrites four bytes at `position` with `value`. Returns false when the
    /// position lies outside the data written so far.
    pub fn patch_u32(&mut self, position: usize, value: u32) -> bool {
        match self.destination.get_mut(position..position + 4) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_be_bytes());
                true
            }
            None => false,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_patch() {
        let mut writer = JpegStreamWriter::new();
        writer.write_marker(JpegMarkerCode::StartOfCodestream);
        writer.write_u16(0x0102);
        writer.write_u32(0);
        assert!(writer.patch_u32(4, 0xAABBCCDD));
        assert!(!writer.patch_u32(6, 1));
        assert_eq!(
            writer.into_inner(),
            vec![0xFF, 0x4F, 0x01, 0x02, 0xAA, 0xBB, 0xCC, 0xDD]
        );
    }
}
