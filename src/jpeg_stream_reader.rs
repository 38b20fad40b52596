//! Byte-level cursor over a JPEG 2000 codestream.
//!
//! Marker segments are big-endian; every read is bounds checked and reports
//! the offset at which the data ran out.

use crate::error::J2kError;
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};

pub struct JpegStreamReader<'a> {
    source: &'a [u8],
    position: usize,
}

impl<'a> JpegStreamReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        &self.source[self.position.min(self.source.len())..]
    }

    pub fn seek(&mut self, position: usize) -> Result<(), J2kError> {
        if position > self.source.len() {
            return Err(J2kError::UnexpectedEndOfData { offset: position });
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), J2kError> {
        self.seek(self.position + count)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.source.get(self.position).copied()
    }

    pub fn peek_u16(&self) -> Option<u16> {
        let bytes = self.source.get(self.position..self.position + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u8(&mut self) -> Result<u8, J2kError> {
        let value = self
            .peek_u8()
            .ok_or(J2kError::UnexpectedEndOfData {
                offset: self.position,
            })?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, J2kError> {
        let value = self.peek_u16().ok_or(J2kError::UnexpectedEndOfData {
            offset: self.position,
        })?;
        self.position += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32, J2kError> {
        let high = self.read_u16()? as u32;
        let low = self.read_u16()? as u32;
        Ok((high << 16) | low)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], J2kError> {
        let end = self.position + count;
        let bytes = self
            .source
            .get(self.position..end)
            .ok_or(J2kError::UnexpectedEndOfData { offset: end })?;
        self.position = end;
        Ok(bytes)
    }

    /// Reads the two-byte marker at the cursor. Returns the raw second byte
    /// so callers can report markers this crate has no name for.
    pub fn read_marker_byte(&mut self) -> Result<u8, J2kError> {
        let offset = self.position;
        if self.read_u8()? != JPEG_MARKER_START_BYTE {
            return Err(J2kError::MarkerStartByteNotFound { offset });
        }
        self.read_u8()
    }

    pub fn read_marker(&mut self) -> Result<JpegMarkerCode, J2kError> {
        let offset = self.position;
        let code = self.read_marker_byte()?;
        JpegMarkerCode::try_from(code).map_err(|_| J2kError::UnknownMarker {
            marker: code,
            offset,
        })
    }

    /// Reads a segment length field and returns the payload length that
    /// follows it.
    pub fn read_segment_length(&mut self, marker: JpegMarkerCode) -> Result<usize, J2kError> {
        let offset = self.position;
        let length = self.read_u16()? as usize;
        if length < 2 || self.position + length - 2 > self.source.len() {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                offset,
            });
        }
        Ok(length - 2)
    }
}
