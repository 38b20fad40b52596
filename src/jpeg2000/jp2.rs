//! JP2 box structure (ISO/IEC 15444-1 Annex I), just enough to locate the
//! contiguous codestream box.

use crate::constants::JP2_SIGNATURE;
use crate::error::J2kError;

pub struct Jp2Box {
    pub length: u64,
    pub box_type: [u8; 4],
    pub data_range: std::ops::Range<usize>,
}

pub struct Jp2Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Jp2Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Returns the payload of the first `jp2c` box, or `None` when the data
    /// is not a JP2 file or holds no codestream.
    pub fn find_codestream(&mut self) -> Result<Option<&'a [u8]>, J2kError> {
        if !self.data.starts_with(&JP2_SIGNATURE) {
            return Ok(None);
        }
        self.position = 0;
        while let Some(b) = self.read_box()? {
            if b.box_type == *b"jp2c" {
                return Ok(Some(&self.data[b.data_range]));
            }
        }
        Ok(None)
    }

    pub fn read_box(&mut self) -> Result<Option<Jp2Box>, J2kError> {
        let start = self.position;
        let Some(header) = self.data.get(start..start + 8) else {
            return Ok(None);
        };
        let mut length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let box_type = [header[4], header[5], header[6], header[7]];
        let mut header_size = 8;

        if length == 1 {
            let extended = self
                .data
                .get(start + 8..start + 16)
                .ok_or(J2kError::UnexpectedEndOfData { offset: start + 8 })?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(extended);
            length = u64::from_be_bytes(bytes);
            header_size = 16;
        } else if length == 0 {
            length = (self.data.len() - start) as u64;
        }

        let end = start as u64 + length;
        if length < header_size as u64 || end > self.data.len() as u64 {
            return Err(J2kError::UnexpectedEndOfData {
                offset: self.data.len(),
            });
        }
        self.position = end as usize;

        Ok(Some(Jp2Box {
            length,
            box_type,
            data_range: start + header_size..end as usize,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jp2_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(box_type);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_find_codestream() {
        let mut file = JP2_SIGNATURE.to_vec();
        file.extend(jp2_box(b"ftyp", b"jp2 \0\0\0\0jp2 "));
        file.extend(jp2_box(b"jp2h", &[0; 12]));
        file.extend(jp2_box(b"jp2c", &[0xFF, 0x4F, 0xFF, 0x51]));
        let codestream = Jp2Reader::new(&file).find_codestream().unwrap();
        assert_eq!(codestream, Some(&[0xFF, 0x4F, 0xFF, 0x51][..]));
    }

    #[test]
    fn test_box_running_to_end_of_file() {
        let mut file = JP2_SIGNATURE.to_vec();
        file.extend_from_slice(&[0, 0, 0, 0]);
        file.extend_from_slice(b"jp2c");
        file.extend_from_slice(&[1, 2, 3]);
        let codestream = Jp2Reader::new(&file).find_codestream().unwrap();
        assert_eq!(codestream, Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_not_jp2_and_truncated_box() {
        assert_eq!(Jp2Reader::new(&[0xFF, 0x4F]).find_codestream(), Ok(None));
        let mut file = JP2_SIGNATURE.to_vec();
        file.extend_from_slice(&[0, 0, 0, 64]);
        file.extend_from_slice(b"jp2c");
        assert!(Jp2Reader::new(&file).find_codestream().is_err());
    }
}
