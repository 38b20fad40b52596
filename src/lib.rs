//! JPEG 2000 Part 1 codec: wavelet transforms, scalar quantization, the MQ
//! coder, EBCOT tier-1 block coding and tier-2 packets.
//!
//! ```no_run
//! let samples = vec![128u8; 64 * 64];
//! let codestream = jpegexp_j2k::encode(&samples, 64, 64, 90, true, 3).unwrap();
//! let image = jpegexp_j2k::decode(&codestream).unwrap();
//! assert_eq!(image.pixels.len(), 64 * 64);
//! ```

pub mod coding_parameters;
pub mod constants;
pub mod error;
pub mod jpeg2000;
pub mod jpeg_marker_code;
pub mod jpeg_stream_reader;
pub mod jpeg_stream_writer;

pub use coding_parameters::{CodingParameters, QuantizationParameters, QuantizationStyle};
pub use error::J2kError;
pub use jpeg2000::decoder::J2kDecoder;
pub use jpeg2000::dwt::WaveletKind;
pub use jpeg2000::encoder::J2kEncoder;
pub use jpeg2000::progression::ProgressionOrder;

use constants::JP2_SIGNATURE;
use jpeg2000::jp2::Jp2Reader;
use jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};

/// Layout of the samples handed to the encoder: interleaved, one byte per
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u8,
    pub component_count: u32,
}

/// Decoded image as interleaved 8-bit samples on the image grid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub component_count: u32,
    pub bits_per_sample: u8,
}

/// Encodes a single-component 8-bit image. With `lossy` unset the 5/3
/// path is used and `quality` has no effect.
pub fn encode(
    samples: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    lossy: bool,
    levels: u8,
) -> Result<Vec<u8>, J2kError> {
    let mut encoder = J2kEncoder::new();
    encoder.set_quality(quality);
    encoder.set_lossy(lossy);
    encoder.set_decomposition_levels(levels);
    let frame_info = FrameInfo {
        width,
        height,
        bits_per_sample: 8,
        component_count: 1,
    };
    encoder.encode(samples, &frame_info)
}

/// Decodes a raw codestream or a JP2 file.
pub fn decode(data: &[u8]) -> Result<DecodedImage, J2kError> {
    let codestream = if is_jp2_file(data) {
        Jp2Reader::new(data)
            .find_codestream()?
            .ok_or(J2kError::StartOfCodestreamNotFound)?
    } else {
        data
    };
    J2kDecoder::new().decode(codestream)
}

/// True when `data` starts with the SOC marker.
pub fn is_jpeg2000_codestream(data: &[u8]) -> bool {
    data.starts_with(&[JPEG_MARKER_START_BYTE, JpegMarkerCode::StartOfCodestream as u8])
}

/// True when `data` starts with the JP2 signature box.
pub fn is_jp2_file(data: &[u8]) -> bool {
    data.starts_with(&JP2_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_detection() {
        assert!(is_jpeg2000_codestream(&[0xFF, 0x4F, 0xFF, 0x51]));
        assert!(!is_jpeg2000_codestream(&[0xFF, 0xD8]));
        assert!(!is_jpeg2000_codestream(&[0xFF]));
        assert!(!is_jpeg2000_codestream(&[0u8; 16]));
        assert!(!is_jpeg2000_codestream(&[]));
        assert!(is_jp2_file(&JP2_SIGNATURE));
        assert!(!is_jp2_file(&JP2_SIGNATURE[..11]));
        assert!(!is_jp2_file(&[0xFF, 0x4F]));
        assert!(!is_jp2_file(&[0u8; 16]));
    }
}
