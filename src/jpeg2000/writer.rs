//! JPEG 2000 codestream writer: marker segments in main-header order.

use super::image::Frame;
use crate::coding_parameters::{CodingParameters, QuantizationParameters, QuantizationStyle};
use crate::constants::{SIZ_FIXED_LENGTH, SOT_SEGMENT_LENGTH};
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_writer::JpegStreamWriter;

#[derive(Debug, Default)]
pub struct J2kWriter {
    writer: JpegStreamWriter,
}

impl J2kWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn write_soc(&mut self) {
        self.writer.write_marker(JpegMarkerCode::StartOfCodestream);
    }

    pub fn write_eoc(&mut self) {
        self.writer.write_marker(JpegMarkerCode::EndOfCodestream);
    }

    pub fn write_siz(&mut self, frame: &Frame) {
        self.writer.write_marker(JpegMarkerCode::ImageAndTileSize);
        let count = frame.components.len() as u16;
        self.writer.write_u16(SIZ_FIXED_LENGTH + 3 * count);
        self.writer.write_u16(0); // Rsiz: Part 1 without restrictions
        self.writer.write_u32(frame.width);
        self.writer.write_u32(frame.height);
        self.writer.write_u32(frame.x_origin);
        self.writer.write_u32(frame.y_origin);
        self.writer.write_u32(frame.tile_width);
        self.writer.write_u32(frame.tile_height);
        self.writer.write_u32(frame.tile_x_origin);
        self.writer.write_u32(frame.tile_y_origin);
        self.writer.write_u16(count);
        for component in &frame.components {
            self.writer
                .write_byte((component.precision - 1) | if component.is_signed { 0x80 } else { 0 });
            self.writer.write_byte(component.dx);
            self.writer.write_byte(component.dy);
        }
    }

    pub fn write_cod(&mut self, coding: &CodingParameters) {
        self.writer.write_marker(JpegMarkerCode::CodingStyleDefault);
        self.writer.write_u16(12);
        self.writer.write_byte(coding.style_flags());
        self.writer.write_byte(coding.progression_order.into());
        self.writer.write_u16(coding.layer_count);
        self.writer.write_byte(coding.use_mct as u8);
        self.writer.write_byte(coding.decomposition_levels);
        self.writer.write_byte(coding.codeblock_width_exponent - 2);
        self.writer.write_byte(coding.codeblock_height_exponent - 2);
        self.writer.write_byte(0); // code-block style: all options off
        self.writer.write_byte(coding.wavelet.into());
    }

    pub fn write_qcd(&mut self, quantization: &QuantizationParameters) {
        self.writer.write_marker(JpegMarkerCode::QuantizationDefault);
        let sqcd = quantization.guard_bits << 5 | quantization.style.code();
        match quantization.style {
            QuantizationStyle::NoQuantization => {
                self.writer.write_u16(3 + quantization.steps.len() as u16);
                self.writer.write_byte(sqcd);
                for step in &quantization.steps {
                    self.writer.write_byte(step.exponent << 3);
                }
            }
            QuantizationStyle::ScalarDerived | QuantizationStyle::ScalarExpounded => {
                self.writer.write_u16(3 + 2 * quantization.steps.len() as u16);
                self.writer.write_byte(sqcd);
                for step in &quantization.steps {
                    self.writer.write_u16(step.to_u16());
                }
            }
        }
    }

    /// COM segment with Latin-1 text (Rcom = 1).
    pub fn write_comment(&mut self, text: &[u8]) {
        self.writer.write_marker(JpegMarkerCode::Comment);
        self.writer.write_u16(4 + text.len() as u16);
        self.writer.write_u16(1);
        self.writer.write_bytes(text);
    }

    /// Writes SOT, SOD and the packet data of one tile-part; Psot is patched
    /// once the body length is known.
    pub fn write_tile_part(&mut self, tile_index: u16, body: &[u8]) {
        let start = self.writer.len();
        self.writer.write_marker(JpegMarkerCode::StartOfTile);
        self.writer.write_u16(SOT_SEGMENT_LENGTH);
        self.writer.write_u16(tile_index);
        let psot_position = self.writer.len();
        self.writer.write_u32(0);
        self.writer.write_byte(0); // TPsot
        self.writer.write_byte(1); // TNsot
        self.writer.write_marker(JpegMarkerCode::StartOfData);
        self.writer.write_bytes(body);
        let length = (self.writer.len() - start) as u32;
        let patched = self.writer.patch_u32(psot_position, length);
        debug_assert!(patched);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::dwt::WaveletKind;
    use crate::jpeg2000::image::ComponentInfo;
    use crate::jpeg2000::parser::parse;
    use crate::jpeg2000::progression::ProgressionOrder;
    use crate::jpeg2000::quantization::StepSize;

    #[test]
    fn test_header_roundtrip_through_parser() {
        let frame = Frame::new(33, 17, 16, 16, vec![ComponentInfo::default(); 3]);
        let coding = CodingParameters {
            decomposition_levels: 2,
            layer_count: 3,
            progression_order: ProgressionOrder::Rpcl,
            codeblock_width_exponent: 5,
            codeblock_height_exponent: 4,
            use_sop: true,
            use_eph: false,
            wavelet: WaveletKind::Irreversible97,
            use_mct: true,
        };
        let quantization = QuantizationParameters {
            style: QuantizationStyle::ScalarExpounded,
            guard_bits: 3,
            steps: (0..7)
                .map(|i| StepSize {
                    exponent: 8 + i,
                    mantissa: 100 * i as u16,
                })
                .collect(),
        };

        let mut writer = J2kWriter::new();
        writer.write_soc();
        writer.write_siz(&frame);
        writer.write_cod(&coding);
        writer.write_qcd(&quantization);
        writer.write_comment(b"jpegexp-j2k");
        for tile in 0..frame.tile_count() as u16 {
            writer.write_tile_part(tile, &[tile as u8; 3]);
        }
        writer.write_eoc();

        let codestream = parse(&writer.into_inner()).unwrap();
        assert_eq!(codestream.frame, frame);
        assert_eq!(codestream.coding, coding);
        assert_eq!(codestream.quantization, quantization);
        assert_eq!(codestream.comments, vec![b"jpegexp-j2k".to_vec()]);
        assert_eq!(codestream.tiles.len(), 6);
        assert_eq!(codestream.tiles[5].data, vec![5, 5, 5]);
    }

    #[test]
    fn test_tile_part_length() {
        let mut writer = J2kWriter::new();
        writer.write_tile_part(0, &[0xAA; 5]);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 12 + 2 + 5);
        assert_eq!(&bytes[6..10], &(bytes.len() as u32).to_be_bytes());
    }
}
