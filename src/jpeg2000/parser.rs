//! JPEG 2000 codestream parser.
//!
//! Reads the main header (SOC, SIZ, COD, QCD and the informational segments
//! that can be skipped) and collects the tile-part bodies of every tile.

use super::dwt::WaveletKind;
use super::image::{ComponentInfo, Frame, subband_count};
use super::progression::ProgressionOrder;
use super::quantization::StepSize;
use crate::coding_parameters::{
    CodingParameters, QuantizationParameters, QuantizationStyle, validate_codeblock_exponents,
};
use crate::constants::{
    MAXIMUM_BITS_PER_SAMPLE, MAXIMUM_COMPONENT_COUNT, MAXIMUM_DECOMPOSITION_LEVELS, SIZ_FIXED_LENGTH,
    SOT_SEGMENT_LENGTH,
};
use crate::error::J2kError;
use crate::jpeg_marker_code::JpegMarkerCode;
use crate::jpeg_stream_reader::JpegStreamReader;
use log::{debug, warn};

/// Concatenated tile-part bodies of one tile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileBitstream {
    pub index: u16,
    /// Codestream offset of the first body byte.
    pub offset: usize,
    pub data: Vec<u8>,
    pub tile_parts: u8,
}

/// Everything the decoder needs from a codestream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Codestream {
    pub frame: Frame,
    pub coding: CodingParameters,
    pub quantization: QuantizationParameters,
    pub comments: Vec<Vec<u8>>,
    pub tiles: Vec<TileBitstream>,
}

/// A parser that transforms raw marker segments into a [`Codestream`].
pub struct J2kParser<'a, 'b> {
    reader: &'b mut JpegStreamReader<'a>,
    frame: Option<Frame>,
    coding: Option<CodingParameters>,
    quantization: Option<QuantizationParameters>,
    comments: Vec<Vec<u8>>,
}

fn invalid_value(marker: JpegMarkerCode, offset: usize) -> J2kError {
    J2kError::InvalidMarkerSegmentValue {
        marker: marker.into(),
        offset,
    }
}

impl<'a, 'b> J2kParser<'a, 'b> {
    pub fn new(reader: &'b mut JpegStreamReader<'a>) -> Self {
        Self {
            reader,
            frame: None,
            coding: None,
            quantization: None,
            comments: Vec::new(),
        }
    }

    /// Parses the main header up to and including the first SOT marker.
    pub fn parse_main_header(&mut self) -> Result<(), J2kError> {
        match self.reader.read_marker_byte() {
            Ok(code) if code == u8::from(JpegMarkerCode::StartOfCodestream) => {}
            _ => return Err(J2kError::StartOfCodestreamNotFound),
        }

        let offset = self.reader.position();
        let marker = self.reader.read_marker()?;
        if marker != JpegMarkerCode::ImageAndTileSize {
            return Err(J2kError::UnexpectedMarker {
                marker: marker.into(),
                offset,
            });
        }
        self.parse_siz()?;

        loop {
            let offset = self.reader.position();
            let marker = self.reader.read_marker()?;
            match marker {
                JpegMarkerCode::CodingStyleDefault => self.parse_cod()?,
                JpegMarkerCode::QuantizationDefault => self.parse_qcd()?,
                JpegMarkerCode::Comment => self.parse_com()?,
                JpegMarkerCode::ExtendedCapabilities
                | JpegMarkerCode::TilePartLengths
                | JpegMarkerCode::PacketLengthMain
                | JpegMarkerCode::ComponentRegistration => self.skip_segment(marker)?,
                JpegMarkerCode::CodingStyleComponent
                | JpegMarkerCode::QuantizationComponent
                | JpegMarkerCode::RegionOfInterest
                | JpegMarkerCode::ProgressionOrderChange
                | JpegMarkerCode::PackedPacketHeadersMain => {
                    return Err(J2kError::UnsupportedMarker {
                        marker: marker.into(),
                        offset,
                    });
                }
                JpegMarkerCode::StartOfTile => break,
                _ => {
                    return Err(J2kError::UnexpectedMarker {
                        marker: marker.into(),
                        offset,
                    });
                }
            }
        }

        let coding = self.coding.ok_or(J2kError::MissingMarkerSegment {
            marker: JpegMarkerCode::CodingStyleDefault.into(),
        })?;
        let quantization = self.quantization.as_ref().ok_or(J2kError::MissingMarkerSegment {
            marker: JpegMarkerCode::QuantizationDefault.into(),
        })?;
        let needed = match quantization.style {
            QuantizationStyle::ScalarDerived => 1,
            _ => subband_count(coding.decomposition_levels),
        };
        if quantization.steps.len() < needed {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: JpegMarkerCode::QuantizationDefault.into(),
                offset: self.reader.position(),
            });
        }
        debug!(
            "main header: {:?}, {} levels, {} layers, {:?}, {:?}",
            coding.wavelet,
            coding.decomposition_levels,
            coding.layer_count,
            coding.progression_order,
            quantization.style
        );
        Ok(())
    }

    fn skip_segment(&mut self, marker: JpegMarkerCode) -> Result<(), J2kError> {
        let length = self.reader.read_segment_length(marker)?;
        warn!("skipping marker segment {marker:?} ({length} bytes)");
        self.reader.skip(length)
    }

    fn parse_com(&mut self) -> Result<(), J2kError> {
        let length = self.reader.read_segment_length(JpegMarkerCode::Comment)?;
        let payload = self.reader.read_bytes(length)?;
        // Rcom (2 bytes) precedes the text.
        if payload.len() >= 2 {
            self.comments.push(payload[2..].to_vec());
        }
        Ok(())
    }

    pub fn parse_siz(&mut self) -> Result<(), J2kError> {
        let marker = JpegMarkerCode::ImageAndTileSize;
        let offset = self.reader.position();
        let length = self.reader.read_segment_length(marker)?;
        if length + 2 < SIZ_FIXED_LENGTH as usize {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                offset,
            });
        }

        let _rsiz = self.reader.read_u16()?;
        let width = self.reader.read_u32()?;
        let height = self.reader.read_u32()?;
        let x_origin = self.reader.read_u32()?;
        let y_origin = self.reader.read_u32()?;
        let tile_width = self.reader.read_u32()?;
        let tile_height = self.reader.read_u32()?;
        let tile_x_origin = self.reader.read_u32()?;
        let tile_y_origin = self.reader.read_u32()?;
        let component_count = self.reader.read_u16()? as usize;
        if component_count == 0 || component_count > MAXIMUM_COMPONENT_COUNT {
            return Err(invalid_value(marker, offset));
        }
        if length + 2 != SIZ_FIXED_LENGTH as usize + 3 * component_count {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                offset,
            });
        }

        let mut components = Vec::with_capacity(component_count);
        for _ in 0..component_count {
            let ssiz = self.reader.read_u8()?;
            let dx = self.reader.read_u8()?;
            let dy = self.reader.read_u8()?;
            let precision = (ssiz & 0x7F) + 1;
            if precision > MAXIMUM_BITS_PER_SAMPLE || dx == 0 || dy == 0 {
                return Err(invalid_value(marker, offset));
            }
            components.push(ComponentInfo {
                precision,
                is_signed: ssiz & 0x80 != 0,
                dx,
                dy,
            });
        }

        let frame = Frame {
            width,
            height,
            x_origin,
            y_origin,
            tile_width,
            tile_height,
            tile_x_origin,
            tile_y_origin,
            components,
        };
        frame.validate()?;
        debug!(
            "SIZ: {}x{} at ({}, {}), {} components, {} tiles of {}x{}",
            width - x_origin,
            height - y_origin,
            x_origin,
            y_origin,
            component_count,
            frame.tile_count(),
            tile_width,
            tile_height
        );
        self.frame = Some(frame);
        Ok(())
    }

    pub fn parse_cod(&mut self) -> Result<(), J2kError> {
        let marker = JpegMarkerCode::CodingStyleDefault;
        let offset = self.reader.position();
        let length = self.reader.read_segment_length(marker)?;
        if length < 10 {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                offset,
            });
        }

        let scod = self.reader.read_u8()?;
        if scod & !0x07 != 0 {
            return Err(J2kError::UnsupportedFeature("coding style flags"));
        }
        let progression_order =
            ProgressionOrder::try_from(self.reader.read_u8()?).map_err(|_| invalid_value(marker, offset))?;
        let layer_count = self.reader.read_u16()?;
        let mct = self.reader.read_u8()?;
        let decomposition_levels = self.reader.read_u8()?;
        let codeblock_width_exponent = self.reader.read_u8()?.saturating_add(2);
        let codeblock_height_exponent = self.reader.read_u8()?.saturating_add(2);
        let codeblock_style = self.reader.read_u8()?;
        let wavelet = WaveletKind::try_from(self.reader.read_u8()?).map_err(|_| invalid_value(marker, offset))?;

        if layer_count == 0 || mct > 1 || decomposition_levels > MAXIMUM_DECOMPOSITION_LEVELS {
            return Err(invalid_value(marker, offset));
        }
        validate_codeblock_exponents(codeblock_width_exponent, codeblock_height_exponent)
            .map_err(|_| invalid_value(marker, offset))?;
        if codeblock_style != 0 {
            return Err(J2kError::UnsupportedFeature("code-block coding style"));
        }

        if scod & 0x01 != 0 {
            let resolutions = decomposition_levels as usize + 1;
            if length < 10 + resolutions {
                return Err(J2kError::InvalidMarkerSegmentSize {
                    marker: marker.into(),
                    offset,
                });
            }
            let sizes = self.reader.read_bytes(resolutions)?;
            // Only the maximal 2^15 precinct, i.e. one precinct per resolution.
            if sizes.iter().any(|&s| s != 0xFF) {
                return Err(J2kError::UnsupportedFeature("precinct partitions"));
            }
            self.reader.skip(length - 10 - resolutions)?;
        } else {
            self.reader.skip(length - 10)?;
        }

        self.coding = Some(CodingParameters {
            decomposition_levels,
            layer_count,
            progression_order,
            codeblock_width_exponent,
            codeblock_height_exponent,
            use_sop: scod & 0x02 != 0,
            use_eph: scod & 0x04 != 0,
            wavelet,
            use_mct: mct == 1,
        });
        Ok(())
    }

    pub fn parse_qcd(&mut self) -> Result<(), J2kError> {
        let marker = JpegMarkerCode::QuantizationDefault;
        let offset = self.reader.position();
        let length = self.reader.read_segment_length(marker)?;
        if length < 1 {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                offset,
            });
        }
        let sqcd = self.reader.read_u8()?;
        let style = QuantizationStyle::from_code(sqcd & 0x1F).ok_or(invalid_value(marker, offset))?;
        let guard_bits = sqcd >> 5;
        let payload = length - 1;

        let steps = match style {
            QuantizationStyle::NoQuantization => self
                .reader
                .read_bytes(payload)?
                .iter()
                .map(|&b| StepSize::reversible(b >> 3))
                .collect(),
            QuantizationStyle::ScalarDerived | QuantizationStyle::ScalarExpounded => {
                if payload % 2 != 0 || payload == 0 {
                    return Err(J2kError::InvalidMarkerSegmentSize {
                        marker: marker.into(),
                        offset,
                    });
                }
                let mut steps = Vec::with_capacity(payload / 2);
                for _ in 0..payload / 2 {
                    steps.push(StepSize::from_u16(self.reader.read_u16()?));
                }
                steps
            }
        };

        let quantization = QuantizationParameters {
            style,
            guard_bits,
            steps,
        };
        quantization.validate()?;
        self.quantization = Some(quantization);
        Ok(())
    }

    /// Parses one tile-part from the SOT segment to the end of its body and
    /// returns the next marker, or `None` when the data ends without EOC.
    fn parse_tile_part(&mut self, tiles: &mut [TileBitstream]) -> Result<Option<JpegMarkerCode>, J2kError> {
        let marker = JpegMarkerCode::StartOfTile;
        let sot_start = self.reader.position() - 2;
        let length = self.reader.read_segment_length(marker)?;
        if length + 2 != SOT_SEGMENT_LENGTH as usize {
            return Err(J2kError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                offset: sot_start,
            });
        }
        let index = self.reader.read_u16()?;
        let psot = self.reader.read_u32()? as usize;
        let _tile_part_index = self.reader.read_u8()?;
        let _tile_part_count = self.reader.read_u8()?;
        let tile = tiles
            .get_mut(index as usize)
            .ok_or(J2kError::InvalidTileIndex { index })?;

        loop {
            let offset = self.reader.position();
            let marker = self.reader.read_marker()?;
            match marker {
                JpegMarkerCode::StartOfData => break,
                JpegMarkerCode::Comment | JpegMarkerCode::PacketLengthTilePart => self.skip_segment(marker)?,
                _ => {
                    return Err(J2kError::UnsupportedMarker {
                        marker: marker.into(),
                        offset,
                    });
                }
            }
        }

        let body_start = self.reader.position();
        let source_len = self.reader.len();
        let mut body_end = if psot == 0 {
            let rest = self.reader.remaining_data();
            if rest.ends_with(&[0xFF, u8::from(JpegMarkerCode::EndOfCodestream)]) {
                source_len - 2
            } else {
                source_len
            }
        } else {
            sot_start + psot
        };
        if body_end < body_start {
            return Err(J2kError::InvalidMarkerSegmentValue {
                marker: marker.into(),
                offset: sot_start,
            });
        }
        if body_end > source_len {
            warn!(
                "tile-part of tile {} truncated: {} of {} body bytes present",
                index,
                source_len - body_start,
                body_end - body_start
            );
            body_end = source_len;
        }

        if tile.tile_parts == 0 {
            tile.offset = body_start;
        }
        tile.tile_parts += 1;
        tile.data.extend_from_slice(self.reader.read_bytes(body_end - body_start)?);
        debug!("tile {} part {}: {} bytes", index, tile.tile_parts, body_end - body_start);

        if self.reader.remaining_data().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.reader.read_marker()?))
    }

    /// Parses the whole codestream: main header and every tile-part.
    pub fn parse_codestream(mut self) -> Result<Codestream, J2kError> {
        self.parse_main_header()?;
        let frame = self.frame.take().ok_or(J2kError::MissingMarkerSegment {
            marker: JpegMarkerCode::ImageAndTileSize.into(),
        })?;
        let mut tiles: Vec<TileBitstream> = (0..frame.tile_count())
            .map(|index| TileBitstream {
                index: index as u16,
                ..TileBitstream::default()
            })
            .collect();

        let mut next = Some(JpegMarkerCode::StartOfTile);
        loop {
            match next {
                Some(JpegMarkerCode::StartOfTile) => next = self.parse_tile_part(&mut tiles)?,
                Some(JpegMarkerCode::EndOfCodestream) => break,
                Some(marker) => {
                    return Err(J2kError::UnexpectedMarker {
                        marker: marker.into(),
                        offset: self.reader.position() - 2,
                    });
                }
                None => {
                    warn!("codestream ends without EOC");
                    break;
                }
            }
        }

        Ok(Codestream {
            frame,
            coding: self.coding.unwrap_or_default(),
            quantization: self.quantization.unwrap_or_default(),
            comments: self.comments,
            tiles,
        })
    }
}

/// Parses a raw codestream.
pub fn parse(data: &[u8]) -> Result<Codestream, J2kError> {
    let mut reader = JpegStreamReader::new(data);
    J2kParser::new(&mut reader).parse_codestream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg_stream_writer::JpegStreamWriter;

    fn main_header(writer: &mut JpegStreamWriter, cod_extra: &[u8]) {
        writer.write_marker(JpegMarkerCode::StartOfCodestream);
        writer.write_marker(JpegMarkerCode::ImageAndTileSize);
        writer.write_u16(SIZ_FIXED_LENGTH + 3);
        writer.write_u16(0);
        for v in [16u32, 8, 0, 0, 16, 8, 0, 0] {
            writer.write_u32(v);
        }
        writer.write_u16(1);
        writer.write_bytes(&[7, 1, 1]);

        writer.write_marker(JpegMarkerCode::CodingStyleDefault);
        writer.write_u16(12 + cod_extra.len() as u16);
        writer.write_bytes(&[cod_extra.len().min(1) as u8, 0, 0, 1, 0, 1, 4, 4, 0, 1]);
        writer.write_bytes(cod_extra);

        writer.write_marker(JpegMarkerCode::QuantizationDefault);
        writer.write_u16(2 + 1 + 4);
        writer.write_bytes(&[0x40, 8 << 3, 9 << 3, 9 << 3, 10 << 3]);
    }

    fn tile_part(writer: &mut JpegStreamWriter, index: u16, body: &[u8]) {
        writer.write_marker(JpegMarkerCode::StartOfTile);
        writer.write_u16(SOT_SEGMENT_LENGTH);
        writer.write_u16(index);
        writer.write_u32(12 + 2 + body.len() as u32);
        writer.write_bytes(&[0, 1]);
        writer.write_marker(JpegMarkerCode::StartOfData);
        writer.write_bytes(body);
    }

    #[test]
    fn test_parse_minimal_codestream() {
        let mut writer = JpegStreamWriter::new();
        main_header(&mut writer, &[]);
        tile_part(&mut writer, 0, &[1, 2, 3]);
        writer.write_marker(JpegMarkerCode::EndOfCodestream);
        let codestream = parse(&writer.into_inner()).unwrap();

        assert_eq!(codestream.frame.width, 16);
        assert_eq!(codestream.frame.height, 8);
        assert_eq!(codestream.frame.components[0].precision, 8);
        assert_eq!(codestream.coding.decomposition_levels, 1);
        assert_eq!(codestream.coding.codeblock_width_exponent, 6);
        assert_eq!(codestream.coding.wavelet, WaveletKind::Reversible53);
        assert_eq!(codestream.quantization.guard_bits, 2);
        assert_eq!(codestream.quantization.steps[3].exponent, 10);
        assert_eq!(codestream.tiles[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn test_single_precinct_partition_is_accepted() {
        let mut writer = JpegStreamWriter::new();
        main_header(&mut writer, &[0xFF, 0xFF]);
        tile_part(&mut writer, 0, &[]);
        writer.write_marker(JpegMarkerCode::EndOfCodestream);
        assert!(parse(&writer.into_inner()).is_ok());
    }

    #[test]
    fn test_tile_parts_are_concatenated() {
        let mut writer = JpegStreamWriter::new();
        main_header(&mut writer, &[]);
        tile_part(&mut writer, 0, &[1, 2]);
        tile_part(&mut writer, 0, &[3]);
        writer.write_marker(JpegMarkerCode::EndOfCodestream);
        let codestream = parse(&writer.into_inner()).unwrap();
        assert_eq!(codestream.tiles[0].data, vec![1, 2, 3]);
        assert_eq!(codestream.tiles[0].tile_parts, 2);
    }

    #[test]
    fn test_missing_soc() {
        assert_eq!(parse(&[0xFF, 0x51]), Err(J2kError::StartOfCodestreamNotFound));
        assert_eq!(parse(&[]), Err(J2kError::StartOfCodestreamNotFound));
    }

    #[test]
    fn test_unsupported_marker_is_rejected() {
        let mut writer = JpegStreamWriter::new();
        main_header(&mut writer, &[]);
        writer.write_marker(JpegMarkerCode::ProgressionOrderChange);
        writer.write_u16(2);
        let result = parse(&writer.into_inner());
        assert!(matches!(
            result,
            Err(J2kError::UnsupportedMarker { marker: 0x5F, .. })
        ));
    }

    #[test]
    fn test_invalid_tile_index() {
        let mut writer = JpegStreamWriter::new();
        main_header(&mut writer, &[]);
        tile_part(&mut writer, 3, &[]);
        writer.write_marker(JpegMarkerCode::EndOfCodestream);
        assert_eq!(
            parse(&writer.into_inner()),
            Err(J2kError::InvalidTileIndex { index: 3 })
        );
    }

    #[test]
    fn test_missing_qcd() {
        let mut writer = JpegStreamWriter::new();
        writer.write_marker(JpegMarkerCode::StartOfCodestream);
        writer.write_marker(JpegMarkerCode::ImageAndTileSize);
        writer.write_u16(SIZ_FIXED_LENGTH + 3);
        writer.write_u16(0);
        for v in [16u32, 8, 0, 0, 16, 8, 0, 0] {
            writer.write_u32(v);
        }
        writer.write_u16(1);
        writer.write_bytes(&[7, 1, 1]);
        writer.write_marker(JpegMarkerCode::CodingStyleDefault);
        writer.write_u16(12);
        writer.write_bytes(&[0, 0, 0, 1, 0, 1, 4, 4, 0, 1]);
        tile_part(&mut writer, 0, &[]);
        assert_eq!(
            parse(&writer.into_inner()),
            Err(J2kError::MissingMarkerSegment { marker: 0x5C })
        );
    }

    #[test]
    fn test_truncated_tile_part_is_clipped() {
        let mut writer = JpegStreamWriter::new();
        main_header(&mut writer, &[]);
        tile_part(&mut writer, 0, &[9, 9, 9, 9]);
        let mut data = writer.into_inner();
        data.truncate(data.len() - 2);
        let codestream = parse(&data).unwrap();
        assert_eq!(codestream.tiles[0].data, vec![9, 9]);
    }
}
