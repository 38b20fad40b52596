//! Tier-2 coding: packet headers and bodies (ISO/IEC 15444-1 B.9, B.10).
//!
//! Each tile carries one precinct per resolution, so a packet holds the
//! contributions of every code-block of one (component, resolution, layer).

use super::bit_io::{J2kBitReader, J2kBitWriter};
use super::codeblock::{Subband, build_subbands};
use super::image::{Rect, SubbandOrientation, subband_index};
use super::progression::PacketId;
use super::tag_tree::TagTree;
use crate::constants::{INITIAL_LBLOCK, MAXIMUM_CODING_PASSES, SOP_SEGMENT_SIZE};
use crate::error::J2kError;
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};
use log::{trace, warn};

/// What one layer contributes to one code-block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBlockInfo {
    pub layer: u16,
    pub passes: u32,
    pub zero_bit_planes: u32,
    pub data: Vec<u8>,
}

/// All contributions of a code-block, merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockBitstream {
    pub band: SubbandOrientation,
    /// Extent on the band grid.
    pub rect: Rect,
    pub zero_bit_planes: u32,
    pub passes: u32,
    pub data: Vec<u8>,
    /// Encoder side: the contribution of each layer, in layer order.
    pub layers: Vec<CodeBlockInfo>,
    included: bool,
    lblock: u32,
}

impl CodeBlockBitstream {
    pub fn new(band: SubbandOrientation, rect: Rect) -> Self {
        Self {
            band,
            rect,
            zero_bit_planes: 0,
            passes: 0,
            data: Vec::new(),
            layers: Vec::new(),
            included: false,
            lblock: INITIAL_LBLOCK,
        }
    }

    pub fn is_included(&self) -> bool {
        self.included
    }

    /// Folds a decoded contribution into the block.
    pub fn merge(&mut self, info: &CodeBlockInfo) {
        self.passes += info.passes;
        self.data.extend_from_slice(&info.data);
    }

    fn first_layer(&self, layers: u16) -> u32 {
        self.layers
            .iter()
            .find(|info| info.passes > 0)
            .map_or(layers as u32, |info| info.layer as u32)
    }
}

/// One subband: geometry, its code-blocks and the two tag trees that
/// persist across layers.
#[derive(Debug, Clone)]
pub struct SubbandBitstream {
    pub subband: Subband,
    pub blocks: Vec<CodeBlockBitstream>,
    inclusion: TagTree,
    zero_planes: TagTree,
}

impl SubbandBitstream {
    pub fn new(subband: Subband) -> Self {
        let blocks = subband
            .grid
            .blocks()
            .map(|rect| CodeBlockBitstream::new(subband.orientation, rect))
            .collect();
        let (cols, rows) = (subband.grid.cols() as usize, subband.grid.rows() as usize);
        Self {
            subband,
            blocks,
            inclusion: TagTree::new(cols, rows),
            zero_planes: TagTree::new(cols, rows),
        }
    }

    fn cols(&self) -> usize {
        self.subband.grid.cols() as usize
    }
}

/// Tier-2 state of one tile-component: a flat subband arena indexed by
/// [`subband_index`].
#[derive(Debug, Clone)]
pub struct Tier2Output {
    pub resolutions: u8,
    pub subbands: Vec<SubbandBitstream>,
}

impl Tier2Output {
    pub fn new(tc: Rect, levels: u8, block_width: u32, block_height: u32) -> Self {
        Self {
            resolutions: levels + 1,
            subbands: build_subbands(tc, levels, block_width, block_height)
                .into_iter()
                .map(SubbandBitstream::new)
                .collect(),
        }
    }

    pub fn subband(&self, resolution: u8, band: SubbandOrientation) -> Option<&SubbandBitstream> {
        self.subbands.get(subband_index(resolution, band))
    }

    fn band_range(resolution: u8) -> std::ops::Range<usize> {
        let first = subband_index(resolution, SubbandOrientation::for_resolution(resolution)[0]);
        first..first + SubbandOrientation::for_resolution(resolution).len()
    }

    /// Prepares the tag trees from the per-layer contributions before
    /// packets are written.
    pub fn prepare_encoding(&mut self, layers: u16) {
        for band in &mut self.subbands {
            band.inclusion.clear();
            band.zero_planes.clear();
            let cols = band.cols();
            for (k, block) in band.blocks.iter_mut().enumerate() {
                block.included = false;
                block.lblock = INITIAL_LBLOCK;
                band.inclusion.set_value(k % cols, k / cols, block.first_layer(layers));
                band.zero_planes.set_value(k % cols, k / cols, block.zero_bit_planes);
            }
        }
    }
}

/// Table B.4 codeword for a pass count.
pub fn write_pass_count(writer: &mut J2kBitWriter, passes: u32) {
    debug_assert!((1..=MAXIMUM_CODING_PASSES).contains(&passes));
    match passes {
        1 => writer.write_bit(0),
        2 => writer.write_bits(0b10, 2),
        3..=5 => {
            writer.write_bits(0b11, 2);
            writer.write_bits(passes - 3, 2);
        }
        6..=36 => {
            writer.write_bits(0b1111, 4);
            writer.write_bits(passes - 6, 5);
        }
        _ => {
            writer.write_bits(0b1_1111_1111, 9);
            writer.write_bits(passes - 37, 7);
        }
    }
}

pub fn read_pass_count(reader: &mut J2kBitReader) -> Result<u32, J2kError> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let value = reader.read_bits(2)?;
    if value < 3 {
        return Ok(3 + value);
    }
    let value = reader.read_bits(5)?;
    if value < 31 {
        return Ok(6 + value);
    }
    Ok(37 + reader.read_bits(7)?)
}

fn floor_log2(value: u32) -> u32 {
    31 - value.leading_zeros()
}

/// Writes one packet: optional SOP, header, optional EPH, bodies.
pub fn encode_packet(
    output: &mut Vec<u8>,
    tier2: &mut Tier2Output,
    packet: PacketId,
    sequence_number: u16,
    use_sop: bool,
    use_eph: bool,
) {
    if use_sop {
        output.extend_from_slice(&[JPEG_MARKER_START_BYTE, JpegMarkerCode::StartOfPacket.into()]);
        output.extend_from_slice(&4u16.to_be_bytes());
        output.extend_from_slice(&sequence_number.to_be_bytes());
    }

    let layer = packet.layer;
    let bands = Tier2Output::band_range(packet.resolution);
    let contributes = |block: &CodeBlockBitstream| {
        block
            .layers
            .get(layer as usize)
            .is_some_and(|info| info.passes > 0)
    };
    let non_empty = tier2.subbands[bands.clone()]
        .iter()
        .any(|band| band.blocks.iter().any(contributes));

    let mut writer = J2kBitWriter::new();
    writer.write_bit(non_empty as u8);
    if non_empty {
        for band in &mut tier2.subbands[bands] {
            let cols = band.cols();
            for (k, block) in band.blocks.iter_mut().enumerate() {
                let (x, y) = (k % cols, k / cols);
                let info = block
                    .layers
                    .get(layer as usize)
                    .filter(|info| info.passes > 0);
                let included = info.is_some();
                if block.included {
                    writer.write_bit(included as u8);
                } else {
                    band.inclusion.encode(&mut writer, x, y, layer as u32);
                    if included {
                        band.zero_planes.encode_value(&mut writer, x, y);
                        block.included = true;
                    }
                }
                let Some(info) = info else {
                    continue;
                };

                write_pass_count(&mut writer, info.passes);
                let length = info.data.len() as u32;
                let mut bits = block.lblock + floor_log2(info.passes);
                while bits < 32 && length >> bits != 0 {
                    writer.write_bit(1);
                    block.lblock += 1;
                    bits += 1;
                }
                writer.write_bit(0);
                writer.write_bits(length, bits);
            }
        }
    }
    output.extend_from_slice(&writer.finish());

    if use_eph {
        output.extend_from_slice(&[JPEG_MARKER_START_BYTE, JpegMarkerCode::EndOfPacketHeader.into()]);
    }
    if non_empty {
        for band in &tier2.subbands[Tier2Output::band_range(packet.resolution)] {
            for block in &band.blocks {
                if let Some(info) = block.layers.get(layer as usize).filter(|info| info.passes > 0) {
                    output.extend_from_slice(&info.data);
                }
            }
        }
    }
    trace!(
        "packet l={} r={} c={}: {} bytes total",
        packet.layer,
        packet.resolution,
        packet.component,
        output.len()
    );
}

/// Reads packets from the concatenated tile-part bodies of one tile.
pub struct PacketDecoder<'a> {
    data: &'a [u8],
    position: usize,
    base_offset: usize,
    use_sop: bool,
    use_eph: bool,
}

impl<'a> PacketDecoder<'a> {
    /// `base_offset` is the codestream offset of `data`, used in errors.
    pub fn new(data: &'a [u8], base_offset: usize, use_sop: bool, use_eph: bool) -> Self {
        Self {
            data,
            position: 0,
            base_offset,
            use_sop,
            use_eph,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.data.len()
    }

    fn skip_marker(&mut self, marker: JpegMarkerCode, size: usize) {
        let rest = &self.data[self.position.min(self.data.len())..];
        if rest.len() >= 2 && rest[0] == JPEG_MARKER_START_BYTE && rest[1] == u8::from(marker) {
            self.position += size.min(rest.len());
        }
    }

    /// Parses one packet and merges its contributions. Contributions of
    /// layers at or above `max_layers` are read but dropped.
    pub fn decode_packet(
        &mut self,
        tier2: &mut Tier2Output,
        packet: PacketId,
        max_layers: u16,
    ) -> Result<(), J2kError> {
        if self.use_sop {
            self.skip_marker(JpegMarkerCode::StartOfPacket, SOP_SEGMENT_SIZE);
        }

        let start = self.position.min(self.data.len());
        let mut reader = J2kBitReader::with_offset(&self.data[start..], self.base_offset + start);
        let layer = packet.layer;
        let mut contributions: Vec<(usize, usize, CodeBlockInfo, usize)> = Vec::new();

        if reader.read_bit()? == 1 {
            for band_index in Tier2Output::band_range(packet.resolution) {
                let band = &mut tier2.subbands[band_index];
                let cols = band.cols();
                for (k, block) in band.blocks.iter_mut().enumerate() {
                    let (x, y) = (k % cols, k / cols);
                    let first_inclusion = !block.included;
                    let included = if first_inclusion {
                        band.inclusion.decode(&mut reader, x, y, layer as u32)?
                    } else {
                        reader.read_bit()? == 1
                    };
                    if !included {
                        continue;
                    }

                    let zero_bit_planes = if first_inclusion {
                        block.included = true;
                        let value = band.zero_planes.decode_value(&mut reader, x, y)?;
                        block.zero_bit_planes = value;
                        value
                    } else {
                        block.zero_bit_planes
                    };

                    let passes = read_pass_count(&mut reader)?;
                    if block.passes + passes > MAXIMUM_CODING_PASSES {
                        return Err(J2kError::TooManyCodingPasses {
                            passes: block.passes + passes,
                        });
                    }
                    while reader.read_bit()? == 1 {
                        block.lblock += 1;
                    }
                    let bits = block.lblock + floor_log2(passes);
                    if bits > 32 {
                        return Err(J2kError::TruncatedPacketHeader {
                            offset: self.base_offset + start + reader.position(),
                        });
                    }
                    let length = reader.read_bits(bits)? as usize;
                    let info = CodeBlockInfo {
                        layer,
                        passes,
                        zero_bit_planes,
                        data: Vec::new(),
                    };
                    contributions.push((band_index, k, info, length));
                }
            }
        }
        self.position = start + reader.align();

        if self.use_eph {
            self.skip_marker(JpegMarkerCode::EndOfPacketHeader, 2);
        }

        for (band_index, k, mut info, length) in contributions {
            let begin = self.position.min(self.data.len());
            let end = (begin + length).min(self.data.len());
            if end - begin < length {
                warn!(
                    "code-block body clipped from {} to {} bytes at offset {}",
                    length,
                    end - begin,
                    self.base_offset + begin
                );
            }
            self.position = begin + length;
            if layer < max_layers {
                info.data = self.data[begin..end].to_vec();
                tier2.subbands[band_index].blocks[k].merge(&info);
            }
        }
        trace!(
            "packet l={} r={} c={} ends at {}",
            packet.layer,
            packet.resolution,
            packet.component,
            self.base_offset + self.position
        );
        Ok(())
    }
}

/// Splits a block's passes across `layers` layers: layer `l` ends at pass
/// `ceil(passes · (l + 1) / layers)`, cut at the matching pass rate.
pub fn distribute_layers(
    data: &[u8],
    passes: u32,
    pass_rates: &[usize],
    zero_bit_planes: u32,
    layers: u16,
) -> Vec<CodeBlockInfo> {
    let mut infos = Vec::with_capacity(layers as usize);
    let (mut done_passes, mut done_bytes) = (0u32, 0usize);
    for layer in 0..layers {
        let end_passes = (passes as u64 * (layer as u64 + 1)).div_ceil(layers as u64) as u32;
        let end_bytes = if end_passes == 0 {
            0
        } else {
            pass_rates[end_passes as usize - 1].min(data.len())
        };
        infos.push(CodeBlockInfo {
            layer,
            passes: end_passes - done_passes,
            zero_bit_planes,
            data: data[done_bytes..end_bytes.max(done_bytes)].to_vec(),
        });
        done_passes = end_passes;
        done_bytes = end_bytes.max(done_bytes);
    }
    infos
}
