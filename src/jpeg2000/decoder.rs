//! JPEG 2000 decoder.
//!
//! Parses the codestream, reads every packet of every tile in progression
//! order, decodes the code-blocks and reconstructs the samples through the
//! inverse wavelet and colour transforms.

use super::bit_plane_coder::decode_code_block;
use super::codeblock::CodeBlock;
use super::dwt::inverse_2d_at;
use super::image::{Frame, Rect};
use super::mct;
use super::packet::{PacketDecoder, Tier2Output};
use super::parser::{Codestream, TileBitstream, parse};
use super::progression::packet_sequence;
use super::quantization::log2_gain;
use crate::DecodedImage;
use crate::coding_parameters::CodingParameters;
use crate::error::J2kError;
use crate::jpeg_marker_code::JpegMarkerCode;
use log::{debug, trace, warn};

/// Reconstructed samples of one component, before conversion to bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlane {
    /// Extent on the component grid.
    pub rect: Rect,
    pub precision: u8,
    pub is_signed: bool,
    pub samples: Vec<f32>,
}

/// JPEG 2000 codestream decoder.
#[derive(Debug, Clone, Default)]
pub struct J2kDecoder {
    max_layers: Option<u16>,
}

impl J2kDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes at most `layers` quality layers; later layers are parsed but
    /// their contributions are dropped.
    pub fn set_max_layers(&mut self, layers: u16) {
        self.max_layers = Some(layers.max(1));
    }

    /// Decodes a raw codestream into interleaved 8-bit samples.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedImage, J2kError> {
        let codestream = parse(data)?;
        let planes = self.decode_components(&codestream)?;
        Ok(interleave(&codestream.frame, &planes))
    }

    /// Decodes every component at full precision. Colour-transformed
    /// components are returned after the inverse transform and all samples
    /// are level shifted back to their nominal range.
    pub fn decode_components(&self, codestream: &Codestream) -> Result<Vec<ComponentPlane>, J2kError> {
        let frame = &codestream.frame;
        let coding = &codestream.coding;
        let layers = self.max_layers.unwrap_or(coding.layer_count).min(coding.layer_count);
        debug!(
            "decoding {}x{}x{}: {:?}, {} levels, {}/{} layers, {}, {} tile(s)",
            frame.image_rect().width(),
            frame.image_rect().height(),
            frame.component_count(),
            coding.wavelet,
            coding.decomposition_levels,
            layers,
            coding.layer_count,
            coding.progression_order.name(),
            frame.tile_count()
        );

        let mut planes = frame
            .components
            .iter()
            .enumerate()
            .map(|(c, info)| {
                let rect = frame.component_rect(c).ok_or(J2kError::InvalidGeometry)?;
                Ok(ComponentPlane {
                    rect,
                    precision: info.precision,
                    is_signed: info.is_signed,
                    samples: vec![0.0; rect.area()],
                })
            })
            .collect::<Result<Vec<_>, J2kError>>()?;

        let use_mct = coding.use_mct && can_apply_mct(frame);
        if coding.use_mct && !use_mct {
            warn!("multiple component transform signalled for incompatible components; skipped");
        }

        for tile in &codestream.tiles {
            let mut buffers = self.decode_tile(codestream, tile, layers)?;
            if use_mct {
                let (first, rest) = buffers.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                mct::inverse(
                    coding.wavelet,
                    &mut first[0].1,
                    &mut second[0].1,
                    &mut third[0].1,
                );
            }
            for ((tc, samples), plane) in buffers.into_iter().zip(&mut planes) {
                let shift = if plane.is_signed {
                    0.0
                } else {
                    (1u64 << (plane.precision - 1)) as f32
                };
                let stride = plane.rect.width() as usize;
                let width = tc.width() as usize;
                for (row, line) in samples.chunks_exact(width.max(1)).enumerate() {
                    let y = (tc.y0 - plane.rect.y0) as usize + row;
                    let x = (tc.x0 - plane.rect.x0) as usize;
                    for (target, &value) in plane.samples[y * stride + x..y * stride + x + width]
                        .iter_mut()
                        .zip(line)
                    {
                        *target = value + shift;
                    }
                }
            }
        }
        Ok(planes)
    }

    /// Tier-2 and tier-1 decoding of one tile followed by the inverse DWT of
    /// each tile-component.
    fn decode_tile(
        &self,
        codestream: &Codestream,
        tile: &TileBitstream,
        layers: u16,
    ) -> Result<Vec<(Rect, Vec<f32>)>, J2kError> {
        let frame = &codestream.frame;
        let coding = &codestream.coding;
        let index = tile.index as usize;

        let mut tier2 = (0..frame.component_count())
            .map(|c| {
                let tc = frame
                    .tile_component_rect(index, c)
                    .ok_or(J2kError::InvalidTileIndex { index: tile.index })?;
                Ok(Tier2Output::new(
                    tc,
                    coding.decomposition_levels,
                    coding.codeblock_width(),
                    coding.codeblock_height(),
                ))
            })
            .collect::<Result<Vec<_>, J2kError>>()?;

        let resolutions = vec![coding.resolution_count(); frame.component_count()];
        let sequence = packet_sequence(coding.progression_order, coding.layer_count, &resolutions);
        let mut packets = PacketDecoder::new(&tile.data, tile.offset, coding.use_sop, coding.use_eph);
        for (n, packet) in sequence.iter().enumerate() {
            if packets.is_exhausted() {
                warn!(
                    "tile {} data ends after {} of {} packets",
                    tile.index,
                    n,
                    sequence.len()
                );
                break;
            }
            packets.decode_packet(&mut tier2[packet.component as usize], *packet, layers)?;
        }

        let mut buffers = Vec::with_capacity(tier2.len());
        for (c, output) in tier2.iter().enumerate() {
            let tc = frame
                .tile_component_rect(index, c)
                .ok_or(J2kError::InvalidTileIndex { index: tile.index })?;
            let precision = frame.components[c].precision;
            let mut buffer = reconstruct_coefficients(codestream, output, tc, precision)?;
            inverse_2d_at(
                &mut buffer,
                tc.width() as usize,
                tc.height() as usize,
                tc.x0,
                tc.y0,
                coding.decomposition_levels,
                coding.wavelet,
            );
            buffers.push((tc, buffer));
        }
        Ok(buffers)
    }
}

/// The colour transform needs three components sharing one sampling grid.
fn can_apply_mct(frame: &Frame) -> bool {
    match frame.components.get(..3) {
        Some([a, b, c]) => (a.dx, a.dy) == (b.dx, b.dy) && (a.dx, a.dy) == (c.dx, c.dy),
        _ => false,
    }
}

/// Decodes every code-block of a tile-component and places the
/// dequantized coefficients into the wavelet buffer layout.
fn reconstruct_coefficients(
    codestream: &Codestream,
    output: &Tier2Output,
    tc: Rect,
    precision: u8,
) -> Result<Vec<f32>, J2kError> {
    let coding: &CodingParameters = &codestream.coding;
    let quantization = &codestream.quantization;
    let stride = tc.width() as usize;
    let mut buffer = vec![0.0f32; tc.area()];

    for (i, band) in output.subbands.iter().enumerate() {
        let orientation = band.subband.orientation;
        let step_size = quantization
            .step(i, coding.decomposition_levels)
            .ok_or(J2kError::InvalidMarkerSegmentValue {
                marker: JpegMarkerCode::QuantizationDefault.into(),
                offset: 0,
            })?;
        let max_planes = step_size.bit_planes(quantization.guard_bits);
        let step = if coding.is_reversible() {
            1.0
        } else {
            step_size.to_step(precision + log2_gain(orientation))
        };

        for bitstream in &band.blocks {
            if bitstream.passes == 0 {
                continue;
            }
            let (width, height) = (bitstream.rect.width() as usize, bitstream.rect.height() as usize);
            if bitstream.zero_bit_planes > max_planes {
                warn!(
                    "code-block {:?} signals {} zero bit-planes of {}; skipped",
                    bitstream.rect, bitstream.zero_bit_planes, max_planes
                );
                continue;
            }
            let bit_planes = max_planes - bitstream.zero_bit_planes;
            let block = decode_code_block(
                &bitstream.data,
                width,
                height,
                orientation,
                bit_planes,
                bitstream.passes,
            )?;
            trace!(
                "r={} {:?} block {:?}: {} planes, {} passes, {} bytes",
                band.subband.resolution,
                orientation,
                bitstream.rect,
                bit_planes,
                bitstream.passes,
                bitstream.data.len()
            );

            let (x, y) = band.subband.block_origin(bitstream.rect);
            for row in 0..height {
                let start = (y + row) * stride + x;
                for (col, target) in buffer[start..start + width].iter_mut().enumerate() {
                    *target = reconstruct(&block, row * width + col, step, coding.is_reversible());
                }
            }
        }
    }
    Ok(buffer)
}

/// Value of one coefficient from its decoded bits. Planes below the lowest
/// decoded one are filled with their midpoint.
fn reconstruct(block: &CodeBlock, index: usize, step: f32, reversible: bool) -> f32 {
    let magnitude = block.magnitudes[index];
    if magnitude == 0 {
        return 0.0;
    }
    let lowest = block.lowest_plane[index] as i32;
    let value = if reversible {
        if lowest == 0 {
            magnitude as f32
        } else {
            magnitude as f32 + 2f32.powi(lowest - 1)
        }
    } else {
        (magnitude as f32 + 0.5 * 2f32.powi(lowest)) * step
    };
    if block.negative[index] { -value } else { value }
}

/// Converts the planes into interleaved bytes on the image grid. Subsampled
/// components are upsampled by sample repetition; deeper samples are scaled
/// down to 8 bits.
fn interleave(frame: &Frame, planes: &[ComponentPlane]) -> DecodedImage {
    let image = frame.image_rect();
    let (width, height) = (image.width() as usize, image.height() as usize);
    let count = planes.len();
    let mut pixels = vec![0u8; width * height * count];

    for (c, (plane, info)) in planes.iter().zip(&frame.components).enumerate() {
        let precision = plane.precision as u32;
        let maximum = ((1u64 << precision) - 1) as f32;
        let offset = if plane.is_signed {
            (1u64 << (precision - 1)) as f32
        } else {
            0.0
        };
        let drop = precision.saturating_sub(8);
        let stride = plane.rect.width() as usize;
        if plane.rect.is_empty() {
            continue;
        }
        for y in 0..height {
            let v = ((image.y0 + y as u32) / info.dy as u32)
                .clamp(plane.rect.y0, plane.rect.y1 - 1)
                - plane.rect.y0;
            for x in 0..width {
                let u = ((image.x0 + x as u32) / info.dx as u32)
                    .clamp(plane.rect.x0, plane.rect.x1 - 1)
                    - plane.rect.x0;
                let value = (plane.samples[v as usize * stride + u as usize] + offset)
                    .round()
                    .clamp(0.0, maximum) as u64;
                pixels[(y * width + x) * count + c] = (value >> drop) as u8;
            }
        }
    }

    let precision = frame.components.first().map_or(8, |c| c.precision);
    DecodedImage {
        pixels,
        width: width as u32,
        height: height as u32,
        component_count: count as u32,
        bits_per_sample: precision.min(8),
    }
}
