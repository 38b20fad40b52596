//! JPEG 2000 encoder.
//!
//! Samples are level shifted, optionally colour transformed, wavelet
//! transformed per tile-component and quantized. Each code-block is then
//! coded by the EBCOT tier-1 coder, split into quality layers and packed
//! into packets in the configured progression order.

use super::bit_plane_coder::encode_code_block;
use super::codeblock::CodeBlock;
use super::dwt::{WaveletKind, forward_2d_at};
use super::image::{ComponentInfo, Frame, SubbandOrientation, subband_count};
use super::mct;
use super::packet::{Tier2Output, distribute_layers, encode_packet};
use super::progression::{ProgressionOrder, packet_sequence};
use super::quantization::{StepSize, calculate_step_sizes, log2_gain, quality_to_step};
use super::writer::J2kWriter;
use crate::FrameInfo;
use crate::coding_parameters::{CodingParameters, QuantizationParameters, QuantizationStyle};
use crate::constants::{
    DEFAULT_CODEBLOCK_EXPONENT, DEFAULT_DECOMPOSITION_LEVELS, DEFAULT_GUARD_BITS, DEFAULT_LAYER_COUNT,
    DEFAULT_QUALITY, MAXIMUM_COMPONENT_COUNT, MAXIMUM_ENCODE_BITS_PER_SAMPLE, MAXIMUM_GUARD_BITS,
    MAXIMUM_QUALITY, MINIMUM_BITS_PER_SAMPLE, MINIMUM_COMPONENT_COUNT, MINIMUM_QUALITY,
};
use crate::error::J2kError;
use log::{debug, trace, warn};

/// Quantized code-blocks of one tile-component; `blocks[i]` holds the
/// blocks of subband `i` of `tier2`, in raster order.
struct TileComponent {
    tier2: Tier2Output,
    blocks: Vec<Vec<CodeBlock>>,
}

/// JPEG 2000 encoder producing a raw codestream.
#[derive(Debug, Clone)]
pub struct J2kEncoder {
    quality: u8,
    lossy: bool,
    decomposition_levels: u8,
    layer_count: u16,
    progression_order: ProgressionOrder,
    codeblock_width: u32,
    codeblock_height: u32,
    use_sop: bool,
    use_eph: bool,
    tile_size: Option<(u32, u32)>,
    color_transform: bool,
    comment: Option<Vec<u8>>,
}

impl Default for J2kEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            lossy: false,
            decomposition_levels: DEFAULT_DECOMPOSITION_LEVELS,
            layer_count: DEFAULT_LAYER_COUNT,
            progression_order: ProgressionOrder::Lrcp,
            codeblock_width: 1 << DEFAULT_CODEBLOCK_EXPONENT,
            codeblock_height: 1 << DEFAULT_CODEBLOCK_EXPONENT,
            use_sop: false,
            use_eph: false,
            tile_size: None,
            color_transform: true,
            comment: None,
        }
    }
}

impl J2kEncoder {
    /// Lossless encoder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Sets the quality level, clamped to 1..=100. Only used when lossy.
    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.clamp(MINIMUM_QUALITY, MAXIMUM_QUALITY);
    }

    /// Lossy coding uses the 9/7 wavelet and scalar quantization; lossless
    /// coding uses the 5/3 wavelet with unit steps.
    pub fn set_lossy(&mut self, lossy: bool) {
        self.lossy = lossy;
    }

    pub fn set_decomposition_levels(&mut self, levels: u8) {
        self.decomposition_levels = levels;
    }

    pub fn set_layer_count(&mut self, layers: u16) {
        self.layer_count = layers;
    }

    pub fn set_progression_order(&mut self, order: ProgressionOrder) {
        self.progression_order = order;
    }

    /// Nominal code-block size in samples; both must be powers of two.
    pub fn set_codeblock_size(&mut self, width: u32, height: u32) {
        self.codeblock_width = width;
        self.codeblock_height = height;
    }

    pub fn set_sop(&mut self, enabled: bool) {
        self.use_sop = enabled;
    }

    pub fn set_eph(&mut self, enabled: bool) {
        self.use_eph = enabled;
    }

    /// Tile size on the reference grid. By default the whole image is one tile.
    pub fn set_tile_size(&mut self, width: u32, height: u32) {
        self.tile_size = Some((width, height));
    }

    /// Applies RCT (lossless) or ICT (lossy) to the first three components.
    /// Ignored for images with fewer than three components.
    pub fn set_color_transform(&mut self, enabled: bool) {
        self.color_transform = enabled;
    }

    /// Adds a COM marker segment to the main header.
    pub fn set_comment(&mut self, text: &[u8]) {
        self.comment = Some(text.to_vec());
    }

    fn coding_parameters(&self, components: usize) -> Result<CodingParameters, J2kError> {
        let coding = CodingParameters {
            decomposition_levels: self.decomposition_levels,
            layer_count: self.layer_count,
            progression_order: self.progression_order,
            codeblock_width_exponent: codeblock_exponent(self.codeblock_width)?,
            codeblock_height_exponent: codeblock_exponent(self.codeblock_height)?,
            use_sop: self.use_sop,
            use_eph: self.use_eph,
            wavelet: if self.lossy {
                WaveletKind::Irreversible97
            } else {
                WaveletKind::Reversible53
            },
            use_mct: self.color_transform && components >= 3,
        };
        coding.validate()?;
        Ok(coding)
    }

    fn frame(&self, frame_info: &FrameInfo) -> Result<Frame, J2kError> {
        let (tile_width, tile_height) = self
            .tile_size
            .unwrap_or((frame_info.width, frame_info.height));
        if tile_width == 0 || tile_height == 0 {
            return Err(J2kError::InvalidArgumentTileSize);
        }
        let component = ComponentInfo {
            precision: frame_info.bits_per_sample,
            ..ComponentInfo::default()
        };
        let frame = Frame::new(
            frame_info.width,
            frame_info.height,
            tile_width,
            tile_height,
            vec![component; frame_info.component_count as usize],
        );
        if frame.tile_count() > u16::MAX as usize {
            return Err(J2kError::InvalidArgumentTileSize);
        }
        frame.validate()?;
        Ok(frame)
    }

    /// Encodes interleaved samples, one byte per sample, into a codestream.
    pub fn encode(&self, pixels: &[u8], frame_info: &FrameInfo) -> Result<Vec<u8>, J2kError> {
        validate_frame_info(pixels, frame_info)?;
        let components = frame_info.component_count as usize;
        let coding = self.coding_parameters(components)?;
        let frame = self.frame(frame_info)?;
        let depth = frame_info.bits_per_sample;
        let levels = coding.decomposition_levels;

        if self.color_transform && !coding.use_mct {
            debug!("colour transform ignored for {components} component(s)");
        }
        debug!(
            "encoding {}x{}x{} at {} bits: {:?}, {} levels, {} layers, {}, {} tile(s)",
            frame.width,
            frame.height,
            components,
            depth,
            coding.wavelet,
            levels,
            coding.layer_count,
            coding.progression_order.name(),
            frame.tile_count()
        );

        let planes = component_planes(pixels, frame_info, &coding);
        let signalled = if coding.is_reversible() {
            Vec::new()
        } else {
            self.irreversible_steps(levels, depth)
        };
        let applied: Vec<f32> = (0..subband_count(levels))
            .map(|i| match signalled.get(i) {
                Some(step) => step.to_step(depth + log2_gain(band_of(i))),
                None => 1.0,
            })
            .collect();

        let mut tiles = Vec::with_capacity(frame.tile_count());
        for tile in 0..frame.tile_count() {
            let mut tile_components = Vec::with_capacity(components);
            for (component, plane) in planes.iter().enumerate() {
                tile_components.push(quantize_tile_component(
                    &frame, plane, tile, component, &coding, &applied,
                )?);
            }
            tiles.push(tile_components);
        }

        let quantization = choose_quantization(&mut tiles, &coding, depth, signalled);
        code_blocks(&mut tiles, &quantization, coding.layer_count);

        let mut writer = J2kWriter::new();
        writer.write_soc();
        writer.write_siz(&frame);
        writer.write_cod(&coding);
        writer.write_qcd(&quantization);
        if let Some(comment) = &self.comment {
            writer.write_comment(comment);
        }

        let resolutions = vec![coding.resolution_count(); components];
        let sequence = packet_sequence(coding.progression_order, coding.layer_count, &resolutions);
        for (index, tile) in tiles.iter_mut().enumerate() {
            for tile_component in tile.iter_mut() {
                tile_component.tier2.prepare_encoding(coding.layer_count);
            }
            let mut body = Vec::new();
            for (sequence_number, packet) in sequence.iter().enumerate() {
                let tier2 = &mut tile[packet.component as usize].tier2;
                // Nsop counts modulo 2^16.
                encode_packet(
                    &mut body,
                    tier2,
                    *packet,
                    sequence_number as u16,
                    coding.use_sop,
                    coding.use_eph,
                );
            }
            debug!("tile {}: {} packets, {} bytes", index, sequence.len(), body.len());
            writer.write_tile_part(index as u16, &body);
        }
        writer.write_eoc();

        let codestream = writer.into_inner();
        debug!("codestream is {} bytes", codestream.len());
        Ok(codestream)
    }

    /// Signalled steps for the 9/7 path, in subband arena order.
    fn irreversible_steps(&self, levels: u8, depth: u8) -> Vec<StepSize> {
        let table = calculate_step_sizes(quality_to_step(self.quality), levels, true);
        (0..=levels)
            .flat_map(|resolution| {
                SubbandOrientation::for_resolution(resolution)
                    .iter()
                    .map(move |&band| (resolution, band))
            })
            .map(|(resolution, band)| {
                let step = table.for_resolution(resolution, levels, band);
                StepSize::from_step(step, depth + log2_gain(band))
            })
            .collect()
    }
}

fn codeblock_exponent(size: u32) -> Result<u8, J2kError> {
    if !size.is_power_of_two() {
        return Err(J2kError::InvalidArgumentCodeBlockSize);
    }
    Ok(size.trailing_zeros() as u8)
}

fn validate_frame_info(pixels: &[u8], frame_info: &FrameInfo) -> Result<(), J2kError> {
    if frame_info.width == 0 {
        return Err(J2kError::InvalidArgumentWidth);
    }
    if frame_info.height == 0 {
        return Err(J2kError::InvalidArgumentHeight);
    }
    let components = frame_info.component_count as usize;
    if !(MINIMUM_COMPONENT_COUNT..=MAXIMUM_COMPONENT_COUNT).contains(&components) {
        return Err(J2kError::InvalidArgumentComponentCount);
    }
    if !(MINIMUM_BITS_PER_SAMPLE..=MAXIMUM_ENCODE_BITS_PER_SAMPLE).contains(&frame_info.bits_per_sample) {
        return Err(J2kError::InvalidArgumentBitsPerSample);
    }
    let expected = (frame_info.width as usize)
        .checked_mul(frame_info.height as usize)
        .and_then(|n| n.checked_mul(components));
    if expected != Some(pixels.len()) {
        return Err(J2kError::InvalidArgumentSampleBufferSize);
    }
    Ok(())
}

/// Orientation of the subband at arena index `index`.
fn band_of(index: usize) -> SubbandOrientation {
    if index == 0 {
        SubbandOrientation::LL
    } else {
        SubbandOrientation::DETAIL[(index - 1) % 3]
    }
}

/// De-interleaves the samples into level-shifted planes and applies the
/// colour transform.
fn component_planes(pixels: &[u8], frame_info: &FrameInfo, coding: &CodingParameters) -> Vec<Vec<f32>> {
    let components = frame_info.component_count as usize;
    let depth = frame_info.bits_per_sample;
    let maximum = ((1u32 << depth) - 1) as u8;
    let shift = (1u32 << (depth - 1)) as f32;

    let mut planes: Vec<Vec<f32>> = (0..components)
        .map(|c| {
            pixels
                .iter()
                .skip(c)
                .step_by(components)
                .map(|&sample| sample.min(maximum) as f32 - shift)
                .collect()
        })
        .collect();

    if coding.use_mct {
        let (first, rest) = planes.split_at_mut(1);
        let (second, third) = rest.split_at_mut(1);
        mct::forward(coding.wavelet, &mut first[0], &mut second[0], &mut third[0]);
    }
    planes
}

fn quantize_tile_component(
    frame: &Frame,
    plane: &[f32],
    tile: usize,
    component: usize,
    coding: &CodingParameters,
    steps: &[f32],
) -> Result<TileComponent, J2kError> {
    let tc = frame
        .tile_component_rect(tile, component)
        .ok_or(J2kError::InvalidGeometry)?;
    let (width, height) = (tc.width() as usize, tc.height() as usize);
    let stride = frame.width as usize;

    let mut buffer = Vec::with_capacity(width * height);
    for y in tc.y0..tc.y1 {
        let start = y as usize * stride + tc.x0 as usize;
        buffer.extend_from_slice(&plane[start..start + width]);
    }
    forward_2d_at(
        &mut buffer,
        width,
        height,
        tc.x0,
        tc.y0,
        coding.decomposition_levels,
        coding.wavelet,
    );

    let tier2 = Tier2Output::new(
        tc,
        coding.decomposition_levels,
        coding.codeblock_width(),
        coding.codeblock_height(),
    );
    let blocks = tier2
        .subbands
        .iter()
        .zip(steps)
        .map(|(band, &step)| {
            band.subband
                .grid
                .blocks()
                .map(|rect| {
                    let (x, y) = band.subband.block_origin(rect);
                    CodeBlock::from_coefficients(
                        &buffer,
                        width,
                        x,
                        y,
                        rect.width() as usize,
                        rect.height() as usize,
                        step,
                    )
                })
                .collect()
        })
        .collect();
    Ok(TileComponent { tier2, blocks })
}

/// Picks exponents and guard bits so that every band's M_b covers its
/// coded magnitudes. Blocks that still do not fit are saturated.
fn choose_quantization(
    tiles: &mut [Vec<TileComponent>],
    coding: &CodingParameters,
    depth: u8,
    signalled: Vec<StepSize>,
) -> QuantizationParameters {
    let count = subband_count(coding.decomposition_levels);
    let mut needed = vec![0u32; count];
    for tile_component in tiles.iter().flatten() {
        for (i, blocks) in tile_component.blocks.iter().enumerate() {
            for block in blocks {
                needed[i] = needed[i].max(block.num_bit_planes());
            }
        }
    }

    let quantization = if coding.is_reversible() {
        let guard_bits = DEFAULT_GUARD_BITS;
        let steps = needed
            .iter()
            .enumerate()
            .map(|(i, &planes)| {
                let nominal = depth + log2_gain(band_of(i));
                let required = (planes + 1).saturating_sub(guard_bits as u32).min(31) as u8;
                StepSize::reversible(nominal.max(required))
            })
            .collect();
        QuantizationParameters {
            style: QuantizationStyle::NoQuantization,
            guard_bits,
            steps,
        }
    } else {
        let guard_bits = needed
            .iter()
            .zip(&signalled)
            .filter(|(planes, _)| **planes > 0)
            .map(|(&planes, step)| (planes + 1).saturating_sub(step.exponent as u32))
            .max()
            .unwrap_or(0)
            .clamp(DEFAULT_GUARD_BITS as u32, MAXIMUM_GUARD_BITS as u32) as u8;
        QuantizationParameters {
            style: QuantizationStyle::ScalarExpounded,
            guard_bits,
            steps: signalled,
        }
    };

    for (i, &planes) in needed.iter().enumerate() {
        let limit = quantization.steps[i].bit_planes(quantization.guard_bits);
        if planes <= limit {
            continue;
        }
        let clipped: usize = tiles
            .iter_mut()
            .flatten()
            .flat_map(|tile_component| tile_component.blocks[i].iter_mut())
            .map(|block| block.saturate(limit))
            .sum();
        warn!(
            "subband {} needs {} bit-planes but only {} can be signalled; {} coefficient(s) saturated",
            i, planes, limit, clipped
        );
    }
    debug!(
        "quantization: {:?}, {} guard bits, {} steps",
        quantization.style,
        quantization.guard_bits,
        quantization.steps.len()
    );
    quantization
}

/// Runs tier-1 on every block and splits the result into layers.
fn code_blocks(tiles: &mut [Vec<TileComponent>], quantization: &QuantizationParameters, layers: u16) {
    for tile_component in tiles.iter_mut().flatten() {
        let bands = tile_component
            .tier2
            .subbands
            .iter_mut()
            .zip(tile_component.blocks.iter_mut());
        for (i, (band, blocks)) in bands.enumerate() {
            let max_planes = quantization.steps[i].bit_planes(quantization.guard_bits);
            let orientation = band.subband.orientation;
            for (bitstream, block) in band.blocks.iter_mut().zip(blocks.iter_mut()) {
                let encoded = encode_code_block(block, orientation);
                let zero_bit_planes = max_planes.saturating_sub(encoded.bit_planes);
                trace!(
                    "r={} {:?} block {:?}: {} planes, {} passes, {} bytes",
                    band.subband.resolution,
                    orientation,
                    bitstream.rect,
                    encoded.bit_planes,
                    encoded.passes,
                    encoded.data.len()
                );
                bitstream.zero_bit_planes = zero_bit_planes;
                bitstream.layers = distribute_layers(
                    &encoded.data,
                    encoded.passes,
                    &encoded.pass_rates,
                    zero_bit_planes,
                    layers,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::parser::parse;

    fn gray(width: u32, height: u32) -> (Vec<u8>, FrameInfo) {
        let pixels = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        let info = FrameInfo {
            width,
            height,
            bits_per_sample: 8,
            component_count: 1,
        };
        (pixels, info)
    }

    #[test]
    fn test_quality_is_clamped() {
        let mut encoder = J2kEncoder::new();
        encoder.set_quality(0);
        assert_eq!(encoder.quality(), 1);
        encoder.set_quality(250);
        assert_eq!(encoder.quality(), 100);
    }

    #[test]
    fn test_invalid_arguments() {
        let (pixels, info) = gray(8, 8);
        let encoder = J2kEncoder::new();

        let zero_width = FrameInfo { width: 0, ..info };
        assert_eq!(encoder.encode(&pixels, &zero_width), Err(J2kError::InvalidArgumentWidth));
        let deep = FrameInfo {
            bits_per_sample: 9,
            ..info
        };
        assert_eq!(encoder.encode(&pixels, &deep), Err(J2kError::InvalidArgumentBitsPerSample));
        let no_components = FrameInfo {
            component_count: 0,
            ..info
        };
        assert_eq!(
            encoder.encode(&pixels, &no_components),
            Err(J2kError::InvalidArgumentComponentCount)
        );
        assert_eq!(
            encoder.encode(&pixels[1..], &info),
            Err(J2kError::InvalidArgumentSampleBufferSize)
        );

        let mut levels = J2kEncoder::new();
        levels.set_decomposition_levels(33);
        assert_eq!(levels.encode(&pixels, &info), Err(J2kError::InvalidArgumentDecompositionLevels));

        let mut layers = J2kEncoder::new();
        layers.set_layer_count(0);
        assert_eq!(layers.encode(&pixels, &info), Err(J2kError::InvalidArgumentLayerCount));

        let mut blocks = J2kEncoder::new();
        blocks.set_codeblock_size(48, 64);
        assert_eq!(blocks.encode(&pixels, &info), Err(J2kError::InvalidArgumentCodeBlockSize));
        blocks.set_codeblock_size(128, 64);
        assert_eq!(blocks.encode(&pixels, &info), Err(J2kError::InvalidArgumentCodeBlockSize));

        let mut tiles = J2kEncoder::new();
        tiles.set_tile_size(0, 8);
        assert_eq!(tiles.encode(&pixels, &info), Err(J2kError::InvalidArgumentTileSize));
    }

    #[test]
    fn test_lossless_header() {
        let (pixels, info) = gray(24, 20);
        let mut encoder = J2kEncoder::new();
        encoder.set_decomposition_levels(2);
        encoder.set_comment(b"test");
        let codestream = parse(&encoder.encode(&pixels, &info).unwrap()).unwrap();

        assert_eq!(codestream.coding.wavelet, WaveletKind::Reversible53);
        assert!(!codestream.coding.use_mct);
        assert_eq!(codestream.quantization.style, QuantizationStyle::NoQuantization);
        assert_eq!(codestream.quantization.guard_bits, DEFAULT_GUARD_BITS);
        assert_eq!(codestream.quantization.steps.len(), 7);
        // Nominal exponents are precision plus the band gain.
        assert_eq!(codestream.quantization.steps[0].exponent, 8);
        assert!(codestream.quantization.steps[3].exponent >= 10);
        assert_eq!(codestream.comments, vec![b"test".to_vec()]);
        assert_eq!(codestream.tiles.len(), 1);
    }

    #[test]
    fn test_lossy_header_and_tiles() {
        let pixels: Vec<u8> = (0..40 * 30 * 3).map(|i| (i % 251) as u8).collect();
        let info = FrameInfo {
            width: 40,
            height: 30,
            bits_per_sample: 8,
            component_count: 3,
        };
        let mut encoder = J2kEncoder::new();
        encoder.set_lossy(true);
        encoder.set_quality(60);
        encoder.set_decomposition_levels(3);
        encoder.set_tile_size(16, 16);
        let codestream = parse(&encoder.encode(&pixels, &info).unwrap()).unwrap();

        assert_eq!(codestream.coding.wavelet, WaveletKind::Irreversible97);
        assert!(codestream.coding.use_mct);
        assert_eq!(codestream.quantization.style, QuantizationStyle::ScalarExpounded);
        assert_eq!(codestream.quantization.steps.len(), 10);
        // Arena order runs from the coarsest bands to the finest.
        let steps = &codestream.quantization.steps;
        for (coarse, fine) in [(1, 7), (2, 8), (3, 9), (1, 4), (4, 7)] {
            let rb = 8 + log2_gain(band_of(coarse));
            assert!(steps[coarse].to_step(rb) > steps[fine].to_step(rb), "band {coarse} vs {fine}");
        }
        assert!((DEFAULT_GUARD_BITS..=MAXIMUM_GUARD_BITS).contains(&codestream.quantization.guard_bits));
        assert_eq!(codestream.tiles.len(), 6);
        assert!(codestream.tiles.iter().all(|tile| !tile.data.is_empty()));
    }

    #[test]
    fn test_sop_markers_are_numbered() {
        let (pixels, info) = gray(16, 16);
        let mut encoder = J2kEncoder::new();
        encoder.set_decomposition_levels(1);
        encoder.set_layer_count(2);
        encoder.set_sop(true);
        let codestream = parse(&encoder.encode(&pixels, &info).unwrap()).unwrap();
        let data = &codestream.tiles[0].data;
        assert_eq!(&data[..6], &[0xFF, 0x91, 0x00, 0x04, 0x00, 0x00]);
        let count = data.windows(4).filter(|w| w[0] == 0xFF && w[1] == 0x91 && w[3] == 0x04).count();
        assert_eq!(count, 4);
    }
}
