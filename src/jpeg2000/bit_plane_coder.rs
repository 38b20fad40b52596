//! EBCOT tier-1 coding (ISO/IEC 15444-1 Annex D).
//!
//! A code-block is coded bit-plane by bit-plane, most significant first. The
//! first plane gets a single cleanup pass; every later plane gets a
//! significance propagation, a magnitude refinement and a cleanup pass.
//! Coefficients are scanned in stripes of four rows, column by column.
//!
//! Context labels: 0..=8 zero coding, 9..=13 sign coding, 14..=16
//! refinement, 17 run-length, 18 uniform.

use super::codeblock::CodeBlock;
use super::image::SubbandOrientation;
use super::mq_coder::{MqDecoder, MqEncoder};
use crate::error::J2kError;
use log::trace;

pub const CONTEXT_COUNT: usize = 19;
const CX_SIGN: usize = 9;
const CX_REFINE_FIRST: usize = 14;
const CX_REFINE_FIRST_ACTIVE: usize = 15;
const CX_REFINE_LATER: usize = 16;
const CX_RUN: usize = 17;
const CX_UNIFORM: usize = 18;

const SIG: u8 = 1 << 0;
const VISIT: u8 = 1 << 1;
const REFINE: u8 = 1 << 2;
const NEG: u8 = 1 << 3;

const STRIPE_HEIGHT: usize = 4;

// Magnitudes are u32, and one plane is reserved for midpoint reconstruction.
const MAXIMUM_BIT_PLANES: u32 = 31;

fn initial_state(cx: usize) -> u8 {
    match cx {
        0 => 4,
        CX_RUN => 3,
        CX_UNIFORM => 46,
        _ => 0,
    }
}

/// Number of coding passes for a block with `bit_planes` magnitude planes.
pub fn pass_count(bit_planes: u32) -> u32 {
    if bit_planes == 0 { 0 } else { 3 * bit_planes - 2 }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PassKind {
    Significance,
    Refinement,
    Cleanup,
}

/// Bit-plane and kind of pass `index` in a block with `bit_planes` planes.
fn pass_at(index: u32, bit_planes: u32) -> (u32, PassKind) {
    let plane = bit_planes - 1 - (index + 2) / 3;
    let kind = match (index + 2) % 3 {
        0 => PassKind::Significance,
        1 => PassKind::Refinement,
        _ => PassKind::Cleanup,
    };
    (plane, kind)
}

// Neighbourhood lookups on the padded state array.

#[inline]
fn is_sig(state: &[u8], s: usize) -> u8 {
    state[s] & SIG
}

/// Significant (horizontal, vertical, diagonal) neighbours.
#[inline]
fn neighbours(state: &[u8], s: usize, stride: usize) -> (u8, u8, u8) {
    let h = is_sig(state, s - 1) + is_sig(state, s + 1);
    let v = is_sig(state, s - stride) + is_sig(state, s + stride);
    let d = is_sig(state, s - stride - 1)
        + is_sig(state, s - stride + 1)
        + is_sig(state, s + stride - 1)
        + is_sig(state, s + stride + 1);
    (h, v, d)
}

/// Zero-coding context (Table D.1).
fn zero_context(band: SubbandOrientation, h: u8, v: u8, d: u8) -> usize {
    match band {
        SubbandOrientation::LL | SubbandOrientation::LH => zero_context_ll(h, v, d),
        SubbandOrientation::HL => zero_context_ll(v, h, d),
        SubbandOrientation::HH => match (d, h + v) {
            (d, _) if d >= 3 => 8,
            (2, hv) if hv >= 1 => 7,
            (2, _) => 6,
            (1, hv) if hv >= 2 => 5,
            (1, 1) => 4,
            (1, _) => 3,
            (_, hv) if hv >= 2 => 2,
            (_, 1) => 1,
            _ => 0,
        },
    }
}

fn zero_context_ll(h: u8, v: u8, d: u8) -> usize {
    match (h, v, d) {
        (2, _, _) => 8,
        (1, v, _) if v >= 1 => 7,
        (1, 0, d) if d >= 1 => 6,
        (1, _, _) => 5,
        (0, 2, _) => 4,
        (0, 1, _) => 3,
        (0, 0, d) if d >= 2 => 2,
        (0, 0, 1) => 1,
        _ => 0,
    }
}

#[inline]
fn sign_contribution(state: &[u8], s: usize) -> i8 {
    match state[s] & (SIG | NEG) {
        SIG => 1,
        x if x == SIG | NEG => -1,
        _ => 0,
    }
}

/// Sign-coding context and XOR bit (Tables D.2 and D.3).
fn sign_context(state: &[u8], s: usize, stride: usize) -> (usize, u8) {
    let h = (sign_contribution(state, s - 1) + sign_contribution(state, s + 1)).clamp(-1, 1);
    let v = (sign_contribution(state, s - stride) + sign_contribution(state, s + stride)).clamp(-1, 1);
    let (offset, xor) = match (h, v) {
        (1, 1) => (4, 0),
        (1, 0) => (3, 0),
        (1, _) => (2, 0),
        (0, 1) => (1, 0),
        (0, 0) => (0, 0),
        (0, _) => (1, 1),
        (_, 1) => (2, 1),
        (_, 0) => (3, 1),
        _ => (4, 1),
    };
    (CX_SIGN + offset, xor)
}

fn refinement_context(state: &[u8], s: usize, stride: usize) -> usize {
    if state[s] & REFINE != 0 {
        CX_REFINE_LATER
    } else {
        let (h, v, d) = neighbours(state, s, stride);
        if h + v + d > 0 {
            CX_REFINE_FIRST_ACTIVE
        } else {
            CX_REFINE_FIRST
        }
    }
}

/// Output of tier-1 coding for one code-block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedCodeBlock {
    /// Terminated MQ codeword.
    pub data: Vec<u8>,
    pub bit_planes: u32,
    pub passes: u32,
    /// Byte length needed to decode passes `0..=k`, non-decreasing, the last
    /// entry equal to `data.len()`.
    pub pass_rates: Vec<usize>,
}

struct BitPlaneEncoder<'a> {
    block: &'a mut CodeBlock,
    band: SubbandOrientation,
    stride: usize,
    mq: MqEncoder,
}

impl<'a> BitPlaneEncoder<'a> {
    fn new(block: &'a mut CodeBlock, band: SubbandOrientation) -> Self {
        block.reset_state();
        let stride = block.width + 2;
        let mut mq = MqEncoder::new(CONTEXT_COUNT);
        for cx in 0..CONTEXT_COUNT {
            mq.set_context(cx, initial_state(cx), 0);
        }
        Self {
            block,
            band,
            stride,
            mq,
        }
    }

    #[inline]
    fn bit(&self, i: usize, plane: u32) -> u8 {
        ((self.block.magnitudes[i] >> plane) & 1) as u8
    }

    fn encode_sign(&mut self, i: usize, s: usize) {
        let (cx, xor) = sign_context(&self.block.state, s, self.stride);
        let negative = self.block.negative[i] as u8;
        self.mq.encode(cx, negative ^ xor);
        self.block.state[s] |= SIG | if negative == 1 { NEG } else { 0 };
    }

    fn significance_pass(&mut self, plane: u32) {
        let (w, h) = (self.block.width, self.block.height);
        for y0 in (0..h).step_by(STRIPE_HEIGHT) {
            for x in 0..w {
                for y in y0..(y0 + STRIPE_HEIGHT).min(h) {
                    let (i, s) = (y * w + x, (y + 1) * self.stride + x + 1);
                    if self.block.state[s] & SIG != 0 {
                        continue;
                    }
                    let (nh, nv, nd) = neighbours(&self.block.state, s, self.stride);
                    if nh + nv + nd == 0 {
                        continue;
                    }
                    let bit = self.bit(i, plane);
                    self.mq.encode(zero_context(self.band, nh, nv, nd), bit);
                    self.block.state[s] |= VISIT;
                    if bit == 1 {
                        self.encode_sign(i, s);
                    }
                }
            }
        }
    }

    fn refinement_pass(&mut self, plane: u32) {
        let (w, h) = (self.block.width, self.block.height);
        for y0 in (0..h).step_by(STRIPE_HEIGHT) {
            for x in 0..w {
                for y in y0..(y0 + STRIPE_HEIGHT).min(h) {
                    let (i, s) = (y * w + x, (y + 1) * self.stride + x + 1);
                    if self.block.state[s] & (SIG | VISIT) != SIG {
                        continue;
                    }
                    let cx = refinement_context(&self.block.state, s, self.stride);
                    let bit = self.bit(i, plane);
                    self.mq.encode(cx, bit);
                    self.block.state[s] |= REFINE;
                }
            }
        }
    }

    fn cleanup_pass(&mut self, plane: u32) {
        let (w, h) = (self.block.width, self.block.height);
        for y0 in (0..h).step_by(STRIPE_HEIGHT) {
            let rows = (h - y0).min(STRIPE_HEIGHT);
            for x in 0..w {
                let mut first_row = y0;
                if rows == STRIPE_HEIGHT && self.column_is_quiet(x, y0) {
                    let hit = (0..STRIPE_HEIGHT).find(|&r| self.bit((y0 + r) * w + x, plane) == 1);
                    let Some(r) = hit else {
                        self.mq.encode(CX_RUN, 0);
                        continue;
                    };
                    self.mq.encode(CX_RUN, 1);
                    self.mq.encode(CX_UNIFORM, (r >> 1) as u8);
                    self.mq.encode(CX_UNIFORM, (r & 1) as u8);
                    let y = y0 + r;
                    self.encode_sign(y * w + x, (y + 1) * self.stride + x + 1);
                    first_row = y + 1;
                }
                for y in first_row..y0 + rows {
                    let (i, s) = (y * w + x, (y + 1) * self.stride + x + 1);
                    if self.block.state[s] & (SIG | VISIT) != 0 {
                        continue;
                    }
                    let (nh, nv, nd) = neighbours(&self.block.state, s, self.stride);
                    let bit = self.bit(i, plane);
                    self.mq.encode(zero_context(self.band, nh, nv, nd), bit);
                    if bit == 1 {
                        self.encode_sign(i, s);
                    }
                }
            }
        }
        self.block.state.iter_mut().for_each(|f| *f &= !VISIT);
    }

    fn column_is_quiet(&self, x: usize, y0: usize) -> bool {
        (y0..y0 + STRIPE_HEIGHT).all(|y| {
            let s = (y + 1) * self.stride + x + 1;
            let (nh, nv, nd) = neighbours(&self.block.state, s, self.stride);
            self.block.state[s] & (SIG | VISIT) == 0 && nh + nv + nd == 0
        })
    }
}

/// Codes every bit-plane of `block` into a single terminated MQ codeword.
pub fn encode_code_block(block: &mut CodeBlock, band: SubbandOrientation) -> EncodedCodeBlock {
    let bit_planes = block.num_bit_planes();
    if bit_planes == 0 {
        return EncodedCodeBlock::default();
    }

    let mut coder = BitPlaneEncoder::new(block, band);
    let mut rates = Vec::with_capacity(pass_count(bit_planes) as usize);
    for plane in (0..bit_planes).rev() {
        if plane != bit_planes - 1 {
            coder.significance_pass(plane);
            rates.push(coder.mq.num_bytes());
            coder.refinement_pass(plane);
            rates.push(coder.mq.num_bytes());
        }
        coder.cleanup_pass(plane);
        rates.push(coder.mq.num_bytes());
    }
    let data = coder.mq.flush();

    // Count the bytes still held in the coder registers toward each pass.
    let mut floor = 0;
    for rate in rates.iter_mut() {
        *rate = (*rate + 3).min(data.len()).max(floor);
        floor = *rate;
    }
    if let Some(last) = rates.last_mut() {
        *last = data.len();
    }

    trace!(
        "tier-1 encode {}x{} {:?}: {} planes, {} bytes",
        block.width,
        block.height,
        band,
        bit_planes,
        data.len()
    );
    EncodedCodeBlock {
        data,
        bit_planes,
        passes: rates.len() as u32,
        pass_rates: rates,
    }
}

struct BitPlaneDecoder<'a, 'b> {
    block: &'b mut CodeBlock,
    band: SubbandOrientation,
    stride: usize,
    mq: MqDecoder<'a>,
}

impl<'a, 'b> BitPlaneDecoder<'a, 'b> {
    fn new(data: &'a [u8], block: &'b mut CodeBlock, band: SubbandOrientation) -> Self {
        let stride = block.width + 2;
        let mut mq = MqDecoder::new(data, CONTEXT_COUNT);
        for cx in 0..CONTEXT_COUNT {
            mq.set_context(cx, initial_state(cx), 0);
        }
        Self {
            block,
            band,
            stride,
            mq,
        }
    }

    fn decode_sign(&mut self, i: usize, s: usize, plane: u32) {
        let (cx, xor) = sign_context(&self.block.state, s, self.stride);
        let negative = self.mq.decode(cx) ^ xor;
        self.block.negative[i] = negative == 1;
        self.block.magnitudes[i] = 1 << plane;
        self.block.lowest_plane[i] = plane as u8;
        self.block.state[s] |= SIG | if negative == 1 { NEG } else { 0 };
    }

    fn significance_pass(&mut self, plane: u32) {
        let (w, h) = (self.block.width, self.block.height);
        for y0 in (0..h).step_by(STRIPE_HEIGHT) {
            for x in 0..w {
                for y in y0..(y0 + STRIPE_HEIGHT).min(h) {
                    let (i, s) = (y * w + x, (y + 1) * self.stride + x + 1);
                    if self.block.state[s] & SIG != 0 {
                        continue;
                    }
                    let (nh, nv, nd) = neighbours(&self.block.state, s, self.stride);
                    if nh + nv + nd == 0 {
                        continue;
                    }
                    self.block.state[s] |= VISIT;
                    if self.mq.decode(zero_context(self.band, nh, nv, nd)) == 1 {
                        self.decode_sign(i, s, plane);
                    }
                }
            }
        }
    }

    fn refinement_pass(&mut self, plane: u32) {
        let (w, h) = (self.block.width, self.block.height);
        for y0 in (0..h).step_by(STRIPE_HEIGHT) {
            for x in 0..w {
                for y in y0..(y0 + STRIPE_HEIGHT).min(h) {
                    let (i, s) = (y * w + x, (y + 1) * self.stride + x + 1);
                    if self.block.state[s] & (SIG | VISIT) != SIG {
                        continue;
                    }
                    let cx = refinement_context(&self.block.state, s, self.stride);
                    let bit = self.mq.decode(cx) as u32;
                    self.block.magnitudes[i] |= bit << plane;
                    self.block.lowest_plane[i] = plane as u8;
                    self.block.state[s] |= REFINE;
                }
            }
        }
    }

    fn cleanup_pass(&mut self, plane: u32) {
        let (w, h) = (self.block.width, self.block.height);
        for y0 in (0..h).step_by(STRIPE_HEIGHT) {
            let rows = (h - y0).min(STRIPE_HEIGHT);
            for x in 0..w {
                let mut first_row = y0;
                if rows == STRIPE_HEIGHT && self.column_is_quiet(x, y0) {
                    if self.mq.decode(CX_RUN) == 0 {
                        continue;
                    }
                    let r = ((self.mq.decode(CX_UNIFORM) << 1) | self.mq.decode(CX_UNIFORM)) as usize;
                    let y = y0 + r;
                    self.decode_sign(y * w + x, (y + 1) * self.stride + x + 1, plane);
                    first_row = y + 1;
                }
                for y in first_row..y0 + rows {
                    let (i, s) = (y * w + x, (y + 1) * self.stride + x + 1);
                    if self.block.state[s] & (SIG | VISIT) != 0 {
                        continue;
                    }
                    let (nh, nv, nd) = neighbours(&self.block.state, s, self.stride);
                    if self.mq.decode(zero_context(self.band, nh, nv, nd)) == 1 {
                        self.decode_sign(i, s, plane);
                    }
                }
            }
        }
        self.block.state.iter_mut().for_each(|f| *f &= !VISIT);
    }

    fn column_is_quiet(&self, x: usize, y0: usize) -> bool {
        (y0..y0 + STRIPE_HEIGHT).all(|y| {
            let s = (y + 1) * self.stride + x + 1;
            let (nh, nv, nd) = neighbours(&self.block.state, s, self.stride);
            self.block.state[s] & (SIG | VISIT) == 0 && nh + nv + nd == 0
        })
    }
}

/// Decodes the first `passes` coding passes of a block whose most
/// significant coded plane is `bit_planes - 1`. Missing bytes are filled by
/// the MQ decoder, so a short `data` never fails.
pub fn decode_code_block(
    data: &[u8],
    width: usize,
    height: usize,
    band: SubbandOrientation,
    bit_planes: u32,
    passes: u32,
) -> Result<CodeBlock, J2kError> {
    let mut block = CodeBlock::new(width, height);
    if bit_planes == 0 || passes == 0 || block.is_empty() {
        return Ok(block);
    }
    if bit_planes > MAXIMUM_BIT_PLANES {
        return Err(J2kError::UnsupportedFeature("more than 31 magnitude bit-planes"));
    }

    let passes = passes.min(pass_count(bit_planes));
    let mut coder = BitPlaneDecoder::new(data, &mut block, band);
    for index in 0..passes {
        match pass_at(index, bit_planes) {
            (plane, PassKind::Significance) => coder.significance_pass(plane),
            (plane, PassKind::Refinement) => coder.refinement_pass(plane),
            (plane, PassKind::Cleanup) => coder.cleanup_pass(plane),
        }
    }
    trace!(
        "tier-1 decode {width}x{height} {band:?}: {passes} passes from {} bytes",
        data.len()
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_block(width: usize, height: usize, max: u32, seed: u64) -> CodeBlock {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut block = CodeBlock::new(width, height);
        for i in 0..width * height {
            // Mostly small values with a few large ones, like real subbands.
            let m = match rng.u8(..) {
                0..=99 => 0,
                100..=219 => rng.u32(0..8),
                _ => rng.u32(0..=max),
            };
            block.magnitudes[i] = m;
            block.negative[i] = m != 0 && rng.bool();
        }
        block
    }

    #[test]
    fn test_pass_schedule() {
        assert_eq!(pass_count(0), 0);
        assert_eq!(pass_count(1), 1);
        assert_eq!(pass_count(8), 22);
        assert_eq!(pass_at(0, 8), (7, PassKind::Cleanup));
        assert_eq!(pass_at(1, 8), (6, PassKind::Significance));
        assert_eq!(pass_at(2, 8), (6, PassKind::Refinement));
        assert_eq!(pass_at(3, 8), (6, PassKind::Cleanup));
        assert_eq!(pass_at(21, 8), (0, PassKind::Cleanup));
    }

    #[test]
    fn test_zero_context_orientation() {
        // Two horizontal neighbours are the strongest evidence for LL/LH,
        // vertical neighbours play that role for HL.
        assert_eq!(zero_context(SubbandOrientation::LL, 2, 0, 0), 8);
        assert_eq!(zero_context(SubbandOrientation::HL, 2, 0, 0), 4);
        assert_eq!(zero_context(SubbandOrientation::HL, 0, 2, 0), 8);
        assert_eq!(zero_context(SubbandOrientation::HH, 0, 0, 3), 8);
        assert_eq!(zero_context(SubbandOrientation::HH, 2, 2, 0), 2);
        assert_eq!(zero_context(SubbandOrientation::LH, 0, 0, 0), 0);
    }

    #[test]
    fn test_tier1_roundtrip_all_bands() {
        for (seed, band) in SubbandOrientation::ALL.into_iter().enumerate() {
            for &(w, h) in &[(16usize, 16usize), (13, 7), (1, 1), (64, 5), (3, 33)] {
                let original = random_block(w, h, 1000, seed as u64 * 31 + w as u64);
                let mut block = original.clone();
                let encoded = encode_code_block(&mut block, band);
                assert_eq!(encoded.passes, pass_count(original.num_bit_planes()));
                assert_eq!(encoded.pass_rates.last().copied().unwrap_or(0), encoded.data.len());

                let decoded =
                    decode_code_block(&encoded.data, w, h, band, encoded.bit_planes, encoded.passes).unwrap();
                assert_eq!(decoded.magnitudes, original.magnitudes, "{band:?} {w}x{h}");
                assert_eq!(decoded.negative, original.negative, "{band:?} {w}x{h}");
            }
        }
    }

    #[test]
    fn test_all_zero_block_produces_no_passes() {
        let mut block = CodeBlock::new(8, 8);
        let encoded = encode_code_block(&mut block, SubbandOrientation::LL);
        assert_eq!(encoded, EncodedCodeBlock::default());
        let decoded = decode_code_block(&[], 8, 8, SubbandOrientation::LL, 0, 0).unwrap();
        assert!(decoded.magnitudes.iter().all(|&m| m == 0));
    }

    #[test]
    fn test_pass_rates_are_monotonic() {
        let mut block = random_block(32, 32, 255, 7);
        let encoded = encode_code_block(&mut block, SubbandOrientation::HH);
        assert!(encoded.pass_rates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_partial_decode_keeps_high_planes() {
        let original = random_block(16, 16, 255, 11);
        let mut block = original.clone();
        let encoded = encode_code_block(&mut block, SubbandOrientation::LH);
        // Stop after the cleanup pass of the second-lowest plane.
        let passes = encoded.passes - 3;
        let decoded = decode_code_block(
            &encoded.data,
            16,
            16,
            SubbandOrientation::LH,
            encoded.bit_planes,
            passes,
        )
        .unwrap();
        for i in 0..original.len() {
            assert_eq!(decoded.magnitudes[i], original.magnitudes[i] & !1, "coefficient {i}");
            if decoded.magnitudes[i] != 0 {
                assert_eq!(decoded.negative[i], original.negative[i]);
                assert_eq!(decoded.lowest_plane[i], 1);
            }
        }
    }

    #[test]
    fn test_codeword_has_no_markers() {
        let mut block = random_block(32, 32, 4000, 3);
        let encoded = encode_code_block(&mut block, SubbandOrientation::HL);
        for pair in encoded.data.windows(2) {
            assert!(!(pair[0] == 0xFF && pair[1] > 0x8F));
        }
    }
}
