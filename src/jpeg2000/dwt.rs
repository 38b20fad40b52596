//! Discrete Wavelet Transforms for JPEG 2000 (ISO/IEC 15444-1 Annex F)
//!
//! Both filters run as lifting steps over an interleaved 1D signal with
//! whole-sample symmetric extension. A signal starting at an odd absolute
//! coordinate has its high-pass samples on the even slice positions, which
//! is how tiles and images with odd origins keep the standard's parity.
//!
//! The 2D transforms work in place on a row-major buffer: every level splits
//! the active region into `[low | high]` along rows and then columns, and
//! the next level continues on the top-left (LL) quadrant.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Wavelet filter, as signalled in the COD transformation byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum WaveletKind {
    Irreversible97 = 0,
    Reversible53 = 1,
}

impl WaveletKind {
    pub fn is_reversible(self) -> bool {
        self == WaveletKind::Reversible53
    }
}

// Symmetric extension: index -1 maps to 1, index n maps to n - 2.
#[inline]
fn mirror(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut i = i.rem_euclid(period);
    if i >= n as isize {
        i = period - i;
    }
    i as usize
}

#[inline]
fn neighbours(x: &[f32], k: usize) -> f32 {
    let n = x.len();
    x[mirror(k as isize - 1, n)] + x[mirror(k as isize + 1, n)]
}

/// Applies `step` to every position of the given parity class.
#[inline]
fn lift(x: &mut [f32], first: usize, step: impl Fn(f32, f32) -> f32) {
    let mut k = first;
    while k < x.len() {
        let sum = neighbours(x, k);
        x[k] = step(x[k], sum);
        k += 2;
    }
}

pub struct Dwt53;

impl Dwt53 {
    /// Forward 5/3 lifting (F.4.8.1) on an interleaved signal.
    /// `odd_start` is true when the first sample has an odd coordinate.
    pub fn forward(x: &mut [f32], odd_start: bool) {
        if x.len() == 1 {
            if odd_start {
                x[0] *= 2.0;
            }
            return;
        }
        let (low, high) = parity_offsets(odd_start);
        lift(x, high, |v, s| v - (s / 2.0).floor());
        lift(x, low, |v, s| v + ((s + 2.0) / 4.0).floor());
    }

    pub fn inverse(x: &mut [f32], odd_start: bool) {
        if x.len() == 1 {
            if odd_start {
                x[0] /= 2.0;
            }
            return;
        }
        let (low, high) = parity_offsets(odd_start);
        lift(x, low, |v, s| v - ((s + 2.0) / 4.0).floor());
        lift(x, high, |v, s| v + (s / 2.0).floor());
    }
}

pub struct Dwt97;

impl Dwt97 {
    const ALPHA: f32 = -1.586_134_3;
    const BETA: f32 = -0.052_980_12;
    const GAMMA: f32 = 0.882_911_1;
    const DELTA: f32 = 0.443_506_87;
    const K: f32 = 1.230_174_1;
    const INV_K: f32 = 1.0 / 1.230_174_1;

    /// Forward 9/7 lifting (F.4.8.2) on an interleaved signal.
    pub fn forward(x: &mut [f32], odd_start: bool) {
        if x.len() == 1 {
            if odd_start {
                x[0] *= 2.0;
            }
            return;
        }
        let (low, high) = parity_offsets(odd_start);
        lift(x, high, |v, s| v + Self::ALPHA * s);
        lift(x, low, |v, s| v + Self::BETA * s);
        lift(x, high, |v, s| v + Self::GAMMA * s);
        lift(x, low, |v, s| v + Self::DELTA * s);
        scale(x, low, Self::INV_K);
        scale(x, high, Self::K);
    }

    pub fn inverse(x: &mut [f32], odd_start: bool) {
        if x.len() == 1 {
            if odd_start {
                x[0] /= 2.0;
            }
            return;
        }
        let (low, high) = parity_offsets(odd_start);
        scale(x, low, Self::K);
        scale(x, high, Self::INV_K);
        lift(x, low, |v, s| v - Self::DELTA * s);
        lift(x, high, |v, s| v - Self::GAMMA * s);
        lift(x, low, |v, s| v - Self::BETA * s);
        lift(x, high, |v, s| v - Self::ALPHA * s);
    }
}

#[inline]
fn parity_offsets(odd_start: bool) -> (usize, usize) {
    if odd_start { (1, 0) } else { (0, 1) }
}

fn scale(x: &mut [f32], first: usize, factor: f32) {
    x.iter_mut().skip(first).step_by(2).for_each(|v| *v *= factor);
}

fn forward_1d(kind: WaveletKind, x: &mut [f32], odd_start: bool) {
    match kind {
        WaveletKind::Reversible53 => Dwt53::forward(x, odd_start),
        WaveletKind::Irreversible97 => Dwt97::forward(x, odd_start),
    }
}

fn inverse_1d(kind: WaveletKind, x: &mut [f32], odd_start: bool) {
    match kind {
        WaveletKind::Reversible53 => Dwt53::inverse(x, odd_start),
        WaveletKind::Irreversible97 => Dwt97::inverse(x, odd_start),
    }
}

/// Moves low-pass samples to the front of `out` and high-pass samples after.
fn deinterleave(src: &[f32], out: &mut [f32], odd_start: bool) {
    let (low, high) = parity_offsets(odd_start);
    let mut n = 0;
    for k in (low..src.len()).step_by(2) {
        out[n] = src[k];
        n += 1;
    }
    for k in (high..src.len()).step_by(2) {
        out[n] = src[k];
        n += 1;
    }
}

fn interleave(src: &[f32], out: &mut [f32], odd_start: bool) {
    let (low, high) = parity_offsets(odd_start);
    let mut n = 0;
    for k in (low..out.len()).step_by(2) {
        out[k] = src[n];
        n += 1;
    }
    for k in (high..out.len()).step_by(2) {
        out[k] = src[n];
        n += 1;
    }
}

/// Extent `[ceil(a0 / 2^level), ceil(a1 / 2^level))` of a region after
/// `level` decompositions.
#[inline]
pub fn level_extent(a0: u32, a1: u32, level: u32) -> (u32, u32) {
    let d = 1u64 << level;
    (
        (a0 as u64).div_ceil(d) as u32,
        (a1 as u64).div_ceil(d) as u32,
    )
}

/// Forward 2D DWT of a `width × height` buffer anchored at the origin.
pub fn forward_2d(buffer: &mut [f32], width: usize, height: usize, levels: u8, kind: WaveletKind) {
    forward_2d_at(buffer, width, height, 0, 0, levels, kind);
}

pub fn inverse_2d(buffer: &mut [f32], width: usize, height: usize, levels: u8, kind: WaveletKind) {
    inverse_2d_at(buffer, width, height, 0, 0, levels, kind);
}

/// Forward 2D DWT of a tile-component whose top-left sample sits at
/// `(x0, y0)` on the component grid.
pub fn forward_2d_at(
    buffer: &mut [f32],
    width: usize,
    height: usize,
    x0: u32,
    y0: u32,
    levels: u8,
    kind: WaveletKind,
) {
    debug_assert!(buffer.len() >= width * height);
    let mut line = vec![0.0f32; width.max(height)];
    let mut scratch = vec![0.0f32; width.max(height)];

    for level in 0..levels as u32 {
        let (u0, u1) = level_extent(x0, x0 + width as u32, level);
        let (v0, v1) = level_extent(y0, y0 + height as u32, level);
        let (rw, rh) = ((u1 - u0) as usize, (v1 - v0) as usize);
        if rw == 0 || rh == 0 {
            break;
        }
        let odd_x = u0 % 2 == 1;
        let odd_y = v0 % 2 == 1;

        for y in 0..rh {
            let row = &mut buffer[y * width..y * width + rw];
            line[..rw].copy_from_slice(row);
            forward_1d(kind, &mut line[..rw], odd_x);
            deinterleave(&line[..rw], &mut scratch[..rw], odd_x);
            row.copy_from_slice(&scratch[..rw]);
        }

        for x in 0..rw {
            for y in 0..rh {
                line[y] = buffer[y * width + x];
            }
            forward_1d(kind, &mut line[..rh], odd_y);
            deinterleave(&line[..rh], &mut scratch[..rh], odd_y);
            for y in 0..rh {
                buffer[y * width + x] = scratch[y];
            }
        }
    }
}

pub fn inverse_2d_at(
    buffer: &mut [f32],
    width: usize,
    height: usize,
    x0: u32,
    y0: u32,
    levels: u8,
    kind: WaveletKind,
) {
    debug_assert!(buffer.len() >= width * height);
    let mut line = vec![0.0f32; width.max(height)];
    let mut scratch = vec![0.0f32; width.max(height)];

    for level in (0..levels as u32).rev() {
        let (u0, u1) = level_extent(x0, x0 + width as u32, level);
        let (v0, v1) = level_extent(y0, y0 + height as u32, level);
        let (rw, rh) = ((u1 - u0) as usize, (v1 - v0) as usize);
        if rw == 0 || rh == 0 {
            continue;
        }
        let odd_x = u0 % 2 == 1;
        let odd_y = v0 % 2 == 1;

        for x in 0..rw {
            for y in 0..rh {
                scratch[y] = buffer[y * width + x];
            }
            interleave(&scratch[..rh], &mut line[..rh], odd_y);
            inverse_1d(kind, &mut line[..rh], odd_y);
            for y in 0..rh {
                buffer[y * width + x] = line[y];
            }
        }

        for y in 0..rh {
            let row = &mut buffer[y * width..y * width + rw];
            interleave(row, &mut line[..rw], odd_x);
            inverse_1d(kind, &mut line[..rw], odd_x);
            row.copy_from_slice(&line[..rw]);
        }
    }
}
