//! Multi-component transforms (ISO/IEC 15444-1 Annex G) on the first three
//! components of a tile, after DC level shifting.

use super::dwt::WaveletKind;

/// Forward reversible colour transform (G.2). Inputs must hold integers.
pub fn forward_rct(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    for ((r, g), b) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = ((red + 2.0 * green + blue) / 4.0).floor();
        *g = blue - green;
        *b = red - green;
    }
}

pub fn inverse_rct(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    for ((y, cb), cr) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let green = *y - ((*cb + *cr) / 4.0).floor();
        let red = *cr + green;
        let blue = *cb + green;
        *y = red;
        *cb = green;
        *cr = blue;
    }
}

/// Forward irreversible colour transform (G.3).
pub fn forward_ict(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    for ((r, g), b) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = 0.299 * red + 0.587 * green + 0.114 * blue;
        *g = -0.16875 * red - 0.33126 * green + 0.5 * blue;
        *b = 0.5 * red - 0.41869 * green - 0.08131 * blue;
    }
}

pub fn inverse_ict(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    for ((y, cb), cr) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (luma, blue_diff, red_diff) = (*y, *cb, *cr);
        *y = luma + 1.402 * red_diff;
        *cb = luma - 0.34413 * blue_diff - 0.71414 * red_diff;
        *cr = luma + 1.772 * blue_diff;
    }
}

/// The transform paired with the wavelet filter: RCT with 5/3, ICT with 9/7.
pub fn forward(kind: WaveletKind, c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    match kind {
        WaveletKind::Reversible53 => forward_rct(c0, c1, c2),
        WaveletKind::Irreversible97 => forward_ict(c0, c1, c2),
    }
}

pub fn inverse(kind: WaveletKind, c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    match kind {
        WaveletKind::Reversible53 => inverse_rct(c0, c1, c2),
        WaveletKind::Irreversible97 => inverse_ict(c0, c1, c2),
    }
}
