//! Image, tile and subband geometry (ISO/IEC 15444-1 Annex B).
//!
//! All extents are half-open rectangles on the canvas of the quantity they
//! describe: the reference grid for images and tiles, the component grid for
//! tile-components, and the band's own grid for subbands.

use crate::constants::MAXIMUM_IMAGE_SAMPLES;
use crate::error::J2kError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL = 0,
    /// High-Low (horizontal high-pass, vertical edges)
    HL = 1,
    /// Low-High (vertical high-pass, horizontal edges)
    LH = 2,
    /// High-High (diagonal details)
    HH = 3,
}

impl SubbandOrientation {
    pub const ALL: [SubbandOrientation; 4] = [Self::LL, Self::HL, Self::LH, Self::HH];
    pub const DETAIL: [SubbandOrientation; 3] = [Self::HL, Self::LH, Self::HH];

    /// `(xo_b, yo_b)` from equation B-15.
    pub fn offsets(self) -> (u32, u32) {
        match self {
            Self::LL => (0, 0),
            Self::HL => (1, 0),
            Self::LH => (0, 1),
            Self::HH => (1, 1),
        }
    }

    /// Bands coded in a packet of the given resolution, in packet order.
    pub fn for_resolution(resolution: u8) -> &'static [SubbandOrientation] {
        if resolution == 0 {
            &Self::ALL[..1]
        } else {
            &Self::DETAIL
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Component-grid extent of a reference-grid rectangle (B-12).
    pub fn subsampled(&self, dx: u32, dy: u32) -> Rect {
        Rect {
            x0: self.x0.div_ceil(dx),
            y0: self.y0.div_ceil(dy),
            x1: self.x1.div_ceil(dx),
            y1: self.y1.div_ceil(dy),
        }
    }
}

/// Metadata for a single component from the SIZ marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Bit depth (1..=38).
    pub precision: u8,
    pub is_signed: bool,
    /// Horizontal subsampling factor
    pub dx: u8,
    /// Vertical subsampling factor
    pub dy: u8,
}

impl Default for ComponentInfo {
    fn default() -> Self {
        Self {
            precision: 8,
            is_signed: false,
            dx: 1,
            dy: 1,
        }
    }
}

/// Image-level description from SIZ. Borrowed by every later stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Xsiz: right edge of the image area on the reference grid.
    pub width: u32,
    /// Ysiz: bottom edge of the image area on the reference grid.
    pub height: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub components: Vec<ComponentInfo>,
}

impl Frame {
    /// A frame anchored at the origin with a regular tile grid.
    pub fn new(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
        components: Vec<ComponentInfo>,
    ) -> Self {
        Self {
            width,
            height,
            x_origin: 0,
            y_origin: 0,
            tile_width,
            tile_height,
            tile_x_origin: 0,
            tile_y_origin: 0,
            components,
        }
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn image_rect(&self) -> Rect {
        Rect::new(self.x_origin, self.y_origin, self.width, self.height)
    }

    pub fn num_tiles_x(&self) -> u32 {
        (self.width - self.tile_x_origin).div_ceil(self.tile_width)
    }

    pub fn num_tiles_y(&self) -> u32 {
        (self.height - self.tile_y_origin).div_ceil(self.tile_height)
    }

    pub fn tile_count(&self) -> usize {
        self.num_tiles_x() as usize * self.num_tiles_y() as usize
    }

    /// Checks the SIZ constraints (A.5.1) that the geometry code relies on.
    pub fn validate(&self) -> Result<(), J2kError> {
        let image = self.image_rect();
        if image.is_empty()
            || self.tile_width == 0
            || self.tile_height == 0
            || self.tile_x_origin > self.x_origin
            || self.tile_y_origin > self.y_origin
            || self.tile_x_origin as u64 + self.tile_width as u64 <= self.x_origin as u64
            || self.tile_y_origin as u64 + self.tile_height as u64 <= self.y_origin as u64
            || self.components.is_empty()
        {
            return Err(J2kError::InvalidGeometry);
        }
        if self
            .components
            .iter()
            .any(|c| c.dx == 0 || c.dy == 0 || c.precision == 0)
        {
            return Err(J2kError::InvalidGeometry);
        }
        if self.tile_count() > u16::MAX as usize {
            return Err(J2kError::InvalidGeometry);
        }
        let mut samples = 0u64;
        for component in 0..self.component_count() {
            let rect = self.component_rect(component).ok_or(J2kError::InvalidGeometry)?;
            samples = (rect.width() as u64)
                .checked_mul(rect.height() as u64)
                .and_then(|area| samples.checked_add(area))
                .filter(|&total| total <= MAXIMUM_IMAGE_SAMPLES)
                .ok_or(J2kError::InvalidGeometry)?;
        }
        Ok(())
    }

    /// Reference-grid extent of tile `index` (B-7).
    pub fn tile_rect(&self, index: usize) -> Option<Rect> {
        if index >= self.tile_count() {
            return None;
        }
        let p = index as u32 % self.num_tiles_x();
        let q = index as u32 / self.num_tiles_x();
        let tx0 = self.tile_x_origin + p * self.tile_width;
        let ty0 = self.tile_y_origin + q * self.tile_height;
        Some(Rect {
            x0: tx0.max(self.x_origin),
            y0: ty0.max(self.y_origin),
            x1: tx0.saturating_add(self.tile_width).min(self.width),
            y1: ty0.saturating_add(self.tile_height).min(self.height),
        })
    }

    /// Component-grid extent of a tile-component.
    pub fn tile_component_rect(&self, tile: usize, component: usize) -> Option<Rect> {
        let info = self.components.get(component)?;
        Some(self.tile_rect(tile)?.subsampled(info.dx as u32, info.dy as u32))
    }

    /// Component-grid extent of a whole component.
    pub fn component_rect(&self, component: usize) -> Option<Rect> {
        let info = self.components.get(component)?;
        Some(self.image_rect().subsampled(info.dx as u32, info.dy as u32))
    }
}

fn ceil_div_pow2(value: i64, shift: u32) -> i64 {
    let d = 1i64 << shift;
    (value + d - 1).div_euclid(d)
}

/// Extent of resolution `resolution` of a tile-component decomposed
/// `levels` times (B-14).
pub fn resolution_rect(tc: Rect, levels: u8, resolution: u8) -> Rect {
    let shift = (levels - resolution) as u32;
    Rect {
        x0: ceil_div_pow2(tc.x0 as i64, shift) as u32,
        y0: ceil_div_pow2(tc.y0 as i64, shift) as u32,
        x1: ceil_div_pow2(tc.x1 as i64, shift) as u32,
        y1: ceil_div_pow2(tc.y1 as i64, shift) as u32,
    }
}

/// Extent of a subband on its own grid (B-15). Resolution 0 holds only LL;
/// every other resolution holds HL, LH and HH.
pub fn subband_rect(tc: Rect, levels: u8, resolution: u8, band: SubbandOrientation) -> Rect {
    if resolution == 0 {
        return resolution_rect(tc, levels, 0);
    }
    let nb = (levels - resolution + 1) as u32;
    let (xo, yo) = band.offsets();
    let half = 1i64 << (nb - 1);
    let edge = |v: u32, o: u32| ceil_div_pow2(v as i64 - half * o as i64, nb).max(0) as u32;
    Rect {
        x0: edge(tc.x0, xo),
        y0: edge(tc.y0, yo),
        x1: edge(tc.x1, xo),
        y1: edge(tc.y1, yo),
    }
}

/// Position of a subband inside the in-place wavelet buffer of its
/// tile-component: high-pass bands sit after the low-pass half of the
/// resolution they refine.
pub fn subband_buffer_offset(
    tc: Rect,
    levels: u8,
    resolution: u8,
    band: SubbandOrientation,
) -> (usize, usize) {
    if resolution == 0 {
        return (0, 0);
    }
    let low = resolution_rect(tc, levels, resolution - 1);
    let (xo, yo) = band.offsets();
    (
        (xo * low.width()) as usize,
        (yo * low.height()) as usize,
    )
}

/// Linear index of `(resolution, band)` in a flat per-tile-component subband
/// arena ordered LL, then HL/LH/HH of each resolution.
pub fn subband_index(resolution: u8, band: SubbandOrientation) -> usize {
    if resolution == 0 {
        0
    } else {
        1 + 3 * (resolution as usize - 1) + (band as usize - 1)
    }
}

pub fn subband_count(levels: u8) -> usize {
    1 + 3 * levels as usize
}
