//! Subbands and their code-block partition (ISO/IEC 15444-1 B.7).

use super::image::{Rect, SubbandOrientation, subband_buffer_offset, subband_rect};
use super::quantization::quantize;

/// Partition of a subband into code-blocks. Cells are anchored at multiples
/// of the nominal block size on the band grid; cells cut by the band edges
/// are partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlockGrid {
    rect: Rect,
    block_width: u32,
    block_height: u32,
    first_col: u32,
    first_row: u32,
    cols: u32,
    rows: u32,
}

impl CodeBlockGrid {
    pub fn new(rect: Rect, block_width: u32, block_height: u32) -> Self {
        let (first_col, first_row, cols, rows) = if rect.is_empty() {
            (0, 0, 0, 0)
        } else {
            let first_col = rect.x0 / block_width;
            let first_row = rect.y0 / block_height;
            (
                first_col,
                first_row,
                rect.x1.div_ceil(block_width) - first_col,
                rect.y1.div_ceil(block_height) - first_row,
            )
        };
        Self {
            rect,
            block_width,
            block_height,
            first_col,
            first_row,
            cols,
            rows,
        }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Band-grid extent of block `(col, row)`, `None` outside the grid.
    pub fn block(&self, col: u32, row: u32) -> Option<Rect> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let x0 = (self.first_col + col) * self.block_width;
        let y0 = (self.first_row + row) * self.block_height;
        Some(Rect {
            x0: x0.max(self.rect.x0),
            y0: y0.max(self.rect.y0),
            x1: (x0 + self.block_width).min(self.rect.x1),
            y1: (y0 + self.block_height).min(self.rect.y1),
        })
    }

    /// Blocks in raster order.
    pub fn blocks(&self) -> impl Iterator<Item = Rect> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).filter_map(move |col| self.block(col, row)))
    }
}

/// One subband of a tile-component.
#[derive(Debug, Clone, PartialEq)]
pub struct Subband {
    pub resolution: u8,
    pub orientation: SubbandOrientation,
    /// Extent on the band's own grid.
    pub rect: Rect,
    /// Top-left of the band inside the tile-component's wavelet buffer.
    pub buffer_x: usize,
    pub buffer_y: usize,
    pub grid: CodeBlockGrid,
}

impl Subband {
    pub fn new(
        tc: Rect,
        levels: u8,
        resolution: u8,
        orientation: SubbandOrientation,
        block_width: u32,
        block_height: u32,
    ) -> Self {
        let rect = subband_rect(tc, levels, resolution, orientation);
        let (buffer_x, buffer_y) = subband_buffer_offset(tc, levels, resolution, orientation);
        Self {
            resolution,
            orientation,
            rect,
            buffer_x,
            buffer_y,
            grid: CodeBlockGrid::new(rect, block_width, block_height),
        }
    }

    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// Buffer position of the top-left sample of a block of this band.
    pub fn block_origin(&self, block: Rect) -> (usize, usize) {
        (
            self.buffer_x + (block.x0 - self.rect.x0) as usize,
            self.buffer_y + (block.y0 - self.rect.y0) as usize,
        )
    }
}

/// All subbands of a tile-component in arena order: LL, then HL, LH, HH for
/// each resolution from coarse to fine.
pub fn build_subbands(tc: Rect, levels: u8, block_width: u32, block_height: u32) -> Vec<Subband> {
    let mut bands = Vec::with_capacity(1 + 3 * levels as usize);
    for resolution in 0..=levels {
        for &orientation in SubbandOrientation::for_resolution(resolution) {
            bands.push(Subband::new(
                tc,
                levels,
                resolution,
                orientation,
                block_width,
                block_height,
            ));
        }
    }
    bands
}

/// Quantized coefficients of one code-block together with its tier-1 state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub width: usize,
    pub height: usize,
    pub magnitudes: Vec<u32>,
    pub negative: Vec<bool>,
    /// Lowest bit-plane decoded per coefficient; undecoded planes are
    /// reconstructed at their midpoint.
    pub lowest_plane: Vec<u8>,
    /// Significance flags with a one-sample border on every side.
    pub(crate) state: Vec<u8>,
}

impl CodeBlock {
    pub fn new(width: usize, height: usize) -> Self {
        let count = width * height;
        Self {
            width,
            height,
            magnitudes: vec![0; count],
            negative: vec![false; count],
            lowest_plane: vec![0; count],
            state: vec![0; (width + 2) * (height + 2)],
        }
    }

    /// Quantizes a `width × height` window of a row-major coefficient buffer.
    pub fn from_coefficients(
        buffer: &[f32],
        stride: usize,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        step: f32,
    ) -> Self {
        let mut block = Self::new(width, height);
        for row in 0..height {
            let line = &buffer[(y + row) * stride + x..(y + row) * stride + x + width];
            for (col, &value) in line.iter().enumerate() {
                let (magnitude, negative) = quantize(value, step);
                block.magnitudes[row * width + col] = magnitude;
                block.negative[row * width + col] = negative && magnitude != 0;
            }
        }
        block
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn max_magnitude(&self) -> u32 {
        self.magnitudes.iter().copied().max().unwrap_or(0)
    }

    /// `ceil(log2(max + 1))`: 0 for an all-zero block.
    pub fn num_bit_planes(&self) -> u32 {
        32 - self.max_magnitude().leading_zeros()
    }

    /// Clamps every magnitude to `planes` bits. Returns how many changed.
    pub fn saturate(&mut self, planes: u32) -> usize {
        let limit = if planes >= 32 { u32::MAX } else { (1u32 << planes) - 1 };
        let mut clipped = 0;
        for m in &mut self.magnitudes {
            if *m > limit {
                *m = limit;
                clipped += 1;
            }
        }
        clipped
    }

    pub(crate) fn reset_state(&mut self) {
        self.state.iter_mut().for_each(|s| *s = 0);
    }
}
