pub const MINIMUM_QUALITY: u8 = 1;
pub const MAXIMUM_QUALITY: u8 = 100;
pub const DEFAULT_QUALITY: u8 = 85;

pub const DEFAULT_DECOMPOSITION_LEVELS: u8 = 5;
// ISO/IEC 15444-1, A.6.1: SPcod decomposition levels range is 0..=32.
pub const MAXIMUM_DECOMPOSITION_LEVELS: u8 = 32;

pub const DEFAULT_LAYER_COUNT: u16 = 1;

// Upper bound on the samples of all components together; keeps a corrupt
// SIZ from requesting buffers that cannot be allocated.
pub const MAXIMUM_IMAGE_SAMPLES: u64 = 1 << 28;

pub const MINIMUM_COMPONENT_COUNT: usize = 1;
// Csiz upper bound, ISO/IEC 15444-1, table A.9.
pub const MAXIMUM_COMPONENT_COUNT: usize = 16384;

pub const MINIMUM_BITS_PER_SAMPLE: u8 = 1;
// Encoder input is one byte per sample.
pub const MAXIMUM_ENCODE_BITS_PER_SAMPLE: u8 = 8;
pub const MAXIMUM_BITS_PER_SAMPLE: u8 = 38;

// Code-block dimensions are 2^xcb with xcb in 2..=10 and xcb + ycb <= 12.
pub const DEFAULT_CODEBLOCK_EXPONENT: u8 = 6;
pub const MINIMUM_CODEBLOCK_EXPONENT: u8 = 2;
pub const MAXIMUM_CODEBLOCK_EXPONENT: u8 = 10;
pub const MAXIMUM_CODEBLOCK_EXPONENT_SUM: u8 = 12;

pub const DEFAULT_GUARD_BITS: u8 = 2;
pub const MAXIMUM_GUARD_BITS: u8 = 7;

// Table B.4 caps the signalled number of coding passes at 164.
pub const MAXIMUM_CODING_PASSES: u32 = 164;

// Initial value of the per code-block length indicator (B.10.7.1).
pub const INITIAL_LBLOCK: u32 = 3;

// Size of the SOP marker segment including the marker itself.
pub const SOP_SEGMENT_SIZE: usize = 6;

// Length of the fixed part of SIZ without the per-component fields.
pub const SIZ_FIXED_LENGTH: u16 = 38;
pub const SOT_SEGMENT_LENGTH: u16 = 10;

pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];
