//! JPEG 2000 Part 1 (ISO/IEC 15444-1)
//!
//! The codec is split along the stages of the standard:
//!
//! - `parser` / `writer`: codestream syntax (main header, tile-parts).
//! - `jp2`: the JP2 box structure around a codestream.
//! - `image`: reference grid, tiles, tile-components and subband geometry.
//! - `codeblock`: subbands, their code-block partition and code-block buffers.
//! - `packet`: tier-2 packet headers and bodies.
//! - `progression`: packet ordering.
//! - `tag_tree`: tag trees used in packet headers.
//! - `bit_io`: bit-level access with marker stuffing.
//! - `mq_coder`: the MQ arithmetic coder.
//! - `bit_plane_coder`: EBCOT tier-1 context modelling and coding passes.
//! - `dwt`: 5/3 and 9/7 wavelet transforms.
//! - `quantization`: scalar dead-zone quantization.
//! - `mct`: reversible and irreversible colour transforms.
//! - `encoder` / `decoder`: the full pipelines.

pub mod bit_io;
pub mod bit_plane_coder;
pub mod codeblock;
pub mod decoder;
pub mod dwt;
pub mod encoder;
pub mod image;
pub mod jp2;
pub mod mct;
pub mod mq_coder;
pub mod packet;
pub mod parser;
pub mod progression;
pub mod quantization;
pub mod tag_tree;
pub mod writer;
