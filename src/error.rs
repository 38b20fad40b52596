use thiserror::Error;

/// Errors raised while encoding or decoding a JPEG 2000 codestream.
///
/// Structural errors carry the marker code and/or byte offset at which
/// the problem was detected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum J2kError {
    #[error("Start of codestream marker (0xFF4F) not found")]
    StartOfCodestreamNotFound,
    #[error("Marker start byte not found at offset {offset}")]
    MarkerStartByteNotFound { offset: usize },
    #[error("Unknown marker 0xFF{marker:02X} at offset {offset}")]
    UnknownMarker { marker: u8, offset: usize },
    #[error("Unexpected marker 0xFF{marker:02X} at offset {offset}")]
    UnexpectedMarker { marker: u8, offset: usize },
    #[error("Unsupported marker segment 0xFF{marker:02X} at offset {offset}")]
    UnsupportedMarker { marker: u8, offset: usize },
    #[error("Invalid length for marker segment 0xFF{marker:02X} at offset {offset}")]
    InvalidMarkerSegmentSize { marker: u8, offset: usize },
    #[error("Invalid value in marker segment 0xFF{marker:02X} at offset {offset}")]
    InvalidMarkerSegmentValue { marker: u8, offset: usize },
    #[error("Missing required marker segment 0xFF{marker:02X}")]
    MissingMarkerSegment { marker: u8 },
    #[error("Unexpected end of data at offset {offset}")]
    UnexpectedEndOfData { offset: usize },
    #[error("Truncated packet header at offset {offset}")]
    TruncatedPacketHeader { offset: usize },
    #[error("Invalid tile index {index}")]
    InvalidTileIndex { index: u16 },
    #[error("Inconsistent image, tile or component geometry")]
    InvalidGeometry,
    #[error("Unsupported coding feature: {0}")]
    UnsupportedFeature(&'static str),
    #[error("Too many coding passes ({passes}) for a code-block")]
    TooManyCodingPasses { passes: u32 },
    #[error("Invalid argument: width")]
    InvalidArgumentWidth,
    #[error("Invalid argument: height")]
    InvalidArgumentHeight,
    #[error("Invalid argument: component count")]
    InvalidArgumentComponentCount,
    #[error("Invalid argument: bits per sample")]
    InvalidArgumentBitsPerSample,
    #[error("Invalid argument: decomposition levels")]
    InvalidArgumentDecompositionLevels,
    #[error("Invalid argument: layer count")]
    InvalidArgumentLayerCount,
    #[error("Invalid argument: code-block size")]
    InvalidArgumentCodeBlockSize,
    #[error("Invalid argument: tile size")]
    InvalidArgumentTileSize,
    #[error("Invalid argument: sample buffer size")]
    InvalidArgumentSampleBufferSize,
}
