use num_enum::{IntoPrimitive, TryFromPrimitive};

/// JPEG 2000 marker codes (second byte after 0xFF), ISO/IEC 15444-1 Annex A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JpegMarkerCode {
    /// CAP: Extended capabilities (Part 2 / Part 15).
    ExtendedCapabilities = 0x50,

    /// SIZ: Image and tile size.
    ImageAndTileSize = 0x51,

    /// COD: Coding style default.
    CodingStyleDefault = 0x52,

    /// COC: Coding style component.
    CodingStyleComponent = 0x53,

    /// TLM: Tile-part lengths.
    TilePartLengths = 0x55,

    /// PLM: Packet length, main header.
    PacketLengthMain = 0x57,

    /// PLT: Packet length, tile-part header.
    PacketLengthTilePart = 0x58,

    /// QCD: Quantization default.
    QuantizationDefault = 0x5C,

    /// QCC: Quantization component.
    QuantizationComponent = 0x5D,

    /// RGN: Region of interest.
    RegionOfInterest = 0x5E,

    /// POC: Progression order change.
    ProgressionOrderChange = 0x5F,

    /// PPM: Packed packet headers, main header.
    PackedPacketHeadersMain = 0x60,

    /// PPT: Packed packet headers, tile-part header.
    PackedPacketHeadersTilePart = 0x61,

    /// CRG: Component registration.
    ComponentRegistration = 0x63,

    /// COM: Comment.
    Comment = 0x64,

    /// SOC: Start of codestream.
    StartOfCodestream = 0x4F,

    /// SOT: Start of tile-part.
    StartOfTile = 0x90,

    /// SOP: Start of packet.
    StartOfPacket = 0x91,

    /// EPH: End of packet header.
    EndOfPacketHeader = 0x92,

    /// SOD: Start of data.
    StartOfData = 0x93,

    /// EOC: End of codestream.
    EndOfCodestream = 0xD9,
}

impl JpegMarkerCode {
    /// Delimiting markers carry no length field.
    pub fn has_segment(self) -> bool {
        !matches!(
            self,
            Self::StartOfCodestream
                | Self::StartOfData
                | Self::EndOfCodestream
                | Self::EndOfPacketHeader
        )
    }
}

pub const JPEG_MARKER_START_BYTE: u8 = 0xFF;
