//! Codestream syntax, container detection and malformed input handling.

use jpegexp_j2k::jpeg2000::parser::parse;
use jpegexp_j2k::{
    FrameInfo, J2kDecoder, J2kEncoder, J2kError, decode, encode, is_jp2_file, is_jpeg2000_codestream,
};

fn sample_codestream() -> (Vec<u8>, Vec<u8>) {
    let mut rng = fastrand::Rng::with_seed(42);
    let pixels: Vec<u8> = (0..24 * 16 * 3).map(|_| rng.u8(..)).collect();
    let info = FrameInfo {
        width: 24,
        height: 16,
        bits_per_sample: 8,
        component_count: 3,
    };
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(2);
    encoder.set_layer_count(2);
    (encoder.encode(&pixels, &info).unwrap(), pixels)
}

fn jp2_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// Byte offset just past the SIZ marker segment.
fn end_of_siz(codestream: &[u8]) -> usize {
    4 + u16::from_be_bytes([codestream[4], codestream[5]]) as usize
}

#[test]
fn test_marker_layout() {
    let (codestream, _) = sample_codestream();
    assert!(is_jpeg2000_codestream(&codestream));
    assert!(!is_jp2_file(&codestream));
    assert_eq!(&codestream[..4], &[0xFF, 0x4F, 0xFF, 0x51]);
    assert_eq!(&codestream[end_of_siz(&codestream)..][..2], &[0xFF, 0x52]);
    assert_eq!(&codestream[codestream.len() - 2..], &[0xFF, 0xD9]);

    let parsed = parse(&codestream).unwrap();
    assert_eq!(parsed.frame.width, 24);
    assert_eq!(parsed.frame.component_count(), 3);
    assert_eq!(parsed.coding.layer_count, 2);
    assert_eq!(parsed.tiles.len(), 1);
    assert_eq!(parsed.tiles[0].tile_parts, 1);
}

#[test]
fn test_jp2_container_decodes() {
    let (codestream, pixels) = sample_codestream();
    let mut file = jp2_box(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);
    file.extend(jp2_box(b"ftyp", b"jp2 \0\0\0\0jp2 "));
    file.extend(jp2_box(b"jp2h", &[0; 22]));
    file.extend(jp2_box(b"jp2c", &codestream));

    assert!(is_jp2_file(&file));
    assert!(!is_jpeg2000_codestream(&file));
    let image = decode(&file).unwrap();
    assert_eq!(image.pixels, pixels);
}

#[test]
fn test_jp2_without_codestream() {
    let mut file = jp2_box(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);
    file.extend(jp2_box(b"ftyp", b"jp2 \0\0\0\0jp2 "));
    assert_eq!(decode(&file), Err(J2kError::StartOfCodestreamNotFound));
}

#[test]
fn test_missing_soc() {
    assert_eq!(decode(b"not a codestream"), Err(J2kError::StartOfCodestreamNotFound));
    assert_eq!(decode(&[]), Err(J2kError::StartOfCodestreamNotFound));
}

#[test]
fn test_unsupported_marker_is_rejected() {
    let (codestream, _) = sample_codestream();
    let at = end_of_siz(&codestream);
    for marker in [0x53u8, 0x5D, 0x5E, 0x5F] {
        let mut patched = codestream[..at].to_vec();
        patched.extend_from_slice(&[0xFF, marker, 0x00, 0x04, 0x00, 0x00]);
        patched.extend_from_slice(&codestream[at..]);
        assert_eq!(
            decode(&patched),
            Err(J2kError::UnsupportedMarker { marker, offset: at })
        );
    }
}

#[test]
fn test_skipped_marker_is_ignored() {
    let (codestream, pixels) = sample_codestream();
    let at = end_of_siz(&codestream);
    // CRG with one (Xcrg, Ycrg) pair per component.
    let mut patched = codestream[..at].to_vec();
    patched.extend_from_slice(&[0xFF, 0x63, 0x00, 14]);
    patched.extend_from_slice(&[0; 12]);
    patched.extend_from_slice(&codestream[at..]);
    assert_eq!(decode(&patched).unwrap().pixels, pixels);
}

#[test]
fn test_oversized_siz_is_rejected() {
    let pixels = vec![0x40u8; 64];
    let codestream = encode(&pixels, 8, 8, 90, false, 1).unwrap();
    // Xsiz, Ysiz, XTsiz and YTsiz of a single-tile image.
    for fields in [&[8usize, 12, 24, 28][..], &[8, 12]] {
        let mut patched = codestream.clone();
        for &at in fields {
            patched[at..at + 4].copy_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        }
        assert_eq!(decode(&patched), Err(J2kError::InvalidGeometry));
    }
}

#[test]
fn test_truncated_input_never_panics() {
    let (codestream, _) = sample_codestream();
    for length in (0..codestream.len()).step_by(7) {
        let _ = decode(&codestream[..length]);
    }
    // Losing only EOC still decodes everything.
    let image = J2kDecoder::new().decode(&codestream[..codestream.len() - 2]).unwrap();
    assert_eq!(image.width, 24);
}

#[test]
fn test_corrupted_packet_data_never_panics() {
    let (codestream, _) = sample_codestream();
    let body = parse(&codestream).unwrap().tiles[0].offset;
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..20 {
        let mut corrupted = codestream.clone();
        let at = rng.usize(body..codestream.len() - 2);
        corrupted[at] = rng.u8(..0x90);
        let _ = decode(&corrupted);
    }
}
