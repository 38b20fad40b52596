//! End-to-end encode/decode tests through the public API.

use jpegexp_j2k::{FrameInfo, J2kDecoder, J2kEncoder, ProgressionOrder, decode, encode};

fn noise(width: u32, height: u32, components: u32, seed: u64) -> (Vec<u8>, FrameInfo) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let pixels = (0..width * height * components).map(|_| rng.u8(..)).collect();
    let info = FrameInfo {
        width,
        height,
        bits_per_sample: 8,
        component_count: components,
    };
    (pixels, info)
}

fn gradient(width: u32, height: u32, components: u32) -> (Vec<u8>, FrameInfo) {
    let mut pixels = Vec::with_capacity((width * height * components) as usize);
    for y in 0..height {
        for x in 0..width {
            for c in 0..components {
                pixels.push((x * 3 + y * 2 + c * 20).min(255) as u8);
            }
        }
    }
    let info = FrameInfo {
        width,
        height,
        bits_per_sample: 8,
        component_count: components,
    };
    (pixels, info)
}

fn assert_lossless(encoder: &J2kEncoder, pixels: &[u8], info: &FrameInfo) {
    let codestream = encoder.encode(pixels, info).unwrap();
    let image = J2kDecoder::new().decode(&codestream).unwrap();
    assert_eq!((image.width, image.height), (info.width, info.height));
    assert_eq!(image.component_count, info.component_count);
    assert!(image.pixels == pixels, "lossless round trip differs");
}

fn max_error(a: &[u8], b: &[u8]) -> u8 {
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

#[test]
fn test_ramp_8x8_quality_95() {
    let samples: Vec<u8> = (0..64).map(|i| (i * 4) as u8).collect();
    let codestream = encode(&samples, 8, 8, 95, true, 1).unwrap();
    let image = decode(&codestream).unwrap();
    assert_eq!((image.width, image.height), (8, 8));
    assert_eq!(image.pixels.len(), 64);
    assert!(max_error(&image.pixels, &samples) <= 8);
}

#[test]
fn test_constant_image_quality_100() {
    let samples = vec![128u8; 16 * 16];
    let codestream = encode(&samples, 16, 16, 100, true, 3).unwrap();
    let image = decode(&codestream).unwrap();
    assert_eq!(image.pixels.len(), 256);
    assert!(image.pixels.iter().all(|&p| p.abs_diff(128) <= 5));
}

#[test]
fn test_lossless_ignores_quality() {
    let (pixels, _) = noise(20, 20, 1, 3);
    let low = encode(&pixels, 20, 20, 1, false, 2).unwrap();
    let high = encode(&pixels, 20, 20, 100, false, 2).unwrap();
    assert_eq!(low, high);
    assert_eq!(decode(&low).unwrap().pixels, pixels);
}

#[test]
fn test_lossless_gray() {
    let (pixels, info) = noise(37, 23, 1, 1);
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(3);
    assert_lossless(&encoder, &pixels, &info);
}

#[test]
fn test_lossless_rgb_with_rct() {
    let (pixels, info) = noise(29, 31, 3, 2);
    let encoder = J2kEncoder::new();
    assert_lossless(&encoder, &pixels, &info);

    let mut plain = J2kEncoder::new();
    plain.set_color_transform(false);
    assert_lossless(&plain, &pixels, &info);
}

#[test]
fn test_lossless_four_components() {
    let (pixels, info) = noise(12, 9, 4, 4);
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(2);
    assert_lossless(&encoder, &pixels, &info);
}

#[test]
fn test_lossless_multiple_layers() {
    let (pixels, info) = noise(40, 24, 1, 5);
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(3);
    encoder.set_layer_count(5);
    assert_lossless(&encoder, &pixels, &info);
}

#[test]
fn test_lossless_every_progression_order() {
    let (pixels, info) = noise(24, 18, 3, 6);
    for order in ProgressionOrder::ALL {
        let mut encoder = J2kEncoder::new();
        encoder.set_decomposition_levels(2);
        encoder.set_layer_count(3);
        encoder.set_progression_order(order);
        assert_lossless(&encoder, &pixels, &info);
    }
}

#[test]
fn test_lossless_sop_eph() {
    let (pixels, info) = noise(33, 17, 3, 7);
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(2);
    encoder.set_layer_count(2);
    encoder.set_sop(true);
    encoder.set_eph(true);
    assert_lossless(&encoder, &pixels, &info);
}

#[test]
fn test_lossless_small_codeblocks() {
    let (pixels, info) = noise(30, 26, 1, 8);
    for (width, height) in [(4, 4), (8, 16), (32, 4)] {
        let mut encoder = J2kEncoder::new();
        encoder.set_decomposition_levels(2);
        encoder.set_codeblock_size(width, height);
        assert_lossless(&encoder, &pixels, &info);
    }
}

#[test]
fn test_lossless_multiple_tiles() {
    let (pixels, info) = noise(50, 35, 3, 9);
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(3);
    encoder.set_tile_size(16, 16);
    assert_lossless(&encoder, &pixels, &info);

    encoder.set_tile_size(24, 35);
    encoder.set_layer_count(2);
    assert_lossless(&encoder, &pixels, &info);
}

#[test]
fn test_lossless_more_levels_than_samples() {
    let (pixels, info) = noise(5, 3, 1, 10);
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(5);
    assert_lossless(&encoder, &pixels, &info);

    let (pixels, info) = noise(1, 1, 1, 11);
    assert_lossless(&encoder, &pixels, &info);
}

#[test]
fn test_lossless_low_bit_depth() {
    let mut rng = fastrand::Rng::with_seed(12);
    let pixels: Vec<u8> = (0..21 * 13).map(|_| rng.u8(..16)).collect();
    let info = FrameInfo {
        width: 21,
        height: 13,
        bits_per_sample: 4,
        component_count: 1,
    };
    let mut encoder = J2kEncoder::new();
    encoder.set_decomposition_levels(2);
    let image = J2kDecoder::new().decode(&encoder.encode(&pixels, &info).unwrap()).unwrap();
    assert_eq!(image.bits_per_sample, 4);
    assert_eq!(image.pixels, pixels);
}

#[test]
fn test_lossy_rgb_error_is_bounded() {
    let (pixels, info) = gradient(40, 40, 3);
    let mut encoder = J2kEncoder::new();
    encoder.set_lossy(true);
    encoder.set_quality(90);
    encoder.set_decomposition_levels(3);
    let image = J2kDecoder::new().decode(&encoder.encode(&pixels, &info).unwrap()).unwrap();
    assert_eq!(image.pixels.len(), pixels.len());

    let total: u64 = image
        .pixels
        .iter()
        .zip(&pixels)
        .map(|(a, b)| a.abs_diff(*b) as u64)
        .sum();
    assert!(total as f64 / (pixels.len() as f64) < 3.0);
}

#[test]
fn test_lossy_size_follows_quality() {
    let (pixels, info) = noise(48, 48, 1, 13);
    let size = |quality| {
        let mut encoder = J2kEncoder::new();
        encoder.set_lossy(true);
        encoder.set_quality(quality);
        encoder.set_decomposition_levels(3);
        encoder.encode(&pixels, &info).unwrap().len()
    };
    assert!(size(30) < size(90));
}

#[test]
fn test_layer_truncation_improves_with_layers() {
    let (pixels, info) = gradient(32, 32, 1);
    let mut encoder = J2kEncoder::new();
    encoder.set_lossy(true);
    encoder.set_quality(100);
    encoder.set_decomposition_levels(2);
    encoder.set_layer_count(3);
    let codestream = encoder.encode(&pixels, &info).unwrap();

    let error_with = |layers| {
        let mut decoder = J2kDecoder::new();
        decoder.set_max_layers(layers);
        let image = decoder.decode(&codestream).unwrap();
        image
            .pixels
            .iter()
            .zip(&pixels)
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum::<u64>()
    };
    assert!(error_with(3) <= error_with(1));
}
