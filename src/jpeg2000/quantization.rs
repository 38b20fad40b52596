//! Scalar dead-zone quantization (ISO/IEC 15444-1 Annex E).

use super::image::SubbandOrientation;
use crate::constants::{MAXIMUM_QUALITY, MINIMUM_QUALITY};

/// log2 of the nominal analysis gain of a band (Table E.1).
pub fn log2_gain(band: SubbandOrientation) -> u8 {
    match band {
        SubbandOrientation::LL => 0,
        SubbandOrientation::HL | SubbandOrientation::LH => 1,
        SubbandOrientation::HH => 2,
    }
}

/// Maps the 1..=100 quality knob to a base step size. Higher quality gives
/// a smaller step; the result always lies in (0, 10).
pub fn quality_to_step(quality: u8) -> f32 {
    let q = quality.clamp(MINIMUM_QUALITY, MAXIMUM_QUALITY) as f32;
    0.25 * 2f32.powf((100.0 - q) / 20.0)
}

/// Step sizes indexed by `[level][band]`; level 0 is the finest
/// decomposition level.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSizeTable {
    steps: Vec<[f32; 4]>,
}

impl StepSizeTable {
    pub fn levels(&self) -> usize {
        self.steps.len()
    }

    pub fn get(&self, level: usize, band: SubbandOrientation) -> Option<f32> {
        self.steps.get(level).map(|row| row[band as usize])
    }

    /// Step for a band at resolution `resolution` of a transform with
    /// `levels` decomposition levels. The LL band lives at resolution 0.
    pub fn for_resolution(&self, resolution: u8, levels: u8, band: SubbandOrientation) -> f32 {
        let level = if resolution == 0 {
            levels.saturating_sub(1)
        } else {
            levels - resolution
        };
        self.get(level as usize, band).unwrap_or(1.0)
    }
}

/// Builds the step table. Lossless tables are all 1.0. Lossy steps double
/// with every decomposition level and widen with the band's dynamic range,
/// so coarser subbands get coarser steps.
pub fn calculate_step_sizes(base_step: f32, levels: u8, lossy: bool) -> StepSizeTable {
    let rows = (levels as usize).max(1);
    let steps = (0..rows)
        .map(|level| {
            let mut row = [1.0f32; 4];
            if lossy {
                for band in SubbandOrientation::ALL {
                    let range = level as f32 + log2_gain(band) as f32 / 2.0;
                    row[band as usize] = base_step * 2f32.powf(range);
                }
            }
            row
        })
        .collect();
    StepSizeTable { steps }
}

/// Returns `(magnitude, negative)` with the magnitude truncated toward zero.
pub fn quantize(value: f32, step: f32) -> (u32, bool) {
    if step <= 0.0 || !value.is_finite() {
        return (0, false);
    }
    let magnitude = (value.abs() / step).floor();
    (magnitude.min(u32::MAX as f32) as u32, value < 0.0)
}

/// Mid-point reconstruction; a zero magnitude stays zero.
pub fn dequantize(magnitude: u32, negative: bool, step: f32) -> f32 {
    if magnitude == 0 {
        return 0.0;
    }
    let value = (magnitude as f32 + 0.5) * step;
    if negative { -value } else { value }
}

/// QCD step encoding: `Δ = 2^(R_b - ε) · (1 + μ / 2^11)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepSize {
    pub exponent: u8,
    pub mantissa: u16,
}

impl StepSize {
    /// Reversible bands signal only the exponent.
    pub fn reversible(exponent: u8) -> Self {
        Self {
            exponent: exponent.min(31),
            mantissa: 0,
        }
    }

    /// Nearest representable step for `step`, given the band's dynamic range
    /// `rb` (precision plus log2 gain).
    pub fn from_step(step: f32, rb: u8) -> Self {
        let log = step.log2().floor() as i32;
        let mut exponent = rb as i32 - log;
        let base = 2f32.powi(log);
        let mut mantissa = ((step / base - 1.0) * 2048.0).round() as i32;
        if mantissa >= 2048 {
            mantissa = 0;
            exponent -= 1;
        }
        if exponent < 0 {
            return Self {
                exponent: 0,
                mantissa: 2047,
            };
        }
        if exponent > 31 {
            return Self {
                exponent: 31,
                mantissa: 0,
            };
        }
        Self {
            exponent: exponent as u8,
            mantissa: mantissa.clamp(0, 2047) as u16,
        }
    }

    pub fn to_step(self, rb: u8) -> f32 {
        2f32.powi(rb as i32 - self.exponent as i32) * (1.0 + self.mantissa as f32 / 2048.0)
    }

    /// Number of magnitude bit-planes M_b (E-2).
    pub fn bit_planes(self, guard_bits: u8) -> u32 {
        (guard_bits as u32 + self.exponent as u32).saturating_sub(1)
    }

    pub fn from_u16(value: u16) -> Self {
        Self {
            exponent: (value >> 11) as u8,
            mantissa: value & 0x7FF,
        }
    }

    pub fn to_u16(self) -> u16 {
        ((self.exponent as u16) << 11) | (self.mantissa & 0x7FF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantization_roundtrip() {
        let (q, negative) = quantize(10.5, 2.0);
        assert_eq!((q, negative), (5, false));
        let recon = dequantize(q, negative, 2.0);
        assert_eq!(recon, 11.0);
    }

    #[test]
    fn test_quantize_dequantize_bound() {
        let steps = [0.1f32, 0.37, 1.0, 2.5, 7.9];
        let values = [-300.2f32, -17.0, -1.01, -0.04, 0.0, 0.3, 3.99, 44.4, 255.0];
        for &step in &steps {
            for &value in &values {
                let (magnitude, negative) = quantize(value, step);
                assert_eq!(negative, value < 0.0);
                let recon = dequantize(magnitude, negative, step);
                assert!(
                    (recon.abs() - value.abs()).abs() < step,
                    "value {value} step {step} recon {recon}"
                );
            }
        }
    }

    #[test]
    fn test_quality_to_step_monotonic_and_bounded() {
        assert!(quality_to_step(100) < quality_to_step(75));
        assert!(quality_to_step(75) < quality_to_step(50));
        for q in 0..=255u8 {
            let step = quality_to_step(q);
            assert!(step > 0.0 && step < 10.0, "quality {q} -> {step}");
        }
        for q in 1..100u8 {
            assert!(quality_to_step(q) > quality_to_step(q + 1));
        }
    }

    #[test]
    fn test_lossless_steps_are_one() {
        for levels in 0..=8u8 {
            let table = calculate_step_sizes(3.7, levels, false);
            for level in 0..table.levels() {
                for band in SubbandOrientation::ALL {
                    assert_eq!(table.get(level, band), Some(1.0));
                }
            }
        }
    }

    #[test]
    fn test_lossy_steps_grow_toward_coarser_levels() {
        let table = calculate_step_sizes(1.0, 5, true);
        assert_eq!(table.levels(), 5);
        for band in SubbandOrientation::ALL {
            for level in 1..table.levels() {
                assert!(table.get(level, band) > table.get(level - 1, band), "{band:?} level {level}");
            }
            assert!(table.get(4, band) > table.get(0, band));
        }
        assert_eq!(table.get(0, SubbandOrientation::LL), Some(1.0));
        assert_eq!(table.get(5, SubbandOrientation::HH), None);

        // The LL band sits at the coarsest level.
        let ll = table.for_resolution(0, 5, SubbandOrientation::LL);
        let finest = table.for_resolution(5, 5, SubbandOrientation::LL);
        assert!(ll > finest);
    }

    #[test]
    fn test_step_size_encoding() {
        for &step in &[0.03f32, 0.25, 0.9, 1.0, 3.3, 17.0] {
            let encoded = StepSize::from_step(step, 9);
            let decoded = encoded.to_step(9);
            assert!((decoded - step).abs() / step < 1e-3, "{step} -> {decoded}");
            assert_eq!(StepSize::from_u16(encoded.to_u16()), encoded);
        }
        assert_eq!(StepSize::from_step(1.0, 8).exponent, 8);
        assert_eq!(StepSize::reversible(9).bit_planes(2), 10);
    }
}
