use crate::constants::{
    DEFAULT_CODEBLOCK_EXPONENT, DEFAULT_DECOMPOSITION_LEVELS, DEFAULT_GUARD_BITS, DEFAULT_LAYER_COUNT,
    MAXIMUM_CODEBLOCK_EXPONENT, MAXIMUM_CODEBLOCK_EXPONENT_SUM, MAXIMUM_DECOMPOSITION_LEVELS,
    MAXIMUM_GUARD_BITS, MINIMUM_CODEBLOCK_EXPONENT,
};
use crate::error::J2kError;
use crate::jpeg2000::dwt::WaveletKind;
use crate::jpeg2000::progression::ProgressionOrder;
use crate::jpeg2000::quantization::StepSize;

/// Coding style of a tile (COD marker, A.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodingParameters {
    pub decomposition_levels: u8,
    pub layer_count: u16,
    pub progression_order: ProgressionOrder,
    /// Code-block width is `2^codeblock_width_exponent`.
    pub codeblock_width_exponent: u8,
    pub codeblock_height_exponent: u8,
    pub use_sop: bool,
    pub use_eph: bool,
    pub wavelet: WaveletKind,
    pub use_mct: bool,
}

impl Default for CodingParameters {
    fn default() -> Self {
        Self {
            decomposition_levels: DEFAULT_DECOMPOSITION_LEVELS,
            layer_count: DEFAULT_LAYER_COUNT,
            progression_order: ProgressionOrder::Lrcp,
            codeblock_width_exponent: DEFAULT_CODEBLOCK_EXPONENT,
            codeblock_height_exponent: DEFAULT_CODEBLOCK_EXPONENT,
            use_sop: false,
            use_eph: false,
            wavelet: WaveletKind::Reversible53,
            use_mct: false,
        }
    }
}

impl CodingParameters {
    pub fn codeblock_width(&self) -> u32 {
        1 << self.codeblock_width_exponent
    }

    pub fn codeblock_height(&self) -> u32 {
        1 << self.codeblock_height_exponent
    }

    pub fn resolution_count(&self) -> u8 {
        self.decomposition_levels + 1
    }

    pub fn is_reversible(&self) -> bool {
        self.wavelet.is_reversible()
    }

    /// Scod flags byte.
    pub fn style_flags(&self) -> u8 {
        (self.use_sop as u8) << 1 | (self.use_eph as u8) << 2
    }

    pub fn validate(&self) -> Result<(), J2kError> {
        if self.decomposition_levels > MAXIMUM_DECOMPOSITION_LEVELS {
            return Err(J2kError::InvalidArgumentDecompositionLevels);
        }
        if self.layer_count == 0 {
            return Err(J2kError::InvalidArgumentLayerCount);
        }
        validate_codeblock_exponents(self.codeblock_width_exponent, self.codeblock_height_exponent)
    }
}

pub fn validate_codeblock_exponents(width: u8, height: u8) -> Result<(), J2kError> {
    let range = MINIMUM_CODEBLOCK_EXPONENT..=MAXIMUM_CODEBLOCK_EXPONENT;
    if !range.contains(&width) || !range.contains(&height) || width + height > MAXIMUM_CODEBLOCK_EXPONENT_SUM {
        return Err(J2kError::InvalidArgumentCodeBlockSize);
    }
    Ok(())
}

/// Sqcd quantization style (A.6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationStyle {
    NoQuantization,
    ScalarDerived,
    ScalarExpounded,
}

impl QuantizationStyle {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoQuantization),
            1 => Some(Self::ScalarDerived),
            2 => Some(Self::ScalarExpounded),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::NoQuantization => 0,
            Self::ScalarDerived => 1,
            Self::ScalarExpounded => 2,
        }
    }
}

/// Quantization default (QCD marker). `steps` holds one entry per subband in
/// arena order (LL first), except for the derived style which signals only
/// the LL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationParameters {
    pub style: QuantizationStyle,
    pub guard_bits: u8,
    pub steps: Vec<StepSize>,
}

impl Default for QuantizationParameters {
    fn default() -> Self {
        Self {
            style: QuantizationStyle::NoQuantization,
            guard_bits: DEFAULT_GUARD_BITS,
            steps: Vec::new(),
        }
    }
}

impl QuantizationParameters {
    /// Step of the subband at arena index `index`; a derived table scales
    /// the LL entry by the band's decomposition level (E-5).
    pub fn step(&self, index: usize, levels: u8) -> Option<StepSize> {
        match self.style {
            QuantizationStyle::ScalarDerived => {
                let base = *self.steps.first()?;
                let level_of_band = if index == 0 {
                    levels
                } else {
                    levels - ((index - 1) / 3) as u8
                };
                let exponent = (base.exponent as i32 - levels as i32 + level_of_band as i32).max(0);
                Some(StepSize {
                    exponent: exponent as u8,
                    mantissa: base.mantissa,
                })
            }
            _ => self.steps.get(index).copied(),
        }
    }

    pub fn validate(&self) -> Result<(), J2kError> {
        if self.guard_bits > MAXIMUM_GUARD_BITS {
            return Err(J2kError::UnsupportedFeature("guard bits"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_valid() {
        let parameters = CodingParameters::default();
        assert!(parameters.validate().is_ok());
        assert_eq!(parameters.codeblock_width(), 64);
        assert_eq!(parameters.resolution_count(), 6);
        assert_eq!(parameters.style_flags(), 0);
    }

    #[test]
    fn test_codeblock_exponent_limits() {
        assert!(validate_codeblock_exponents(2, 10).is_ok());
        assert!(validate_codeblock_exponents(6, 6).is_ok());
        assert_eq!(
            validate_codeblock_exponents(7, 6),
            Err(J2kError::InvalidArgumentCodeBlockSize)
        );
        assert_eq!(
            validate_codeblock_exponents(1, 4),
            Err(J2kError::InvalidArgumentCodeBlockSize)
        );
    }

    #[test]
    fn test_sop_eph_flags() {
        let parameters = CodingParameters {
            use_sop: true,
            use_eph: true,
            ..CodingParameters::default()
        };
        assert_eq!(parameters.style_flags(), 0b110);
    }

    #[test]
    fn test_derived_steps_follow_level() {
        let qcd = QuantizationParameters {
            style: QuantizationStyle::ScalarDerived,
            guard_bits: 2,
            steps: vec![StepSize {
                exponent: 10,
                mantissa: 5,
            }],
        };
        // LL and the coarsest detail bands share the signalled exponent.
        assert_eq!(qcd.step(0, 3).map(|s| s.exponent), Some(10));
        assert_eq!(qcd.step(1, 3).map(|s| s.exponent), Some(10));
        // Finest level: one less per level.
        assert_eq!(qcd.step(9, 3).map(|s| s.exponent), Some(8));
        assert_eq!(qcd.step(9, 3).map(|s| s.mantissa), Some(5));
    }
}
