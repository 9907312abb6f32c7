//! Enhanced-resolution bit depth and the bandwidth it leaves.

use std::fmt;

/// Bandwidth, as a fraction of Nyquist, left by each enhanced-resolution
/// setting. Keys match exactly; there is no interpolation.
const BANDWIDTH_FRACTIONS: [(f64, f64); 5] = [
    (0.5, 0.5),
    (1.0, 0.241),
    (1.5, 0.121),
    (2.0, 0.058),
    (3.0, 0.016),
];

/// Extra bits of resolution gained by the enhanced-resolution filter.
///
/// Depths read back from a waveform descriptor are always
/// [`BitDepth::Integer`]; only [`BitDepth::Fractional`] values can hit the
/// bandwidth table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BitDepth {
    Integer(i32),
    Fractional(f64),
}

impl BitDepth {
    /// Derive the depth from a descriptor's nominal bit count.
    pub fn from_nominal_bits(nominal_bits: i16) -> Self {
        match i32::from(nominal_bits) - 8 {
            8 => Self::Integer(0),
            bits => Self::Integer(bits),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Integer(bits) => *bits == 0,
            Self::Fractional(bits) => *bits == 0.0,
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(bits) => write!(f, "{bits}"),
            Self::Fractional(bits) => write!(f, "{bits:.1}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MetricsError {
    #[error("No bandwidth entry for {0} enhanced-resolution bits")]
    UnmappedBitDepth(BitDepth),
}

/// Effective bandwidth in Hz for a bit depth at `sample_rate` samples/s.
pub fn bandwidth(bit_depth: BitDepth, sample_rate: f64) -> Result<f64, MetricsError> {
    let nyquist = sample_rate / 2.0;
    if bit_depth.is_zero() {
        return Ok(nyquist);
    }

    let fraction = match bit_depth {
        BitDepth::Fractional(bits) => BANDWIDTH_FRACTIONS
            .iter()
            .find(|(key, _)| key.to_bits() == bits.to_bits())
            .map(|(_, fraction)| *fraction),
        BitDepth::Integer(_) => None,
    };

    fraction
        .map(|fraction| fraction * nyquist)
        .ok_or(MetricsError::UnmappedBitDepth(bit_depth))
}
