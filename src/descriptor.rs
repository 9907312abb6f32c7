//! Binary waveform descriptor (`WAVEDESC`) decoding.
//!
//! A `C<n>:WAVEFORM?` reply in `DEF9,WORD,BIN` format starts with a 21-byte
//! prefix (`C1:WF ALL,#9nnnnnnnnn`), followed by the descriptor and the
//! sample array. Multi-byte fields are little-endian; offsets below are
//! relative to the end of the prefix.

use crate::calibration::{self, Axis, CalibrationError, Scale};

/// Length of the response header and block prefix preceding the descriptor.
pub const HEADER_SKIP: usize = 21;

const VERTICAL_GAIN: usize = 156;
const VERTICAL_OFFSET: usize = 160;
const NOMINAL_BITS: usize = 172;
const HORIZONTAL_INTERVAL: usize = 176;
const TIMEBASE: usize = 324;
const FIXED_VERTICAL_GAIN: usize = 332;
const WAVE_ARRAY: usize = 348;

/// Absolute offset of the first sample, and the shortest block accepted.
pub const DATA_START: usize = HEADER_SKIP + WAVE_ARRAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Waveform block too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
}

/// The sample payload did not hold a whole number of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Waveform payload of {payload_len} bytes is misaligned; dropped {dropped} trailing byte(s)")]
pub struct Misalignment {
    pub payload_len: usize,
    pub dropped: usize,
}

/// Calibration and geometry fields of one waveform block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformDescriptor {
    /// Volts per raw count.
    pub vertical_gain: f32,
    /// Volts subtracted after scaling.
    pub vertical_offset: f32,
    /// Seconds between samples.
    pub horizontal_gain: f32,
    pub nominal_bits: i16,
    pub vertical_scale_code: i16,
    pub horizontal_scale_code: i16,
}

impl WaveformDescriptor {
    pub fn volts_per_division(&self) -> Result<Scale, CalibrationError> {
        calibration::resolve(self.vertical_scale_code, Axis::Vertical)
    }

    pub fn time_per_division(&self) -> Result<Scale, CalibrationError> {
        calibration::resolve(self.horizontal_scale_code, Axis::Horizontal)
    }
}

/// A parsed waveform block.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    pub descriptor: WaveformDescriptor,
    pub samples: Vec<i16>,
    /// Set when trailing bytes had to be dropped from the payload.
    pub misalignment: Option<Misalignment>,
}

/// Reads descriptor fields at offsets relative to [`HEADER_SKIP`].
struct DescriptorReader<'a> {
    block: &'a [u8],
}

impl<'a> DescriptorReader<'a> {
    fn new(block: &'a [u8]) -> Result<Self, ParseError> {
        if block.len() < DATA_START {
            return Err(ParseError::TooShort {
                len: block.len(),
                min: DATA_START,
            });
        }
        Ok(Self { block })
    }

    fn bytes<const N: usize>(&self, offset: usize) -> Result<[u8; N], ParseError> {
        let start = HEADER_SKIP + offset;
        self.block
            .get(start..start + N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(ParseError::TooShort {
                len: self.block.len(),
                min: start + N,
            })
    }

    fn f32_at(&self, offset: usize) -> Result<f32, ParseError> {
        self.bytes(offset).map(f32::from_le_bytes)
    }

    fn i16_at(&self, offset: usize) -> Result<i16, ParseError> {
        self.bytes(offset).map(i16::from_le_bytes)
    }

    fn descriptor(&self) -> Result<WaveformDescriptor, ParseError> {
        Ok(WaveformDescriptor {
            vertical_gain: self.f32_at(VERTICAL_GAIN)?,
            vertical_offset: self.f32_at(VERTICAL_OFFSET)?,
            horizontal_gain: self.f32_at(HORIZONTAL_INTERVAL)?,
            nominal_bits: self.i16_at(NOMINAL_BITS)?,
            vertical_scale_code: self.i16_at(FIXED_VERTICAL_GAIN)?,
            horizontal_scale_code: self.i16_at(TIMEBASE)?,
        })
    }

    fn samples(&self) -> (Vec<i16>, Option<Misalignment>) {
        let payload = &self.block[DATA_START..];
        let chunks = payload.chunks_exact(2);
        let dropped = chunks.remainder().len();
        let samples = chunks
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let misalignment = (dropped > 0).then_some(Misalignment {
            payload_len: payload.len(),
            dropped,
        });
        (samples, misalignment)
    }
}

/// Split a raw waveform reply into its descriptor and sample buffer.
///
/// An odd-length payload is truncated to the last whole sample and the
/// truncation is reported in [`DecodedBlock::misalignment`].
pub fn parse(raw: &[u8]) -> Result<DecodedBlock, ParseError> {
    let reader = DescriptorReader::new(raw)?;
    let descriptor = reader.descriptor()?;
    let (samples, misalignment) = reader.samples();

    if let Some(misalignment) = &misalignment {
        log::warn!("{}", misalignment);
    }
    log::debug!(
        "Parsed waveform block: {} samples, {} nominal bits",
        samples.len(),
        descriptor.nominal_bits
    );

    Ok(DecodedBlock {
        descriptor,
        samples,
        misalignment,
    })
}
