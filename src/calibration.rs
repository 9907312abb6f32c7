//! Scale codes carried in the waveform descriptor and the physical scale
//! each one stands for.
//!
//! Both tables follow the 1-2-5 sequence. The vertical table runs from
//! 1 µV/div (code 0) to 1 kV/div (code 27), the horizontal one from
//! 1 ps/div (code 0) to 5 ks/div (code 47). Horizontal code 100 marks an
//! external timebase, which has no scale of its own.

use std::fmt;

/// Volts per division, indexed by vertical scale code.
const VOLTS_PER_DIVISION: [f64; 28] = [
    1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6, //
    1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3, //
    1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, //
    1e3,
];

/// Seconds per division, indexed by horizontal scale code.
const SECONDS_PER_DIVISION: [f64; 48] = [
    1e-12, 2e-12, 5e-12, 10e-12, 20e-12, 50e-12, 100e-12, 200e-12, 500e-12, //
    1e-9, 2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9, //
    1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6, //
    1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3, //
    1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, //
    1e3, 2e3, 5e3,
];

pub const EXTERNAL_TIMEBASE_CODE: i16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical size of one division.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Volts or seconds per division, depending on the axis.
    PerDivision(f64),
    /// The timebase is supplied externally and unknown to the scope.
    ExternalTimebase,
}

impl Scale {
    pub fn per_division(&self) -> Option<f64> {
        match self {
            Self::PerDivision(value) => Some(*value),
            Self::ExternalTimebase => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    #[error("Unknown {axis} scale code {code}")]
    UnknownCode { axis: Axis, code: i16 },
}

/// Look up the scale a descriptor code stands for.
pub fn resolve(code: i16, axis: Axis) -> Result<Scale, CalibrationError> {
    let scale = match axis {
        Axis::Vertical => table_entry(&VOLTS_PER_DIVISION, code).map(Scale::PerDivision),
        Axis::Horizontal if code == EXTERNAL_TIMEBASE_CODE => Some(Scale::ExternalTimebase),
        Axis::Horizontal => table_entry(&SECONDS_PER_DIVISION, code).map(Scale::PerDivision),
    };
    scale.ok_or(CalibrationError::UnknownCode { axis, code })
}

fn table_entry(table: &[f64], code: i16) -> Option<f64> {
    usize::try_from(code)
        .ok()
        .and_then(|index| table.get(index).copied())
}
