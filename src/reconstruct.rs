//! Conversion of raw sample counts to time and voltage.

use crate::descriptor::WaveformDescriptor;
use polars::prelude::*;

pub const TIME_COLUMN_NAME: &str = "time";
pub const VOLTAGE_COLUMN_NAME: &str = "voltage";

/// Whether a reconstruction also produces the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
    #[default]
    WithTime,
    VoltageOnly,
}

/// Calibrated samples of one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedWaveform {
    time: Option<Vec<f64>>,
    voltage: Vec<f64>,
}

impl CalibratedWaveform {
    /// Seconds since the first sample, if requested.
    pub fn time(&self) -> Option<&[f64]> {
        self.time.as_deref()
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    pub fn into_parts(self) -> (Option<Vec<f64>>, Vec<f64>) {
        (self.time, self.voltage)
    }

    /// Columns `time` (when present) and `voltage`.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let mut columns: Vec<Column> = Vec::with_capacity(2);
        if let Some(time) = &self.time {
            columns.push(Series::new(TIME_COLUMN_NAME.into(), time.as_slice()).into());
        }
        columns.push(Series::new(VOLTAGE_COLUMN_NAME.into(), self.voltage.as_slice()).into());
        DataFrame::new(columns)
    }
}

/// Apply the descriptor's affine calibration to raw samples.
///
/// `voltage[i] = vertical_gain * raw[i] - vertical_offset` and
/// `time[i] = horizontal_gain * i`. Time starts at the first sample; no
/// trigger offset is applied.
pub fn reconstruct(
    descriptor: &WaveformDescriptor,
    samples: &[i16],
    shape: OutputShape,
) -> CalibratedWaveform {
    let gain = f64::from(descriptor.vertical_gain);
    let offset = f64::from(descriptor.vertical_offset);
    let voltage = samples
        .iter()
        .map(|&raw| gain * f64::from(raw) - offset)
        .collect();

    let time = match shape {
        OutputShape::WithTime => {
            let interval = f64::from(descriptor.horizontal_gain);
            Some((0..samples.len()).map(|i| interval * i as f64).collect())
        }
        OutputShape::VoltageOnly => None,
    };

    CalibratedWaveform { time, voltage }
}
