//! # WaveSurfer RS
//!
//! A Rust library for acquiring and decoding waveforms from LeCroy
//! WaveSurfer-class digital storage oscilloscopes.
//!
//! The instrument answers a waveform query with a binary block: a fixed
//! layout descriptor carrying calibration and geometry, followed by 16-bit
//! samples. This crate parses that block, resolves its scale codes, turns
//! the samples into time and voltage, and derives the enhanced-resolution
//! bit depth and the bandwidth it leaves.
//!
//! ## Features
//!
//! - **Descriptor parsing**: named, offset-checked fields with truncation
//!   reporting for misaligned payloads
//! - **Calibration lookup**: exact integer-coded volts/div and time/div tables
//! - **Reconstruction**: calibrated `time`/`voltage` arrays, optionally as a
//!   `polars` DataFrame
//! - **Probe acquisitions**: the memory size is always restored, even when
//!   the probe fails
//! - **Reply validation**: sentinel replies are surfaced as errors before any
//!   field is parsed
//!
//! ## Examples
//!
//! ### Acquiring a waveform
//!
//! ```rust,no_run
//! use wavesurfer_rs::{Channel, OutputShape, Scope, ScopeConfig, SerialConfig};
//!
//! let mut scope = Scope::open(&SerialConfig::new("/dev/ttyUSB0"), ScopeConfig::default())?;
//!
//! scope.arm()?;
//! let acquisition = scope.waveform(Channel::C1, OutputShape::WithTime)?;
//! println!("Captured {} samples", acquisition.waveform.len());
//!
//! let df = acquisition.waveform.to_dataframe()?;
//! println!("{}", df.head(Some(5)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Enhanced resolution
//!
//! ```rust,no_run
//! use wavesurfer_rs::{Channel, Scope, ScopeConfig, SerialConfig};
//!
//! let mut scope = Scope::open(&SerialConfig::new("/dev/ttyUSB0"), ScopeConfig::default())?;
//!
//! // Lowers the memory size for a quick acquisition and restores it afterwards.
//! let bits = scope.probe_bit_depth(Channel::C2)?;
//! println!("C2 enhanced resolution: {} bits", bits);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Bandwidth
//!
//! ```rust
//! use wavesurfer_rs::metrics::{bandwidth, BitDepth};
//!
//! let sample_rate = 2e9;
//! assert_eq!(bandwidth(BitDepth::Integer(0), sample_rate).unwrap(), 1e9);
//! assert_eq!(bandwidth(BitDepth::Fractional(3.0), sample_rate).unwrap(), 0.016 * 1e9);
//! assert!(bandwidth(BitDepth::Integer(1), sample_rate).is_err());
//! ```

pub mod calibration;
pub mod config;
pub mod descriptor;
pub mod metrics;
pub mod reconstruct;
pub mod reply;
pub mod scope;
pub mod serial_transport;
pub mod transport;

// Re-export the main types for convenience
pub use calibration::{Axis, CalibrationError, Scale};

pub use config::{ScopeConfig, SerialConfig};

pub use descriptor::{DecodedBlock, Misalignment, ParseError, WaveformDescriptor};

pub use metrics::{BitDepth, MetricsError};

pub use reconstruct::{CalibratedWaveform, OutputShape};

pub use reply::{ProtocolError, Sentinels};

pub use scope::{Acquisition, Channel, Scope, ScopeError};

pub use serial_transport::SerialTransport;

pub use transport::{Transport, TransportError};
