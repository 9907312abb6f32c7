use crate::calibration::{CalibrationError, Scale};
use crate::config::{ScopeConfig, SerialConfig};
use crate::descriptor::{self, DecodedBlock, Misalignment, ParseError, WaveformDescriptor};
use crate::metrics::{self, BitDepth, MetricsError};
use crate::reconstruct::{self, CalibratedWaveform, OutputShape};
use crate::reply::{self, ProtocolError};
use crate::serial_transport::SerialTransport;
use crate::transport::{Transport, TransportError};
use std::fmt;
use std::ops::Deref;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Waveform parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Bandwidth error: {0}")]
    Metrics(#[from] MetricsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    C1,
    C2,
    C3,
    C4,
}

impl Channel {
    pub const ALL: [Self; 4] = [Self::C1, Self::C2, Self::C3, Self::C4];

    /// Channel by its 1-based front panel number.
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::C1),
            2 => Some(Self::C2),
            3 => Some(Self::C3),
            4 => Some(Self::C4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::C1 => "C1",
            Self::C2 => "C2",
            Self::C3 => "C3",
            Self::C4 => "C4",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded and calibrated acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub descriptor: WaveformDescriptor,
    pub volts_per_division: Scale,
    pub time_per_division: Scale,
    pub waveform: CalibratedWaveform,
    pub misalignment: Option<Misalignment>,
}

/// Controller for one oscilloscope session.
///
/// The scope owns its transport; every operation borrows the scope
/// mutably, so requests on a session never interleave.
#[derive(Debug)]
pub struct Scope<T: Transport> {
    transport: T,
    config: ScopeConfig,
}

impl Scope<SerialTransport> {
    /// Open a serial link and wrap it in a controller.
    pub fn open(serial: &SerialConfig, config: ScopeConfig) -> Result<Self, ScopeError> {
        let transport = SerialTransport::open(serial)?;
        log::debug!("Connected to oscilloscope on {}", serial.port);
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Scope<T> {
    const ARM: &'static str = "ARM";
    const SINGLE_TRIGGER: &'static str = "TRMD SINGLE";
    const STOP: &'static str = "STOP";
    const MEMORY_SIZE: &'static str = "MSIZ";
    const TIME_PER_DIVISION: &'static str = "TDIV";
    const WORD_FORMAT: &'static str = "COMM_FORMAT DEF9,WORD,BIN";
    /// Horizontal divisions on screen.
    const DIVISIONS: f64 = 10.0;

    pub fn new(transport: T, config: ScopeConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Ask `command`, reject sentinel replies and strip the `header`.
    fn query(&mut self, command: &str, header: &str) -> Result<String, ScopeError> {
        let reply = self.transport.ask(command)?;
        let body = self.config.sentinels.check(command, &reply)?;
        let value = reply::strip_header(command, body, header)?;
        Ok(value.to_string())
    }

    /// Arm the trigger for a single acquisition. Does not wait for it.
    pub fn arm(&mut self) -> Result<(), ScopeError> {
        log::debug!("Arming single acquisition");
        self.transport.write(Self::ARM)?;
        self.transport.write(Self::SINGLE_TRIGGER)?;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ScopeError> {
        log::debug!("Stopping acquisition");
        self.transport.write(Self::STOP)?;
        Ok(())
    }

    /// Acquisition memory size in samples.
    pub fn memory_size(&mut self) -> Result<u32, ScopeError> {
        let command = format!("{}?", Self::MEMORY_SIZE);
        let body = self.query(&command, Self::MEMORY_SIZE)?;
        let samples: f64 = reply::leading_number(&body)?;
        if !samples.is_finite() || samples < 0.0 || samples > f64::from(u32::MAX) {
            return Err(ProtocolError::InvalidNumber { field: body }.into());
        }
        Ok(samples as u32)
    }

    pub fn set_memory_size(&mut self, samples: u32) -> Result<(), ScopeError> {
        log::debug!("Setting memory size to {}", samples);
        self.transport
            .write(&format!("{} {}", Self::MEMORY_SIZE, samples))?;
        Ok(())
    }

    /// Seconds per horizontal division.
    pub fn time_per_division(&mut self) -> Result<f64, ScopeError> {
        let command = format!("{}?", Self::TIME_PER_DIVISION);
        let body = self.query(&command, Self::TIME_PER_DIVISION)?;
        Ok(reply::leading_number(&body)?)
    }

    /// Samples per second implied by the memory size and timebase.
    pub fn sample_rate(&mut self) -> Result<f64, ScopeError> {
        let memory_size = f64::from(self.memory_size()?);
        let time_per_division = self.time_per_division()?;
        Ok(memory_size / (time_per_division * Self::DIVISIONS))
    }

    /// Fetch and parse the raw waveform block of `channel`.
    ///
    /// A text reply in place of the block goes through the sentinel check,
    /// so `AL`/`AE` surface as [`ProtocolError`]s.
    pub fn waveform_block(&mut self, channel: Channel) -> Result<DecodedBlock, ScopeError> {
        self.transport.write(Self::WORD_FORMAT)?;
        let command = format!("{channel}:WAVEFORM?");
        let raw = match self.transport.ask_block(&command) {
            Ok(raw) => raw,
            Err(TransportError::TextReply(text)) => {
                let reply = self.config.sentinels.check(&command, &text)?;
                return Err(ProtocolError::UnexpectedPrefix {
                    expected: "#".to_string(),
                    reply: reply.to_string(),
                    command,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };
        log::debug!("Received {} bytes of {} waveform", raw.len(), channel);
        Ok(descriptor::parse(&raw)?)
    }

    /// Read the last acquisition of `channel` as calibrated samples.
    #[tracing::instrument(skip(self))]
    pub fn waveform(
        &mut self,
        channel: Channel,
        shape: OutputShape,
    ) -> Result<Acquisition, ScopeError> {
        let block = self.waveform_block(channel)?;
        let descriptor = block.descriptor;
        let volts_per_division = descriptor.volts_per_division()?;
        let time_per_division = descriptor.time_per_division()?;
        if time_per_division == Scale::ExternalTimebase {
            log::warn!("{} uses an external timebase; time axis is sample interval only", channel);
        }

        let waveform = reconstruct::reconstruct(&descriptor, &block.samples, shape);
        Ok(Acquisition {
            descriptor,
            volts_per_division,
            time_per_division,
            waveform,
            misalignment: block.misalignment,
        })
    }

    /// Run a short acquisition on `channel` and return the decoded block.
    ///
    /// The memory size is lowered for the probe and put back afterwards,
    /// also when the acquisition or the read fails.
    #[tracing::instrument(skip(self))]
    pub fn probe_block(&mut self, channel: Channel) -> Result<DecodedBlock, ScopeError> {
        let probe_size = self.config.probe_memory_size;
        let mut guard = MemorySizeGuard::acquire(self, probe_size)?;

        let outcome = guard.arm().and_then(|()| guard.waveform_block(channel));
        let restored = guard.restore();

        let block = outcome?;
        restored?;
        Ok(block)
    }

    /// Enhanced-resolution bits currently applied to `channel`.
    pub fn probe_bit_depth(&mut self, channel: Channel) -> Result<BitDepth, ScopeError> {
        let block = self.probe_block(channel)?;
        if let Some(misalignment) = block.misalignment {
            log::warn!("Bit depth read of {}: {}", channel, misalignment);
        }
        let descriptor = block.descriptor;
        let bit_depth = BitDepth::from_nominal_bits(descriptor.nominal_bits);
        log::debug!(
            "{} has {} enhanced resolution bits ({} nominal)",
            channel,
            bit_depth,
            descriptor.nominal_bits
        );
        Ok(bit_depth)
    }

    /// Bandwidth left on `channel` by its enhanced-resolution setting.
    pub fn eres_bandwidth(&mut self, channel: Channel) -> Result<f64, ScopeError> {
        let bit_depth = self.probe_bit_depth(channel)?;
        let sample_rate = self.sample_rate()?;
        Ok(metrics::bandwidth(bit_depth, sample_rate)?)
    }
}

/// Memory size temporarily overridden for a probe acquisition.
///
/// The saved size is written back by [`MemorySizeGuard::restore`], or on
/// drop if that was never called. Only the probe steps are reachable
/// through the guard, so the memory size cannot change under it.
pub(crate) struct MemorySizeGuard<'a, T: Transport> {
    scope: &'a mut Scope<T>,
    saved: u32,
    restored: bool,
}

impl<'a, T: Transport> MemorySizeGuard<'a, T> {
    pub(crate) fn acquire(scope: &'a mut Scope<T>, probe_size: u32) -> Result<Self, ScopeError> {
        let saved = scope.memory_size()?;
        let guard = Self {
            scope,
            saved,
            restored: false,
        };
        guard.scope.set_memory_size(probe_size)?;
        Ok(guard)
    }

    pub(crate) fn saved(&self) -> u32 {
        self.saved
    }

    pub(crate) fn arm(&mut self) -> Result<(), ScopeError> {
        self.scope.arm()
    }

    pub(crate) fn waveform_block(&mut self, channel: Channel) -> Result<DecodedBlock, ScopeError> {
        self.scope.waveform_block(channel)
    }

    pub(crate) fn restore(mut self) -> Result<(), ScopeError> {
        self.restored = true;
        let saved = self.saved;
        self.scope.set_memory_size(saved).inspect_err(|e| {
            log::error!("Failed to restore memory size {}: {}", saved, e);
        })
    }
}

impl<T: Transport> Deref for MemorySizeGuard<'_, T> {
    type Target = Scope<T>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl<T: Transport> Drop for MemorySizeGuard<'_, T> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.scope.set_memory_size(self.saved) {
                log::error!("Failed to restore memory size {}: {}", self.saved, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::fixture;
    use crate::transport::mock::MockTransport;

    const C2_WAVEFORM: &str = "C2:WAVEFORM?";

    fn scope_with(transport: MockTransport) -> Scope<MockTransport> {
        Scope::new(transport, ScopeConfig::default())
    }

    #[test]
    fn test_channel_numbers() {
        assert_eq!(Channel::from_number(1), Some(Channel::C1));
        assert_eq!(Channel::from_number(4), Some(Channel::C4));
        assert_eq!(Channel::from_number(0), None);
        assert_eq!(Channel::C3.to_string(), "C3");
    }

    #[test]
    fn test_arm_sends_arm_then_single() {
        let mut scope = scope_with(MockTransport::new(1000));
        scope.arm().unwrap();
        assert_eq!(scope.transport().sent(), ["ARM", "TRMD SINGLE"]);
    }

    #[test]
    fn test_memory_size_parsing() {
        let mut scope = scope_with(MockTransport::new(25_000));
        assert_eq!(scope.memory_size().unwrap(), 25_000);

        let mut scope = scope_with(MockTransport::new(0).with_reply("MSIZ?", "MSIZ 10E+3 SAMPLE"));
        assert_eq!(scope.memory_size().unwrap(), 10_000);

        let mut scope = scope_with(MockTransport::new(0).with_reply("MSIZ?", "-5 SAMPLE"));
        assert!(matches!(
            scope.memory_size(),
            Err(ScopeError::Protocol(ProtocolError::InvalidNumber { .. }))
        ));
    }

    #[test]
    fn test_sentinel_replies_are_errors() {
        let mut scope = scope_with(MockTransport::new(0).with_reply("MSIZ?", "AL"));
        assert!(matches!(
            scope.memory_size(),
            Err(ScopeError::Protocol(ProtocolError::LocalControl { .. }))
        ));

        let mut scope = scope_with(MockTransport::new(0).with_reply("TDIV?", "AE"));
        assert!(matches!(
            scope.time_per_division(),
            Err(ScopeError::Protocol(ProtocolError::DeviceBusy { .. }))
        ));
    }

    #[test]
    fn test_unexpected_header_is_protocol_error() {
        let mut scope = scope_with(MockTransport::new(0).with_reply("MSIZ?", "TDIV 1E-6 S"));
        assert!(matches!(
            scope.memory_size(),
            Err(ScopeError::Protocol(ProtocolError::UnexpectedPrefix { .. }))
        ));
    }

    #[test]
    fn test_sample_rate() {
        let mut transport = MockTransport::new(10_000);
        transport.time_per_division = 1e-6;
        let mut scope = scope_with(transport);
        let rate = scope.sample_rate().unwrap();
        assert!((rate - 1e9).abs() < 1.0);
    }

    #[test]
    fn test_waveform_decodes_and_calibrates() {
        let raw = fixture::block(&fixture::descriptor(9), &[100, -50, 0]);
        let mut scope = scope_with(MockTransport::new(1000).with_block(C2_WAVEFORM, raw));

        let acquisition = scope.waveform(Channel::C2, OutputShape::WithTime).unwrap();
        assert_eq!(acquisition.volts_per_division, Scale::PerDivision(1e-3));
        assert_eq!(acquisition.time_per_division, Scale::PerDivision(1e-6));
        assert_eq!(acquisition.waveform.len(), 3);
        assert!((acquisition.waveform.voltage()[0] - 0.08).abs() < 1e-7);
        assert_eq!(acquisition.misalignment, None);
        assert_eq!(
            scope.transport().sent(),
            ["COMM_FORMAT DEF9,WORD,BIN", C2_WAVEFORM]
        );
    }

    #[test]
    fn test_waveform_rejects_unknown_scale_code() {
        let descriptor = WaveformDescriptor {
            horizontal_scale_code: 77,
            ..fixture::descriptor(8)
        };
        let raw = fixture::block(&descriptor, &[1, 2]);
        let mut scope = scope_with(MockTransport::new(1000).with_block(C2_WAVEFORM, raw));

        assert!(matches!(
            scope.waveform(Channel::C2, OutputShape::VoltageOnly),
            Err(ScopeError::Calibration(CalibrationError::UnknownCode { code: 77, .. }))
        ));
    }

    #[test]
    fn test_waveform_accepts_external_timebase() {
        let descriptor = WaveformDescriptor {
            horizontal_scale_code: 100,
            ..fixture::descriptor(8)
        };
        let raw = fixture::block(&descriptor, &[1]);
        let mut scope = scope_with(MockTransport::new(1000).with_block(C2_WAVEFORM, raw));

        let acquisition = scope.waveform(Channel::C2, OutputShape::WithTime).unwrap();
        assert_eq!(acquisition.time_per_division, Scale::ExternalTimebase);
    }

    #[test]
    fn test_waveform_reports_misalignment() {
        let mut raw = fixture::block(&fixture::descriptor(8), &[1, 2]);
        raw.push(0);
        let mut scope = scope_with(MockTransport::new(1000).with_block(C2_WAVEFORM, raw));

        let acquisition = scope.waveform(Channel::C2, OutputShape::VoltageOnly).unwrap();
        assert_eq!(acquisition.waveform.len(), 2);
        assert_eq!(acquisition.misalignment.map(|m| m.dropped), Some(1));
    }

    #[test]
    fn test_probe_sequence_and_restore() {
        let raw = fixture::block(&fixture::descriptor(11), &[0; 500]);
        let mut scope = scope_with(MockTransport::new(50_000).with_block(C2_WAVEFORM, raw));

        let bit_depth = scope.probe_bit_depth(Channel::C2).unwrap();
        assert_eq!(bit_depth, BitDepth::Integer(3));
        assert_eq!(scope.transport().memory_size, 50_000);
        assert_eq!(
            scope.transport().sent(),
            [
                "MSIZ?",
                "MSIZ 500",
                "ARM",
                "TRMD SINGLE",
                "COMM_FORMAT DEF9,WORD,BIN",
                C2_WAVEFORM,
                "MSIZ 50000",
            ]
        );
    }

    #[test]
    fn test_probe_restores_memory_size_when_read_fails() {
        let transport = MockTransport::new(25_000).failing_on(C2_WAVEFORM);
        let mut scope = scope_with(transport);

        let result = scope.probe_bit_depth(Channel::C2);
        assert!(matches!(
            result,
            Err(ScopeError::Transport(TransportError::Timeout { .. }))
        ));
        assert_eq!(scope.transport().memory_size, 25_000);
        assert_eq!(scope.transport().sent().last().unwrap(), "MSIZ 25000");
    }

    #[test]
    fn test_probe_restores_memory_size_when_arm_fails() {
        let transport = MockTransport::new(2_500).failing_on("ARM");
        let mut scope = scope_with(transport);

        assert!(scope.probe_bit_depth(Channel::C1).is_err());
        assert_eq!(scope.transport().memory_size, 2_500);
    }

    #[test]
    fn test_probe_restores_memory_size_when_block_is_short() {
        let transport = MockTransport::new(1_000).with_block(C2_WAVEFORM, vec![0; 10]);
        let mut scope = scope_with(transport);

        assert!(matches!(
            scope.probe_bit_depth(Channel::C2),
            Err(ScopeError::Parse(ParseError::TooShort { len: 10, .. }))
        ));
        assert_eq!(scope.transport().memory_size, 1_000);
    }

    #[test]
    fn test_probe_does_not_mutate_when_save_fails() {
        let transport = MockTransport::new(1_000).with_reply("MSIZ?", "AL");
        let mut scope = scope_with(transport);

        assert!(scope.probe_bit_depth(Channel::C2).is_err());
        assert_eq!(scope.transport().sent(), ["MSIZ?"]);
    }

    #[test]
    fn test_waveform_sentinel_instead_of_block() {
        let mut scope = scope_with(MockTransport::new(1000).with_block_text(C2_WAVEFORM, "AL"));
        assert!(matches!(
            scope.waveform(Channel::C2, OutputShape::WithTime),
            Err(ScopeError::Protocol(ProtocolError::LocalControl { .. }))
        ));

        let mut scope = scope_with(MockTransport::new(1000).with_block_text(C2_WAVEFORM, "AE"));
        assert!(matches!(
            scope.waveform_block(Channel::C2),
            Err(ScopeError::Protocol(ProtocolError::DeviceBusy { .. }))
        ));
    }

    #[test]
    fn test_waveform_other_text_instead_of_block() {
        let mut scope =
            scope_with(MockTransport::new(1000).with_block_text(C2_WAVEFORM, "CMR 1"));
        assert!(matches!(
            scope.waveform_block(Channel::C2),
            Err(ScopeError::Protocol(ProtocolError::UnexpectedPrefix {
                ref command,
                ref expected,
                ref reply,
            })) if command == C2_WAVEFORM && expected == "#" && reply == "CMR 1"
        ));
    }

    #[test]
    fn test_bit_depth_read_restores_memory_size_after_sentinel() {
        let transport = MockTransport::new(20_000).with_block_text(C2_WAVEFORM, "AL");
        let mut scope = scope_with(transport);

        assert!(matches!(
            scope.probe_bit_depth(Channel::C2),
            Err(ScopeError::Protocol(ProtocolError::LocalControl { .. }))
        ));
        assert_eq!(scope.transport().memory_size, 20_000);
        assert_eq!(scope.transport().sent().last().unwrap(), "MSIZ 20000");
    }

    #[test]
    fn test_restore_failure_is_returned() {
        let raw = fixture::block(&fixture::descriptor(10), &[0; 4]);
        let transport = MockTransport::new(50_000)
            .with_block(C2_WAVEFORM, raw)
            .failing_on("MSIZ 50000");
        let mut scope = scope_with(transport);

        assert!(matches!(
            scope.probe_bit_depth(Channel::C2),
            Err(ScopeError::Transport(TransportError::Timeout { .. }))
        ));
        assert_eq!(scope.transport().memory_size, 500);
        assert_eq!(
            scope
                .transport()
                .sent()
                .iter()
                .filter(|c| c.as_str() == "MSIZ 50000")
                .count(),
            1
        );
    }

    #[test]
    fn test_guarded_block_keeps_misalignment() {
        let mut raw = fixture::block(&fixture::descriptor(10), &[7, 8, 9]);
        raw.push(0xff);
        let mut scope = scope_with(MockTransport::new(5_000).with_block(C2_WAVEFORM, raw));

        let block = scope.probe_block(Channel::C2).unwrap();
        assert_eq!(block.samples, [7, 8, 9]);
        assert_eq!(block.misalignment.map(|m| m.dropped), Some(1));
        assert_eq!(block.descriptor.nominal_bits, 10);
        assert_eq!(scope.transport().memory_size, 5_000);
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let mut scope = scope_with(MockTransport::new(10_000));
        {
            let guard = MemorySizeGuard::acquire(&mut scope, 500).unwrap();
            assert_eq!(guard.saved(), 10_000);
            assert_eq!(guard.transport().memory_size, 500);
        }
        assert_eq!(scope.transport().memory_size, 10_000);
    }

    #[test]
    fn test_probe_size_is_configurable() {
        let raw = fixture::block(&fixture::descriptor(8), &[]);
        let transport = MockTransport::new(1_000).with_block(C2_WAVEFORM, raw);
        let mut scope = Scope::new(
            transport,
            ScopeConfig::default().with_probe_memory_size(1_000),
        );

        assert_eq!(scope.probe_bit_depth(Channel::C2).unwrap(), BitDepth::Integer(0));
        assert!(scope.transport().sent().contains(&"MSIZ 1000".to_string()));
    }

    #[test]
    fn test_eres_bandwidth_scenario() {
        // 9 nominal bits give an integer depth of 1, which has no table entry.
        let raw = fixture::block(&fixture::descriptor(9), &[100, -50, 0]);
        let mut scope = scope_with(MockTransport::new(10_000).with_block(C2_WAVEFORM, raw));

        assert!(matches!(
            scope.eres_bandwidth(Channel::C2),
            Err(ScopeError::Metrics(MetricsError::UnmappedBitDepth(BitDepth::Integer(1))))
        ));
        assert_eq!(scope.transport().memory_size, 10_000);
    }

    #[test]
    fn test_eres_bandwidth_without_enhancement_is_nyquist() {
        let raw = fixture::block(&fixture::descriptor(8), &[]);
        let mut transport = MockTransport::new(10_000).with_block(C2_WAVEFORM, raw);
        transport.time_per_division = 1e-6;
        let mut scope = scope_with(transport);

        let bandwidth = scope.eres_bandwidth(Channel::C2).unwrap();
        assert!((bandwidth - 5e8).abs() < 1.0);
    }
}
