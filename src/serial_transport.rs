use crate::config::SerialConfig;
use crate::transport::{Transport, TransportError};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// [`Transport`] over a serial port.
///
/// Text replies end at the configured terminator. Binary replies are IEEE
/// 488.2 definite-length blocks (`#<n><length><payload>`), followed by the
/// terminator.
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
    terminator: u8,
    reply_timeout: Duration,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.serial.name())
            .field("terminator", &self.terminator)
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}

impl SerialTransport {
    /// Open the port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        log::debug!("Opening {} at {} baud", config.port, config.baud_rate);
        let serial = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;
        Self::from_port(serial, config)
    }

    /// Wrap an already opened port.
    pub fn from_port(
        serial: Box<dyn SerialPort>,
        config: &SerialConfig,
    ) -> Result<Self, TransportError> {
        let mut transport = Self {
            serial,
            terminator: config.terminator,
            reply_timeout: config.reply_timeout,
        };
        transport.flush()?;
        Ok(transport)
    }

    /// Flush the serial buffer
    fn flush(&mut self) -> Result<(), TransportError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        log::debug!("-> {}", command);
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(self.terminator);
        self.serial.write_all(&line)?;
        Ok(())
    }

    fn reader(&mut self) -> ReplyReader<'_, dyn SerialPort> {
        ReplyReader::new(&mut *self.serial, self.terminator, self.reply_timeout)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let reply = self.reader().line()?;
        log::debug!("<- {}", reply);
        Ok(reply)
    }

    fn read_block(&mut self) -> Result<Vec<u8>, TransportError> {
        let block = self.reader().block()?;
        log::debug!("<- block of {} bytes", block.len());
        Ok(block)
    }
}

/// Collects one reply from a byte stream, giving up once the reply
/// deadline passes.
struct ReplyReader<'a, R: Read + ?Sized> {
    reader: &'a mut R,
    terminator: u8,
    started: Instant,
    timeout: Duration,
    received: Vec<u8>,
}

impl<'a, R: Read + ?Sized> ReplyReader<'a, R> {
    fn new(reader: &'a mut R, terminator: u8, timeout: Duration) -> Self {
        Self {
            reader,
            terminator,
            started: Instant::now(),
            timeout,
            received: Vec::new(),
        }
    }

    fn timeout_error(&self) -> TransportError {
        let tail = self.received.len().saturating_sub(2);
        TransportError::Timeout {
            expected: char::from(self.terminator).escape_default().to_string(),
            actual: String::from_utf8_lossy(&self.received[tail..]).to_string(),
        }
    }

    /// Append exactly `len` more bytes to the reply.
    fn read_exact_len(&mut self, len: usize) -> Result<(), TransportError> {
        let mut filled = self.received.len();
        let end = filled + len;
        self.received.resize(end, 0);
        while filled < end {
            match self.reader.read(&mut self.received[filled..]) {
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(e.into()),
            }
            if filled < end && self.started.elapsed() >= self.timeout {
                self.received.truncate(filled);
                return Err(self.timeout_error());
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        self.read_exact_len(1)?;
        self.received
            .last()
            .copied()
            .ok_or_else(|| self.timeout_error())
    }

    /// Text up to the terminator, trimmed.
    fn line(mut self) -> Result<String, TransportError> {
        while self.read_byte()? != self.terminator {}
        self.received.pop();
        Ok(String::from_utf8(self.received)?.trim().to_string())
    }

    /// Response header and definite-length block, without the terminator.
    ///
    /// A terminator before the `#` marker means the instrument answered
    /// with text; that text is returned as [`TransportError::TextReply`].
    fn block(mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let byte = self.read_byte()?;
            if byte == b'#' {
                break;
            }
            if byte == self.terminator {
                self.received.pop();
                let text = String::from_utf8_lossy(&self.received).trim().to_string();
                return Err(TransportError::TextReply(text));
            }
        }

        let digits = self.read_byte()?;
        let digits = char::from(digits)
            .to_digit(10)
            .filter(|&d| d > 0)
            .ok_or_else(|| {
                TransportError::MalformedBlock(format!(
                    "bad length digit count {:?}",
                    char::from(digits)
                ))
            })?;

        let field_start = self.received.len();
        self.read_exact_len(digits as usize)?;
        let length_field = &self.received[field_start..];
        let length: usize = std::str::from_utf8(length_field)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                TransportError::MalformedBlock(format!(
                    "bad block length {:?}",
                    String::from_utf8_lossy(length_field)
                ))
            })?;

        self.read_exact_len(length)?;
        let block_len = self.received.len();

        match self.read_byte() {
            Ok(byte) if byte == self.terminator => {}
            Ok(byte) => log::warn!("Block not followed by terminator, got 0x{:02x}", byte),
            Err(TransportError::Timeout { .. }) => log::warn!("Block not followed by terminator"),
            Err(e) => return Err(e),
        }
        self.received.truncate(block_len);
        Ok(self.received)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.send(command)
    }

    fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        self.send(command)?;
        self.read_line()
    }

    fn ask_block(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        self.send(command)?;
        self.read_block()
    }
}
