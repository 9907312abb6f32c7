//! Request/response primitive the scope controller drives.
//!
//! A [`Transport`] is a blocking link with at most one request in flight.
//! Failures are reported as [`TransportError`] and are never retried here.

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Timeout error: Expected terminator '{expected}' but got '{actual}'. Likely due to a timeout."
    )]
    Timeout { expected: String, actual: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Malformed block header: {0}")]
    MalformedBlock(String),

    #[error("Text reply '{0}' where a binary block was expected")]
    TextReply(String),
}

/// Synchronous command link to an instrument.
pub trait Transport {
    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Send a query and return its textual reply with the terminator stripped.
    fn ask(&mut self, command: &str) -> Result<String, TransportError>;

    /// Send a query whose reply is a definite-length binary block.
    ///
    /// The returned bytes include everything the instrument sent before the
    /// payload (response header and `#<n><length>` block prefix). A reply
    /// that ends before any block marker is [`TransportError::TextReply`].
    fn ask_block(&mut self, command: &str) -> Result<Vec<u8>, TransportError>;
}
