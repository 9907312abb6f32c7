//! Validation and field extraction for textual instrument replies.
//!
//! Every textual reply goes through two phases. First it is compared against
//! the instrument's sentinel replies ("under local control", "general
//! error"); a match is an error and the reply is never treated as data.
//! Only then are fixed-width fields cut out of the reply and converted.
//!
//! ```
//! use wavesurfer_rs::reply::{self, Sentinels};
//!
//! let sentinels = Sentinels::default();
//! let status = sentinels.check("S20", "A2115 6").unwrap();
//! let word: u32 = reply::numeric_field(status, 2..5).unwrap();
//! assert_eq!(word, 115);
//! assert!(reply::bit_set(word, 4));
//!
//! assert!(sentinels.check("S20", "AL").is_err());
//! ```

use std::ops::{Range, RangeInclusive};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Instrument is under local control; '{command}' was denied")]
    LocalControl { command: String },

    #[error("Instrument answered '{command}' with a general error")]
    DeviceBusy { command: String },

    #[error("Unexpected reply to '{command}': expected prefix '{expected}', got '{reply}'")]
    UnexpectedPrefix {
        command: String,
        expected: String,
        reply: String,
    },

    #[error("Reply '{reply}' has no field at {start}..{end}")]
    MissingField {
        reply: String,
        start: usize,
        end: usize,
    },

    #[error("Field '{field}' is not a valid number")]
    InvalidNumber { field: String },
}

/// Fixed replies an instrument sends instead of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub local_control: String,
    pub general_error: String,
}

impl Sentinels {
    pub fn new(local_control: &str, general_error: &str) -> Self {
        Self {
            local_control: local_control.to_string(),
            general_error: general_error.to_string(),
        }
    }

    /// Reject sentinel replies, passing anything else through untouched.
    pub fn check<'a>(&self, command: &str, reply: &'a str) -> Result<&'a str, ProtocolError> {
        let trimmed = reply.trim();
        if trimmed == self.local_control {
            log::warn!("'{}' refused: instrument under local control", command);
            return Err(ProtocolError::LocalControl {
                command: command.to_string(),
            });
        }
        if trimmed == self.general_error {
            log::warn!("'{}' answered with a general error", command);
            return Err(ProtocolError::DeviceBusy {
                command: command.to_string(),
            });
        }
        Ok(trimmed)
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self::new("AL", "AE")
    }
}

/// Strip the acknowledgement header from a reply.
///
/// Replies sent with command headers disabled carry no prefix at all and are
/// accepted as they are. Anything else that does not start with `expected`
/// is a protocol error.
pub fn strip_header<'a>(
    command: &str,
    reply: &'a str,
    expected: &str,
) -> Result<&'a str, ProtocolError> {
    if let Some(rest) = reply.strip_prefix(expected) {
        return Ok(rest.trim_start());
    }
    if reply.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.')) {
        return Ok(reply);
    }
    Err(ProtocolError::UnexpectedPrefix {
        command: command.to_string(),
        expected: expected.to_string(),
        reply: reply.to_string(),
    })
}

/// Cut the characters in `range` out of a reply.
pub fn fixed_field(reply: &str, range: Range<usize>) -> Result<&str, ProtocolError> {
    reply
        .get(range.clone())
        .ok_or_else(|| ProtocolError::MissingField {
            reply: reply.to_string(),
            start: range.start,
            end: range.end,
        })
}

/// Parse the fixed-width field at `range` as a number.
pub fn numeric_field<N: FromStr>(reply: &str, range: Range<usize>) -> Result<N, ProtocolError> {
    let field = fixed_field(reply, range)?;
    parse_number(field)
}

/// Parse the first whitespace-separated token of a reply body, e.g. the
/// `1E-6` of `1E-6 S`.
pub fn leading_number<N: FromStr>(body: &str) -> Result<N, ProtocolError> {
    let token = body.split_whitespace().next().unwrap_or_default();
    parse_number(token)
}

fn parse_number<N: FromStr>(field: &str) -> Result<N, ProtocolError> {
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber {
            field: field.to_string(),
        })
}

pub const fn bit_set(value: u32, bit: u32) -> bool {
    bit < u32::BITS && (value >> bit) & 1 == 1
}

pub fn field_in_range(value: i64, range: &RangeInclusive<i64>) -> bool {
    range.contains(&value)
}
