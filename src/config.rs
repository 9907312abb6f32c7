//! Link and controller settings.

use crate::reply::Sentinels;
use std::time::Duration;

/// How to open the serial link to the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Timeout of a single read call on the port.
    pub read_timeout: Duration,
    /// Upper bound on the time spent waiting for one complete reply.
    pub reply_timeout: Duration,
    pub terminator: u8,
}

impl SerialConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(10),
            reply_timeout: Duration::from_secs(5),
            terminator: b'\n',
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_terminator(mut self, terminator: u8) -> Self {
        self.terminator = terminator;
        self
    }
}

/// Behaviour of the acquisition controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfig {
    /// Memory size written for the short acquisition that reads the bit depth.
    pub probe_memory_size: u32,
    pub sentinels: Sentinels,
}

impl ScopeConfig {
    pub const DEFAULT_PROBE_MEMORY_SIZE: u32 = 500;

    pub fn with_probe_memory_size(mut self, samples: u32) -> Self {
        self.probe_memory_size = samples;
        self
    }

    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            probe_memory_size: Self::DEFAULT_PROBE_MEMORY_SIZE,
            sentinels: Sentinels::default(),
        }
    }
}
