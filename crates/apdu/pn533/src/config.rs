//! Timing configuration

use std::time::Duration;

/// Timeouts used when talking to the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pn533Config {
    /// Timeout for one USB bulk transfer
    pub usb_timeout: Duration,
    /// Timeout for the response to InListPassiveTarget
    pub poll_timeout: Duration,
    /// Timeout for each read while draining stale data
    pub flush_timeout: Duration,
    /// Most reads while draining stale data
    pub flush_reads: usize,
}

impl Default for Pn533Config {
    fn default() -> Self {
        Self {
            usb_timeout: Duration::from_millis(5000),
            poll_timeout: Duration::from_millis(2000),
            flush_timeout: Duration::from_millis(100),
            flush_reads: 10,
        }
    }
}

impl Pn533Config {
    /// Set the USB transfer timeout
    pub const fn with_usb_timeout(mut self, timeout: Duration) -> Self {
        self.usb_timeout = timeout;
        self
    }

    /// Set the target poll timeout
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}
