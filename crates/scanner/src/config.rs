//! Scanner configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use farecard_card::KeyProvider;

/// Which backends to probe and how the poll loops pace themselves
#[derive(Clone)]
pub struct ScannerConfig {
    /// Probe PC/SC readers
    pub pcsc: bool,
    /// Probe PN533-family USB devices
    pub pn533: bool,
    /// Only use PC/SC readers whose name contains this
    pub reader_filter: Option<String>,
    /// Sleep between polls that found nothing
    pub poll_interval: Duration,
    /// Sleep between polls while waiting for the card to leave
    pub removal_interval: Duration,
    /// Key material for MIFARE Classic
    pub keys: Option<Arc<dyn KeyProvider>>,
}

impl fmt::Debug for ScannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerConfig")
            .field("pcsc", &self.pcsc)
            .field("pn533", &self.pn533)
            .field("reader_filter", &self.reader_filter)
            .field("poll_interval", &self.poll_interval)
            .field("removal_interval", &self.removal_interval)
            .field("keys", &self.keys.is_some())
            .finish()
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            pcsc: true,
            pn533: true,
            reader_filter: None,
            poll_interval: Duration::from_millis(250),
            removal_interval: Duration::from_millis(300),
            keys: None,
        }
    }
}

impl ScannerConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the PC/SC backend
    pub const fn with_pcsc(mut self, enabled: bool) -> Self {
        self.pcsc = enabled;
        self
    }

    /// Enable or disable the PN533 backend
    pub const fn with_pn533(mut self, enabled: bool) -> Self {
        self.pn533 = enabled;
        self
    }

    /// Restrict PC/SC to readers whose name contains `filter`
    pub fn with_reader_filter(mut self, filter: impl Into<String>) -> Self {
        self.reader_filter = Some(filter.into());
        self
    }

    /// Set both poll loop intervals
    pub const fn with_intervals(mut self, poll: Duration, removal: Duration) -> Self {
        self.poll_interval = poll;
        self.removal_interval = removal;
        self
    }

    /// Use key material for MIFARE Classic
    pub fn with_keys(mut self, keys: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }
}
