//! Connection settings for a PC/SC reader

use std::time::Duration;

/// How the card handle is shared with other PC/SC clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShareMode {
    /// Keep other applications off the card while it is being read
    Exclusive,
    /// Let other applications use the card too
    #[default]
    Shared,
}

impl From<ShareMode> for pcsc::ShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
        }
    }
}

/// Reader connection settings
///
/// Contactless readers present every card as T=1, but the default accepts
/// either protocol so contact readers keep working.
#[derive(Debug, Clone, Copy)]
pub struct PcscConfig {
    /// Card handle sharing
    pub share_mode: ShareMode,
    /// Protocols offered on connect
    pub protocols: pcsc::Protocols,
    /// Longest single wait for a card to arrive or leave
    ///
    /// Polling loops check for cancellation between waits.
    pub presence_timeout: Duration,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::default(),
            protocols: pcsc::Protocols::ANY,
            presence_timeout: Duration::from_millis(250),
        }
    }
}

impl PcscConfig {
    /// Set card handle sharing
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Offer only these protocols on connect
    pub const fn with_protocols(mut self, protocols: pcsc::Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the card presence wait
    pub const fn with_presence_timeout(mut self, timeout: Duration) -> Self {
        self.presence_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = PcscConfig::default()
            .with_share_mode(ShareMode::Exclusive)
            .with_protocols(pcsc::Protocols::T1)
            .with_presence_timeout(Duration::from_secs(1));
        assert_eq!(config.share_mode, ShareMode::Exclusive);
        assert_eq!(config.protocols, pcsc::Protocols::T1);
        assert_eq!(config.presence_timeout, Duration::from_secs(1));
        assert_eq!(PcscConfig::default().share_mode, ShareMode::Shared);
    }
}
