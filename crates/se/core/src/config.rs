//! Service configuration

use nexum_apdu_core::{MAX_LOGICAL_CHANNEL, ResponseChainer, processor::DEFAULT_MAX_CHAIN};

/// Configuration for an [`SeService`](crate::SeService)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeConfig {
    /// Maximum number of logical channels open at once on one card, excluding the basic channel
    pub max_logical_channels: u8,
    /// Follow 61xx / 6Cxx status words transparently
    pub get_response: bool,
    /// Maximum number of GET RESPONSE rounds per command
    pub max_response_chain: usize,
    /// Keep SELECT responses so callers can read them back
    pub select_response_enabled: bool,
    /// Report every reader as reserved for the trusted environment
    pub tee_only: bool,
}

impl Default for SeConfig {
    fn default() -> Self {
        Self {
            max_logical_channels: MAX_LOGICAL_CHANNEL,
            get_response: true,
            max_response_chain: DEFAULT_MAX_CHAIN,
            select_response_enabled: true,
            tee_only: false,
        }
    }
}

impl SeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit concurrent logical channels per card; clamped to `1..=19`
    pub fn with_max_logical_channels(mut self, max: u8) -> Self {
        self.max_logical_channels = max.clamp(1, MAX_LOGICAL_CHANNEL);
        self
    }

    /// Enable or disable automatic GET RESPONSE handling
    pub const fn with_get_response(mut self, enabled: bool) -> Self {
        self.get_response = enabled;
        self
    }

    /// Set the GET RESPONSE round limit
    pub const fn with_max_response_chain(mut self, max: usize) -> Self {
        self.max_response_chain = max;
        self
    }

    /// Enable or disable SELECT response retention
    pub const fn with_select_response(mut self, enabled: bool) -> Self {
        self.select_response_enabled = enabled;
        self
    }

    /// Mark all readers as reserved for the trusted environment
    pub const fn with_tee_only(mut self, tee_only: bool) -> Self {
        self.tee_only = tee_only;
        self
    }

    pub(crate) const fn chainer(&self) -> ResponseChainer {
        ResponseChainer {
            enabled: self.get_response,
            max_chain: self.max_response_chain,
        }
    }
}
