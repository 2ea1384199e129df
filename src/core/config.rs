//! Per-endpoint tuning parameters.
//!
//! The frame cap, accept retry backoff, and listen backlog are fields on the
//! endpoint rather than process-wide constants, so independent endpoints can
//! be tuned (and tested) separately.

use std::time::Duration;

use crate::message::sizes;

/// Default backoff between retries of a transiently failing accept.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default listen backlog for the server role.
pub const DEFAULT_BACKLOG: u32 = 8;

/// Tunable parameters for one [`Endpoint`](crate::Endpoint), consumed via
/// [`EndpointBuilder::config`](crate::EndpointBuilder::config) or the
/// builder's individual setters.
///
/// Both sides of a connection must agree on `max_frame_size`; the codec
/// rejects inbound frames advertising a larger length before buffering them.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Hard cap on one encoded frame, prefix included. Doubles as the bound
    /// on the inbound accumulation buffer, so any complete frame fits.
    pub max_frame_size: usize,

    /// Backoff between retries of a transiently failing accept. Not a
    /// timeout: connection attempts run to the transport's own verdict.
    pub poll_interval: Duration,

    /// Listen backlog for the server role.
    pub backlog: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_frame_size: sizes::DEFAULT_MAX_FRAME,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EndpointConfig::default();
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.backlog, 8);
    }
}
