//! Client configuration
//!
//! [`CallConfig`] carries everything the coordinator needs that is not a
//! collaborator object: the local identity, the ICE server set and the
//! timing knobs of the call lifecycle. Defaults match production behavior;
//! tests shrink the durations to keep runs fast.
//!
//! # Usage
//!
//! ```rust
//! use peercall_client_core::config::CallConfig;
//! use peercall_signaling_core::Party;
//!
//! let config = CallConfig::new(Party::new("alice", "Alice"))
//!     .with_ring_timeout(std::time::Duration::from_secs(30));
//!
//! assert_eq!(config.user.id, "alice");
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use peercall_signaling_core::Party;
use peercall_transport_core::{default_ice_servers, IceServerConfig};

use crate::error::{ClientError, ClientResult};

/// Configuration for a calling client.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// The local user
    pub user: Party,
    /// STUN/TURN servers for connectivity establishment
    pub ice_servers: Vec<IceServerConfig>,
    /// Incoming records older than this are discarded as stale
    pub staleness_bound: Duration,
    /// How long an unanswered incoming call rings before it is missed
    pub ring_timeout: Duration,
    /// Delay between a terminal status and signaling-data cleanup
    pub cleanup_delay: Duration,
    /// Interval of the connected-duration ticker
    pub tick_interval: Duration,
    /// Ringtone audio asset; a synthesized tone is used when absent
    pub ringtone_asset: Option<PathBuf>,
    /// Outgoing dial-tone audio asset; a synthesized tone is used when absent
    pub dial_tone_asset: Option<PathBuf>,
}

impl CallConfig {
    /// Configuration with production defaults for `user`.
    pub fn new(user: Party) -> Self {
        Self {
            user,
            ice_servers: default_ice_servers(),
            staleness_bound: Duration::from_secs(60),
            ring_timeout: Duration::from_secs(45),
            cleanup_delay: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
            ringtone_asset: None,
            dial_tone_asset: None,
        }
    }

    /// Replace the ICE server set.
    pub fn with_ice_servers(mut self, servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Set the staleness bound for incoming records.
    pub fn with_staleness_bound(mut self, bound: Duration) -> Self {
        self.staleness_bound = bound;
        self
    }

    /// Set how long an unanswered call rings before it is missed.
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Set the delay before signaling-data cleanup.
    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Set the connected-duration ticker interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Use an audio asset for the incoming ringtone.
    pub fn with_ringtone_asset(mut self, path: impl Into<PathBuf>) -> Self {
        self.ringtone_asset = Some(path.into());
        self
    }

    /// Use an audio asset for the outgoing dial tone.
    pub fn with_dial_tone_asset(mut self, path: impl Into<PathBuf>) -> Self {
        self.dial_tone_asset = Some(path.into());
        self
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> ClientResult<()> {
        if self.user.id.is_empty() {
            return Err(ClientError::InvalidConfiguration {
                message: "user id must not be empty".to_string(),
            });
        }
        if self.ring_timeout.is_zero() {
            return Err(ClientError::InvalidConfiguration {
                message: "ring timeout must be non-zero".to_string(),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ClientError::InvalidConfiguration {
                message: "tick interval must be non-zero".to_string(),
            });
        }
        if self.staleness_bound < self.ring_timeout {
            return Err(ClientError::InvalidConfiguration {
                message: "staleness bound must be at least the ring timeout".to_string(),
            });
        }
        Ok(())
    }
}
