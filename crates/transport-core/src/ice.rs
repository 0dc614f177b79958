//! ICE server configuration
//!
//! Connectivity establishment needs at least one STUN server for reflexive
//! candidates and, behind symmetric NATs, a TURN relay. The defaults here
//! combine public STUN with a public relay so that a freshly built client
//! connects across typical consumer NATs without any configuration.

use serde::{Deserialize, Serialize};

/// Candidates gathered ahead of the first offer, to shorten call setup.
pub const DEFAULT_CANDIDATE_POOL_SIZE: u8 = 10;

/// One STUN or TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URL, e.g. `stun:stun.example.org:19302`
    pub urls: String,
    /// TURN username, absent for STUN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential, absent for STUN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// STUN entry (no credentials).
    pub fn stun(urls: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            username: None,
            credential: None,
        }
    }

    /// TURN entry with long-term credentials.
    pub fn turn(
        urls: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: urls.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    /// Whether this entry is a relay (TURN) server.
    pub fn is_relay(&self) -> bool {
        self.urls.starts_with("turn:") || self.urls.starts_with("turns:")
    }
}

/// Default server set: public Google STUN plus the Open Relay TURN pool on
/// ports 80, 443 and 443/tcp for networks that block UDP.
pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig::stun("stun:stun.l.google.com:19302"),
        IceServerConfig::stun("stun:stun1.l.google.com:19302"),
        IceServerConfig::stun("stun:stun2.l.google.com:19302"),
        IceServerConfig::turn(
            "turn:openrelay.metered.ca:80",
            "openrelayproject",
            "openrelayproject",
        ),
        IceServerConfig::turn(
            "turn:openrelay.metered.ca:443",
            "openrelayproject",
            "openrelayproject",
        ),
        IceServerConfig::turn(
            "turn:openrelay.metered.ca:443?transport=tcp",
            "openrelayproject",
            "openrelayproject",
        ),
    ]
}
