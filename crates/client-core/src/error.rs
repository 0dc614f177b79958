//! Error types for call coordination
//!
//! All public operations return [`ClientResult`]. Errors are grouped the way
//! callers react to them: device problems are shown to the user, signaling
//! and transport problems may be retried, state errors mean the operation
//! simply does not apply right now.

use peercall_signaling_core::{CallId, CallStatus, SignalingError};
use peercall_transport_core::{DeviceError, TransportError};

/// Errors surfaced by call-coordination operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Microphone or camera could not be acquired
    #[error("capture device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    /// A new call was requested while one is already in progress
    #[error("already in a call (status {status:?})")]
    AlreadyInCall { status: CallStatus },

    /// Accept/decline was requested with no incoming call pending
    #[error("no incoming call")]
    NoIncomingCall,

    /// An in-call operation was requested with no active call
    #[error("no active call")]
    NoActiveCall,

    /// The referenced call does not exist
    #[error("call {call_id} not found")]
    CallNotFound { call_id: CallId },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The signaling channel failed
    #[error("signaling failed: {reason}")]
    SignalingFailed { reason: String },

    /// The media transport failed
    #[error("transport failed: {reason}")]
    TransportFailed { reason: String },

    /// Internal error
    #[error("internal error: {message}")]
    InternalError { message: String },

    /// The client is shutting down
    #[error("client is shut down")]
    Shutdown,
}

impl ClientError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Signaling and transport failures are usually transient network
    /// conditions; everything else reflects state or configuration that a
    /// retry will not change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::SignalingFailed { .. } | ClientError::TransportFailed { .. }
        )
    }

    /// Coarse category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::DeviceUnavailable { .. } => "device",
            ClientError::AlreadyInCall { .. }
            | ClientError::NoIncomingCall
            | ClientError::NoActiveCall
            | ClientError::CallNotFound { .. } => "state",
            ClientError::InvalidConfiguration { .. } => "configuration",
            ClientError::SignalingFailed { .. } => "signaling",
            ClientError::TransportFailed { .. } => "transport",
            ClientError::InternalError { .. } => "internal",
            ClientError::Shutdown => "lifecycle",
        }
    }
}

impl From<SignalingError> for ClientError {
    fn from(e: SignalingError) -> Self {
        match e {
            SignalingError::CallNotFound { call_id } => ClientError::CallNotFound { call_id },
            SignalingError::Backend { reason } => ClientError::SignalingFailed { reason },
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::TransportFailed {
            reason: e.to_string(),
        }
    }
}

impl From<DeviceError> for ClientError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Unavailable { reason } => ClientError::DeviceUnavailable { reason },
        }
    }
}

/// Result type for call-coordination operations.
pub type ClientResult<T> = Result<T, ClientError>;
