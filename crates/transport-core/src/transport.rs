//! The media-transport seam
//!
//! [`MediaTransport`] abstracts one peer connection: offer/answer
//! negotiation, candidate application, track attachment and connection-state
//! reporting. Call control is written entirely against this trait and the
//! matching [`TransportFactory`], so the concrete engine (a WebRTC stack in
//! production, [`crate::testing::FakeTransport`] in tests) is a deployment
//! choice, not a code path.
//!
//! The one behavioral contract every implementation must honor is candidate
//! ordering: [`MediaTransport::add_ice_candidate`] fails with
//! [`TransportError::NoRemoteDescription`] until the remote description is
//! applied. Callers are expected to buffer early candidates and flush them
//! in arrival order afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use peercall_signaling_core::{IceCandidate, SessionDescription};
use tokio::sync::{mpsc, watch};

use crate::devices::{MediaStream, MediaTrack};
use crate::ice::IceServerConfig;

/// Connection state of a media transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, negotiation not started
    New,
    /// Candidate checks in progress
    Connecting,
    /// A working path exists and media is flowing
    Connected,
    /// The path was lost, may recover
    Disconnected,
    /// All candidate pairs failed
    Failed,
    /// Explicitly closed
    Closed,
}

impl TransportState {
    /// Whether this state means the call cannot continue on this transport.
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed
        )
    }
}

/// Errors surfaced by a media transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// A candidate was applied before the remote description
    #[error("no remote description set")]
    NoRemoteDescription,

    /// The transport was already closed
    #[error("transport closed")]
    Closed,

    /// Offer/answer negotiation failed
    #[error("negotiation failed: {reason}")]
    Negotiation { reason: String },
}

/// One peer connection.
///
/// All methods take `&self`; implementations are internally synchronized and
/// shared behind `Arc<dyn MediaTransport>`.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Produce an SDP offer describing the currently attached local tracks.
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Produce an SDP answer to the previously applied remote offer.
    async fn create_answer(&self) -> Result<String, TransportError>;

    /// Apply our own description (the offer or answer we just produced).
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError>;

    /// Apply the counterparty's description.
    async fn set_remote_description(&self, desc: SessionDescription)
        -> Result<(), TransportError>;

    /// Whether a remote description has been applied yet.
    fn has_remote_description(&self) -> bool;

    /// Apply one remote candidate.
    ///
    /// Must be called only after [`set_remote_description`]; fails with
    /// [`TransportError::NoRemoteDescription`] otherwise.
    ///
    /// [`set_remote_description`]: MediaTransport::set_remote_description
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Attach a local capture track to be sent to the peer.
    fn add_track(&self, track: MediaTrack);

    /// Swap the outgoing video track without renegotiating.
    async fn replace_video_track(&self, track: MediaTrack) -> Result<(), TransportError>;

    /// Detach all outgoing video tracks.
    fn remove_video_tracks(&self);

    /// The stream of tracks received from the peer.
    fn remote_stream(&self) -> MediaStream;

    /// Current connection state.
    fn state(&self) -> TransportState;

    /// Subscribe to connection-state changes.
    fn state_changes(&self) -> watch::Receiver<TransportState>;

    /// Take the stream of locally discovered candidates.
    ///
    /// Candidates arrive in discovery order. The receiver can be taken once;
    /// subsequent calls return `None`.
    fn take_local_candidates(&self) -> Option<mpsc::UnboundedReceiver<IceCandidate>>;

    /// Tear the connection down. Idempotent.
    async fn close(&self);
}

/// Creates transports, one per call attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
    ) -> Result<Arc<dyn MediaTransport>, TransportError>;
}
