//! Media transport and capture-device seams for peer-to-peer calls
//!
//! Call control never talks to a media engine directly. It goes through the
//! trait seams defined here:
//!
//! - [`MediaTransport`] / [`TransportFactory`]: one peer connection per call
//!   attempt, covering offer/answer negotiation, candidate application, track
//!   attachment and connection-state watching
//! - [`MediaDevices`]: microphone/camera acquisition behind
//!   [`CaptureConstraints`]
//! - [`ice`]: STUN/TURN server configuration with working public defaults
//!
//! The [`testing`] module ships complete in-memory doubles of both seams; it
//! is always compiled so downstream integration tests can use it directly.

pub mod devices;
pub mod ice;
pub mod testing;
pub mod transport;

pub use devices::{
    CameraFacing, CaptureConstraints, DeviceError, MediaDevices, MediaStream, MediaTrack,
    TrackKind, VideoConstraints,
};
pub use ice::{default_ice_servers, IceServerConfig, DEFAULT_CANDIDATE_POOL_SIZE};
pub use transport::{MediaTransport, TransportError, TransportFactory, TransportState};
