//! Capture devices and local media streams
//!
//! [`MediaDevices`] is the seam between call control and the platform's
//! microphone/camera stack. Call control only ever asks for a stream matching
//! [`CaptureConstraints`]; what "a microphone" concretely is belongs to the
//! implementation behind the trait.
//!
//! [`MediaStream`] and [`MediaTrack`] are thin shared handles. Tracks carry
//! the two flags call control needs to flip at runtime: `enabled` (mute and
//! camera on/off toggles) and `stopped` (hardware released, irreversible).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// Errors surfaced by a capture-device backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// The requested device is missing, busy or permission was denied
    #[error("capture device unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Which physical camera a video track should come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    /// The opposite camera, used by the mid-call camera switch.
    pub fn flipped(&self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

/// What to capture when acquiring a local stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Capture the microphone
    pub audio: bool,
    /// Capture a camera, and which one
    pub video: Option<VideoConstraints>,
}

/// Camera capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: CameraFacing,
}

impl CaptureConstraints {
    /// Microphone only.
    pub fn voice() -> Self {
        Self {
            audio: true,
            video: None,
        }
    }

    /// Microphone plus camera at the standard call resolution.
    pub fn video(facing: CameraFacing) -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                width: 640,
                height: 480,
                facing,
            }),
        }
    }
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    facing: Option<CameraFacing>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Shared handle to one capture track.
///
/// Cloning shares the underlying track; disabling or stopping through any
/// clone is visible through all of them.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>, facing: Option<CameraFacing>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                facing,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Camera this track captures from, for video tracks.
    pub fn facing(&self) -> Option<CameraFacing> {
        self.inner.facing
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Pause or resume the track without releasing the device.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Release the underlying device. Irreversible.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Shared handle to a set of local capture tracks.
#[derive(Clone, Default)]
pub struct MediaStream {
    tracks: Arc<Mutex<Vec<MediaTrack>>>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(tracks: Vec<MediaTrack>) -> Self {
        Self {
            tracks: Arc::new(Mutex::new(tracks)),
        }
    }

    pub fn add_track(&self, track: MediaTrack) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.push(track);
        }
    }

    /// Remove a track by id, returning it if present.
    pub fn remove_track(&self, id: &str) -> Option<MediaTrack> {
        let mut tracks = self.tracks.lock().ok()?;
        let pos = tracks.iter().position(|t| t.id() == id)?;
        Some(tracks.remove(pos))
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Audio)
            .collect()
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .collect()
    }

    /// Stop every track, releasing all captured devices.
    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("tracks", &self.tracks().len())
            .finish()
    }
}

/// Platform capture stack.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a local stream matching `constraints`.
    ///
    /// Fails with [`DeviceError::Unavailable`] when the device is missing,
    /// busy or permission was denied; callers surface this before any
    /// signaling write happens so a failed acquisition leaves no trace in
    /// the channel.
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaStream, DeviceError>;
}
