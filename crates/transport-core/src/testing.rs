//! Test doubles for the transport and device seams
//!
//! Always compiled so that downstream crates can drive their integration
//! tests without a real media engine. [`FakeTransport`] enforces the same
//! ordering contract as a real peer connection (candidates are rejected
//! before the remote description) and records everything applied to it so
//! tests can assert on exact sequences.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use peercall_signaling_core::{CallId, IceCandidate, SessionDescription};
use tokio::sync::{mpsc, watch};

use crate::devices::{
    CameraFacing, CaptureConstraints, DeviceError, MediaDevices, MediaStream, MediaTrack,
    TrackKind,
};
use crate::ice::IceServerConfig;
use crate::transport::{MediaTransport, TransportError, TransportFactory, TransportState};

/// In-memory [`MediaTransport`] that records what call control does to it.
pub struct FakeTransport {
    state_tx: watch::Sender<TransportState>,
    closed: AtomicBool,
    offers_created: AtomicUsize,
    local_desc: Mutex<Option<SessionDescription>>,
    remote_desc: Mutex<Option<SessionDescription>>,
    applied_candidates: Mutex<Vec<IceCandidate>>,
    local_tracks: MediaStream,
    remote_stream: MediaStream,
    candidates_tx: mpsc::UnboundedSender<IceCandidate>,
    candidates_rx: Mutex<Option<mpsc::UnboundedReceiver<IceCandidate>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = watch::channel(TransportState::New);
        let (candidates_tx, candidates_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state_tx,
            closed: AtomicBool::new(false),
            offers_created: AtomicUsize::new(0),
            local_desc: Mutex::new(None),
            remote_desc: Mutex::new(None),
            applied_candidates: Mutex::new(Vec::new()),
            local_tracks: MediaStream::new(),
            remote_stream: MediaStream::new(),
            candidates_tx,
            candidates_rx: Mutex::new(Some(candidates_rx)),
        })
    }

    /// Drive the connection state from a test.
    pub fn set_state(&self, state: TransportState) {
        let _ = self.state_tx.send(state);
    }

    /// Simulate local candidate discovery.
    pub fn emit_local_candidate(&self, call_id: CallId, candidate: impl Into<String>) {
        let _ = self.candidates_tx.send(IceCandidate {
            call_id,
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        });
    }

    /// Candidates applied so far, in application order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.applied_candidates
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// How many offers this transport has produced.
    pub fn offers_created(&self) -> usize {
        self.offers_created.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Local tracks attached via [`MediaTransport::add_track`].
    pub fn local_tracks(&self) -> Vec<MediaTrack> {
        self.local_tracks.tracks()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn create_offer(&self) -> Result<String, TransportError> {
        self.ensure_open()?;
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("v=0 fake-offer {n}"))
    }

    async fn create_answer(&self) -> Result<String, TransportError> {
        self.ensure_open()?;
        if !self.has_remote_description() {
            return Err(TransportError::NoRemoteDescription);
        }
        Ok("v=0 fake-answer".to_string())
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.ensure_open()?;
        if let Ok(mut slot) = self.local_desc.lock() {
            *slot = Some(desc);
        }
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if let Ok(mut slot) = self.remote_desc.lock() {
            *slot = Some(desc);
        }
        Ok(())
    }

    fn has_remote_description(&self) -> bool {
        self.remote_desc
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !self.has_remote_description() {
            return Err(TransportError::NoRemoteDescription);
        }
        if let Ok(mut applied) = self.applied_candidates.lock() {
            applied.push(candidate);
        }
        Ok(())
    }

    fn add_track(&self, track: MediaTrack) {
        self.local_tracks.add_track(track);
    }

    async fn replace_video_track(&self, track: MediaTrack) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.remove_video_tracks();
        self.local_tracks.add_track(track);
        Ok(())
    }

    fn remove_video_tracks(&self) {
        for track in self.local_tracks.video_tracks() {
            self.local_tracks.remove_track(track.id());
        }
    }

    fn remote_stream(&self) -> MediaStream {
        self.remote_stream.clone()
    }

    fn state(&self) -> TransportState {
        *self.state_tx.borrow()
    }

    fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }

    fn take_local_candidates(&self) -> Option<mpsc::UnboundedReceiver<IceCandidate>> {
        self.candidates_rx.lock().ok()?.take()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.state_tx.send(TransportState::Closed);
        }
    }
}

/// Factory handing out [`FakeTransport`]s and remembering each one.
#[derive(Default)]
pub struct FakeTransportFactory {
    created: Mutex<Vec<Arc<FakeTransport>>>,
    fail_next: AtomicBool,
}

impl FakeTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next [`TransportFactory::create`] call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every transport created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The most recently created transport.
    pub fn last(&self) -> Option<Arc<FakeTransport>> {
        self.created
            .lock()
            .ok()
            .and_then(|c| c.last().cloned())
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServerConfig],
    ) -> Result<Arc<dyn MediaTransport>, TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Negotiation {
                reason: "simulated transport failure".to_string(),
            });
        }
        let transport = FakeTransport::new();
        if let Ok(mut created) = self.created.lock() {
            created.push(transport.clone());
        }
        Ok(transport)
    }
}

/// Capture stack handing out synthetic tracks.
#[derive(Default)]
pub struct FakeDevices {
    fail_next: AtomicBool,
    acquisitions: Mutex<Vec<CaptureConstraints>>,
}

impl FakeDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next [`MediaDevices::acquire`] call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Constraints of every acquisition so far.
    pub fn acquisitions(&self) -> Vec<CaptureConstraints> {
        self.acquisitions
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaStream, DeviceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::Unavailable {
                reason: "simulated device failure".to_string(),
            });
        }
        if let Ok(mut acquisitions) = self.acquisitions.lock() {
            acquisitions.push(constraints);
        }

        let stream = MediaStream::new();
        if constraints.audio {
            stream.add_track(MediaTrack::new(TrackKind::Audio, "fake-mic", None));
        }
        if let Some(video) = constraints.video {
            stream.add_track(MediaTrack::new(
                TrackKind::Video,
                "fake-camera",
                Some(video.facing),
            ));
        }
        Ok(stream)
    }
}

/// Convenience for tests that only need "a camera track".
pub fn fake_video_track(facing: CameraFacing) -> MediaTrack {
    MediaTrack::new(TrackKind::Video, "fake-camera", Some(facing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use peercall_signaling_core::SessionDescription;

    #[tokio::test]
    async fn candidate_rejected_before_remote_description() {
        let transport = FakeTransport::new();
        let call_id = uuid::Uuid::new_v4();
        let candidate = IceCandidate {
            call_id,
            candidate: "candidate:0".into(),
            sdp_mid: None,
            sdp_mline_index: None,
        };

        let err = transport.add_ice_candidate(candidate.clone()).await;
        assert!(matches!(err, Err(TransportError::NoRemoteDescription)));

        transport
            .set_remote_description(SessionDescription::offer(call_id, "v=0"))
            .await
            .unwrap();
        transport.add_ice_candidate(candidate).await.unwrap();
        assert_eq!(transport.applied_candidates().len(), 1);
    }

    #[tokio::test]
    async fn answer_requires_remote_offer() {
        let transport = FakeTransport::new();
        assert!(matches!(
            transport.create_answer().await,
            Err(TransportError::NoRemoteDescription)
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let transport = FakeTransport::new();
        transport.close().await;
        transport.close().await;
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(matches!(
            transport.create_offer().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn factory_records_created_transports() {
        let factory = FakeTransportFactory::new();
        factory.create(&[]).await.unwrap();
        factory.create(&[]).await.unwrap();
        assert_eq!(factory.created().len(), 2);
    }

    #[tokio::test]
    async fn devices_honor_constraints() {
        let devices = FakeDevices::new();
        let stream = devices
            .acquire(CaptureConstraints::video(CameraFacing::Front))
            .await
            .unwrap();
        assert_eq!(stream.audio_tracks().len(), 1);
        assert_eq!(stream.video_tracks().len(), 1);
        assert_eq!(
            stream.video_tracks()[0].facing(),
            Some(CameraFacing::Front)
        );
    }

    #[tokio::test]
    async fn failed_acquisition_leaves_no_stream() {
        let devices = FakeDevices::new();
        devices.fail_next();
        assert!(devices
            .acquire(CaptureConstraints::voice())
            .await
            .is_err());
        assert!(devices.acquisitions().is_empty());
    }
}
