//! One media session, from handshake to teardown
//!
//! A [`CallSession`] owns everything specific to a single call attempt: the
//! transport, the acquired local media, the signaling watchers and the
//! candidate gate. The coordinator creates one per call and drops it at
//! teardown; nothing in here survives the call.
//!
//! # Candidate ordering
//!
//! Remote candidates can arrive through the signaling channel before the
//! remote description does, and the transport rejects candidates until the
//! description is applied. The session therefore routes every remote
//! candidate through a single gate: before the remote description, the
//! candidate is buffered; applying the description flushes the buffer in
//! arrival order under the same lock, so a candidate arriving mid-flush can
//! never jump the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use peercall_signaling_core::{
    CallKind, CallPatch, CallRecord, CallStatus, IceCandidate, Party, SessionDescription,
    SignalingStore,
};
use peercall_transport_core::{
    CameraFacing, CaptureConstraints, IceServerConfig, MediaDevices, MediaStream, MediaTransport,
    TrackKind, TransportFactory, TransportState,
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Which side of the call this client is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

/// Events a session reports up to the coordinator.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transport left its working state and the call cannot continue
    TransportDown {
        call_id: peercall_signaling_core::CallId,
        state: TransportState,
    },
    /// Remote media started flowing
    RemoteStream {
        call_id: peercall_signaling_core::CallId,
        stream: MediaStream,
    },
}

/// How long the callee waits for the caller's offer to appear.
const OFFER_WAIT: Duration = Duration::from_secs(20);

struct CandidateGate {
    remote_applied: bool,
    buffer: Vec<IceCandidate>,
}

/// One active media session.
pub struct CallSession {
    record: CallRecord,
    role: CallRole,
    user_id: String,
    store: Arc<dyn SignalingStore>,
    transport: Arc<dyn MediaTransport>,
    local_stream: MediaStream,
    gate: AsyncMutex<CandidateGate>,
    camera_facing: std::sync::Mutex<CameraFacing>,
    devices: Arc<dyn MediaDevices>,
    torn_down: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl CallSession {
    /// Start the caller side: acquire media, create the call record, write
    /// the offer and watch for the answer and the callee's candidates.
    ///
    /// Device acquisition happens first so that a missing microphone fails
    /// the operation before anything is written to the signaling channel.
    /// Once the record exists, any later failure tears the session down and
    /// closes the record out, so the receiver never rings against a dial
    /// that already died.
    pub async fn start_caller(
        store: Arc<dyn SignalingStore>,
        transports: Arc<dyn TransportFactory>,
        devices: Arc<dyn MediaDevices>,
        ice_servers: &[IceServerConfig],
        caller: Party,
        receiver: Party,
        kind: CallKind,
    ) -> ClientResult<(Arc<Self>, CallRecord)> {
        let local_stream = devices.acquire(constraints_for(kind)).await?;
        let transport = transports.create(ice_servers).await?;
        for track in local_stream.tracks() {
            transport.add_track(track);
        }

        let record = store.create_call(&caller, &receiver, kind).await?;
        info!(call_id = %record.id, receiver = %receiver.id, ?kind, "outgoing call created");

        let session = Self::assemble(
            record.clone(),
            CallRole::Caller,
            caller.id.clone(),
            store.clone(),
            transport.clone(),
            local_stream,
            devices,
        );

        session.spawn_candidate_pump();
        session.spawn_remote_candidate_watcher(record.receiver_id.clone());

        if let Err(e) = session.caller_handshake().await {
            warn!(call_id = %record.id, error = %e, "caller setup failed, abandoning the call");
            session.teardown().await;
            if let Err(we) = store
                .update_status(record.id, CallStatus::Ended, CallPatch::default())
                .await
            {
                warn!(call_id = %record.id, error = %we, "failed to close out abandoned call");
            }
            return Err(e);
        }

        session.spawn_answer_watcher();
        session.spawn_state_watcher();

        Ok((session, record))
    }

    /// Start the callee side for an accepted call: acquire media, apply the
    /// offer, write the answer and mark the record connected.
    ///
    /// Any failure after media is acquired tears the session down before the
    /// error is returned, so the microphone and transport never leak out of
    /// a setup that went nowhere.
    pub async fn start_callee(
        store: Arc<dyn SignalingStore>,
        transports: Arc<dyn TransportFactory>,
        devices: Arc<dyn MediaDevices>,
        ice_servers: &[IceServerConfig],
        user: Party,
        record: CallRecord,
    ) -> ClientResult<Arc<Self>> {
        let local_stream = devices.acquire(constraints_for(record.kind)).await?;
        let transport = transports.create(ice_servers).await?;
        for track in local_stream.tracks() {
            transport.add_track(track);
        }

        let session = Self::assemble(
            record.clone(),
            CallRole::Callee,
            user.id.clone(),
            store.clone(),
            transport.clone(),
            local_stream,
            devices,
        );

        session.spawn_candidate_pump();
        session.spawn_remote_candidate_watcher(record.caller_id.clone());

        if let Err(e) = session.callee_handshake().await {
            warn!(call_id = %record.id, error = %e, "callee setup failed, releasing media");
            session.teardown().await;
            return Err(e);
        }
        info!(call_id = %record.id, "call answered");

        session.spawn_state_watcher();
        Ok(session)
    }

    async fn caller_handshake(&self) -> ClientResult<()> {
        let offer_sdp = self.transport.create_offer().await?;
        self.transport
            .set_local_description(SessionDescription::offer(self.record.id, offer_sdp.clone()))
            .await?;
        let store = self.store.clone();
        let desc = SessionDescription::offer(self.record.id, offer_sdp);
        retry_with_backoff("write_offer", RetryConfig::quick(), || {
            let store = store.clone();
            let desc = desc.clone();
            async move { store.write_offer(desc).await.map_err(ClientError::from) }
        })
        .await?;
        Ok(())
    }

    async fn callee_handshake(&self) -> ClientResult<()> {
        // The offer is normally already in the channel and replayed
        // immediately; the timeout covers a caller that died mid-dial.
        let mut offer_rx = self.store.watch_offer(self.record.id);
        let offer = tokio::time::timeout(OFFER_WAIT, offer_rx.recv())
            .await
            .map_err(|_| ClientError::SignalingFailed {
                reason: "offer never arrived".to_string(),
            })?
            .ok_or_else(|| ClientError::SignalingFailed {
                reason: "offer channel closed".to_string(),
            })?;
        self.apply_remote_description(offer).await?;

        let answer_sdp = self.transport.create_answer().await?;
        self.transport
            .set_local_description(SessionDescription::answer(self.record.id, answer_sdp.clone()))
            .await?;
        {
            let store = self.store.clone();
            let desc = SessionDescription::answer(self.record.id, answer_sdp);
            retry_with_backoff("write_answer", RetryConfig::quick(), || {
                let store = store.clone();
                let desc = desc.clone();
                async move { store.write_answer(desc).await.map_err(ClientError::from) }
            })
            .await?;
        }

        let store = self.store.clone();
        let call_id = self.record.id;
        retry_with_backoff("mark_connected", RetryConfig::quick(), || {
            let store = store.clone();
            async move {
                store
                    .update_status(call_id, CallStatus::Connected, CallPatch::default())
                    .await
                    .map_err(ClientError::from)
            }
        })
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        record: CallRecord,
        role: CallRole,
        user_id: String,
        store: Arc<dyn SignalingStore>,
        transport: Arc<dyn MediaTransport>,
        local_stream: MediaStream,
        devices: Arc<dyn MediaDevices>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            record,
            role,
            user_id,
            store,
            transport,
            local_stream,
            gate: AsyncMutex::new(CandidateGate {
                remote_applied: false,
                buffer: Vec::new(),
            }),
            camera_facing: std::sync::Mutex::new(CameraFacing::Front),
            devices,
            torn_down: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(Vec::new()),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        })
    }

    pub fn call_id(&self) -> peercall_signaling_core::CallId {
        self.record.id
    }

    pub fn role(&self) -> CallRole {
        self.role
    }

    /// Take the session event stream. Can be taken once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().ok()?.take()
    }

    /// Media received from the peer.
    pub fn remote_stream(&self) -> MediaStream {
        self.transport.remote_stream()
    }

    /// Apply the counterparty's description and flush buffered candidates.
    ///
    /// Buffer flush happens under the gate lock, so candidates arriving
    /// concurrently queue behind the flush and keep their order.
    async fn apply_remote_description(&self, desc: SessionDescription) -> ClientResult<()> {
        let mut gate = self.gate.lock().await;
        self.transport.set_remote_description(desc).await?;
        gate.remote_applied = true;
        let buffered = std::mem::take(&mut gate.buffer);
        if !buffered.is_empty() {
            debug!(
                call_id = %self.record.id,
                count = buffered.len(),
                "flushing buffered remote candidates"
            );
        }
        for candidate in buffered {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!(call_id = %self.record.id, error = %e, "buffered candidate rejected");
            }
        }
        Ok(())
    }

    async fn handle_remote_candidate(&self, candidate: IceCandidate) {
        let mut gate = self.gate.lock().await;
        if gate.remote_applied {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!(call_id = %self.record.id, error = %e, "remote candidate rejected");
            }
        } else {
            gate.buffer.push(candidate);
        }
    }

    /// Mute or unmute the outgoing audio.
    pub fn set_muted(&self, muted: bool) {
        for track in self.local_stream.audio_tracks() {
            track.set_enabled(!muted);
        }
        debug!(call_id = %self.record.id, muted, "microphone toggled");
    }

    /// Pause or resume the outgoing video.
    pub fn set_video_enabled(&self, enabled: bool) {
        for track in self.local_stream.video_tracks() {
            track.set_enabled(enabled);
        }
        debug!(call_id = %self.record.id, enabled, "camera toggled");
    }

    /// Route audio to the speaker or the earpiece.
    ///
    /// Output routing lives in the platform audio layer; the session only
    /// records the request.
    pub fn set_speaker(&self, on: bool) {
        debug!(call_id = %self.record.id, speaker = on, "speaker route requested");
    }

    /// Swap the outgoing video to the opposite camera.
    ///
    /// The new track replaces the old one in the existing transport sender,
    /// so no renegotiation happens and the remote side keeps receiving.
    pub async fn switch_camera(&self) -> ClientResult<()> {
        if self.local_stream.video_tracks().is_empty() {
            warn!(call_id = %self.record.id, "camera switch requested without video");
            return Ok(());
        }
        let next = {
            let facing = self
                .camera_facing
                .lock()
                .map_err(|_| ClientError::InternalError {
                    message: "camera state poisoned".to_string(),
                })?;
            facing.flipped()
        };

        let fresh = self
            .devices
            .acquire(CaptureConstraints {
                audio: false,
                video: CaptureConstraints::video(next).video,
            })
            .await?;
        let new_track = fresh
            .video_tracks()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::DeviceUnavailable {
                reason: "camera produced no video track".to_string(),
            })?;

        for old in self.local_stream.video_tracks() {
            old.stop();
            self.local_stream.remove_track(old.id());
        }
        self.transport.replace_video_track(new_track.clone()).await?;
        self.local_stream.add_track(new_track);

        if let Ok(mut facing) = self.camera_facing.lock() {
            *facing = next;
        }
        info!(call_id = %self.record.id, ?next, "camera switched");
        Ok(())
    }

    /// Add a camera track to a voice call and flip the stored kind to video.
    ///
    /// The track is attached to the existing transport without a new
    /// offer/answer round; the remote side only renders it once a future
    /// renegotiation advertises it. TODO: trigger renegotiation here once
    /// the answer watcher accepts updated descriptions.
    pub async fn upgrade_to_video(&self) -> ClientResult<()> {
        if !self.local_stream.video_tracks().is_empty() {
            return Ok(());
        }
        let facing = self
            .camera_facing
            .lock()
            .map(|f| *f)
            .unwrap_or(CameraFacing::Front);
        let fresh = self
            .devices
            .acquire(CaptureConstraints {
                audio: false,
                video: CaptureConstraints::video(facing).video,
            })
            .await?;
        let track = fresh
            .video_tracks()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::DeviceUnavailable {
                reason: "camera produced no video track".to_string(),
            })?;
        self.transport.add_track(track.clone());
        self.local_stream.add_track(track);

        let store = self.store.clone();
        let call_id = self.record.id;
        retry_with_backoff("upgrade_kind", RetryConfig::quick(), || {
            let store = store.clone();
            async move {
                store
                    .update_status(call_id, CallStatus::Connected, CallPatch::kind(CallKind::Video))
                    .await
                    .map_err(ClientError::from)
            }
        })
        .await?;
        info!(call_id = %self.record.id, "call upgraded to video");
        Ok(())
    }

    /// Drop the camera from a video call and flip the stored kind back to
    /// voice. No-op on a call without video.
    pub async fn downgrade_to_voice(&self) -> ClientResult<()> {
        if self.local_stream.video_tracks().is_empty() {
            return Ok(());
        }
        for track in self.local_stream.video_tracks() {
            track.stop();
            self.local_stream.remove_track(track.id());
        }
        self.transport.remove_video_tracks();

        let store = self.store.clone();
        let call_id = self.record.id;
        retry_with_backoff("downgrade_kind", RetryConfig::quick(), || {
            let store = store.clone();
            async move {
                store
                    .update_status(call_id, CallStatus::Connected, CallPatch::kind(CallKind::Voice))
                    .await
                    .map_err(ClientError::from)
            }
        })
        .await?;
        info!(call_id = %self.record.id, "call downgraded to voice");
        Ok(())
    }

    /// Tear the session down: stop watchers, close the transport and release
    /// every captured device. Idempotent and best effort.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.transport.close().await;
        self.local_stream.stop_all();
        debug!(call_id = %self.record.id, "session torn down");
    }

    fn spawn(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    /// Forward locally discovered candidates into the signaling channel.
    fn spawn_candidate_pump(self: &Arc<Self>) {
        let Some(mut rx) = self.transport.take_local_candidates() else {
            return;
        };
        let store = self.store.clone();
        let call_id = self.record.id;
        let sender_id = self.user_id.clone();
        self.spawn(tokio::spawn(async move {
            while let Some(candidate) = rx.recv().await {
                if let Err(e) = store.append_candidate(call_id, &sender_id, candidate).await {
                    warn!(%call_id, error = %e, "failed to publish local candidate");
                }
            }
        }));
    }

    /// Route the counterparty's candidates through the gate.
    fn spawn_remote_candidate_watcher(self: &Arc<Self>, peer_id: String) {
        let mut rx = self.store.watch_candidates(self.record.id, &peer_id);
        let session = self.clone();
        self.spawn(tokio::spawn(async move {
            while let Some(candidate) = rx.recv().await {
                session.handle_remote_candidate(candidate).await;
            }
        }));
    }

    /// Caller side: apply the first answer that appears.
    fn spawn_answer_watcher(self: &Arc<Self>) {
        let mut rx = self.store.watch_answer(self.record.id);
        let session = self.clone();
        self.spawn(tokio::spawn(async move {
            if let Some(answer) = rx.recv().await {
                if let Err(e) = session.apply_remote_description(answer).await {
                    warn!(call_id = %session.record.id, error = %e, "failed to apply answer");
                }
            }
        }));
    }

    /// Report transport-state changes up to the coordinator.
    fn spawn_state_watcher(self: &Arc<Self>) {
        let mut rx = self.transport.state_changes();
        let events = self.events_tx.clone();
        let transport = self.transport.clone();
        let call_id = self.record.id;
        self.spawn(tokio::spawn(async move {
            let mut stream_reported = false;
            loop {
                let state = *rx.borrow_and_update();
                if state == TransportState::Connected && !stream_reported {
                    stream_reported = true;
                    let _ = events.send(SessionEvent::RemoteStream {
                        call_id,
                        stream: transport.remote_stream(),
                    });
                }
                if state.is_down() && state != TransportState::Closed {
                    let _ = events.send(SessionEvent::TransportDown { call_id, state });
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }));
    }
}

fn constraints_for(kind: CallKind) -> CaptureConstraints {
    match kind {
        CallKind::Voice => CaptureConstraints::voice(),
        CallKind::Video => CaptureConstraints::video(CameraFacing::Front),
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("call_id", &self.record.id)
            .field("role", &self.role)
            .field("torn_down", &self.torn_down.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peercall_signaling_core::testing::FlakyStore;
    use peercall_signaling_core::MemorySignalStore;
    use peercall_transport_core::testing::{FakeDevices, FakeTransportFactory};

    fn parties() -> (Party, Party) {
        (Party::new("alice", "Alice"), Party::new("bob", "Bob"))
    }

    #[tokio::test]
    async fn caller_writes_offer_and_record() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let (_session, record) = CallSession::start_caller(
            store.clone(),
            factory.clone(),
            devices,
            &[],
            alice,
            bob,
            CallKind::Voice,
        )
        .await
        .unwrap();

        assert_eq!(record.status, CallStatus::Calling);
        let mut offer_rx = store.watch_offer(record.id);
        let offer = offer_rx.recv().await.unwrap();
        assert!(offer.sdp.contains("fake-offer"));
    }

    #[tokio::test]
    async fn device_failure_leaves_no_signaling_trace() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        devices.fail_next();
        let (alice, bob) = parties();

        let mut incoming = store.watch_incoming("bob");
        let result = CallSession::start_caller(
            store.clone(),
            factory.clone(),
            devices,
            &[],
            alice,
            bob,
            CallKind::Voice,
        )
        .await;

        assert!(matches!(result, Err(ClientError::DeviceUnavailable { .. })));
        assert!(incoming.try_recv().is_err());
        assert!(factory.created().is_empty());
    }

    #[tokio::test]
    async fn callee_answers_and_connects() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let (_caller, record) = CallSession::start_caller(
            store.clone(),
            factory.clone(),
            devices.clone(),
            &[],
            alice,
            bob.clone(),
            CallKind::Voice,
        )
        .await
        .unwrap();

        let callee = CallSession::start_callee(
            store.clone(),
            factory.clone(),
            devices,
            &[],
            bob,
            record.clone(),
        )
        .await
        .unwrap();
        assert_eq!(callee.role(), CallRole::Callee);

        let connected = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(connected.status, CallStatus::Connected);
        assert!(connected.answered_at.is_some());

        let mut answer_rx = store.watch_answer(record.id);
        assert!(answer_rx.recv().await.unwrap().sdp.contains("fake-answer"));
    }

    #[tokio::test]
    async fn failed_offer_write_abandons_the_record() {
        let store = Arc::new(MemorySignalStore::new());
        let flaky = FlakyStore::wrap(store.clone());
        flaky.fail_offer_writes(true);
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let mut incoming = store.watch_incoming("bob");
        let result = CallSession::start_caller(
            flaky,
            factory.clone(),
            devices,
            &[],
            alice,
            bob,
            CallKind::Voice,
        )
        .await;
        assert!(matches!(result, Err(ClientError::SignalingFailed { .. })));

        // Media released and the half-created record closed out, so the
        // receiver does not keep ringing against a dead dial.
        let transport = factory.last().unwrap();
        assert!(transport.is_closed());
        assert!(transport.local_tracks().iter().all(|t| t.is_stopped()));
        let record = incoming.recv().await.unwrap();
        let closed = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(closed.status, CallStatus::Ended);
    }

    #[tokio::test]
    async fn failed_callee_setup_releases_media() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let (_caller, record) = CallSession::start_caller(
            store.clone(),
            factory.clone(),
            devices.clone(),
            &[],
            alice,
            bob.clone(),
            CallKind::Voice,
        )
        .await
        .unwrap();

        // The offer and answer go through; the connected write does not.
        let flaky = FlakyStore::wrap(store.clone());
        flaky.fail_status_writes(true);
        let callee_factory = FakeTransportFactory::new();
        let result = CallSession::start_callee(
            flaky,
            callee_factory.clone(),
            devices,
            &[],
            bob,
            record.clone(),
        )
        .await;
        assert!(matches!(result, Err(ClientError::SignalingFailed { .. })));

        // The microphone and transport must not leak out of a failed setup.
        let transport = callee_factory.last().unwrap();
        assert!(transport.is_closed());
        assert!(transport.local_tracks().iter().all(|t| t.is_stopped()));
    }

    #[tokio::test]
    async fn mute_disables_audio_tracks_only() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let (session, _) = CallSession::start_caller(
            store,
            factory.clone(),
            devices,
            &[],
            alice,
            bob,
            CallKind::Video,
        )
        .await
        .unwrap();

        session.set_muted(true);
        let transport = factory.last().unwrap();
        for track in transport.local_tracks() {
            match track.kind() {
                TrackKind::Audio => assert!(!track.is_enabled()),
                TrackKind::Video => assert!(track.is_enabled()),
            }
        }
        session.set_muted(false);
        assert!(transport.local_tracks().iter().all(|t| t.is_enabled()));
    }

    #[tokio::test]
    async fn teardown_stops_tracks_and_closes_transport() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let (session, _) = CallSession::start_caller(
            store,
            factory.clone(),
            devices,
            &[],
            alice,
            bob,
            CallKind::Voice,
        )
        .await
        .unwrap();

        session.teardown().await;
        session.teardown().await;

        let transport = factory.last().unwrap();
        assert!(transport.is_closed());
        assert!(transport.local_tracks().iter().all(|t| t.is_stopped()));
    }

    #[tokio::test]
    async fn switch_camera_replaces_video_track() {
        let store = Arc::new(MemorySignalStore::new());
        let factory = FakeTransportFactory::new();
        let devices = FakeDevices::new();
        let (alice, bob) = parties();

        let (session, _) = CallSession::start_caller(
            store,
            factory.clone(),
            devices,
            &[],
            alice,
            bob,
            CallKind::Video,
        )
        .await
        .unwrap();

        let transport = factory.last().unwrap();
        let before = transport
            .local_tracks()
            .into_iter()
            .find(|t| t.kind() == TrackKind::Video)
            .unwrap();
        assert_eq!(before.facing(), Some(CameraFacing::Front));

        session.switch_camera().await.unwrap();

        let after = transport
            .local_tracks()
            .into_iter()
            .find(|t| t.kind() == TrackKind::Video)
            .unwrap();
        assert_eq!(after.facing(), Some(CameraFacing::Back));
        assert!(before.is_stopped());
    }
}
