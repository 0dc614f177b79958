//! Call lifecycle coordination
//!
//! [`CallClient`] is the public face of the crate. All call state lives in a
//! single engine task; public methods post a command to it and await the
//! reply, so there is exactly one writer of call state and no lock ordering
//! to reason about. Timers, signaling watchers and session events all feed
//! the same command queue.
//!
//! A client handles at most one call at a time: one pending incoming call or
//! one active call. A second incoming call while occupied is answered with a
//! busy status written straight to the channel, without disturbing the call
//! in progress.
//!
//! # Usage
//!
//! ```rust,no_run
//! use peercall_client_core::{CallClientBuilder, CallConfig};
//! use peercall_signaling_core::{CallKind, MemorySignalStore, Party};
//! use peercall_transport_core::testing::{FakeDevices, FakeTransportFactory};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemorySignalStore::new());
//! let client = CallClientBuilder::new(CallConfig::new(Party::new("alice", "Alice")))
//!     .with_store(store)
//!     .with_transports(FakeTransportFactory::new())
//!     .with_devices(FakeDevices::new())
//!     .build()
//!     .await?;
//!
//! let call_id = client.start_call(Party::new("bob", "Bob"), CallKind::Voice).await?;
//! println!("dialing {call_id}");
//! client.end_call().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use peercall_signaling_core::{
    CallId, CallKind, CallPatch, CallRecord, CallStatus, Party, SignalingStore,
};
use peercall_transport_core::{MediaDevices, TransportFactory};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{CueKind, CuePlayer};
use crate::collab::{
    CallHistorySink, CallOutcome, CallOverlay, CallSummary, Haptics, OverlayAction,
};
use crate::config::CallConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{CallEventHandler, CallStateInfo};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::session::{CallRole, CallSession, SessionEvent};

/// Read-only view of the client's call state.
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    /// Local presentation status, including `Idle` and `Ringing`
    pub status: CallStatus,
    /// The call this client is on or presenting, if any
    pub call: Option<CallRecord>,
    /// Seconds of connected time so far
    pub duration_secs: u64,
    pub muted: bool,
    pub speaker: bool,
    pub video_enabled: bool,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            status: CallStatus::Idle,
            call: None,
            duration_secs: 0,
            muted: false,
            speaker: false,
            video_enabled: true,
        }
    }
}

/// Commands processed by the engine task.
pub(crate) enum CallCommand {
    Dial {
        receiver: Party,
        kind: CallKind,
        reply: oneshot::Sender<ClientResult<CallId>>,
    },
    Accept {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Decline {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    End {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    UpgradeToVideo {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    DowngradeToVoice {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    SwitchCamera {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    SetMuted(bool),
    SetSpeaker(bool),
    SetVideoEnabled(bool),
    Incoming(CallRecord),
    RemoteUpdate(CallRecord),
    RingTimeout {
        call_id: CallId,
    },
    Session(SessionEvent),
    Tick {
        call_id: CallId,
    },
    Overlay(OverlayAction),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct IncomingCall {
    record: CallRecord,
    ring_timer: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

struct ActiveCall {
    record: CallRecord,
    session: Arc<CallSession>,
    role: CallRole,
    /// Set when the call connects; the duration is measured from here
    /// rather than counted in ticks.
    connected_at: Option<Instant>,
    duration_secs: u64,
    watcher: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
    events_task: Option<JoinHandle<()>>,
}

pub(crate) struct Engine {
    config: CallConfig,
    store: Arc<dyn SignalingStore>,
    transports: Arc<dyn TransportFactory>,
    devices: Arc<dyn MediaDevices>,
    history: Arc<dyn CallHistorySink>,
    overlay: Arc<dyn CallOverlay>,
    haptics: Arc<dyn Haptics>,
    handler: Arc<dyn CallEventHandler>,
    cues: CuePlayer,
    cmd_tx: mpsc::UnboundedSender<CallCommand>,
    snapshot_tx: watch::Sender<CallSnapshot>,
    incoming: Option<IncomingCall>,
    active: Option<ActiveCall>,
    status: CallStatus,
    muted: bool,
    speaker: bool,
    video_enabled: bool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: CallConfig,
        store: Arc<dyn SignalingStore>,
        transports: Arc<dyn TransportFactory>,
        devices: Arc<dyn MediaDevices>,
        history: Arc<dyn CallHistorySink>,
        overlay: Arc<dyn CallOverlay>,
        haptics: Arc<dyn Haptics>,
        handler: Arc<dyn CallEventHandler>,
        cues: CuePlayer,
        cmd_tx: mpsc::UnboundedSender<CallCommand>,
        snapshot_tx: watch::Sender<CallSnapshot>,
    ) -> Self {
        Self {
            config,
            store,
            transports,
            devices,
            history,
            overlay,
            haptics,
            handler,
            cues,
            cmd_tx,
            snapshot_tx,
            incoming: None,
            active: None,
            status: CallStatus::Idle,
            muted: false,
            speaker: false,
            video_enabled: true,
        }
    }

    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<CallCommand>) {
        while let Some(command) = cmd_rx.recv().await {
            match command {
                CallCommand::Dial {
                    receiver,
                    kind,
                    reply,
                } => {
                    let _ = reply.send(self.dial(receiver, kind).await);
                }
                CallCommand::Accept { reply } => {
                    let _ = reply.send(self.accept().await);
                }
                CallCommand::Decline { reply } => {
                    let _ = reply.send(self.decline().await);
                }
                CallCommand::End { reply } => {
                    let _ = reply.send(self.end().await);
                }
                CallCommand::UpgradeToVideo { reply } => {
                    let _ = reply.send(self.upgrade_to_video().await);
                }
                CallCommand::DowngradeToVoice { reply } => {
                    let _ = reply.send(self.downgrade_to_voice().await);
                }
                CallCommand::SwitchCamera { reply } => {
                    let _ = reply.send(self.switch_camera().await);
                }
                CallCommand::SetMuted(muted) => self.set_muted(muted),
                CallCommand::SetSpeaker(on) => self.set_speaker(on),
                CallCommand::SetVideoEnabled(enabled) => self.set_video_enabled(enabled),
                CallCommand::Incoming(record) => self.handle_incoming(record).await,
                CallCommand::RemoteUpdate(record) => self.handle_remote_update(record).await,
                CallCommand::RingTimeout { call_id } => self.handle_ring_timeout(call_id).await,
                CallCommand::Session(event) => self.handle_session_event(event).await,
                CallCommand::Tick { call_id } => self.handle_tick(call_id).await,
                CallCommand::Overlay(action) => self.handle_overlay(action).await,
                CallCommand::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    async fn dial(&mut self, receiver: Party, kind: CallKind) -> ClientResult<CallId> {
        if self.active.is_some() || self.incoming.is_some() {
            return Err(ClientError::AlreadyInCall {
                status: self.status,
            });
        }

        let (session, record) = CallSession::start_caller(
            self.store.clone(),
            self.transports.clone(),
            self.devices.clone(),
            &self.config.ice_servers,
            self.config.user.clone(),
            receiver,
            kind,
        )
        .await?;
        let call_id = record.id;

        let watcher = self.spawn_record_watcher(call_id);
        let events_task = self.spawn_session_events(&session);
        self.active = Some(ActiveCall {
            record: record.clone(),
            session,
            role: CallRole::Caller,
            connected_at: None,
            duration_secs: 0,
            watcher,
            ticker: None,
            events_task,
        });

        self.cues.play(CueKind::DialTone);
        self.overlay.show_outgoing(&record).await;
        self.transition(CallStatus::Calling, Some(record), None).await;
        Ok(call_id)
    }

    async fn handle_incoming(&mut self, record: CallRecord) {
        // The incoming watcher also replays, so terminal or connected
        // records can show up here after restarts.
        if record.status != CallStatus::Calling {
            return;
        }

        // The occupied check runs before the age check: while on a call,
        // every further incoming record is answered busy, stale or not.
        if self.active.is_some() || self.incoming.is_some() {
            info!(call_id = %record.id, "busy, rejecting second incoming call");
            if let Err(e) = self
                .store
                .update_status(record.id, CallStatus::Busy, CallPatch::default())
                .await
            {
                warn!(call_id = %record.id, error = %e, "failed to write busy status");
            }
            return;
        }

        let age = record.age(Utc::now());
        let bound = chrono::Duration::from_std(self.config.staleness_bound)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        if age > bound {
            debug!(call_id = %record.id, age_secs = age.num_seconds(), "discarding stale incoming call");
            if let Err(e) = self
                .store
                .update_status(record.id, CallStatus::Missed, CallPatch::default())
                .await
            {
                warn!(call_id = %record.id, error = %e, "failed to mark stale call missed");
            }
            return;
        }

        let call_id = record.id;
        let ring_timer = {
            let cmd_tx = self.cmd_tx.clone();
            let timeout = self.config.ring_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = cmd_tx.send(CallCommand::RingTimeout { call_id });
            })
        };
        let watcher = self.spawn_record_watcher(call_id);
        self.incoming = Some(IncomingCall {
            record: record.clone(),
            ring_timer,
            watcher,
        });

        self.cues.play(CueKind::Ringtone);
        self.haptics.start_ring();
        self.overlay.show_incoming(&record).await;
        self.handler.on_incoming_call(record.clone()).await;
        self.transition(CallStatus::Ringing, Some(record), None).await;
    }

    async fn accept(&mut self) -> ClientResult<()> {
        let Some(incoming) = self.incoming.take() else {
            return Err(ClientError::NoIncomingCall);
        };
        self.cues.stop();
        self.haptics.stop();
        incoming.ring_timer.abort();

        let record = incoming.record.clone();
        let session = match CallSession::start_callee(
            self.store.clone(),
            self.transports.clone(),
            self.devices.clone(),
            &self.config.ice_servers,
            self.config.user.clone(),
            record.clone(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                // Media never came up on our side; release the caller.
                error!(call_id = %record.id, error = %e, "accept failed, ending call");
                incoming.watcher.abort();
                if let Err(we) = self
                    .store
                    .update_status(record.id, CallStatus::Ended, CallPatch::default())
                    .await
                {
                    warn!(call_id = %record.id, error = %we, "failed to end unacceptable call");
                }
                self.overlay.dismiss().await;
                let mut ended = record.clone();
                ended.status = CallStatus::Ended;
                self.save_history(&ended, false).await;
                self.schedule_cleanup(record.id);
                self.transition(CallStatus::Idle, None, Some(e.to_string())).await;
                return Err(e);
            }
        };

        let events_task = self.spawn_session_events(&session);
        let ticker = self.spawn_ticker(record.id);
        self.active = Some(ActiveCall {
            record: record.clone(),
            session,
            role: CallRole::Callee,
            connected_at: Some(Instant::now()),
            duration_secs: 0,
            watcher: incoming.watcher,
            ticker: Some(ticker),
            events_task,
        });

        self.overlay.show_ongoing(&record).await;
        self.transition(CallStatus::Connected, Some(record), None).await;
        Ok(())
    }

    async fn decline(&mut self) -> ClientResult<()> {
        let Some(incoming) = self.incoming.as_ref() else {
            return Err(ClientError::NoIncomingCall);
        };
        let mut record = incoming.record.clone();
        let call_id = record.id;

        // Best effort: the local release below runs whether or not the
        // write lands.
        let store = self.store.clone();
        if let Err(e) = retry_with_backoff("write_declined", RetryConfig::quick(), || {
            let store = store.clone();
            async move {
                store
                    .update_status(call_id, CallStatus::Declined, CallPatch::default())
                    .await
                    .map_err(ClientError::from)
            }
        })
        .await
        {
            warn!(%call_id, error = %e, "declined status not written, releasing locally");
        }

        record.status = CallStatus::Declined;
        self.finish_incoming(record).await;
        Ok(())
    }

    async fn end(&mut self) -> ClientResult<()> {
        let Some(active) = self.active.as_ref() else {
            return Err(ClientError::NoActiveCall);
        };
        let call_id = active.record.id;
        let duration_secs = active
            .connected_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(active.duration_secs);
        let patch = if active.record.answered_at.is_some() || self.status == CallStatus::Connected {
            CallPatch::duration(duration_secs)
        } else {
            // Caller gave up before the receiver answered.
            CallPatch::default()
        };

        // Best effort: the local release below runs whether or not the
        // write lands.
        let store = self.store.clone();
        if let Err(e) = retry_with_backoff("write_ended", RetryConfig::quick(), || {
            let store = store.clone();
            let patch = patch.clone();
            async move {
                store
                    .update_status(call_id, CallStatus::Ended, patch)
                    .await
                    .map_err(ClientError::from)
            }
        })
        .await
        {
            warn!(%call_id, error = %e, "ended status not written, releasing locally");
        }

        let record = match self.store.get_call(call_id).await {
            Ok(Some(record)) if record.status.is_terminal() => record,
            _ => {
                let mut record = self
                    .active
                    .as_ref()
                    .map(|a| a.record.clone())
                    .ok_or(ClientError::NoActiveCall)?;
                record.status = CallStatus::Ended;
                if record.answered_at.is_some() && record.duration.is_none() {
                    record.duration = Some(duration_secs);
                }
                record
            }
        };
        self.finish_active(record).await;
        Ok(())
    }

    async fn upgrade_to_video(&mut self) -> ClientResult<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(ClientError::NoActiveCall);
        };
        if self.status != CallStatus::Connected {
            return Err(ClientError::NoActiveCall);
        }
        active.session.upgrade_to_video().await?;
        active.record.kind = CallKind::Video;
        let record = active.record.clone();
        self.overlay.show_ongoing(&record).await;
        self.publish_snapshot();
        Ok(())
    }

    async fn downgrade_to_voice(&mut self) -> ClientResult<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(ClientError::NoActiveCall);
        };
        if self.status != CallStatus::Connected {
            return Err(ClientError::NoActiveCall);
        }
        active.session.downgrade_to_voice().await?;
        active.record.kind = CallKind::Voice;
        let record = active.record.clone();
        self.overlay.show_ongoing(&record).await;
        self.publish_snapshot();
        Ok(())
    }

    async fn switch_camera(&mut self) -> ClientResult<()> {
        let Some(active) = self.active.as_ref() else {
            return Err(ClientError::NoActiveCall);
        };
        active.session.switch_camera().await
    }

    fn set_muted(&mut self, muted: bool) {
        if let Some(active) = self.active.as_ref() {
            active.session.set_muted(muted);
        }
        self.muted = muted;
        self.publish_snapshot();
    }

    fn set_speaker(&mut self, on: bool) {
        if let Some(active) = self.active.as_ref() {
            active.session.set_speaker(on);
        }
        self.speaker = on;
        self.publish_snapshot();
    }

    fn set_video_enabled(&mut self, enabled: bool) {
        if let Some(active) = self.active.as_ref() {
            active.session.set_video_enabled(enabled);
        }
        self.video_enabled = enabled;
        self.publish_snapshot();
    }

    async fn handle_remote_update(&mut self, record: CallRecord) {
        if let Some(incoming) = self.incoming.as_mut() {
            if incoming.record.id == record.id {
                if record.status.is_terminal() {
                    // Caller hung up, or another device of ours handled it.
                    self.finish_incoming(record).await;
                } else {
                    incoming.record = record;
                    self.publish_snapshot();
                }
                return;
            }
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.record.id != record.id {
            return;
        }

        if record.status.is_terminal() {
            self.finish_active(record).await;
            return;
        }

        if record.status == CallStatus::Connected && self.status == CallStatus::Calling {
            // Caller side: the receiver answered.
            self.cues.stop();
            active.record = record.clone();
            let need_ticker = active.ticker.is_none();
            if need_ticker {
                active.connected_at = Some(Instant::now());
            }
            if need_ticker {
                let ticker = self.spawn_ticker(record.id);
                if let Some(active) = self.active.as_mut() {
                    active.ticker = Some(ticker);
                }
            }
            self.overlay.show_ongoing(&record).await;
            self.transition(CallStatus::Connected, Some(record), None).await;
            return;
        }

        // Field updates (video upgrade from the other side, thread id).
        active.record = record;
        self.publish_snapshot();
    }

    async fn handle_ring_timeout(&mut self, call_id: CallId) {
        let Some(incoming) = self.incoming.as_ref() else {
            return;
        };
        if incoming.record.id != call_id {
            return;
        }
        info!(%call_id, "incoming call rang out");
        if let Err(e) = self
            .store
            .update_status(call_id, CallStatus::Missed, CallPatch::default())
            .await
        {
            warn!(%call_id, error = %e, "failed to mark call missed");
        }
        let mut record = incoming.record.clone();
        record.status = CallStatus::Missed;
        self.finish_incoming(record).await;
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::RemoteStream { call_id, stream } => {
                if self.active.as_ref().map(|a| a.record.id) == Some(call_id) {
                    self.handler.on_remote_stream(call_id, stream).await;
                }
            }
            SessionEvent::TransportDown { call_id, state } => {
                let Some(active) = self.active.as_ref() else {
                    return;
                };
                if active.record.id != call_id {
                    return;
                }
                warn!(%call_id, ?state, "transport lost, ending call");
                let duration_secs = active
                    .connected_at
                    .map(|t| t.elapsed().as_secs())
                    .unwrap_or(active.duration_secs);
                let patch = if active.record.answered_at.is_some()
                    || self.status == CallStatus::Connected
                {
                    CallPatch::duration(duration_secs)
                } else {
                    CallPatch::default()
                };
                if let Err(e) = self
                    .store
                    .update_status(call_id, CallStatus::Ended, patch)
                    .await
                {
                    warn!(%call_id, error = %e, "failed to end call after transport loss");
                }
                let record = match self.store.get_call(call_id).await {
                    Ok(Some(record)) if record.status.is_terminal() => record,
                    _ => {
                        let mut record = active.record.clone();
                        record.status = CallStatus::Ended;
                        if record.answered_at.is_some() && record.duration.is_none() {
                            record.duration = Some(duration_secs);
                        }
                        record
                    }
                };
                self.finish_active(record).await;
            }
        }
    }

    async fn handle_tick(&mut self, call_id: CallId) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.record.id != call_id || self.status != CallStatus::Connected {
            return;
        }
        // Wall clock, not tick count: sub-second tick intervals must not
        // inflate the duration.
        let Some(connected_at) = active.connected_at else {
            return;
        };
        let elapsed = connected_at.elapsed().as_secs();
        if elapsed == active.duration_secs {
            return;
        }
        active.duration_secs = elapsed;
        self.handler.on_duration_tick(call_id, elapsed).await;
        self.publish_snapshot();
    }

    async fn handle_overlay(&mut self, action: OverlayAction) {
        let result = match action {
            OverlayAction::Accept { call_id } => {
                if !self.matches_incoming(call_id) {
                    if let Some(id) = call_id {
                        self.adopt_overlay_call(id).await;
                    }
                }
                if self.matches_incoming(call_id) {
                    self.accept().await
                } else {
                    Ok(())
                }
            }
            OverlayAction::Decline { call_id } => {
                if !self.matches_incoming(call_id) {
                    if let Some(id) = call_id {
                        self.adopt_overlay_call(id).await;
                    }
                }
                if self.matches_incoming(call_id) {
                    self.decline().await
                } else {
                    Ok(())
                }
            }
            OverlayAction::End { call_id } => {
                let matches = call_id.is_none()
                    || self.active.as_ref().map(|a| a.record.id) == call_id;
                if matches && self.active.is_some() {
                    self.end().await
                } else {
                    Ok(())
                }
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "overlay action failed");
        }
    }

    /// An overlay action can reference a call this engine never presented,
    /// e.g. when the process hosting the client restarted while the native
    /// surface stayed up. Fetch the record and present it if it is still
    /// ringable; the action is then re-checked against the adopted call.
    async fn adopt_overlay_call(&mut self, call_id: CallId) {
        if self.incoming.is_some() || self.active.is_some() {
            return;
        }
        match self.store.get_call(call_id).await {
            Ok(Some(record))
                if record.status == CallStatus::Calling
                    && record.receiver_id == self.config.user.id =>
            {
                debug!(%call_id, "adopting overlay-referenced call");
                self.handle_incoming(record).await;
            }
            Ok(_) => debug!(%call_id, "overlay referenced a call that is not ringable"),
            Err(e) => warn!(%call_id, error = %e, "failed to resolve overlay call"),
        }
    }

    fn matches_incoming(&self, call_id: Option<CallId>) -> bool {
        match (&self.incoming, call_id) {
            (Some(_), None) => true,
            (Some(incoming), Some(id)) => incoming.record.id == id,
            (None, _) => false,
        }
    }

    async fn shutdown(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.end().await {
                warn!(error = %e, "failed to end call during shutdown");
            }
        }
        if self.incoming.is_some() {
            if let Err(e) = self.decline().await {
                warn!(error = %e, "failed to decline call during shutdown");
            }
        }
        info!("call client shut down");
    }

    /// Close out a pending incoming call. Runs at most once per call: the
    /// pending slot is taken first, so a second terminal signal is a no-op.
    async fn finish_incoming(&mut self, record: CallRecord) {
        let Some(incoming) = self.incoming.take() else {
            return;
        };
        incoming.ring_timer.abort();
        incoming.watcher.abort();
        self.cues.stop();
        self.haptics.stop();
        self.overlay.dismiss().await;
        self.save_history(&record, false).await;
        self.schedule_cleanup(record.id);
        self.transition(record.status, Some(record.clone()), None).await;
        self.transition(CallStatus::Idle, None, None).await;
    }

    /// Close out the active call. Runs at most once per call.
    async fn finish_active(&mut self, record: CallRecord) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.watcher.abort();
        if let Some(ticker) = active.ticker {
            ticker.abort();
        }
        if let Some(events_task) = active.events_task {
            events_task.abort();
        }
        self.cues.stop();
        active.session.teardown().await;
        self.overlay.dismiss().await;
        self.save_history(&record, active.role == CallRole::Caller)
            .await;
        self.schedule_cleanup(record.id);
        self.muted = false;
        self.speaker = false;
        self.video_enabled = true;
        self.transition(record.status, Some(record.clone()), None).await;
        self.transition(CallStatus::Idle, None, None).await;
    }

    async fn save_history(&self, record: &CallRecord, outgoing: bool) {
        let Some(outcome) = CallOutcome::from_record(record) else {
            warn!(call_id = %record.id, status = record.status.as_str(), "not saving non-terminal call");
            return;
        };
        let (peer_id, peer_name) = record.other_party(&self.config.user.id);
        let summary = CallSummary {
            call_id: record.id,
            peer: Party::new(peer_id, peer_name),
            kind: record.kind,
            outcome,
            outgoing,
            started_at: record.started_at,
            duration_secs: record.duration,
            thread_id: record.thread_id.clone(),
        };
        if let Err(e) = self.history.save(summary).await {
            warn!(call_id = %record.id, error = %e, "failed to save call history");
        }
    }

    /// Delete the handshake data a few seconds after the call ends, leaving
    /// the other side time to observe the terminal status first.
    fn schedule_cleanup(&self, call_id: CallId) {
        let store = self.store.clone();
        let delay = self.config.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.cleanup(call_id).await {
                warn!(%call_id, error = %e, "signaling cleanup failed");
            }
        });
    }

    fn spawn_record_watcher(&self, call_id: CallId) -> JoinHandle<()> {
        let mut rx = self.store.watch_call(call_id);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if cmd_tx.send(CallCommand::RemoteUpdate(record)).is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_session_events(&self, session: &Arc<CallSession>) -> Option<JoinHandle<()>> {
        let mut rx = session.take_events()?;
        let cmd_tx = self.cmd_tx.clone();
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if cmd_tx.send(CallCommand::Session(event)).is_err() {
                    break;
                }
            }
        }))
    }

    fn spawn_ticker(&self, call_id: CallId) -> JoinHandle<()> {
        let cmd_tx = self.cmd_tx.clone();
        let interval = self.config.tick_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if cmd_tx.send(CallCommand::Tick { call_id }).is_err() {
                    break;
                }
            }
        })
    }

    async fn transition(
        &mut self,
        status: CallStatus,
        call: Option<CallRecord>,
        reason: Option<String>,
    ) {
        let previous = self.status;
        if previous == status && call.is_none() {
            return;
        }
        self.status = status;
        if let Some(call_id) = call.as_ref().map(|c| c.id) {
            self.handler
                .on_call_state_changed(CallStateInfo {
                    call_id,
                    new_status: status,
                    previous_status: Some(previous),
                    reason,
                    timestamp: Utc::now(),
                })
                .await;
        }
        let snapshot = CallSnapshot {
            status,
            call,
            duration_secs: self.active.as_ref().map(|a| a.duration_secs).unwrap_or(0),
            muted: self.muted,
            speaker: self.speaker,
            video_enabled: self.video_enabled,
        };
        let _ = self.snapshot_tx.send(snapshot);
    }

    fn publish_snapshot(&self) {
        let call = self
            .active
            .as_ref()
            .map(|a| a.record.clone())
            .or_else(|| self.incoming.as_ref().map(|i| i.record.clone()));
        let snapshot = CallSnapshot {
            status: self.status,
            call,
            duration_secs: self.active.as_ref().map(|a| a.duration_secs).unwrap_or(0),
            muted: self.muted,
            speaker: self.speaker,
            video_enabled: self.video_enabled,
        };
        let _ = self.snapshot_tx.send(snapshot);
    }
}

/// Handle to a running call client.
///
/// Cheap to clone; all clones talk to the same engine task.
#[derive(Clone)]
pub struct CallClient {
    pub(crate) cmd_tx: mpsc::UnboundedSender<CallCommand>,
    pub(crate) snapshot_rx: watch::Receiver<CallSnapshot>,
}

impl CallClient {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<ClientResult<T>>) -> CallCommand,
    ) -> ClientResult<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| ClientError::Shutdown)?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Place an outgoing call to `receiver`.
    ///
    /// Fails with [`ClientError::AlreadyInCall`] when a call is in progress
    /// and [`ClientError::DeviceUnavailable`] when the microphone or camera
    /// cannot be acquired; in both cases nothing is written to the channel.
    pub async fn start_call(&self, receiver: Party, kind: CallKind) -> ClientResult<CallId> {
        self.request(|reply| CallCommand::Dial {
            receiver,
            kind,
            reply,
        })
        .await
    }

    /// Accept the pending incoming call.
    pub async fn accept_call(&self) -> ClientResult<()> {
        self.request(|reply| CallCommand::Accept { reply }).await
    }

    /// Decline the pending incoming call.
    pub async fn decline_call(&self) -> ClientResult<()> {
        self.request(|reply| CallCommand::Decline { reply }).await
    }

    /// Hang up the active call (or cancel an unanswered outgoing one).
    pub async fn end_call(&self) -> ClientResult<()> {
        self.request(|reply| CallCommand::End { reply }).await
    }

    /// Add video to the active voice call.
    pub async fn upgrade_to_video(&self) -> ClientResult<()> {
        self.request(|reply| CallCommand::UpgradeToVideo { reply })
            .await
    }

    /// Drop video from the active call, returning it to voice only.
    pub async fn downgrade_to_voice(&self) -> ClientResult<()> {
        self.request(|reply| CallCommand::DowngradeToVoice { reply })
            .await
    }

    /// Switch the active call to the opposite camera.
    pub async fn switch_camera(&self) -> ClientResult<()> {
        self.request(|reply| CallCommand::SwitchCamera { reply })
            .await
    }

    /// Mute or unmute the microphone.
    pub fn set_muted(&self, muted: bool) {
        let _ = self.cmd_tx.send(CallCommand::SetMuted(muted));
    }

    /// Route audio to the speaker or the earpiece.
    pub fn set_speaker(&self, on: bool) {
        let _ = self.cmd_tx.send(CallCommand::SetSpeaker(on));
    }

    /// Pause or resume the outgoing video.
    pub fn set_video_enabled(&self, enabled: bool) {
        let _ = self.cmd_tx.send(CallCommand::SetVideoEnabled(enabled));
    }

    /// Current call state.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to call-state changes.
    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stop the client, ending or declining any call in progress.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(CallCommand::Shutdown { reply: tx }).is_ok() {
            let _ = rx.await;
        }
    }
}

impl std::fmt::Debug for CallClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallClient")
            .field("status", &self.snapshot_rx.borrow().status)
            .finish()
    }
}
