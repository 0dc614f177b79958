//! Building and wiring a call client
//!
//! [`CallClientBuilder`] assembles a [`CallClient`] from its collaborators.
//! The store, transport factory and device stack are required; history,
//! overlay, haptics, the event handler and the audio sink all default to
//! no-op implementations so a minimal client needs only three `with_` calls.

use std::sync::Arc;

use peercall_signaling_core::SignalingStore;
use peercall_transport_core::{MediaDevices, TransportFactory};
use tokio::sync::{mpsc, watch};

use crate::audio::{AudioSink, CuePlayer, NullSink};
use crate::collab::{CallHistorySink, CallOverlay, Haptics, NullHaptics, NullHistorySink, NullOverlay};
use crate::config::CallConfig;
use crate::coordinator::{CallClient, CallCommand, CallSnapshot, Engine};
use crate::error::{ClientError, ClientResult};
use crate::events::{CallEventHandler, NullEventHandler};

/// Builder for [`CallClient`].
pub struct CallClientBuilder {
    config: CallConfig,
    store: Option<Arc<dyn SignalingStore>>,
    transports: Option<Arc<dyn TransportFactory>>,
    devices: Option<Arc<dyn MediaDevices>>,
    history: Arc<dyn CallHistorySink>,
    overlay: Arc<dyn CallOverlay>,
    haptics: Arc<dyn Haptics>,
    handler: Arc<dyn CallEventHandler>,
    sink: Arc<dyn AudioSink>,
}

impl CallClientBuilder {
    pub fn new(config: CallConfig) -> Self {
        Self {
            config,
            store: None,
            transports: None,
            devices: None,
            history: Arc::new(NullHistorySink),
            overlay: Arc::new(NullOverlay),
            haptics: Arc::new(NullHaptics),
            handler: Arc::new(NullEventHandler),
            sink: Arc::new(NullSink),
        }
    }

    /// Signaling store shared with the counterparty. Required.
    pub fn with_store(mut self, store: Arc<dyn SignalingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Media transport factory. Required.
    pub fn with_transports(mut self, transports: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Capture device stack. Required.
    pub fn with_devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Sink receiving one record per finished call.
    pub fn with_history(mut self, history: Arc<dyn CallHistorySink>) -> Self {
        self.history = history;
        self
    }

    /// Native call overlay.
    pub fn with_overlay(mut self, overlay: Arc<dyn CallOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Vibration feedback.
    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Lifecycle event handler.
    pub fn with_event_handler(mut self, handler: Arc<dyn CallEventHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Audio output for call-progress cues.
    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the configuration, spawn the engine and start watching for
    /// incoming calls.
    pub async fn build(self) -> ClientResult<CallClient> {
        self.config.validate()?;
        let store = self.store.ok_or_else(|| ClientError::InvalidConfiguration {
            message: "a signaling store is required".to_string(),
        })?;
        let transports = self
            .transports
            .ok_or_else(|| ClientError::InvalidConfiguration {
                message: "a transport factory is required".to_string(),
            })?;
        let devices = self
            .devices
            .ok_or_else(|| ClientError::InvalidConfiguration {
                message: "a device stack is required".to_string(),
            })?;

        let cues = CuePlayer::new(&self.config, self.sink);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(CallSnapshot::default());

        // Incoming calls addressed to this user feed the engine's queue.
        {
            let mut incoming_rx = store.watch_incoming(&self.config.user.id);
            let cmd_tx = cmd_tx.clone();
            tokio::spawn(async move {
                while let Some(record) = incoming_rx.recv().await {
                    if cmd_tx.send(CallCommand::Incoming(record)).is_err() {
                        break;
                    }
                }
            });
        }

        // So do actions taken on the native overlay.
        if let Some(mut actions_rx) = self.overlay.take_actions() {
            let cmd_tx = cmd_tx.clone();
            tokio::spawn(async move {
                while let Some(action) = actions_rx.recv().await {
                    if cmd_tx.send(CallCommand::Overlay(action)).is_err() {
                        break;
                    }
                }
            });
        }

        let engine = Engine::new(
            self.config,
            store,
            transports,
            devices,
            self.history,
            self.overlay,
            self.haptics,
            self.handler,
            cues,
            cmd_tx.clone(),
            snapshot_tx,
        );
        tokio::spawn(engine.run(cmd_rx));

        Ok(CallClient {
            cmd_tx,
            snapshot_rx,
        })
    }
}
