//! Shared fixtures for the integration tests: recording collaborators and a
//! client harness wired to the in-process store with short timings.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use peercall_client_core::{
    AudioCue, AudioSink, CallClient, CallClientBuilder, CallConfig, CallEventHandler,
    CallHistorySink, CallOverlay, CallStateInfo, CallSummary, OverlayAction,
};
use peercall_signaling_core::{CallRecord, MemorySignalStore, Party, SignalingStore};
use peercall_transport_core::testing::{FakeDevices, FakeTransportFactory};
use tokio::sync::mpsc;

/// History sink that remembers every saved summary.
#[derive(Default)]
pub struct RecordingHistorySink {
    saved: Mutex<Vec<CallSummary>>,
}

impl RecordingHistorySink {
    pub fn saved(&self) -> Vec<CallSummary> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallHistorySink for RecordingHistorySink {
    async fn save(&self, summary: CallSummary) -> anyhow::Result<()> {
        self.saved.lock().unwrap().push(summary);
        Ok(())
    }
}

/// Overlay that records surface changes and lets tests inject user actions.
pub struct RecordingOverlay {
    shown: Mutex<Vec<String>>,
    dismissals: AtomicU32,
    actions_tx: mpsc::UnboundedSender<OverlayAction>,
    actions_rx: Mutex<Option<mpsc::UnboundedReceiver<OverlayAction>>>,
}

impl RecordingOverlay {
    pub fn new() -> Arc<Self> {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            shown: Mutex::new(Vec::new()),
            dismissals: AtomicU32::new(0),
            actions_tx,
            actions_rx: Mutex::new(Some(actions_rx)),
        })
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }

    pub fn dismissals(&self) -> u32 {
        self.dismissals.load(Ordering::SeqCst)
    }

    /// Simulate the user tapping a button on the overlay.
    pub fn press(&self, action: OverlayAction) {
        let _ = self.actions_tx.send(action);
    }
}

#[async_trait]
impl CallOverlay for RecordingOverlay {
    async fn show_incoming(&self, record: &CallRecord) {
        self.shown.lock().unwrap().push(format!("incoming:{}", record.id));
    }
    async fn show_outgoing(&self, record: &CallRecord) {
        self.shown.lock().unwrap().push(format!("outgoing:{}", record.id));
    }
    async fn show_ongoing(&self, record: &CallRecord) {
        self.shown.lock().unwrap().push(format!("ongoing:{}", record.id));
    }
    async fn dismiss(&self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
    }
    fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<OverlayAction>> {
        self.actions_rx.lock().ok()?.take()
    }
}

/// Event handler that records everything it hears.
#[derive(Default)]
pub struct RecordingHandler {
    incoming: Mutex<Vec<CallRecord>>,
    states: Mutex<Vec<CallStateInfo>>,
}

impl RecordingHandler {
    pub fn incoming(&self) -> Vec<CallRecord> {
        self.incoming.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<CallStateInfo> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallEventHandler for RecordingHandler {
    async fn on_incoming_call(&self, record: CallRecord) {
        self.incoming.lock().unwrap().push(record);
    }
    async fn on_call_state_changed(&self, info: CallStateInfo) {
        self.states.lock().unwrap().push(info);
    }
}

/// Audio sink counting cue starts and stops.
#[derive(Default)]
pub struct CountingSink {
    starts: AtomicU32,
    stops: AtomicU32,
}

impl CountingSink {
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioSink for CountingSink {
    fn start(&self, _cue: AudioCue) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// One client plus handles to all of its recording collaborators.
pub struct Harness {
    pub client: CallClient,
    pub factory: Arc<FakeTransportFactory>,
    pub devices: Arc<FakeDevices>,
    pub history: Arc<RecordingHistorySink>,
    pub handler: Arc<RecordingHandler>,
    pub overlay: Arc<RecordingOverlay>,
    pub sink: Arc<CountingSink>,
}

/// Timings shrunk so a whole lifecycle fits in a fraction of a second.
pub fn test_config(id: &str, name: &str) -> CallConfig {
    CallConfig::new(Party::new(id, name))
        .with_ice_servers(Vec::new())
        .with_ring_timeout(Duration::from_millis(300))
        .with_staleness_bound(Duration::from_secs(60))
        .with_cleanup_delay(Duration::from_millis(50))
        .with_tick_interval(Duration::from_millis(25))
}

pub async fn build_harness(store: Arc<MemorySignalStore>, config: CallConfig) -> Harness {
    build_harness_on(store, config).await
}

/// Like [`build_harness`] but for any store, so tests can wrap the shared
/// store in a failure-injecting one.
pub async fn build_harness_on(store: Arc<dyn SignalingStore>, config: CallConfig) -> Harness {
    let factory = FakeTransportFactory::new();
    let devices = FakeDevices::new();
    let history = Arc::new(RecordingHistorySink::default());
    let handler = Arc::new(RecordingHandler::default());
    let overlay = RecordingOverlay::new();
    let sink = Arc::new(CountingSink::default());

    let client = CallClientBuilder::new(config)
        .with_store(store)
        .with_transports(factory.clone())
        .with_devices(devices.clone())
        .with_history(history.clone())
        .with_event_handler(handler.clone())
        .with_overlay(overlay.clone())
        .with_audio_sink(sink.clone())
        .build()
        .await
        .expect("client should build");

    Harness {
        client,
        factory,
        devices,
        history,
        handler,
        overlay,
        sink,
    }
}

/// Poll `predicate` until it holds or two seconds elapse.
pub async fn wait_until(what: &str, predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
