//! Collaborator seams around the call lifecycle
//!
//! The coordinator drives three outward-facing collaborators that are not
//! part of call control itself: the call-history sink (one record per
//! finished call), the native call overlay (system-level incoming/ongoing
//! call UI) and haptics. Each is a trait with a no-op implementation so a
//! headless client can run without wiring any of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peercall_signaling_core::{CallId, CallKind, CallRecord, CallStatus, Party};
use tokio::sync::mpsc;

/// How a finished call turned out, from the local user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Connected, then ended by either side
    Completed,
    /// Never answered: rang out or the caller gave up
    Missed,
    /// The receiver declined
    Declined,
    /// The receiver was on another call
    Busy,
}

impl CallOutcome {
    /// Derive the outcome from a terminal call record.
    ///
    /// Returns `None` for non-terminal records. A call that ended without
    /// ever connecting counts as missed regardless of which side gave up.
    pub fn from_record(record: &CallRecord) -> Option<Self> {
        match record.status {
            CallStatus::Ended if record.answered_at.is_some() => Some(CallOutcome::Completed),
            CallStatus::Ended => Some(CallOutcome::Missed),
            CallStatus::Missed => Some(CallOutcome::Missed),
            CallStatus::Declined => Some(CallOutcome::Declined),
            CallStatus::Busy => Some(CallOutcome::Busy),
            _ => None,
        }
    }
}

/// One finished call, as handed to the history sink.
#[derive(Debug, Clone)]
pub struct CallSummary {
    pub call_id: CallId,
    /// The other side of the call
    pub peer: Party,
    pub kind: CallKind,
    pub outcome: CallOutcome,
    /// Whether the local user placed the call
    pub outgoing: bool,
    pub started_at: DateTime<Utc>,
    /// Connected time in seconds, absent when the call never connected
    pub duration_secs: Option<u64>,
    /// Conversation thread the call belongs to, when known
    pub thread_id: Option<String>,
}

/// Persists finished calls, typically into the conversation history.
///
/// Saving is best effort: a failed save is logged and never blocks or fails
/// call teardown.
#[async_trait]
pub trait CallHistorySink: Send + Sync {
    async fn save(&self, summary: CallSummary) -> anyhow::Result<()>;
}

/// History sink that drops every record.
#[derive(Debug, Default)]
pub struct NullHistorySink;

#[async_trait]
impl CallHistorySink for NullHistorySink {
    async fn save(&self, _summary: CallSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

/// User action taken on the native overlay rather than in the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayAction {
    Accept { call_id: Option<CallId> },
    Decline { call_id: Option<CallId> },
    End { call_id: Option<CallId> },
}

/// System-level call UI shown outside the app (lock screen, notification
/// shade). All methods are best effort; overlay failures never affect the
/// call itself.
#[async_trait]
pub trait CallOverlay: Send + Sync {
    /// Show the incoming-call surface for `record`.
    async fn show_incoming(&self, record: &CallRecord);

    /// Show the outgoing-call surface for `record`.
    async fn show_outgoing(&self, record: &CallRecord);

    /// Switch to the ongoing-call surface for `record`.
    async fn show_ongoing(&self, record: &CallRecord);

    /// Remove any call surface.
    async fn dismiss(&self);

    /// Take the stream of user actions performed on the overlay.
    ///
    /// Can be taken once; `None` afterwards, or always `None` for overlays
    /// with no interactive surface.
    fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<OverlayAction>>;
}

/// Overlay that shows nothing.
#[derive(Debug, Default)]
pub struct NullOverlay;

#[async_trait]
impl CallOverlay for NullOverlay {
    async fn show_incoming(&self, _record: &CallRecord) {}
    async fn show_outgoing(&self, _record: &CallRecord) {}
    async fn show_ongoing(&self, _record: &CallRecord) {}
    async fn dismiss(&self) {}
    fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<OverlayAction>> {
        None
    }
}

/// Vibration feedback for incoming calls.
pub trait Haptics: Send + Sync {
    /// Start the incoming-call vibration pattern.
    fn start_ring(&self);

    /// Stop vibrating.
    fn stop(&self);
}

/// Haptics that do nothing.
#[derive(Debug, Default)]
pub struct NullHaptics;

impl Haptics for NullHaptics {
    fn start_ring(&self) {}
    fn stop(&self) {}
}
