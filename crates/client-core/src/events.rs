//! Event handler interface for call lifecycle notifications
//!
//! Applications implement [`CallEventHandler`] to hear about incoming calls
//! and state changes. All methods have empty defaults, so a handler only
//! overrides what it cares about. Handlers are invoked from the coordinator
//! task and should return quickly; anything slow belongs on a spawned task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peercall_signaling_core::{CallId, CallRecord, CallStatus};
use peercall_transport_core::MediaStream;
use serde::Serialize;

/// Details of a call state transition.
#[derive(Debug, Clone, Serialize)]
pub struct CallStateInfo {
    pub call_id: CallId,
    pub new_status: CallStatus,
    pub previous_status: Option<CallStatus>,
    /// Human-readable cause, when one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receives call lifecycle notifications.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    /// A fresh incoming call is ringing.
    ///
    /// Fired after staleness and busy filtering: records this handler sees
    /// are genuinely ringing on this client.
    async fn on_incoming_call(&self, record: CallRecord) {
        let _ = record;
    }

    /// The local call presentation state changed.
    async fn on_call_state_changed(&self, info: CallStateInfo) {
        let _ = info;
    }

    /// Remote media arrived for a connected call.
    async fn on_remote_stream(&self, call_id: CallId, stream: MediaStream) {
        let _ = (call_id, stream);
    }

    /// One second of connected time elapsed.
    async fn on_duration_tick(&self, call_id: CallId, seconds: u64) {
        let _ = (call_id, seconds);
    }
}

/// Handler that ignores every event.
#[derive(Debug, Default)]
pub struct NullEventHandler;

#[async_trait]
impl CallEventHandler for NullEventHandler {}
