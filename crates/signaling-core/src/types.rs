//! Wire types exchanged over the signaling channel
//!
//! Everything in this module crosses the shared store and therefore derives
//! serde. Field names follow the store schema: a call record per call id, at
//! most one offer and one answer per call id, and an append-only candidate
//! list per (call id, sender id).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a call, allocated when the record is created.
pub type CallId = uuid::Uuid;

/// Status of a call.
///
/// `Idle` and `Ringing` are client-side presentation states; the store only
/// ever holds `Calling`, `Connected` or one of the four terminal statuses.
/// Terminal statuses are absorbing: once a record reaches one, no further
/// transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// No call in progress (local only, never stored)
    Idle,
    /// Caller has created the record and is waiting for the receiver
    Calling,
    /// Receiver is presenting the call locally (local only, never stored)
    Ringing,
    /// Offer/answer exchanged and the media transport is up
    Connected,
    /// Call finished after being connected, or cancelled by the caller
    Ended,
    /// Receiver explicitly declined
    Declined,
    /// Receiver never answered within the ring window
    Missed,
    /// Receiver was already occupied with another call
    Busy,
}

impl CallStatus {
    /// Whether this status is terminal (no further transitions occur).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Ended | CallStatus::Declined | CallStatus::Missed | CallStatus::Busy
        )
    }

    /// Lowercase wire form, as stored in the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::Calling => "calling",
            CallStatus::Ringing => "ringing",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
            CallStatus::Declined => "declined",
            CallStatus::Missed => "missed",
            CallStatus::Busy => "busy",
        }
    }
}

/// Media type of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Audio only
    Voice,
    /// Audio plus video
    Video,
}

/// One side of a call: an opaque user id plus a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Opaque user identifier
    pub id: String,
    /// Human-readable display name
    pub name: String,
}

impl Party {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The shared call record, mutated by both parties through merge updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Immutable call id allocated at creation
    pub id: CallId,
    /// User id of the caller
    pub caller_id: String,
    /// Display name of the caller
    pub caller_name: String,
    /// User id of the receiver
    pub receiver_id: String,
    /// Display name of the receiver
    pub receiver_name: String,
    /// Current status per the call state machine
    pub status: CallStatus,
    /// Voice or video
    pub kind: CallKind,
    /// When the caller created the record
    pub started_at: DateTime<Utc>,
    /// When the call was first connected, if it ever was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
    /// When the call reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Connected duration in seconds, computed at terminal time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Optional reference to the conversation thread this call belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl CallRecord {
    /// Age of the record relative to `now`, used for the staleness check on
    /// incoming-call delivery.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }

    /// The counterparty of `user_id`, as (id, name).
    pub fn other_party(&self, user_id: &str) -> (&str, &str) {
        if self.caller_id == user_id {
            (&self.receiver_id, &self.receiver_name)
        } else {
            (&self.caller_id, &self.caller_name)
        }
    }
}

/// Partial update merged into an existing [`CallRecord`].
///
/// Status updates never blind-replace the record: fields the counterparty
/// already wrote (most importantly `answered_at`) are preserved unless the
/// patch explicitly carries a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallPatch {
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<u64>,
    pub kind: Option<CallKind>,
    pub thread_id: Option<String>,
}

impl CallPatch {
    /// Patch that only flips the media kind (used by mid-call video upgrade).
    pub fn kind(kind: CallKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Patch that carries a locally measured duration.
    pub fn duration(duration: u64) -> Self {
        Self {
            duration: Some(duration),
            ..Self::default()
        }
    }
}

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session-description blob (offer or answer) for one call.
///
/// At most one offer and one answer exist per call id; a new write replaces
/// the previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub call_id: CallId,
    /// Raw SDP payload
    pub sdp: String,
    pub kind: SdpKind,
}

impl SessionDescription {
    pub fn offer(call_id: CallId, sdp: impl Into<String>) -> Self {
        Self {
            call_id,
            sdp: sdp.into(),
            kind: SdpKind::Offer,
        }
    }

    pub fn answer(call_id: CallId, sdp: impl Into<String>) -> Self {
        Self {
            call_id,
            sdp: sdp.into(),
            kind: SdpKind::Answer,
        }
    }
}

/// A discovered network-path candidate, normalized to one fixed schema at
/// the channel boundary regardless of which discovery source produced it.
///
/// Candidates are scoped to (call id, sender id), appended in discovery
/// order and never reordered by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub call_id: CallId,
    /// Raw candidate line
    pub candidate: String,
    /// Media-stream identification tag, when the source provides one
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// Media-description index, when the source provides one
    #[serde(default)]
    pub sdp_mline_index: Option<u32>,
}
