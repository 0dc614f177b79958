//! The signaling-store contract
//!
//! A signaling store is a shared, multi-reader key-value store partitioned by
//! call id. Both parties of a call write to it concurrently, so the contract
//! is deliberately narrow: call records are updated with merge semantics,
//! candidate lists are append-only, and every read side is push-based.
//!
//! Subscriptions follow "replay then follow" semantics: on subscribe the
//! current value (or the full candidate list so far, in order) is delivered
//! first, then every subsequent change. Dropping the receiver cancels the
//! subscription.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{
    CallId, CallKind, CallPatch, CallRecord, CallStatus, IceCandidate, Party, SessionDescription,
};

/// Errors surfaced by a signaling store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalingError {
    /// No record exists for the given call id
    #[error("call {call_id} not found")]
    CallNotFound { call_id: CallId },

    /// The backing store failed; usually transient
    #[error("signaling backend error: {reason}")]
    Backend { reason: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, SignalingError>;

/// Shared store used by both parties of a call to exchange handshake data.
///
/// Implementations hold no call-control logic. The lifecycle coordinator and
/// call session layers are responsible for deciding *what* to write; the
/// store only guarantees *how* writes combine: last-writer-wins merge for the
/// call record, overwrite for offer/answer, append-only for candidates.
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Allocate a new call id and write the initial record with
    /// status [`CallStatus::Calling`].
    ///
    /// Also arms a dead-man's switch for the creating client: if that client
    /// detaches uncleanly, the record is forced to [`CallStatus::Ended`] so
    /// the receiver never rings forever against a dead caller.
    async fn create_call(
        &self,
        caller: &Party,
        receiver: &Party,
        kind: CallKind,
    ) -> StoreResult<CallRecord>;

    /// Write (or overwrite) the offer for a call. Idempotent.
    async fn write_offer(&self, desc: SessionDescription) -> StoreResult<()>;

    /// Write (or overwrite) the answer for a call. Idempotent.
    async fn write_answer(&self, desc: SessionDescription) -> StoreResult<()>;

    /// Append one candidate to the (call id, sender id) list.
    ///
    /// The list only ever grows and preserves append order.
    async fn append_candidate(
        &self,
        call_id: CallId,
        sender_id: &str,
        candidate: IceCandidate,
    ) -> StoreResult<()>;

    /// Merge a status change (plus optional field patch) into the record.
    ///
    /// Never blind-replaces: fields written by the counterparty survive.
    /// Fills `answered_at` on the first transition to `Connected`, and fills
    /// `ended_at` plus a computed `duration` (from `answered_at`, when set)
    /// on terminal transitions. Writes against an already-terminal record
    /// are ignored — terminal statuses are absorbing.
    async fn update_status(
        &self,
        call_id: CallId,
        status: CallStatus,
        patch: CallPatch,
    ) -> StoreResult<()>;

    /// Fetch the current record for a call, if any.
    async fn get_call(&self, call_id: CallId) -> StoreResult<Option<CallRecord>>;

    /// Subscribe to every change of one call record.
    fn watch_call(&self, call_id: CallId) -> mpsc::UnboundedReceiver<CallRecord>;

    /// Subscribe to new incoming calls addressed to `receiver_id`.
    ///
    /// Only records in status `Calling` are delivered, matching the original
    /// channel semantics: a receiver learns about a call once, when it is
    /// dialed.
    fn watch_incoming(&self, receiver_id: &str) -> mpsc::UnboundedReceiver<CallRecord>;

    /// Subscribe to the offer for a call.
    fn watch_offer(&self, call_id: CallId) -> mpsc::UnboundedReceiver<SessionDescription>;

    /// Subscribe to the answer for a call.
    fn watch_answer(&self, call_id: CallId) -> mpsc::UnboundedReceiver<SessionDescription>;

    /// Subscribe to the candidate list of one sender for a call.
    ///
    /// Replays all candidates appended so far, in order, then follows.
    fn watch_candidates(
        &self,
        call_id: CallId,
        sender_id: &str,
    ) -> mpsc::UnboundedReceiver<IceCandidate>;

    /// Best-effort deletion of the offer/answer/candidate subtrees of a call.
    ///
    /// Invoked a few seconds after the call reaches a terminal state so that
    /// in-flight reads on the other side are not raced. The call record
    /// itself is left in place.
    async fn cleanup(&self, call_id: CallId) -> StoreResult<()>;
}
