//! In-process signaling store
//!
//! [`MemorySignalStore`] implements [`SignalingStore`] against process-local
//! maps with push subscriptions. Both ends of a call attach to the same store
//! instance (via `Arc`), which makes it the shared relay for local/demo
//! deployments and the store every integration test runs against.
//!
//! Each partition keeps its subscriber list next to its data so that replays
//! and live updates can never interleave out of order.

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::{SignalingError, SignalingStore, StoreResult};
use crate::types::{
    CallId, CallKind, CallPatch, CallRecord, CallStatus, IceCandidate, Party, SessionDescription,
};
use async_trait::async_trait;

/// Single-value partition (call record, offer, answer) plus its watchers.
struct ValueSlot<T> {
    value: Option<T>,
    watchers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> ValueSlot<T> {
    fn empty() -> Self {
        Self {
            value: None,
            watchers: Vec::new(),
        }
    }

    fn publish(&mut self, value: T) {
        self.value = Some(value.clone());
        self.watchers.retain(|w| w.send(value.clone()).is_ok());
    }

    /// Replay the current value (if any), then follow.
    fn watch(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(value) = &self.value {
            let _ = tx.send(value.clone());
        }
        self.watchers.push(tx);
        rx
    }
}

/// Append-only partition (candidate list) plus its watchers.
struct Lane<T> {
    items: Vec<T>,
    watchers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Lane<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            watchers: Vec::new(),
        }
    }

    fn append(&mut self, item: T) {
        self.items.push(item.clone());
        self.watchers.retain(|w| w.send(item.clone()).is_ok());
    }

    /// Replay everything appended so far, in order, then follow.
    fn watch(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in &self.items {
            let _ = tx.send(item.clone());
        }
        self.watchers.push(tx);
        rx
    }
}

type CandidateKey = (CallId, String);

/// Shared in-process implementation of [`SignalingStore`].
#[derive(Default)]
pub struct MemorySignalStore {
    calls: DashMap<CallId, ValueSlot<CallRecord>>,
    offers: DashMap<CallId, ValueSlot<SessionDescription>>,
    answers: DashMap<CallId, ValueSlot<SessionDescription>>,
    candidates: DashMap<CandidateKey, Lane<IceCandidate>>,
    incoming: DashMap<String, Vec<mpsc::UnboundedSender<CallRecord>>>,
    /// Dead-man's switch: calls each client armed at creation time.
    guards: DashMap<String, Vec<CallId>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip every dead-man's switch armed by `client_id`: all calls that
    /// client created and that are not yet terminal are forced to `Ended`.
    ///
    /// This is the in-process analogue of a presence/on-disconnect hook in a
    /// hosted store; tests and embedding runtimes call it when a client goes
    /// away uncleanly.
    pub async fn client_disconnected(&self, client_id: &str) {
        let armed = self
            .guards
            .remove(client_id)
            .map(|(_, calls)| calls)
            .unwrap_or_default();
        for call_id in armed {
            debug!(%call_id, client_id, "forcing call ended after client disconnect");
            if let Err(e) = self
                .update_status(call_id, CallStatus::Ended, CallPatch::default())
                .await
            {
                warn!(%call_id, error = %e, "dead-man cleanup failed");
            }
        }
    }

    fn notify_incoming(&self, record: &CallRecord) {
        if let Some(mut watchers) = self.incoming.get_mut(&record.receiver_id) {
            watchers.retain(|w| w.send(record.clone()).is_ok());
        }
    }
}

#[async_trait]
impl SignalingStore for MemorySignalStore {
    async fn create_call(
        &self,
        caller: &Party,
        receiver: &Party,
        kind: CallKind,
    ) -> StoreResult<CallRecord> {
        let record = CallRecord {
            id: uuid::Uuid::new_v4(),
            caller_id: caller.id.clone(),
            caller_name: caller.name.clone(),
            receiver_id: receiver.id.clone(),
            receiver_name: receiver.name.clone(),
            status: CallStatus::Calling,
            kind,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            duration: None,
            thread_id: None,
        };

        self.calls
            .entry(record.id)
            .or_insert_with(ValueSlot::empty)
            .publish(record.clone());
        self.guards
            .entry(caller.id.clone())
            .or_default()
            .push(record.id);
        self.notify_incoming(&record);

        debug!(call_id = %record.id, caller = %caller.id, receiver = %receiver.id, "call created");
        Ok(record)
    }

    async fn write_offer(&self, desc: SessionDescription) -> StoreResult<()> {
        self.offers
            .entry(desc.call_id)
            .or_insert_with(ValueSlot::empty)
            .publish(desc);
        Ok(())
    }

    async fn write_answer(&self, desc: SessionDescription) -> StoreResult<()> {
        self.answers
            .entry(desc.call_id)
            .or_insert_with(ValueSlot::empty)
            .publish(desc);
        Ok(())
    }

    async fn append_candidate(
        &self,
        call_id: CallId,
        sender_id: &str,
        candidate: IceCandidate,
    ) -> StoreResult<()> {
        self.candidates
            .entry((call_id, sender_id.to_string()))
            .or_insert_with(Lane::empty)
            .append(candidate);
        Ok(())
    }

    async fn update_status(
        &self,
        call_id: CallId,
        status: CallStatus,
        patch: CallPatch,
    ) -> StoreResult<()> {
        let mut slot = self
            .calls
            .get_mut(&call_id)
            .ok_or(SignalingError::CallNotFound { call_id })?;
        let existing = match &slot.value {
            Some(record) => record.clone(),
            None => return Err(SignalingError::CallNotFound { call_id }),
        };

        // Terminal statuses are absorbing.
        if existing.status.is_terminal() {
            debug!(%call_id, current = existing.status.as_str(), attempted = status.as_str(),
                   "ignoring status write against terminal record");
            return Ok(());
        }

        let now = Utc::now();
        let mut updated = existing;
        updated.status = status;
        if let Some(answered_at) = patch.answered_at {
            updated.answered_at = Some(answered_at);
        }
        if status == CallStatus::Connected && updated.answered_at.is_none() {
            updated.answered_at = Some(now);
        }
        if let Some(kind) = patch.kind {
            updated.kind = kind;
        }
        if let Some(thread_id) = patch.thread_id {
            updated.thread_id = Some(thread_id);
        }
        if status.is_terminal() {
            updated.ended_at = Some(patch.ended_at.unwrap_or(now));
            if updated.duration.is_none() {
                updated.duration = patch.duration.or_else(|| {
                    updated
                        .answered_at
                        .map(|answered| (now - answered).num_seconds().max(0) as u64)
                });
            }
        }

        slot.publish(updated.clone());
        drop(slot);
        if status == CallStatus::Calling {
            self.notify_incoming(&updated);
        }
        Ok(())
    }

    async fn get_call(&self, call_id: CallId) -> StoreResult<Option<CallRecord>> {
        Ok(self.calls.get(&call_id).and_then(|slot| slot.value.clone()))
    }

    fn watch_call(&self, call_id: CallId) -> mpsc::UnboundedReceiver<CallRecord> {
        self.calls
            .entry(call_id)
            .or_insert_with(ValueSlot::empty)
            .watch()
    }

    fn watch_incoming(&self, receiver_id: &str) -> mpsc::UnboundedReceiver<CallRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Replay calls already ringing for this receiver, then follow.
        for entry in self.calls.iter() {
            if let Some(record) = &entry.value().value {
                if record.receiver_id == receiver_id && record.status == CallStatus::Calling {
                    let _ = tx.send(record.clone());
                }
            }
        }
        self.incoming
            .entry(receiver_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn watch_offer(&self, call_id: CallId) -> mpsc::UnboundedReceiver<SessionDescription> {
        self.offers
            .entry(call_id)
            .or_insert_with(ValueSlot::empty)
            .watch()
    }

    fn watch_answer(&self, call_id: CallId) -> mpsc::UnboundedReceiver<SessionDescription> {
        self.answers
            .entry(call_id)
            .or_insert_with(ValueSlot::empty)
            .watch()
    }

    fn watch_candidates(
        &self,
        call_id: CallId,
        sender_id: &str,
    ) -> mpsc::UnboundedReceiver<IceCandidate> {
        self.candidates
            .entry((call_id, sender_id.to_string()))
            .or_insert_with(Lane::empty)
            .watch()
    }

    async fn cleanup(&self, call_id: CallId) -> StoreResult<()> {
        self.offers.remove(&call_id);
        self.answers.remove(&call_id);
        self.candidates.retain(|(id, _), _| *id != call_id);
        debug!(%call_id, "signaling subtrees removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties() -> (Party, Party) {
        (Party::new("alice", "Alice"), Party::new("bob", "Bob"))
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let record = store
            .create_call(&alice, &bob, CallKind::Voice)
            .await
            .unwrap();
        assert_eq!(record.status, CallStatus::Calling);
        let fetched = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn merge_preserves_counterparty_fields() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let record = store
            .create_call(&alice, &bob, CallKind::Voice)
            .await
            .unwrap();

        // Callee connects; store fills answered_at.
        store
            .update_status(record.id, CallStatus::Connected, CallPatch::default())
            .await
            .unwrap();
        let connected = store.get_call(record.id).await.unwrap().unwrap();
        let answered_at = connected.answered_at.expect("answered_at set on connect");

        // Caller writes a later status without answered_at; it must survive.
        store
            .update_status(record.id, CallStatus::Ended, CallPatch::default())
            .await
            .unwrap();
        let ended = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(ended.answered_at, Some(answered_at));
        assert!(ended.ended_at.is_some());
        assert!(ended.duration.is_some());
    }

    #[tokio::test]
    async fn duration_absent_when_never_answered() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let record = store
            .create_call(&alice, &bob, CallKind::Voice)
            .await
            .unwrap();
        store
            .update_status(record.id, CallStatus::Missed, CallPatch::default())
            .await
            .unwrap();
        let missed = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(missed.duration, None);
        assert!(missed.ended_at.is_some());
    }

    #[tokio::test]
    async fn terminal_status_is_absorbing() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let record = store
            .create_call(&alice, &bob, CallKind::Voice)
            .await
            .unwrap();
        store
            .update_status(record.id, CallStatus::Declined, CallPatch::default())
            .await
            .unwrap();
        store
            .update_status(record.id, CallStatus::Connected, CallPatch::default())
            .await
            .unwrap();
        let after = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(after.status, CallStatus::Declined);
    }

    #[tokio::test]
    async fn offer_is_single_valued_and_overwritten() {
        let store = MemorySignalStore::new();
        let call_id = uuid::Uuid::new_v4();
        let mut rx = store.watch_offer(call_id);

        store
            .write_offer(SessionDescription::offer(call_id, "v=0 first"))
            .await
            .unwrap();
        store
            .write_offer(SessionDescription::offer(call_id, "v=0 second"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().sdp, "v=0 first");
        assert_eq!(rx.recv().await.unwrap().sdp, "v=0 second");

        // A late subscriber only sees the final value.
        let mut late = store.watch_offer(call_id);
        assert_eq!(late.recv().await.unwrap().sdp, "v=0 second");
    }

    #[tokio::test]
    async fn candidates_replay_in_append_order() {
        let store = MemorySignalStore::new();
        let call_id = uuid::Uuid::new_v4();
        for i in 0..5 {
            store
                .append_candidate(
                    call_id,
                    "alice",
                    IceCandidate {
                        call_id,
                        candidate: format!("candidate:{i}"),
                        sdp_mid: Some("0".into()),
                        sdp_mline_index: Some(0),
                    },
                )
                .await
                .unwrap();
        }

        let mut rx = store.watch_candidates(call_id, "alice");
        // Two more after subscribing.
        for i in 5..7 {
            store
                .append_candidate(
                    call_id,
                    "alice",
                    IceCandidate {
                        call_id,
                        candidate: format!("candidate:{i}"),
                        sdp_mid: Some("0".into()),
                        sdp_mline_index: Some(0),
                    },
                )
                .await
                .unwrap();
        }

        for i in 0..7 {
            assert_eq!(rx.recv().await.unwrap().candidate, format!("candidate:{i}"));
        }
    }

    #[tokio::test]
    async fn incoming_watch_sees_only_dialed_calls() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let mut rx = store.watch_incoming("bob");

        let record = store
            .create_call(&alice, &bob, CallKind::Video)
            .await
            .unwrap();
        let seen = rx.recv().await.unwrap();
        assert_eq!(seen.id, record.id);

        // Busy write does not re-notify the receiver.
        store
            .update_status(record.id, CallStatus::Busy, CallPatch::default())
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_man_switch_forces_ended() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let record = store
            .create_call(&alice, &bob, CallKind::Voice)
            .await
            .unwrap();

        store.client_disconnected("alice").await;
        let after = store.get_call(record.id).await.unwrap().unwrap();
        assert_eq!(after.status, CallStatus::Ended);
        assert!(after.ended_at.is_some());
    }

    #[tokio::test]
    async fn cleanup_drops_handshake_data_but_keeps_record() {
        let store = MemorySignalStore::new();
        let (alice, bob) = parties();
        let record = store
            .create_call(&alice, &bob, CallKind::Voice)
            .await
            .unwrap();
        store
            .write_offer(SessionDescription::offer(record.id, "v=0"))
            .await
            .unwrap();
        store
            .append_candidate(
                record.id,
                "alice",
                IceCandidate {
                    call_id: record.id,
                    candidate: "candidate:0".into(),
                    sdp_mid: None,
                    sdp_mline_index: None,
                },
            )
            .await
            .unwrap();

        store.cleanup(record.id).await.unwrap();

        assert!(store.offers.get(&record.id).is_none());
        assert!(store
            .candidates
            .get(&(record.id, "alice".to_string()))
            .is_none());
        assert!(store.get_call(record.id).await.unwrap().is_some());
    }
}
