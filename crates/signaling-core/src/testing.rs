//! Test doubles for the signaling channel
//!
//! Always compiled so that downstream crates can drive their retry and
//! release paths against a store that misbehaves on cue. [`FlakyStore`]
//! wraps any real store and injects backend failures into selected write
//! operations; reads and subscriptions always pass through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::store::{SignalingError, SignalingStore, StoreResult};
use crate::types::{
    CallId, CallKind, CallPatch, CallRecord, IceCandidate, Party, SessionDescription,
};

/// Store wrapper that fails selected writes until told otherwise.
pub struct FlakyStore {
    inner: Arc<dyn SignalingStore>,
    fail_offer_writes: AtomicBool,
    fail_answer_writes: AtomicBool,
    fail_status_writes: AtomicBool,
}

impl FlakyStore {
    pub fn wrap(inner: Arc<dyn SignalingStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_offer_writes: AtomicBool::new(false),
            fail_answer_writes: AtomicBool::new(false),
            fail_status_writes: AtomicBool::new(false),
        })
    }

    /// Fail every [`SignalingStore::write_offer`] while set.
    pub fn fail_offer_writes(&self, fail: bool) {
        self.fail_offer_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail every [`SignalingStore::write_answer`] while set.
    pub fn fail_answer_writes(&self, fail: bool) {
        self.fail_answer_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail every [`SignalingStore::update_status`] while set.
    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_status_writes.store(fail, Ordering::SeqCst);
    }

    fn outage() -> SignalingError {
        SignalingError::Backend {
            reason: "injected backend outage".to_string(),
        }
    }
}

#[async_trait]
impl SignalingStore for FlakyStore {
    async fn create_call(
        &self,
        caller: &Party,
        receiver: &Party,
        kind: CallKind,
    ) -> StoreResult<CallRecord> {
        self.inner.create_call(caller, receiver, kind).await
    }

    async fn write_offer(&self, desc: SessionDescription) -> StoreResult<()> {
        if self.fail_offer_writes.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.write_offer(desc).await
    }

    async fn write_answer(&self, desc: SessionDescription) -> StoreResult<()> {
        if self.fail_answer_writes.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.write_answer(desc).await
    }

    async fn append_candidate(
        &self,
        call_id: CallId,
        sender_id: &str,
        candidate: IceCandidate,
    ) -> StoreResult<()> {
        self.inner.append_candidate(call_id, sender_id, candidate).await
    }

    async fn update_status(
        &self,
        call_id: CallId,
        status: crate::types::CallStatus,
        patch: CallPatch,
    ) -> StoreResult<()> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.update_status(call_id, status, patch).await
    }

    async fn get_call(&self, call_id: CallId) -> StoreResult<Option<CallRecord>> {
        self.inner.get_call(call_id).await
    }

    fn watch_call(&self, call_id: CallId) -> mpsc::UnboundedReceiver<CallRecord> {
        self.inner.watch_call(call_id)
    }

    fn watch_incoming(&self, receiver_id: &str) -> mpsc::UnboundedReceiver<CallRecord> {
        self.inner.watch_incoming(receiver_id)
    }

    fn watch_offer(&self, call_id: CallId) -> mpsc::UnboundedReceiver<SessionDescription> {
        self.inner.watch_offer(call_id)
    }

    fn watch_answer(&self, call_id: CallId) -> mpsc::UnboundedReceiver<SessionDescription> {
        self.inner.watch_answer(call_id)
    }

    fn watch_candidates(
        &self,
        call_id: CallId,
        sender_id: &str,
    ) -> mpsc::UnboundedReceiver<IceCandidate> {
        self.inner.watch_candidates(call_id, sender_id)
    }

    async fn cleanup(&self, call_id: CallId) -> StoreResult<()> {
        self.inner.cleanup(call_id).await
    }
}
