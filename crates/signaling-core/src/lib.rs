//! Signaling channel for peer-to-peer calls
//!
//! This crate defines the data that two calling clients exchange through a
//! shared, low-latency store — the call record, the SDP offer/answer pair and
//! the per-sender ICE candidate lists — together with the [`SignalingStore`]
//! trait that abstracts the store itself.
//!
//! The store is pure storage with no call-control logic: call records are
//! merged with last-writer-wins field semantics, candidate lists are
//! append-only, and subscribers are notified of every change. The bundled
//! [`MemorySignalStore`] is a complete in-process implementation used both as
//! the local relay and as the store every test runs against.
//!
//! # Usage
//!
//! ```rust
//! use peercall_signaling_core::{CallKind, MemorySignalStore, Party, SignalingStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemorySignalStore::new());
//! let alice = Party::new("alice", "Alice");
//! let bob = Party::new("bob", "Bob");
//!
//! let record = store.create_call(&alice, &bob, CallKind::Voice).await?;
//! println!("dialing call {}", record.id);
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod store;
pub mod testing;
pub mod types;

pub use memory::MemorySignalStore;
pub use store::{SignalingError, SignalingStore, StoreResult};
pub use types::{
    CallId, CallKind, CallPatch, CallRecord, CallStatus, IceCandidate, Party, SdpKind,
    SessionDescription,
};
