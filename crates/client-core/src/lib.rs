//! Call lifecycle coordination for peer-to-peer voice and video calls
//!
//! This crate turns the signaling channel
//! ([`peercall_signaling_core`]) and the media seams
//! ([`peercall_transport_core`]) into a complete calling client: dialing,
//! ringing, accepting, declining, in-call controls and teardown, with call
//! history, a native overlay, haptics and call-progress audio hanging off
//! trait seams.
//!
//! All call state is owned by one engine task behind [`CallClient`]; public
//! methods post commands to it and await the result. A client handles one
//! call at a time and answers further incoming calls with a busy status.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use peercall_client_core::{CallClientBuilder, CallConfig};
//! use peercall_signaling_core::{CallKind, MemorySignalStore, Party};
//! use peercall_transport_core::testing::{FakeDevices, FakeTransportFactory};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemorySignalStore::new());
//!
//! let alice = CallClientBuilder::new(CallConfig::new(Party::new("alice", "Alice")))
//!     .with_store(store.clone())
//!     .with_transports(FakeTransportFactory::new())
//!     .with_devices(FakeDevices::new())
//!     .build()
//!     .await?;
//!
//! let call_id = alice.start_call(Party::new("bob", "Bob"), CallKind::Voice).await?;
//! println!("calling bob: {call_id}");
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod builder;
pub mod collab;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod retry;
pub mod session;

pub use audio::{AudioCue, AudioSink, CueKind, CuePlayer, NullSink};
pub use builder::CallClientBuilder;
pub use collab::{
    CallHistorySink, CallOutcome, CallOverlay, CallSummary, Haptics, NullHaptics, NullHistorySink,
    NullOverlay, OverlayAction,
};
pub use config::CallConfig;
pub use coordinator::{CallClient, CallSnapshot};
pub use error::{ClientError, ClientResult};
pub use events::{CallEventHandler, CallStateInfo, NullEventHandler};
pub use session::{CallRole, CallSession, SessionEvent};

// Re-export the companion crates so applications can depend on one crate.
pub use peercall_signaling_core as signaling;
pub use peercall_transport_core as transport;
