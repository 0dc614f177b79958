//! End-to-end lifecycle coverage over two clients sharing one in-process
//! store: every terminal path leaves both sides idle, with exactly one
//! history record per client, all devices released and the overlay cleared.

use std::sync::Arc;
use std::time::Duration;

use peercall_client_core::{CallOutcome, ClientError};
use peercall_signaling_core::testing::FlakyStore;
use peercall_signaling_core::{CallKind, CallStatus, MemorySignalStore, Party, SignalingStore};
use peercall_transport_core::TransportState;

mod common;
use common::{build_harness, build_harness_on, test_config, wait_until, Harness};

async fn pair(store: &Arc<MemorySignalStore>) -> (Harness, Harness) {
    let alice = build_harness(store.clone(), test_config("alice", "Alice")).await;
    let bob = build_harness(store.clone(), test_config("bob", "Bob")).await;
    (alice, bob)
}

async fn connect(alice: &Harness, bob: &Harness) -> peercall_signaling_core::CallId {
    let call_id = alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;
    bob.client.accept_call().await.unwrap();
    wait_until("alice connected", || {
        alice.client.snapshot().status == CallStatus::Connected
    })
    .await;
    call_id
}

#[tokio::test]
async fn connected_call_ends_cleanly_on_both_sides() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    let call_id = connect(&alice, &bob).await;
    // Let a full second of connected time accrue.
    wait_until("a second of talk time", || {
        alice.client.snapshot().duration_secs >= 1
    })
    .await;

    alice.client.end_call().await.unwrap();
    wait_until("alice idle", || {
        alice.client.snapshot().status == CallStatus::Idle
    })
    .await;
    wait_until("bob idle", || {
        bob.client.snapshot().status == CallStatus::Idle
    })
    .await;

    // Exactly one history record per side, both completed.
    wait_until("histories saved", || {
        alice.history.saved().len() == 1 && bob.history.saved().len() == 1
    })
    .await;
    let alice_entry = &alice.history.saved()[0];
    assert_eq!(alice_entry.call_id, call_id);
    assert_eq!(alice_entry.outcome, CallOutcome::Completed);
    assert!(alice_entry.outgoing);
    assert!(alice_entry.duration_secs.is_some());
    let bob_entry = &bob.history.saved()[0];
    assert_eq!(bob_entry.outcome, CallOutcome::Completed);
    assert!(!bob_entry.outgoing);
    assert_eq!(bob_entry.peer.id, "alice");

    // Devices released and transports closed on both sides.
    for harness in [&alice, &bob] {
        let transport = harness.factory.last().unwrap();
        assert!(transport.is_closed());
        assert!(transport.local_tracks().iter().all(|t| t.is_stopped()));
        assert!(harness.overlay.dismissals() >= 1);
    }

    // The record survives cleanup, with duration filled in.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let record = store.get_call(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Ended);
    assert!(record.duration.is_some());
}

#[tokio::test]
async fn declined_call_reaches_both_histories() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;
    assert_eq!(bob.client.snapshot().status, CallStatus::Ringing);
    assert!(bob.sink.starts() >= 1, "ringtone should have started");

    bob.client.decline_call().await.unwrap();

    wait_until("both idle", || {
        alice.client.snapshot().status == CallStatus::Idle
            && bob.client.snapshot().status == CallStatus::Idle
    })
    .await;
    wait_until("histories saved", || {
        alice.history.saved().len() == 1 && bob.history.saved().len() == 1
    })
    .await;
    assert_eq!(alice.history.saved()[0].outcome, CallOutcome::Declined);
    assert_eq!(bob.history.saved()[0].outcome, CallOutcome::Declined);
    assert!(bob.sink.stops() >= 1, "ringtone should have stopped");
}

#[tokio::test]
async fn unanswered_call_rings_out_as_missed() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    let call_id = alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;

    // Nobody answers; bob's ring timer fires after 300ms.
    wait_until("both idle after ring-out", || {
        alice.client.snapshot().status == CallStatus::Idle
            && bob.client.snapshot().status == CallStatus::Idle
    })
    .await;

    let record = store.get_call(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Missed);
    assert!(record.duration.is_none());

    wait_until("histories saved", || {
        alice.history.saved().len() == 1 && bob.history.saved().len() == 1
    })
    .await;
    assert_eq!(alice.history.saved()[0].outcome, CallOutcome::Missed);
    assert_eq!(bob.history.saved()[0].outcome, CallOutcome::Missed);
}

#[tokio::test]
async fn caller_cancel_dismisses_the_ringing_side() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    let call_id = alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;

    alice.client.end_call().await.unwrap();

    wait_until("bob idle", || {
        bob.client.snapshot().status == CallStatus::Idle
    })
    .await;
    assert!(bob.overlay.dismissals() >= 1);

    let record = store.get_call(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Ended);
    assert!(record.answered_at.is_none());

    // A cancelled call was never connected, so both sides log a miss.
    wait_until("histories saved", || {
        alice.history.saved().len() == 1 && bob.history.saved().len() == 1
    })
    .await;
    assert_eq!(alice.history.saved()[0].outcome, CallOutcome::Missed);
    assert_eq!(bob.history.saved()[0].outcome, CallOutcome::Missed);
}

#[tokio::test]
async fn dialing_while_in_a_call_is_rejected_without_side_effects() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    let call_id = connect(&alice, &bob).await;

    let result = alice
        .client
        .start_call(Party::new("carol", "Carol"), CallKind::Voice)
        .await;
    assert!(matches!(result, Err(ClientError::AlreadyInCall { .. })));

    // The existing call is untouched.
    let snapshot = alice.client.snapshot();
    assert_eq!(snapshot.status, CallStatus::Connected);
    assert_eq!(snapshot.call.unwrap().id, call_id);
    assert_eq!(alice.history.saved().len(), 0);
}

#[tokio::test]
async fn stale_incoming_records_are_discarded_silently() {
    let store = Arc::new(MemorySignalStore::new());
    let alice = build_harness(store.clone(), test_config("alice", "Alice")).await;

    let call_id = alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();

    // Bob's client comes up only after the record has gone stale.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let bob_config = test_config("bob", "Bob")
        .with_ring_timeout(Duration::from_millis(100))
        .with_staleness_bound(Duration::from_millis(150));
    let bob = build_harness(store.clone(), bob_config).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let status = store.get_call(call_id).await.unwrap().map(|r| r.status);
        if status == Some(CallStatus::Missed) {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for stale record to be marked missed");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Bob never rang: no event, no overlay, no ringtone, no history.
    assert!(bob.handler.incoming().is_empty());
    assert!(bob.overlay.shown().is_empty());
    assert_eq!(bob.sink.starts(), 0);
    assert!(bob.history.saved().is_empty());
    assert_eq!(bob.client.snapshot().status, CallStatus::Idle);
}

#[tokio::test]
async fn failed_accept_releases_the_caller() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    let call_id = alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;

    bob.devices.fail_next();
    let result = bob.client.accept_call().await;
    assert!(matches!(result, Err(ClientError::DeviceUnavailable { .. })));

    wait_until("both idle", || {
        alice.client.snapshot().status == CallStatus::Idle
            && bob.client.snapshot().status == CallStatus::Idle
    })
    .await;
    let record = store.get_call(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Ended);
    wait_until("histories saved", || {
        alice.history.saved().len() == 1 && bob.history.saved().len() == 1
    })
    .await;
}

#[tokio::test]
async fn overlay_actions_drive_the_call() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;

    // Bob accepts from the lock screen.
    bob.overlay
        .press(peercall_client_core::OverlayAction::Accept { call_id: None });
    wait_until("both connected", || {
        alice.client.snapshot().status == CallStatus::Connected
            && bob.client.snapshot().status == CallStatus::Connected
    })
    .await;

    // Alice hangs up from the overlay.
    alice
        .overlay
        .press(peercall_client_core::OverlayAction::End { call_id: None });
    wait_until("both idle", || {
        alice.client.snapshot().status == CallStatus::Idle
            && bob.client.snapshot().status == CallStatus::Idle
    })
    .await;
    assert_eq!(alice.history.saved().len(), 1);
    assert_eq!(alice.history.saved()[0].outcome, CallOutcome::Completed);
}

#[tokio::test]
async fn transport_failure_ends_the_call_on_both_sides() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    let call_id = connect(&alice, &bob).await;

    // The network drops out from under alice's peer connection.
    alice
        .factory
        .last()
        .unwrap()
        .set_state(TransportState::Failed);

    wait_until("both idle after transport loss", || {
        alice.client.snapshot().status == CallStatus::Idle
            && bob.client.snapshot().status == CallStatus::Idle
    })
    .await;

    let record = store.get_call(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Ended);

    wait_until("histories saved", || {
        alice.history.saved().len() == 1 && bob.history.saved().len() == 1
    })
    .await;
    assert_eq!(alice.history.saved()[0].outcome, CallOutcome::Completed);
    assert_eq!(bob.history.saved()[0].outcome, CallOutcome::Completed);

    for harness in [&alice, &bob] {
        let transport = harness.factory.last().unwrap();
        assert!(transport.is_closed());
        assert!(transport.local_tracks().iter().all(|t| t.is_stopped()));
    }
}

#[tokio::test]
async fn failed_end_write_still_releases_the_call() {
    let store = Arc::new(MemorySignalStore::new());
    let flaky = FlakyStore::wrap(store.clone());
    let alice = build_harness_on(flaky.clone(), test_config("alice", "Alice")).await;
    let bob = build_harness(store.clone(), test_config("bob", "Bob")).await;

    let call_id = connect(&alice, &bob).await;

    // The signaling backend goes down right before alice hangs up.
    flaky.fail_status_writes(true);
    alice.client.end_call().await.unwrap();

    wait_until("alice idle", || {
        alice.client.snapshot().status == CallStatus::Idle
    })
    .await;

    // Her side is fully released even though the write never landed.
    assert_eq!(alice.history.saved().len(), 1);
    let entry = &alice.history.saved()[0];
    assert_eq!(entry.outcome, CallOutcome::Completed);
    assert!(entry.duration_secs.is_some());
    let transport = alice.factory.last().unwrap();
    assert!(transport.is_closed());
    assert!(transport.local_tracks().iter().all(|t| t.is_stopped()));

    let record = store.get_call(call_id).await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::Connected);
}

#[tokio::test]
async fn failed_decline_write_still_clears_the_ring() {
    let store = Arc::new(MemorySignalStore::new());
    let flaky = FlakyStore::wrap(store.clone());
    let alice = build_harness(store.clone(), test_config("alice", "Alice")).await;
    let bob = build_harness_on(flaky.clone(), test_config("bob", "Bob")).await;

    alice
        .client
        .start_call(Party::new("bob", "Bob"), CallKind::Voice)
        .await
        .unwrap();
    wait_until("bob ringing", || !bob.handler.incoming().is_empty()).await;

    flaky.fail_status_writes(true);
    bob.client.decline_call().await.unwrap();

    wait_until("bob idle", || {
        bob.client.snapshot().status == CallStatus::Idle
    })
    .await;
    assert_eq!(bob.history.saved().len(), 1);
    assert_eq!(bob.history.saved()[0].outcome, CallOutcome::Declined);
    assert!(bob.sink.stops() >= 1, "ringtone should have stopped");
    assert!(bob.overlay.dismissals() >= 1);
}

#[tokio::test]
async fn duration_tracks_wall_clock_not_tick_count() {
    let store = Arc::new(MemorySignalStore::new());
    let (alice, bob) = pair(&store).await;

    connect(&alice, &bob).await;

    // The harness ticks every 25ms; only elapsed seconds may show up.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let duration = alice.client.snapshot().duration_secs;
    assert!(
        (1..=2).contains(&duration),
        "expected 1-2 seconds of talk time, got {duration}"
    );

    alice.client.end_call().await.unwrap();
}
