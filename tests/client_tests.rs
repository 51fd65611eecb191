#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the lectern client event loop.
//!
//! Run on a paused tokio clock: idle time jumps straight to the next timer,
//! so reconnect delays and light-chase stages are checked to the millisecond
//! without real waiting.

mod common;

use std::time::Duration;

use lectern_client::render::CONNECTION_LOST_TEXT;
use lectern_client::{
    ConnectionStatus, LecternClient, LecternConfig, LecternEvent, NameDisplay, PlayerState,
    SharedDisplay,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use common::{next_event, player, wait_for, ScriptedFactory};

const RETRY: Duration = Duration::from_millis(3000);
const STAGE: Duration = Duration::from_millis(1000);

fn start(
    config: LecternConfig,
    factory: &ScriptedFactory,
) -> (LecternClient, mpsc::Receiver<LecternEvent>, SharedDisplay) {
    let display = SharedDisplay::new();
    let (client, events) = LecternClient::start(config, factory.clone(), display.clone());
    (client, events, display)
}

fn config() -> LecternConfig {
    LecternConfig::new("quiz.local:8080").with_player_number(2)
}

async fn expect_connected(events: &mut mpsc::Receiver<LecternEvent>) {
    let (event, skipped) =
        wait_for(events, |e| matches!(e, LecternEvent::Connected { .. })).await;
    assert!(
        matches!(event, LecternEvent::Connected { .. }),
        "unexpected {event:?} after {skipped:?}"
    );
}

async fn expect_rendered(events: &mut mpsc::Receiver<LecternEvent>) {
    wait_for(events, |e| {
        matches!(
            e,
            LecternEvent::PlayerStateRendered(_) | LecternEvent::NoPlayerRendered
        )
    })
    .await;
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn connects_to_lectern_socket_for_player() {
    let factory = ScriptedFactory::new();
    let _server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);

    let event = next_event(&mut events).await;
    assert_eq!(event, LecternEvent::Connected { player_number: 2 });
    assert!(client.is_connected());
    assert_eq!(
        factory.urls(),
        vec!["ws://quiz.local:8080/lecternsocket?player=2".to_string()]
    );
    assert_eq!(display.snapshot().status, ConnectionStatus::Connected);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_player_number_defaults_to_zero() {
    let factory = ScriptedFactory::new();
    let _server = factory.accept_next();
    let (mut client, mut events, _display) =
        start(LecternConfig::new("quiz.local").with_secure(true), &factory);

    assert_eq!(
        next_event(&mut events).await,
        LecternEvent::Connected { player_number: 0 }
    );
    assert_eq!(client.player_number(), 0);
    assert_eq!(
        factory.urls(),
        vec!["wss://quiz.local/lecternsocket?player=0".to_string()]
    );
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn close_schedules_retry_after_fixed_delay_and_open_resets_counter() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    factory.refuse_next(1);
    let _second = factory.accept_next();
    let closed_at = Instant::now();
    server.close();

    assert_eq!(
        next_event(&mut events).await,
        LecternEvent::Disconnected { reason: None }
    );
    assert_eq!(
        next_event(&mut events).await,
        LecternEvent::ReconnectScheduled {
            attempt: 1,
            max: 10,
            delay: RETRY,
        }
    );
    assert_eq!(
        display.snapshot().status,
        ConnectionStatus::Reconnecting { attempt: 1, max: 10 }
    );
    assert_eq!(client.reconnect_attempts(), 1);

    // First retry is refused, second opens.
    let (event, _) = wait_for(&mut events, |e| {
        matches!(e, LecternEvent::ReconnectScheduled { .. })
    })
    .await;
    assert!(matches!(
        event,
        LecternEvent::ReconnectScheduled { attempt: 2, .. }
    ));
    assert_eq!(Instant::now() - closed_at, RETRY);

    expect_connected(&mut events).await;
    assert_eq!(Instant::now() - closed_at, RETRY * 2);
    assert_eq!(client.reconnect_attempts(), 0);
    assert!(client.is_connected());
    assert_eq!(factory.connect_count(), 3);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_treated_as_close() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, _display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.fail("connection reset");
    let event = next_event(&mut events).await;
    let LecternEvent::Disconnected { reason: Some(reason) } = &event else {
        panic!("expected Disconnected with reason, got {event:?}");
    };
    assert!(reason.contains("connection reset"));
    assert!(matches!(
        next_event(&mut events).await,
        LecternEvent::ReconnectScheduled { attempt: 1, .. }
    ));
    assert!(!client.is_connected());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhaustion_stops_retrying_and_renders_connection_lost_once() {
    let factory = ScriptedFactory::new();
    let started = Instant::now();
    let (mut client, mut events, display) = start(config(), &factory);

    let (_, skipped) = wait_for(&mut events, |e| matches!(e, LecternEvent::ConnectionLost)).await;
    let retries: Vec<u32> = skipped
        .iter()
        .filter_map(|e| match e {
            LecternEvent::ReconnectScheduled { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, (1..=10).collect::<Vec<_>>());
    assert_eq!(factory.connect_count(), 11);
    assert_eq!(Instant::now() - started, RETRY * 10);
    assert_eq!(client.reconnect_attempts(), 10);

    let snapshot = display.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::ConnectionLost);
    assert_eq!(snapshot.name, NameDisplay::Text(CONNECTION_LOST_TEXT.into()));

    // Nothing else happens, however long we wait.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(factory.connect_count(), 11);
    assert!(events.try_recv().is_err());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_restart_recovers_after_exhaustion() {
    let factory = ScriptedFactory::new();
    let (mut client, mut events, display) =
        start(config().with_max_reconnect_attempts(2), &factory);
    wait_for(&mut events, |e| matches!(e, LecternEvent::ConnectionLost)).await;
    assert_eq!(factory.connect_count(), 3);

    // A restart that fails again keeps the terminal state without a second
    // ConnectionLost.
    client.set_visible(true).unwrap();
    assert_eq!(next_event(&mut events).await, LecternEvent::Restarted);
    assert!(matches!(
        next_event(&mut events).await,
        LecternEvent::Disconnected { .. }
    ));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(factory.connect_count(), 4);
    assert_eq!(display.snapshot().status, ConnectionStatus::ConnectionLost);

    // A restart that opens resets everything.
    let server = factory.accept_next();
    client.set_visible(true).unwrap();
    assert_eq!(next_event(&mut events).await, LecternEvent::Restarted);
    expect_connected(&mut events).await;
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(display.snapshot().status, ConnectionStatus::Connected);

    // And the retry budget is full again.
    server.close();
    wait_for(&mut events, |e| {
        matches!(e, LecternEvent::ReconnectScheduled { attempt: 1, .. })
    })
    .await;

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_while_open_does_nothing() {
    let factory = ScriptedFactory::new();
    let _server = factory.accept_next();
    let (mut client, mut events, _display) = start(config(), &factory);
    expect_connected(&mut events).await;

    client.set_visible(false).unwrap();
    client.set_visible(true).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(factory.connect_count(), 1);
    assert!(events.try_recv().is_err());
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_during_retry_wait_restarts_now_and_replaces_the_retry() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, _display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.close();
    wait_for(&mut events, |e| {
        matches!(e, LecternEvent::ReconnectScheduled { .. })
    })
    .await;

    let _second = factory.accept_next();
    client.set_visible(true).unwrap();
    assert_eq!(next_event(&mut events).await, LecternEvent::Restarted);
    expect_connected(&mut events).await;

    // The superseded retry never fires.
    tokio::time::sleep(RETRY * 2).await;
    assert_eq!(factory.connect_count(), 2);
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_during_pending_connect_replaces_the_attempt() {
    let factory = ScriptedFactory::new();
    let held = factory.hold_next();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);

    // The first attempt never resolves on its own.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.connect_count(), 1);
    assert!(!client.is_connected());
    assert_eq!(display.snapshot().status, ConnectionStatus::Connecting);
    assert!(events.try_recv().is_err());

    client.set_visible(true).unwrap();
    assert_eq!(next_event(&mut events).await, LecternEvent::Restarted);
    expect_connected(&mut events).await;
    assert_eq!(factory.connect_count(), 2);

    // The abandoned attempt can no longer hand over a transport.
    assert!(held.accept().is_none());

    server.state(&player("Alice", 100, false, false));
    expect_rendered(&mut events).await;
    assert_eq!(display.snapshot().name, NameDisplay::Text("Alice".into()));

    tokio::time::sleep(RETRY * 2).await;
    assert_eq!(factory.connect_count(), 2);
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts(), 0);
    assert!(events.try_recv().is_err());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Dispatch and rendering through the loop
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn renders_player_state_frames_in_order() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.state(&player("Alice", 400, false, false));
    server.state(&player("Alice", -500, true, false));

    let mut scores = Vec::new();
    for _ in 0..2 {
        if let LecternEvent::PlayerStateRendered(state) = next_event(&mut events).await {
            scores.push(state.score);
        }
    }
    assert_eq!(scores, vec![400, -500]);

    let snapshot = display.snapshot();
    assert_eq!(snapshot.name, NameDisplay::Text("Alice".into()));
    assert_eq!(snapshot.score_text, "-$500");
    assert!(snapshot.score_negative);
    assert!(snapshot.active);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_frames_are_dropped_without_stopping_the_loop() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.state(&player("Bob", 1000, true, false));
    expect_rendered(&mut events).await;
    let before = display.snapshot();

    server.raw("{definitely not json");
    server.raw(r#"{"message":"PLAYER_STATE","text":"{\"score\":"}"#);
    server.raw(r#"{"message":"FINAL_JEOPARDY"}"#);

    assert!(matches!(
        next_event(&mut events).await,
        LecternEvent::MalformedFrame { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        LecternEvent::MalformedFrame { .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        LecternEvent::UnknownMessage {
            kind: "FINAL_JEOPARDY".into()
        }
    );
    assert_eq!(display.snapshot(), before);
    assert!(client.is_connected());

    server.state(&player("Bob", 1_000_000, false, false));
    expect_rendered(&mut events).await;
    assert_eq!(display.snapshot().score_text, "$1,000,000");
    assert!(!display.snapshot().score_negative);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn signature_names_render_as_images() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.state(&player("data:image/png;base64,AAAA", 0, false, false));
    expect_rendered(&mut events).await;
    assert_eq!(
        display.snapshot().name,
        NameDisplay::Image("data:image/png;base64,AAAA".into())
    );

    server.state(&PlayerState::default());
    expect_rendered(&mut events).await;
    let snapshot = display.snapshot();
    assert_eq!(snapshot.name, NameDisplay::Empty);
    assert!(snapshot.no_player);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn light_chase_runs_one_stage_per_second_then_stops() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.state(&player("Carol", 200, true, true));
    expect_rendered(&mut events).await;
    let t0 = Instant::now();

    let stages: [Vec<u8>; 5] = [
        vec![5],
        vec![4, 5, 6],
        vec![3, 4, 5, 6, 7],
        vec![2, 3, 4, 5, 6, 7, 8],
        vec![1, 2, 3, 4, 5, 6, 7, 8, 9],
    ];
    assert_eq!(display.snapshot().lit_lights(), stages[0]);

    for k in 1..stages.len() {
        let due = t0 + STAGE * k as u32;
        tokio::time::sleep_until(due - Duration::from_millis(1)).await;
        assert_eq!(display.snapshot().lit_lights(), stages[k - 1], "before stage {k}");
        tokio::time::sleep_until(due + Duration::from_millis(1)).await;
        assert_eq!(display.snapshot().lit_lights(), stages[k], "at stage {k}");
    }

    // Still buzzed, but the chase does not loop.
    tokio::time::sleep(STAGE * 10).await;
    assert_eq!(display.snapshot().lit_lights(), stages[4]);

    // Releasing the buzz clears the final pattern.
    server.state(&player("Carol", 200, true, false));
    expect_rendered(&mut events).await;
    assert!(display.snapshot().lit_lights().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unbuzz_mid_chase_clears_lights_and_cancels_ticks() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.state(&player("Dave", 0, false, true));
    expect_rendered(&mut events).await;
    let t0 = Instant::now();
    tokio::time::sleep_until(t0 + STAGE * 2 + Duration::from_millis(1)).await;
    assert_eq!(display.snapshot().lit_lights(), vec![3, 4, 5, 6, 7]);

    server.state(&player("Dave", 0, false, false));
    expect_rendered(&mut events).await;
    assert!(display.snapshot().lit_lights().is_empty());

    tokio::time::sleep(STAGE * 5).await;
    assert!(display.snapshot().lit_lights().is_empty());

    // A new buzz starts from the centre again.
    server.state(&player("Dave", 0, false, true));
    expect_rendered(&mut events).await;
    assert_eq!(display.snapshot().lit_lights(), vec![5]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_state_is_idempotent() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    let state = player("Erin", 2400, true, true);
    server.state(&state);
    expect_rendered(&mut events).await;
    let t0 = Instant::now();
    let once = display.snapshot();

    tokio::time::sleep(Duration::from_millis(500)).await;
    server.state(&state);
    expect_rendered(&mut events).await;
    assert_eq!(display.snapshot(), once);

    // The repeat did not restart or double the chase timer.
    tokio::time::sleep_until(t0 + STAGE + Duration::from_millis(1)).await;
    assert_eq!(display.snapshot().lit_lights(), vec![4, 5, 6]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn no_player_stops_chase_and_zeroes_score() {
    let factory = ScriptedFactory::new();
    let server = factory.accept_next();
    let (mut client, mut events, display) = start(config(), &factory);
    expect_connected(&mut events).await;

    server.state(&player("Frank", -1200, true, true));
    expect_rendered(&mut events).await;
    tokio::time::sleep(STAGE + Duration::from_millis(1)).await;
    assert!(!display.snapshot().lit_lights().is_empty());

    server.no_player();
    assert_eq!(next_event(&mut events).await, LecternEvent::NoPlayerRendered);
    let snapshot = display.snapshot();
    assert_eq!(snapshot.name, NameDisplay::Empty);
    assert!(snapshot.no_player);
    assert_eq!(snapshot.score_text, "$0");
    assert!(!snapshot.score_negative);
    assert!(!snapshot.active);
    assert!(snapshot.lit_lights().is_empty());

    tokio::time::sleep(STAGE * 5).await;
    assert!(display.snapshot().lit_lights().is_empty());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_emits_final_disconnect_and_closes_channel() {
    let factory = ScriptedFactory::new();
    let _server = factory.accept_next();
    let (mut client, mut events, _display) = start(config(), &factory);
    expect_connected(&mut events).await;

    client.shutdown().await;
    assert_eq!(
        next_event(&mut events).await,
        LecternEvent::Disconnected {
            reason: Some("client shut down".into())
        }
    );
    assert!(events.recv().await.is_none());
    assert!(!client.is_connected());
}
