mod common;

use std::sync::{atomic::Ordering, Arc};

use tempfile::TempDir;
use tokio::sync::{broadcast, watch};

use vocalis_lib::db::Database;
use vocalis_lib::scoring::feedback::COMPETITIVE_TIP;
use vocalis_lib::session::{SessionConfig, SessionNotice, SessionOrchestrator, SessionState, TokioScheduler};
use vocalis_lib::sync::{MemoryRemoteStore, PersistOutcome, SyncReconciler};
use vocalis_lib::telemetry::{PitchSample, TelemetryEvent};

use common::{input, track, ScriptedInput};

struct Harness {
    _dir: TempDir,
    db: Database,
    remote: Arc<MemoryRemoteStore>,
    online: watch::Sender<bool>,
    scripted: Arc<ScriptedInput>,
    orchestrator: SessionOrchestrator,
}

fn harness(scripted: Arc<ScriptedInput>, online: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("vocalis.sqlite3")).unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let reconciler = SyncReconciler::new(db.clone(), remote.clone());
    let (online_tx, online_rx) = watch::channel(online);
    let orchestrator = SessionOrchestrator::new(input(&scripted), Arc::new(TokioScheduler), "alice")
        .with_sync(reconciler, online_rx);

    Harness {
        _dir: dir,
        db,
        remote,
        online: online_tx,
        scripted,
        orchestrator,
    }
}

async fn next_state(states: &mut broadcast::Receiver<SessionState>) -> SessionState {
    states.recv().await.unwrap()
}

/// Waits for the first notice that is not telemetry.
async fn outcome_notice(notices: &mut broadcast::Receiver<SessionNotice>) -> SessionNotice {
    loop {
        match notices.recv().await.unwrap() {
            SessionNotice::Telemetry { .. } => continue,
            other => return other,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn offline_session_auto_stops_and_queues_one_log() {
    let h = harness(ScriptedInput::singing(440.0, 90.0), false);
    let mut states = h.orchestrator.subscribe_states();
    let mut notices = h.orchestrator.subscribe_notices();

    // 0.1s per tick plus a 1.15s offset: twelve ticks cover the 15s track.
    let config = SessionConfig::new(track("song-15", 15.0), 1150);
    assert_eq!(h.orchestrator.start(config).await.unwrap(), SessionState::CountingDown(3));
    assert_eq!(next_state(&mut states).await, SessionState::CountingDown(3));
    assert_eq!(next_state(&mut states).await, SessionState::CountingDown(2));
    assert_eq!(next_state(&mut states).await, SessionState::CountingDown(1));
    assert_eq!(h.scripted.begun.load(Ordering::SeqCst), 0);
    assert_eq!(next_state(&mut states).await, SessionState::Recording { elapsed: 0.0 });
    assert_eq!(h.scripted.begun.load(Ordering::SeqCst), 1);

    let summary = loop {
        if let SessionState::Completed { summary } = next_state(&mut states).await {
            break summary;
        }
    };
    assert_eq!(summary.sample_count, 12);
    assert!((summary.accuracy_score - 90.0).abs() < 1e-9);
    assert_eq!(summary.max_stability, 100.0);
    assert_eq!(summary.improvement_tips, vec![COMPETITIVE_TIP.to_string()]);

    let persisted = outcome_notice(&mut notices).await;
    let log_id = match persisted {
        SessionNotice::Persisted {
            outcome: PersistOutcome::Queued { log_id },
        } => log_id,
        other => panic!("unexpected notice {other:?}"),
    };

    let queued = h.db.list_unsynced_logs("alice").await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, log_id);
    assert!(!queued[0].synced);
    assert_eq!(queued[0].song_id, "song-15");
    assert!(h.remote.logs().is_empty());
    assert_eq!(h.remote.append_attempts(), 0);
    assert_eq!(h.scripted.released.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stable_status_is_reported_while_recording() {
    let h = harness(ScriptedInput::singing(440.0, 90.0), false);
    let mut notices = h.orchestrator.subscribe_notices();

    h.orchestrator
        .start(SessionConfig::new(track("steady", 5.0), 0))
        .await
        .unwrap();

    let mut saw_stable = false;
    loop {
        match notices.recv().await.unwrap() {
            SessionNotice::Telemetry { event: TelemetryEvent::Stable } => saw_stable = true,
            SessionNotice::Telemetry { .. } => {}
            _ => break,
        }
    }
    assert!(saw_stable);

    let snapshot = h.orchestrator.snapshot().await;
    assert!(matches!(snapshot.state, SessionState::Completed { .. }));
    assert_eq!(snapshot.history.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn manual_stop_of_a_short_take_is_not_stored() {
    let h = harness(ScriptedInput::singing(440.0, 90.0), false);
    let mut states = h.orchestrator.subscribe_states();
    let mut notices = h.orchestrator.subscribe_notices();

    h.orchestrator
        .start(SessionConfig::new(track("long", 120.0), 0))
        .await
        .unwrap();

    let mut recorded = 0;
    while recorded < 5 {
        if let SessionState::Recording { elapsed } = next_state(&mut states).await {
            if elapsed > 0.0 {
                recorded += 1;
            }
        }
    }

    let stopped = h.orchestrator.stop().await.unwrap();
    let summary = stopped.summary().unwrap();
    assert!(summary.sample_count < 10);

    match outcome_notice(&mut notices).await {
        SessionNotice::PersistRejected { reason } => assert!(reason.contains("too short")),
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(h.db.count_unsynced_logs("alice").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_countdown_never_captures() {
    let h = harness(ScriptedInput::singing(440.0, 90.0), false);
    let mut states = h.orchestrator.subscribe_states();

    h.orchestrator
        .start(SessionConfig::new(track("song", 10.0), 0))
        .await
        .unwrap();
    assert_eq!(next_state(&mut states).await, SessionState::CountingDown(3));
    assert_eq!(next_state(&mut states).await, SessionState::CountingDown(2));

    assert_eq!(h.orchestrator.cancel().await.unwrap(), SessionState::Cancelled);
    assert_eq!(next_state(&mut states).await, SessionState::Cancelled);
    assert_eq!(h.scripted.begun.load(Ordering::SeqCst), 0);
    assert_eq!(h.scripted.released.load(Ordering::SeqCst), 1);

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    assert_eq!(h.orchestrator.state().await, SessionState::Cancelled);

    // A cancelled session blocks new starts until it is reset.
    let ignored = h
        .orchestrator
        .start(SessionConfig::new(track("song", 10.0), 0))
        .await
        .unwrap();
    assert_eq!(ignored, SessionState::Cancelled);

    h.orchestrator.reset().await.unwrap();
    let restarted = h
        .orchestrator
        .start(SessionConfig::new(track("song", 10.0), 0))
        .await
        .unwrap();
    assert_eq!(restarted, SessionState::CountingDown(3));
    assert_eq!(h.scripted.acquired.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn capture_failure_returns_to_idle() {
    let scripted = ScriptedInput::singing(440.0, 90.0);
    scripted.fail_begin.store(true, Ordering::SeqCst);
    let h = harness(scripted, false);
    let mut notices = h.orchestrator.subscribe_notices();

    h.orchestrator
        .start(SessionConfig::new(track("song", 10.0), 0))
        .await
        .unwrap();

    match outcome_notice(&mut notices).await {
        SessionNotice::CaptureFailed { reason } => assert!(reason.contains("unavailable")),
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(h.orchestrator.state().await, SessionState::Idle);
    assert_eq!(h.scripted.released.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn online_duel_against_recorded_opponent_is_delivered() {
    let h = harness(ScriptedInput::singing(440.0, 90.0), true);
    let mut notices = h.orchestrator.subscribe_notices();

    let ghost: Vec<_> = (1..=12).map(|i| PitchSample::new(i, 400.0, 90.0)).collect();
    let config = SessionConfig::new(track("duet", 2.0), 0).with_opponent("bob", ghost);
    h.orchestrator.start(config).await.unwrap();

    let duel = match outcome_notice(&mut notices).await {
        SessionNotice::DuelFinished { outcome } => outcome,
        other => panic!("unexpected notice {other:?}"),
    };
    assert_eq!(duel.result.user1.user_id, "alice");
    assert_eq!(duel.result.user2.user_id, "bob");
    assert!(duel.winner_is_user, "equal scores favour the user");

    match outcome_notice(&mut notices).await {
        SessionNotice::Persisted {
            outcome: PersistOutcome::Synced { .. },
        } => {}
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(h.remote.logs().len(), 1);
    assert_eq!(h.remote.best_score("alice"), Some(90.0));
    assert_eq!(h.db.count_unsynced_logs("alice").await.unwrap(), 0);
    drop(h.online);
}
