use std::sync::{Arc, Mutex as StdMutex};

use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::duel::{self, DuelOutcome};
use crate::error::EngineError;
use crate::models::SessionSummary;
use crate::pitch::AudioInput;
use crate::sync::{PersistOutcome, SyncReconciler};
use crate::telemetry::{PitchHistory, StabilityStatus, TelemetryEvent};
use crate::{log_debug, log_info};

use super::{Scheduler, SessionConfig, SessionEvent, SessionMachine, SessionState};

const ENABLE_LOGS: bool = true;
const CHANNEL_CAPACITY: usize = 64;

/// Everything besides state changes that a session reports while it runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionNotice {
    Telemetry { event: TelemetryEvent },
    /// Capture could not begin at the end of the countdown; the session is
    /// back in `Idle`.
    CaptureFailed { reason: String },
    Persisted { outcome: PersistOutcome },
    /// The result was not stored (too short, or the local store failed).
    PersistRejected { reason: String },
    DuelFinished { outcome: DuelOutcome },
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub history: PitchHistory,
    pub stability: StabilityStatus,
}

/// Drives a [`SessionMachine`] in real time and hands finished sessions to
/// scoring, duel comparison and sync.
#[derive(Clone)]
pub struct SessionOrchestrator {
    machine: Arc<Mutex<SessionMachine>>,
    scheduler: Arc<dyn Scheduler>,
    reconciler: Option<SyncReconciler>,
    connectivity: watch::Receiver<bool>,
    user_id: Arc<str>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    pending_tick: Arc<StdMutex<Option<CancellationToken>>>,
    states: broadcast::Sender<SessionState>,
    notices: broadcast::Sender<SessionNotice>,
    heartbeat_every_ticks: u64,
}

impl SessionOrchestrator {
    pub fn new(
        input: Arc<dyn AudioInput>,
        scheduler: Arc<dyn Scheduler>,
        user_id: impl Into<String>,
    ) -> Self {
        let debug_mode = std::env::var("VOCALIS_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let (states, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (notices, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (_, connectivity) = watch::channel(false);

        Self {
            machine: Arc::new(Mutex::new(SessionMachine::new(input))),
            scheduler,
            reconciler: None,
            connectivity,
            user_id: Arc::from(user_id.into()),
            ticker: Arc::new(Mutex::new(None)),
            pending_tick: Arc::new(StdMutex::new(None)),
            states,
            notices,
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }

    /// Persists completed sessions through `reconciler`, online or offline
    /// according to `connectivity` at completion time.
    pub fn with_sync(mut self, reconciler: SyncReconciler, connectivity: watch::Receiver<bool>) -> Self {
        self.reconciler = Some(reconciler);
        self.connectivity = connectivity;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn subscribe_states(&self) -> broadcast::Receiver<SessionState> {
        self.states.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.machine.lock().await.state().clone()
    }

    /// Read-only copy of the pitch history.
    pub async fn history(&self) -> PitchHistory {
        self.machine.lock().await.history()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let machine = self.machine.lock().await;
        SessionSnapshot {
            state: machine.state().clone(),
            history: machine.history(),
            stability: machine.stability(),
        }
    }

    /// Starts the countdown. A no-op unless the session is `Idle`.
    pub async fn start(&self, config: SessionConfig) -> Result<SessionState, EngineError> {
        let transition = {
            let mut machine = self.machine.lock().await;
            machine.handle(SessionEvent::Start(Box::new(config)))?
        };

        if transition.changed {
            self.publish_state(&transition.state);
            self.spawn_ticker().await;
        }
        Ok(transition.state)
    }

    /// Ends a recording early and scores what was captured.
    pub async fn stop(&self) -> Result<SessionState, EngineError> {
        let (transition, config) = {
            let mut machine = self.machine.lock().await;
            let transition = machine.handle(SessionEvent::Stop)?;
            (transition, machine.config().cloned())
        };

        if transition.changed {
            self.cancel_ticker().await;
            self.publish_state(&transition.state);
            if let Some(summary) = transition.state.summary() {
                self.finish(summary.clone(), config).await;
            }
        }
        Ok(transition.state)
    }

    pub async fn cancel(&self) -> Result<SessionState, EngineError> {
        let transition = {
            let mut machine = self.machine.lock().await;
            machine.handle(SessionEvent::Cancel)?
        };

        if transition.changed {
            self.cancel_ticker().await;
            self.publish_state(&transition.state);
        }
        Ok(transition.state)
    }

    /// Returns a finished or cancelled session to `Idle`.
    pub async fn reset(&self) -> Result<SessionState, EngineError> {
        let transition = {
            let mut machine = self.machine.lock().await;
            machine.handle(SessionEvent::Reset)?
        };

        if transition.changed {
            self.publish_state(&transition.state);
        }
        Ok(transition.state)
    }

    fn publish_state(&self, state: &SessionState) {
        let _ = self.states.send(state.clone());
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }

    fn set_pending_tick(&self, token: Option<CancellationToken>) {
        let mut guard = match self.pending_tick.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        // The previous ticker has either finished or been aborted; wait for
        // it so a late persist is not cut short.
        if let Some(handle) = ticker_guard.take() {
            let _ = handle.await;
        }

        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            orchestrator.run_ticker().await;
        });
        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        let pending = {
            let mut guard = match self.pending_tick.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        if let Some(token) = pending {
            token.cancel();
        }

        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn run_ticker(&self) {
        let mut recording_ticks: u64 = 0;

        loop {
            let delay = self.machine.lock().await.next_tick_delay();
            let Some(delay) = delay else {
                break;
            };

            let tick = self.scheduler.schedule(delay);
            self.set_pending_tick(Some(tick.canceller()));
            let fired = tick.wait().await;
            self.set_pending_tick(None);
            if !fired {
                break;
            }

            let (result, config) = {
                let mut machine = self.machine.lock().await;
                let result = machine.handle(SessionEvent::Tick);
                let completed = matches!(&result, Ok(t) if t.state.summary().is_some());
                let config = if completed { machine.config().cloned() } else { None };
                (result, config)
            };
            let transition = match result {
                Ok(transition) => transition,
                Err(err) => {
                    error!("Recording could not start: {err}");
                    self.publish_state(&SessionState::Idle);
                    self.notify(SessionNotice::CaptureFailed {
                        reason: err.to_string(),
                    });
                    break;
                }
            };

            if !transition.changed {
                continue;
            }

            if transition.capture_started {
                log_info!("Capture running; recording ticks armed");
            }
            self.publish_state(&transition.state);
            for event in transition.telemetry {
                self.notify(SessionNotice::Telemetry { event });
            }

            match &transition.state {
                SessionState::CountingDown(n) => {
                    log_debug!("Countdown {n}");
                }
                SessionState::Recording { elapsed } if !transition.capture_started => {
                    recording_ticks += 1;
                    if recording_ticks % self.heartbeat_every_ticks == 0 {
                        let history_len = self.machine.lock().await.history().len();
                        log_info!(
                            "Recording heartbeat: {elapsed:.2}s elapsed, {recording_ticks} ticks, {history_len} samples kept"
                        );
                    }
                }
                SessionState::Completed { summary } => {
                    self.finish(summary.clone(), config).await;
                    break;
                }
                _ => {}
            }
        }
    }

    /// Runs the duel comparison (in duel mode) and hands the summary to sync.
    async fn finish(&self, summary: SessionSummary, config: Option<SessionConfig>) {
        if let Some(config) = config.filter(|config| config.is_duel_mode) {
            let outcome = {
                let mut rng = rand::thread_rng();
                duel::run_duel(
                    &self.user_id,
                    &summary,
                    &config.track,
                    config.opponent_trace.as_deref(),
                    config.opponent_id.as_deref(),
                    &mut rng,
                )
            };
            info!(
                "Duel on {} finished: {:.1} vs {:.1}, user {}",
                outcome.result.song_id,
                outcome.result.user1.score,
                outcome.result.user2.score,
                if outcome.winner_is_user { "wins" } else { "loses" }
            );
            self.notify(SessionNotice::DuelFinished { outcome });
        }

        let Some(reconciler) = &self.reconciler else {
            return;
        };

        let online = *self.connectivity.borrow();
        match reconciler.persist(&self.user_id, &summary, online).await {
            Ok(outcome) => {
                self.notify(SessionNotice::Persisted { outcome });
            }
            Err(err @ EngineError::SessionTooShort { .. }) => {
                warn!("Result not stored: {err}");
                self.notify(SessionNotice::PersistRejected {
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                error!("Failed to persist session result: {err}");
                self.notify(SessionNotice::PersistRejected {
                    reason: err.to_string(),
                });
            }
        }
    }
}
