use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;

use crate::error::EngineError;
use crate::pitch::{AudioInput, CaptureDevice, PitchReading};
use crate::scoring;
use crate::telemetry::{
    PitchHistory, PitchSample, StabilityStatus, TelemetryAggregator, TelemetryEvent,
};

use super::{SessionConfig, SessionEvent, SessionState, COUNTDOWN_START, COUNTDOWN_TICK, RECORDING_TICK};

/// What one event did to the machine.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: SessionState,
    pub changed: bool,
    /// Telemetry raised by the sample appended on this transition, if any.
    pub telemetry: Vec<TelemetryEvent>,
    /// True on the transition that started audio capture.
    pub capture_started: bool,
}

impl Transition {
    fn unchanged(state: &SessionState) -> Self {
        Self {
            state: state.clone(),
            changed: false,
            telemetry: Vec::new(),
            capture_started: false,
        }
    }

    fn to(state: &SessionState) -> Self {
        Self {
            changed: true,
            ..Self::unchanged(state)
        }
    }
}

/// Synchronous transition function of a performance attempt.
///
/// Owns the session config, the capture device and the telemetry aggregator;
/// nothing else mutates them. Time is supplied from outside through `Tick`
/// events, with the period reported by [`SessionMachine::next_tick_delay`].
pub struct SessionMachine {
    input: Arc<dyn AudioInput>,
    state: SessionState,
    config: Option<SessionConfig>,
    device: Option<Box<dyn CaptureDevice>>,
    feed: Option<watch::Receiver<PitchReading>>,
    aggregator: TelemetryAggregator,
    next_sequence: u64,
    recording_ticks: u64,
}

impl SessionMachine {
    pub fn new(input: Arc<dyn AudioInput>) -> Self {
        Self {
            input,
            state: SessionState::Idle,
            config: None,
            device: None,
            feed: None,
            aggregator: TelemetryAggregator::new(),
            next_sequence: 0,
            recording_ticks: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    pub fn history(&self) -> PitchHistory {
        self.aggregator.snapshot()
    }

    pub fn recording_ticks(&self) -> u64 {
        self.recording_ticks
    }

    pub fn is_capturing(&self) -> bool {
        self.feed.is_some()
    }

    pub fn stability(&self) -> StabilityStatus {
        self.aggregator.status()
    }

    /// Period of the ticker that should currently be armed. Only one of the
    /// countdown and recording tickers is ever active.
    pub fn next_tick_delay(&self) -> Option<Duration> {
        match self.state {
            SessionState::CountingDown(_) => Some(COUNTDOWN_TICK),
            SessionState::Recording { .. } => Some(RECORDING_TICK),
            _ => None,
        }
    }

    pub fn handle(&mut self, event: SessionEvent) -> Result<Transition, EngineError> {
        match event {
            SessionEvent::Start(config) => self.start(*config),
            SessionEvent::Tick => self.tick(),
            SessionEvent::Stop => Ok(self.stop()),
            SessionEvent::Cancel => Ok(self.cancel()),
            SessionEvent::Reset => Ok(self.reset()),
        }
    }

    fn start(&mut self, config: SessionConfig) -> Result<Transition, EngineError> {
        if self.state != SessionState::Idle {
            debug!("start ignored while {}", self.state.as_str());
            return Ok(Transition::unchanged(&self.state));
        }

        config.validate()?;

        // Acquire now so permission problems surface before the countdown;
        // samples only start flowing when recording begins.
        let device = self.input.acquire()?;

        info!(
            "Session starting for track {} ({:.1}s, latency offset {}ms, duel: {})",
            config.track_id(),
            config.expected_duration_seconds,
            config.latency_offset_ms,
            config.is_duel_mode
        );

        self.aggregator.reset();
        self.next_sequence = 0;
        self.recording_ticks = 0;
        self.device = Some(device);
        self.config = Some(config);
        self.state = SessionState::CountingDown(COUNTDOWN_START);
        Ok(Transition::to(&self.state))
    }

    fn tick(&mut self) -> Result<Transition, EngineError> {
        match self.state {
            SessionState::CountingDown(n) if n > 1 => {
                self.state = SessionState::CountingDown(n - 1);
                Ok(Transition::to(&self.state))
            }
            SessionState::CountingDown(_) => self.begin_recording(),
            SessionState::Recording { elapsed } => Ok(self.record_tick(elapsed)),
            _ => Ok(Transition::unchanged(&self.state)),
        }
    }

    fn begin_recording(&mut self) -> Result<Transition, EngineError> {
        let begun = match self.device.as_mut() {
            Some(device) => device.begin(),
            None => Err(EngineError::DeviceUnavailable(
                "capture device was not acquired".into(),
            )),
        };

        match begun {
            Ok(feed) => {
                self.feed = Some(feed);
                self.state = SessionState::Recording { elapsed: 0.0 };
                info!("Recording started");
                Ok(Transition {
                    capture_started: true,
                    ..Transition::to(&self.state)
                })
            }
            Err(err) => {
                warn!("Capture failed to begin: {err}");
                self.teardown();
                self.config = None;
                self.state = SessionState::Idle;
                Err(err)
            }
        }
    }

    fn record_tick(&mut self, elapsed: f64) -> Transition {
        let reading = self
            .feed
            .as_ref()
            .map(|feed| *feed.borrow())
            .unwrap_or_default();

        self.next_sequence += 1;
        self.recording_ticks += 1;
        let outcome = self
            .aggregator
            .ingest(PitchSample::from_reading(self.next_sequence, &reading));

        let (advance, expected) = match &self.config {
            Some(config) => (config.tick_advance_seconds(), config.expected_duration_seconds),
            None => (super::RECORDING_TICK_SECONDS, f64::INFINITY),
        };
        let elapsed = elapsed + advance;

        let mut transition = if elapsed >= expected {
            info!("Track duration reached at {elapsed:.2}s; stopping");
            self.complete(elapsed)
        } else {
            self.state = SessionState::Recording { elapsed };
            Transition::to(&self.state)
        };
        transition.telemetry = outcome.events();
        transition
    }

    fn stop(&mut self) -> Transition {
        match self.state {
            SessionState::Recording { elapsed } => {
                info!("Session stopped manually at {elapsed:.2}s");
                self.complete(elapsed)
            }
            _ => Transition::unchanged(&self.state),
        }
    }

    fn cancel(&mut self) -> Transition {
        if !self.state.is_active() {
            return Transition::unchanged(&self.state);
        }
        info!("Session cancelled during {}", self.state.as_str());
        self.teardown();
        self.aggregator.reset();
        self.state = SessionState::Cancelled;
        Transition::to(&self.state)
    }

    fn reset(&mut self) -> Transition {
        if !self.state.is_terminal() {
            return Transition::unchanged(&self.state);
        }
        self.aggregator.reset();
        self.config = None;
        self.next_sequence = 0;
        self.recording_ticks = 0;
        self.state = SessionState::Idle;
        Transition::to(&self.state)
    }

    fn complete(&mut self, elapsed: f64) -> Transition {
        self.teardown();
        let history = self.aggregator.snapshot();
        let summary = match &self.config {
            Some(config) => scoring::score_session(&history, &config.track, elapsed),
            None => scoring::score_session(&history, &Default::default(), elapsed),
        };
        info!(
            "Session completed: accuracy {:.1}, max stability {:.1}, {} samples",
            summary.accuracy_score, summary.max_stability, summary.sample_count
        );
        self.state = SessionState::Completed { summary };
        Transition::to(&self.state)
    }

    fn teardown(&mut self) {
        self.feed = None;
        if let Some(mut device) = self.device.take() {
            device.release();
        }
    }
}

impl Drop for SessionMachine {
    fn drop(&mut self) {
        self.teardown();
    }
}
