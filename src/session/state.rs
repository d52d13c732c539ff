use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{SessionSummary, TrackMetadata};
use crate::telemetry::PitchSample;

pub const COUNTDOWN_START: u8 = 3;
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
pub const RECORDING_TICK: Duration = Duration::from_millis(100);
pub const RECORDING_TICK_SECONDS: f64 = 0.1;
/// Lowest offset that still moves the song position forward on every tick.
pub const MIN_LATENCY_OFFSET_MS: i64 = 1 - RECORDING_TICK.as_millis() as i64;
/// Sessions with fewer samples are scored but never persisted.
pub const MIN_SESSION_DURATION_POINTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    CountingDown(u8),
    Recording {
        elapsed: f64,
    },
    Completed {
        summary: SessionSummary,
    },
    Cancelled,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::CountingDown(_) | SessionState::Recording { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed { .. } | SessionState::Cancelled)
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        match self {
            SessionState::Completed { summary } => Some(summary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::CountingDown(_) => "CountingDown",
            SessionState::Recording { .. } => "Recording",
            SessionState::Completed { .. } => "Completed",
            SessionState::Cancelled => "Cancelled",
        }
    }
}

/// Everything the orchestrator needs for one attempt. Fixed for the
/// session's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub track: TrackMetadata,
    pub expected_duration_seconds: f64,
    /// Device/OS audio pipeline delay measured by calibration.
    pub latency_offset_ms: i64,
    pub is_duel_mode: bool,
    pub opponent_trace: Option<Vec<PitchSample>>,
    /// Who recorded `opponent_trace`. Synthetic opponents have none.
    #[serde(default)]
    pub opponent_id: Option<String>,
}

impl SessionConfig {
    pub fn new(track: TrackMetadata, latency_offset_ms: i64) -> Self {
        Self {
            expected_duration_seconds: track.expected_duration_seconds,
            track,
            latency_offset_ms,
            is_duel_mode: false,
            opponent_trace: None,
            opponent_id: None,
        }
    }

    /// Turns on duel mode. Without a trace a synthetic opponent is generated
    /// when the session completes.
    pub fn with_duel(mut self, opponent_trace: Option<Vec<PitchSample>>) -> Self {
        self.is_duel_mode = true;
        self.opponent_trace = opponent_trace;
        self.opponent_id = None;
        self
    }

    /// Duel against a trace recorded by another user.
    pub fn with_opponent(mut self, opponent_id: impl Into<String>, trace: Vec<PitchSample>) -> Self {
        self.is_duel_mode = true;
        self.opponent_trace = Some(trace);
        self.opponent_id = Some(opponent_id.into());
        self
    }

    pub fn track_id(&self) -> &str {
        &self.track.id
    }

    pub fn latency_offset_seconds(&self) -> f64 {
        self.latency_offset_ms as f64 / 1000.0
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.latency_offset_ms < MIN_LATENCY_OFFSET_MS {
            return Err(EngineError::InvalidLatencyOffset {
                offset_ms: self.latency_offset_ms,
                minimum_ms: MIN_LATENCY_OFFSET_MS,
            });
        }
        Ok(())
    }

    /// Song-position advance of one recording tick.
    pub fn tick_advance_seconds(&self) -> f64 {
        RECORDING_TICK_SECONDS + self.latency_offset_seconds()
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start(Box<SessionConfig>),
    Tick,
    Stop,
    Cancel,
    Reset,
}
