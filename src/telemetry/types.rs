use serde::{Deserialize, Serialize};

use crate::pitch::PitchReading;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchSample {
    pub sequence: u64,
    pub frequency_hz: f64,
    pub visualization: f64,
}

impl PitchSample {
    pub fn new(sequence: u64, frequency_hz: f64, visualization: f64) -> Self {
        Self {
            sequence,
            frequency_hz,
            visualization,
        }
    }

    pub fn from_reading(sequence: u64, reading: &PitchReading) -> Self {
        Self::new(sequence, reading.frequency_hz, reading.visualization)
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StabilityStatus {
    #[default]
    Nominal,
    Stable,
    Deviating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "achievement")]
pub enum TelemetryEvent {
    Nominal,
    Stable,
    Deviating,
    AchievementUnlocked(String),
}

impl From<StabilityStatus> for TelemetryEvent {
    fn from(status: StabilityStatus) -> Self {
        match status {
            StabilityStatus::Nominal => TelemetryEvent::Nominal,
            StabilityStatus::Stable => TelemetryEvent::Stable,
            StabilityStatus::Deviating => TelemetryEvent::Deviating,
        }
    }
}

/// Result of ingesting one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// False when the sample was dropped for arriving out of sequence.
    pub accepted: bool,
    pub status: StabilityStatus,
    pub achievement: Option<String>,
}

impl IngestOutcome {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        let mut events = vec![TelemetryEvent::from(self.status)];
        if let Some(id) = &self.achievement {
            events.push(TelemetryEvent::AchievementUnlocked(id.clone()));
        }
        events
    }
}
