use serde::{Deserialize, Serialize};

/// Outcome of one completed session. Built once, when the session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub song_id: String,
    pub duration_seconds: u32,
    pub accuracy_score: f64,
    pub max_stability: f64,
    /// Share of recorded ticks that carried a voiced pitch, 0..=100.
    pub rhythm_precision: f64,
    /// Samples ingested during the session.
    pub sample_count: u32,
    pub improvement_tips: Vec<String>,
}
