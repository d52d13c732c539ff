//! Durable records backing offline sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SessionSummary;

/// One completed session staged for delivery to the remote profile store.
/// Append-only apart from `synced`, which only ever goes `false -> true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflinePerformanceLog {
    pub id: Uuid,
    pub user_id: String,
    pub song_id: String,
    pub pitch_accuracy: f64,
    pub rhythm_precision: f64,
    pub vocal_stability: f64,
    pub duration_seconds: u32,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

impl OfflinePerformanceLog {
    pub fn from_summary(user_id: &str, summary: &SessionSummary, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            song_id: summary.song_id.clone(),
            pitch_accuracy: summary.accuracy_score,
            rhythm_precision: summary.rhythm_precision,
            vocal_stability: summary.max_stability,
            duration_seconds: summary.duration_seconds,
            timestamp,
            synced: false,
        }
    }
}

/// Result of trying to flip a log to synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkSynced {
    Marked,
    AlreadySynced,
    /// An earlier log of the same user is still unsynced; nothing was written.
    OutOfOrder,
    NotFound,
}
