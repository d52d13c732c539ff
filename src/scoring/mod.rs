//! Turns a finished pitch history into an accuracy score and feedback.
//!
//! Everything here is pure: the same history and track always produce the
//! same summary.

pub mod config;
pub mod feedback;

pub use config::ScoringConfig;
pub use feedback::bracket_tip;

use crate::models::{SessionSummary, TrackMetadata};
use crate::telemetry::PitchHistory;

/// Scores a history against its track, reporting the track's full length as
/// the session duration.
pub fn score(history: &PitchHistory, track: &TrackMetadata) -> SessionSummary {
    score_session(history, track, track.expected_duration_seconds)
}

/// Scores a history recorded for `elapsed_seconds` (shorter than the track
/// when the session was stopped by hand).
pub fn score_session(
    history: &PitchHistory,
    track: &TrackMetadata,
    elapsed_seconds: f64,
) -> SessionSummary {
    score_with_config(history, track, elapsed_seconds, &ScoringConfig::default())
}

pub fn score_with_config(
    history: &PitchHistory,
    track: &TrackMetadata,
    elapsed_seconds: f64,
    config: &ScoringConfig,
) -> SessionSummary {
    let duration_seconds = whole_seconds(elapsed_seconds);
    let sample_count = u32::try_from(history.total_samples()).unwrap_or(u32::MAX);

    if history.is_empty() {
        return SessionSummary {
            song_id: track.id.clone(),
            duration_seconds,
            accuracy_score: 0.0,
            max_stability: history.max_stability(),
            rhythm_precision: 0.0,
            sample_count,
            improvement_tips: vec![feedback::SING_LOUDER_TIP.to_string()],
        };
    }

    let mean = history.iter().map(|s| s.visualization).sum::<f64>() / history.len() as f64;
    let accuracy_score = (mean * complexity_factor(track, config)).min(100.0);

    let mut improvement_tips = vec![bracket_tip(accuracy_score).to_string()];
    if let Some((spread, _)) = history.session_spread() {
        if spread > config.steadiness_spread {
            improvement_tips.push(feedback::STEADINESS_TIP.to_string());
        }
    }

    SessionSummary {
        song_id: track.id.clone(),
        duration_seconds,
        accuracy_score,
        max_stability: history.max_stability(),
        rhythm_precision: rhythm_precision(history),
        sample_count,
        improvement_tips,
    }
}

/// Fixed difficulty proxy based on the length of the reference melody.
pub fn complexity_factor(track: &TrackMetadata, config: &ScoringConfig) -> f64 {
    if track.note_count() > config.complex_melody_notes {
        config.complexity_factor
    } else {
        1.0
    }
}

fn rhythm_precision(history: &PitchHistory) -> f64 {
    let total = history.total_samples();
    if total == 0 {
        return 0.0;
    }
    history.voiced_samples() as f64 / total as f64 * 100.0
}

fn whole_seconds(elapsed_seconds: f64) -> u32 {
    if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
        return 0;
    }
    elapsed_seconds.round().min(u32::MAX as f64) as u32
}
