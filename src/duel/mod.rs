//! Duel mode: a live session against a recorded or synthetic opponent.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::{SessionSummary, TrackMetadata};
use crate::scoring;
use crate::telemetry::{PitchSample, TelemetryAggregator};

pub const OPPONENT_BASE_VISUALIZATION: f64 = 85.0;
pub const OPPONENT_JITTER: f64 = 5.0;
/// Participant id reported for a synthetic opponent.
pub const GHOST_OPPONENT_ID: &str = "ghost";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelMetrics {
    pub accuracy: f64,
    pub rhythm: f64,
    pub stability: f64,
}

impl From<&SessionSummary> for DuelMetrics {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            accuracy: summary.accuracy_score,
            rhythm: summary.rhythm_precision,
            stability: summary.max_stability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelParticipant {
    pub user_id: String,
    pub score: f64,
    pub metrics: DuelMetrics,
}

impl DuelParticipant {
    fn from_summary(user_id: &str, summary: &SessionSummary) -> Self {
        Self {
            user_id: user_id.to_string(),
            score: summary.accuracy_score,
            metrics: DuelMetrics::from(summary),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelResult {
    pub song_id: String,
    pub user1: DuelParticipant,
    pub user2: DuelParticipant,
}

/// User minus opponent, per metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDeltas {
    pub score: f64,
    pub accuracy: f64,
    pub rhythm: f64,
    pub stability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelOutcome {
    pub result: DuelResult,
    pub winner_is_user: bool,
    pub deltas: MetricDeltas,
}

/// One synthetic sample per reference-melody note, visualization drawn
/// uniformly from `85 ± 5`.
pub fn generate_opponent_trace<R: Rng>(track: &TrackMetadata, rng: &mut R) -> Vec<PitchSample> {
    track
        .reference_melody
        .iter()
        .enumerate()
        .map(|(index, note)| {
            let jitter = rng.gen_range(-OPPONENT_JITTER..=OPPONENT_JITTER);
            PitchSample::new(
                index as u64 + 1,
                note.frequency_hz,
                OPPONENT_BASE_VISUALIZATION + jitter,
            )
        })
        .collect()
}

/// Scores an opponent trace the same way a live session is scored.
pub fn opponent_summary(trace: &[PitchSample], track: &TrackMetadata) -> SessionSummary {
    let history = TelemetryAggregator::replay(trace.iter().copied());
    scoring::score(&history, track)
}

/// Ties go to the user.
pub fn compare(
    song_id: &str,
    user_id: &str,
    user: &SessionSummary,
    opponent_id: &str,
    opponent: &SessionSummary,
) -> DuelOutcome {
    let user1 = DuelParticipant::from_summary(user_id, user);
    let user2 = DuelParticipant::from_summary(opponent_id, opponent);

    let deltas = MetricDeltas {
        score: user1.score - user2.score,
        accuracy: user1.metrics.accuracy - user2.metrics.accuracy,
        rhythm: user1.metrics.rhythm - user2.metrics.rhythm,
        stability: user1.metrics.stability - user2.metrics.stability,
    };
    let winner_is_user = user1.score >= user2.score;

    DuelOutcome {
        result: DuelResult {
            song_id: song_id.to_string(),
            user1,
            user2,
        },
        winner_is_user,
        deltas,
    }
}

/// Plays the user's summary against `trace`, or against a freshly generated
/// ghost when no trace was recorded. The opponent is reported as
/// `opponent_id`, falling back to [`GHOST_OPPONENT_ID`].
pub fn run_duel<R: Rng>(
    user_id: &str,
    user: &SessionSummary,
    track: &TrackMetadata,
    trace: Option<&[PitchSample]>,
    opponent_id: Option<&str>,
    rng: &mut R,
) -> DuelOutcome {
    let opponent = match trace {
        Some(trace) => opponent_summary(trace, track),
        None => opponent_summary(&generate_opponent_trace(track, rng), track),
    };
    let opponent_id = opponent_id.unwrap_or(GHOST_OPPONENT_ID);
    compare(&track.id, user_id, user, opponent_id, &opponent)
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::models::{Difficulty, Note};

    fn summary(song: &str, accuracy: f64) -> SessionSummary {
        SessionSummary {
            song_id: song.into(),
            duration_seconds: 20,
            accuracy_score: accuracy,
            max_stability: 95.0,
            rhythm_precision: 100.0,
            sample_count: 40,
            improvement_tips: Vec::new(),
        }
    }

    fn track(notes: usize) -> TrackMetadata {
        let melody = (0..notes)
            .map(|i| Note {
                start_seconds: i as f64,
                duration_seconds: 0.5,
                frequency_hz: 220.0 + i as f64,
            })
            .collect();
        TrackMetadata::from_lyrics("duet", &[10.0], melody, Difficulty::Medium)
    }

    #[test]
    fn tie_goes_to_the_user() {
        let outcome = compare("song", "alice", &summary("song", 82.0), "bob", &summary("song", 82.0));
        assert!(outcome.winner_is_user);
        assert_eq!(outcome.deltas.score, 0.0);
    }

    #[test]
    fn higher_opponent_wins() {
        let outcome = compare("song", "alice", &summary("song", 70.0), "bob", &summary("song", 71.0));
        assert!(!outcome.winner_is_user);
        assert_eq!(outcome.result.user2.user_id, "bob");
        assert!((outcome.deltas.accuracy + 1.0).abs() < 1e-9);
    }

    #[test]
    fn ghost_samples_stay_within_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let track = track(12);
        let trace = generate_opponent_trace(&track, &mut rng);

        assert_eq!(trace.len(), 12);
        for (sample, note) in trace.iter().zip(&track.reference_melody) {
            assert!((80.0..=90.0).contains(&sample.visualization));
            assert_eq!(sample.frequency_hz, note.frequency_hz);
        }
    }

    #[test]
    fn ghost_scores_land_in_the_opponent_band() {
        let mut rng = StdRng::seed_from_u64(11);
        let track = track(12);
        let outcome = run_duel("alice", &summary("duet", 95.0), &track, None, None, &mut rng);

        assert_eq!(outcome.result.user2.user_id, GHOST_OPPONENT_ID);
        assert!((80.0..=90.0).contains(&outcome.result.user2.score));
        assert!(outcome.winner_is_user);
    }

    #[test]
    fn recorded_trace_is_used_verbatim() {
        let mut rng = StdRng::seed_from_u64(3);
        let track = track(4);
        let trace: Vec<_> = (1..=4).map(|i| PitchSample::new(i, 300.0, 60.0)).collect();
        let outcome = run_duel(
            "alice",
            &summary("duet", 59.0),
            &track,
            Some(&trace),
            Some("bob"),
            &mut rng,
        );

        assert!((outcome.result.user2.score - 60.0).abs() < 1e-9);
        assert_eq!(outcome.result.user2.user_id, "bob");
        assert!(!outcome.winner_is_user);

        let anonymous = run_duel("alice", &summary("duet", 59.0), &track, Some(&trace), None, &mut rng);
        assert_eq!(anonymous.result.user2.user_id, GHOST_OPPONENT_ID);
    }
}
