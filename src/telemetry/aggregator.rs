use log::warn;

use super::{
    IngestOutcome, PitchHistory, PitchSample, StabilityStatus, DEVIATION_THRESHOLD,
    STABILITY_THRESHOLD, STABILITY_WINDOW, STEADY_PITCH_ACHIEVEMENT, STEADY_PITCH_MIN_SAMPLES,
};

/// Owns the pitch history of one session and classifies each new sample.
#[derive(Debug, Default)]
pub struct TelemetryAggregator {
    history: PitchHistory,
    last_sequence: Option<u64>,
    achievement_unlocked: bool,
    status: StabilityStatus,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self {
            history: PitchHistory::new(),
            ..Self::default()
        }
    }

    pub fn replay<I>(samples: I) -> PitchHistory
    where
        I: IntoIterator<Item = PitchSample>,
    {
        let mut aggregator = Self::new();
        for sample in samples {
            aggregator.ingest(sample);
        }
        aggregator.history
    }

    pub fn ingest(&mut self, sample: PitchSample) -> IngestOutcome {
        if let Some(last) = self.last_sequence {
            if sample.sequence <= last {
                warn!(
                    "Dropping out-of-order pitch sample {} (last accepted {})",
                    sample.sequence, last
                );
                return IngestOutcome {
                    accepted: false,
                    status: self.status,
                    achievement: None,
                };
            }
        }
        self.last_sequence = Some(sample.sequence);
        self.history.push(sample);

        self.status = match self.history.window_spread(STABILITY_WINDOW) {
            Some((spread, max)) => {
                if max > 0.0 {
                    self.history.record_stability(stability_percent(spread));
                }
                classify(spread, max)
            }
            None => StabilityStatus::Nominal,
        };

        // Counts every sample of the session, not a consecutive streak.
        let achievement = if !self.achievement_unlocked
            && self.status == StabilityStatus::Stable
            && self.history.total_samples() >= STEADY_PITCH_MIN_SAMPLES
        {
            self.achievement_unlocked = true;
            Some(STEADY_PITCH_ACHIEVEMENT.to_string())
        } else {
            None
        };

        IngestOutcome {
            accepted: true,
            status: self.status,
            achievement,
        }
    }

    pub fn status(&self) -> StabilityStatus {
        self.status
    }

    pub fn history(&self) -> &PitchHistory {
        &self.history
    }

    /// Read-only copy for scoring and live charting.
    pub fn snapshot(&self) -> PitchHistory {
        self.history.clone()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Values strictly between the two thresholds (and exactly on them) are
/// nominal, which keeps the status from flickering on borderline spreads.
pub fn classify(spread: f64, max: f64) -> StabilityStatus {
    if spread < STABILITY_THRESHOLD && max > 0.0 {
        StabilityStatus::Stable
    } else if spread > DEVIATION_THRESHOLD {
        StabilityStatus::Deviating
    } else {
        StabilityStatus::Nominal
    }
}

pub fn stability_percent(spread: f64) -> f64 {
    (100.0 - spread).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{TelemetryEvent, MAX_HISTORY};

    fn sample(sequence: u64, visualization: f64) -> PitchSample {
        PitchSample::new(sequence, 440.0, visualization)
    }

    fn window_with(low: f64, high: f64) -> TelemetryAggregator {
        let mut aggregator = TelemetryAggregator::new();
        for i in 0..STABILITY_WINDOW as u64 {
            let value = if i % 2 == 0 { low } else { high };
            aggregator.ingest(sample(i + 1, value));
        }
        aggregator
    }

    #[test]
    fn history_keeps_the_last_fifty_in_order() {
        let mut aggregator = TelemetryAggregator::new();
        for seq in 1..=137u64 {
            aggregator.ingest(sample(seq, (seq % 100) as f64));
        }

        let history = aggregator.snapshot();
        assert_eq!(history.len(), MAX_HISTORY);
        let sequences: Vec<u64> = history.iter().map(|s| s.sequence).collect();
        let expected: Vec<u64> = (88..=137).collect();
        assert_eq!(sequences, expected);
        assert_eq!(history.total_samples(), 137);
    }

    #[test]
    fn nominal_until_window_fills() {
        let mut aggregator = TelemetryAggregator::new();
        for seq in 1..STABILITY_WINDOW as u64 {
            let outcome = aggregator.ingest(sample(seq, 50.0));
            assert_eq!(outcome.status, StabilityStatus::Nominal);
        }
        let outcome = aggregator.ingest(sample(STABILITY_WINDOW as u64, 50.0));
        assert_eq!(outcome.status, StabilityStatus::Stable);
    }

    #[test]
    fn spread_of_exactly_five_is_nominal() {
        assert_eq!(window_with(50.0, 55.0).status(), StabilityStatus::Nominal);
    }

    #[test]
    fn spread_just_under_five_is_stable() {
        assert_eq!(window_with(50.0, 54.9).status(), StabilityStatus::Stable);
    }

    #[test]
    fn spread_just_over_ten_is_deviating() {
        assert_eq!(window_with(50.0, 60.1).status(), StabilityStatus::Deviating);
    }

    #[test]
    fn spread_of_exactly_ten_is_nominal() {
        assert_eq!(window_with(50.0, 60.0).status(), StabilityStatus::Nominal);
    }

    #[test]
    fn silent_window_is_never_stable() {
        let aggregator = window_with(0.0, 0.0);
        assert_eq!(aggregator.status(), StabilityStatus::Nominal);
        assert_eq!(aggregator.history().max_stability(), 0.0);
    }

    #[test]
    fn max_stability_tracks_best_window() {
        let mut aggregator = TelemetryAggregator::new();
        for seq in 1..=10u64 {
            aggregator.ingest(sample(seq, if seq % 2 == 0 { 40.0 } else { 60.0 }));
        }
        assert!((aggregator.history().max_stability() - 80.0).abs() < 1e-9);

        for seq in 11..=20u64 {
            aggregator.ingest(sample(seq, 70.0));
        }
        assert!((aggregator.history().max_stability() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn steady_pitch_unlocks_once() {
        let mut aggregator = TelemetryAggregator::new();
        let mut unlocked_at = Vec::new();
        for seq in 1..=80u64 {
            let outcome = aggregator.ingest(sample(seq, 72.0));
            if outcome.achievement.is_some() {
                unlocked_at.push(seq);
                assert!(outcome
                    .events()
                    .contains(&TelemetryEvent::AchievementUnlocked("steady-pitch".into())));
            }
        }
        assert_eq!(unlocked_at, vec![STEADY_PITCH_MIN_SAMPLES]);
    }

    #[test]
    fn achievement_counts_total_samples_not_streak() {
        let mut aggregator = TelemetryAggregator::new();
        // 29 wobbly samples, then a stable stretch.
        for seq in 1..=29u64 {
            aggregator.ingest(sample(seq, if seq % 2 == 0 { 20.0 } else { 80.0 }));
        }
        let mut unlocked = None;
        for seq in 30..=45u64 {
            if aggregator.ingest(sample(seq, 65.0)).achievement.is_some() {
                unlocked = Some(seq);
            }
        }
        // The first fully stable window ends at sample 39.
        assert_eq!(unlocked, Some(39));
    }

    #[test]
    fn out_of_order_samples_are_dropped() {
        let mut aggregator = TelemetryAggregator::new();
        aggregator.ingest(sample(5, 50.0));
        let outcome = aggregator.ingest(sample(5, 60.0));
        assert!(!outcome.accepted);
        let outcome = aggregator.ingest(sample(3, 60.0));
        assert!(!outcome.accepted);
        assert_eq!(aggregator.history().len(), 1);
    }

    #[test]
    fn reset_clears_session_state() {
        let mut aggregator = window_with(50.0, 51.0);
        aggregator.reset();
        assert!(aggregator.history().is_empty());
        assert_eq!(aggregator.status(), StabilityStatus::Nominal);
        assert!(aggregator.ingest(sample(1, 50.0)).accepted);
    }
}
