use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{PitchSample, MAX_HISTORY};

/// Bounded, ordered pitch history of one session.
///
/// Only the aggregator appends; everyone else works on clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchHistory {
    samples: VecDeque<PitchSample>,
    max_stability: f64,
    total_samples: u64,
    voiced_samples: u64,
    /// Lowest and highest visualization ingested, evicted samples included.
    session_range: Option<(f64, f64)>,
}

impl PitchHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_HISTORY),
            ..Self::default()
        }
    }

    /// Builds a history by replaying samples through a fresh aggregator.
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = PitchSample>,
    {
        super::TelemetryAggregator::replay(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PitchSample> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<PitchSample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&PitchSample> {
        self.samples.back()
    }

    /// Highest window stability percentage seen during the session.
    pub fn max_stability(&self) -> f64 {
        self.max_stability
    }

    /// Samples ingested during the session, including evicted ones.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn voiced_samples(&self) -> u64 {
        self.voiced_samples
    }

    /// `(spread, max)` of the visualization values over the most recent `size`
    /// samples, or `None` until that many samples exist.
    pub fn window_spread(&self, size: usize) -> Option<(f64, f64)> {
        if size == 0 || self.samples.len() < size {
            return None;
        }
        Some(spread(self.samples.iter().rev().take(size)))
    }

    /// `(spread, max)` over every sample of the session, including the ones
    /// already evicted from the window.
    pub fn session_spread(&self) -> Option<(f64, f64)> {
        self.session_range.map(|(min, max)| (max - min, max))
    }

    pub(super) fn push(&mut self, sample: PitchSample) {
        self.total_samples += 1;
        if sample.is_voiced() {
            self.voiced_samples += 1;
        }
        let value = sample.visualization;
        self.session_range = Some(match self.session_range {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
        self.samples.push_back(sample);
        while self.samples.len() > MAX_HISTORY {
            self.samples.pop_front();
        }
    }

    pub(super) fn record_stability(&mut self, stability: f64) {
        if stability > self.max_stability {
            self.max_stability = stability;
        }
    }
}

fn spread<'a>(samples: impl Iterator<Item = &'a PitchSample>) -> (f64, f64) {
    let (min, max) = samples.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
        (min.min(s.visualization), max.max(s.visualization))
    });
    (max - min, max)
}
