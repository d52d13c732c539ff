mod aggregator;
mod history;
mod types;

pub use aggregator::{classify, stability_percent, TelemetryAggregator};
pub use history::PitchHistory;
pub use types::{IngestOutcome, PitchSample, StabilityStatus, TelemetryEvent};

pub const MAX_HISTORY: usize = 50;
pub const STABILITY_WINDOW: usize = 10;
pub const STABILITY_THRESHOLD: f64 = 5.0;
pub const DEVIATION_THRESHOLD: f64 = 10.0;
pub const STEADY_PITCH_MIN_SAMPLES: u64 = 30;
pub const STEADY_PITCH_ACHIEVEMENT: &str = "steady-pitch";
