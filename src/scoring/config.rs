/// Tunables for the scoring engine.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Melodies with more notes than this count as complex.
    pub complex_melody_notes: usize,

    /// Multiplier applied to the mean visualization of complex melodies.
    pub complexity_factor: f64,

    /// Whole-session visualization spread above which the steadiness tip is added.
    pub steadiness_spread: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            complex_melody_notes: 18,
            complexity_factor: 0.95,
            steadiness_spread: 40.0,
        }
    }
}
