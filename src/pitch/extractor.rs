use serde::{Deserialize, Serialize};

/// Lowest frequency of the visualization range, in Hz.
pub const MIN_FREQ: f64 = 80.0;
/// Highest frequency of the visualization range, in Hz.
pub const MAX_FREQ: f64 = 1000.0;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_FFT_SIZE: usize = 2048;
/// Peak magnitude (of a normalised spectrum) below which a frame counts as silence.
pub const DEFAULT_NOISE_FLOOR: f32 = 0.01;

/// Latest estimate published by the sampling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchReading {
    pub frequency_hz: f64,
    /// 0..=100 linear remap of `frequency_hz` over `[MIN_FREQ, MAX_FREQ]`.
    pub visualization: f64,
    /// Magnitude of the winning bin.
    pub magnitude: f32,
}

impl PitchReading {
    pub fn silence() -> Self {
        Self::default()
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Single-peak estimator: the loudest bin wins, no harmonic correction.
///
/// Downstream stability thresholds are tuned to the noise characteristics of
/// exactly this estimator, so it must not be swapped for autocorrelation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchExtractor {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub noise_floor: f32,
}

impl Default for PitchExtractor {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_size: DEFAULT_FFT_SIZE,
            noise_floor: DEFAULT_NOISE_FLOOR,
        }
    }
}

impl PitchExtractor {
    pub fn new(sample_rate: u32, fft_size: usize, noise_floor: f32) -> Self {
        Self {
            sample_rate,
            fft_size,
            noise_floor,
        }
    }

    /// Turns one frame of per-bin magnitudes into a reading.
    pub fn extract(&self, magnitudes: &[f32]) -> PitchReading {
        let mut peak_bin = 0usize;
        let mut peak_magnitude = 0.0f32;

        for (bin, &magnitude) in magnitudes.iter().enumerate() {
            if magnitude > peak_magnitude {
                peak_magnitude = magnitude;
                peak_bin = bin;
            }
        }

        if peak_magnitude < self.noise_floor || self.fft_size == 0 {
            return PitchReading {
                magnitude: peak_magnitude,
                ..PitchReading::silence()
            };
        }

        let frequency_hz = self.bin_to_frequency(peak_bin);
        PitchReading {
            frequency_hz,
            visualization: visualization_for(frequency_hz),
            magnitude: peak_magnitude,
        }
    }

    pub fn bin_to_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / self.fft_size as f64
    }
}

/// Linear remap of a frequency into `0..=100`, clamped outside the vocal range.
pub fn visualization_for(frequency_hz: f64) -> f64 {
    if frequency_hz <= MIN_FREQ {
        return 0.0;
    }
    if frequency_hz >= MAX_FREQ {
        return 100.0;
    }
    (frequency_hz - MIN_FREQ) / (MAX_FREQ - MIN_FREQ) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_peak(bin: usize, magnitude: f32) -> Vec<f32> {
        let mut frame = vec![0.001; DEFAULT_FFT_SIZE / 2];
        frame[bin] = magnitude;
        frame
    }

    #[test]
    fn quiet_frame_reports_silence() {
        let extractor = PitchExtractor::default();
        let reading = extractor.extract(&frame_with_peak(40, 0.005));
        assert_eq!(reading.frequency_hz, 0.0);
        assert_eq!(reading.visualization, 0.0);
        assert!(!reading.is_voiced());
    }

    #[test]
    fn peak_bin_maps_to_frequency() {
        let extractor = PitchExtractor::new(48_000, 1024, 0.01);
        let reading = extractor.extract(&frame_with_peak(10, 0.5));
        assert!((reading.frequency_hz - 468.75).abs() < 1e-9);
        let expected_vis = (468.75 - MIN_FREQ) / (MAX_FREQ - MIN_FREQ) * 100.0;
        assert!((reading.visualization - expected_vis).abs() < 1e-9);
    }

    #[test]
    fn first_of_equal_peaks_wins() {
        let extractor = PitchExtractor::new(1000, 100, 0.01);
        let mut frame = vec![0.0; 50];
        frame[12] = 0.8;
        frame[30] = 0.8;
        let reading = extractor.extract(&frame);
        assert_eq!(reading.frequency_hz, 120.0);
    }

    #[test]
    fn visualization_clamps_outside_range() {
        assert_eq!(visualization_for(40.0), 0.0);
        assert_eq!(visualization_for(MIN_FREQ), 0.0);
        assert_eq!(visualization_for(2_000.0), 100.0);
        assert!((visualization_for(540.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_frame_is_silence() {
        let reading = PitchExtractor::default().extract(&[]);
        assert_eq!(reading, PitchReading::silence());
    }
}
