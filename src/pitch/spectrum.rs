use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Turns fixed-size time-domain frames into normalised magnitude spectra.
///
/// The plan is built once and reused for every frame of the sampling loop.
pub struct Spectrum {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl Spectrum {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            size,
            window: hann_window(size),
            scratch,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Magnitudes of the first `size / 2` bins, scaled so a full-scale sine
    /// lands near 0.5 regardless of frame size.
    ///
    /// Frames of the wrong length yield an empty spectrum, which the extractor
    /// treats as silence.
    pub fn magnitudes(&mut self, frame: &[f32]) -> Vec<f32> {
        if frame.len() != self.size || self.size == 0 {
            return Vec::new();
        }

        let mean = frame.iter().sum::<f32>() / self.size as f32;
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(sample, weight)| Complex {
                re: (sample - mean) * weight,
                im: 0.0,
            })
            .collect();

        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);

        let scale = 2.0 / self.size as f32;
        buffer
            .iter()
            .take(self.size / 2)
            .map(|c| c.norm() * scale)
            .collect()
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let n_minus_1 = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}
