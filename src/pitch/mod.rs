pub mod extractor;
pub mod input;
#[cfg(feature = "microphone")]
pub mod microphone;
pub mod spectrum;

pub use extractor::{
    visualization_for, PitchExtractor, PitchReading, DEFAULT_FFT_SIZE, DEFAULT_NOISE_FLOOR,
    DEFAULT_SAMPLE_RATE, MAX_FREQ, MIN_FREQ,
};
pub use input::{AudioInput, CaptureDevice};
#[cfg(feature = "microphone")]
pub use microphone::MicrophoneInput;
pub use spectrum::Spectrum;
