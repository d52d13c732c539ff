use tokio::sync::watch;

use crate::error::EngineError;

use super::PitchReading;

/// Source of capture devices. Acquisition is where availability and
/// microphone permission are checked; no samples flow yet.
pub trait AudioInput: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn CaptureDevice>, EngineError>;
}

/// An acquired capture device.
///
/// `begin` starts the continuous sampling loop. The returned receiver always
/// holds the most recent estimate, so consumers never block on a fresh frame.
pub trait CaptureDevice: Send {
    fn begin(&mut self) -> Result<watch::Receiver<PitchReading>, EngineError>;

    /// Stops sampling and releases the hardware. Safe to call more than once.
    fn release(&mut self);
}
