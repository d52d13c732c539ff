#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use vocalis_lib::error::EngineError;
use vocalis_lib::models::{SessionSummary, TrackMetadata};
use vocalis_lib::pitch::{visualization_for, AudioInput, CaptureDevice, PitchReading};
use vocalis_lib::session::{ScheduledTick, Scheduler};

/// Capture double that publishes a fixed reading until told otherwise.
#[derive(Default)]
pub struct ScriptedInput {
    pub acquired: AtomicUsize,
    pub begun: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_begin: AtomicBool,
    reading: Mutex<PitchReading>,
    feeds: Mutex<Vec<watch::Sender<PitchReading>>>,
}

impl ScriptedInput {
    pub fn singing(frequency_hz: f64, visualization: f64) -> Arc<Self> {
        let input = Self::default();
        *input.reading.lock().unwrap() = PitchReading {
            frequency_hz,
            visualization,
            magnitude: 0.5,
        };
        Arc::new(input)
    }

    pub fn at(frequency_hz: f64) -> Arc<Self> {
        Self::singing(frequency_hz, visualization_for(frequency_hz))
    }

    /// Changes what every open feed reports from now on.
    pub fn sing(&self, reading: PitchReading) {
        *self.reading.lock().unwrap() = reading;
        for feed in self.feeds.lock().unwrap().iter() {
            feed.send_replace(reading);
        }
    }
}

struct ScriptedDevice(Arc<ScriptedInput>);

pub struct SharedInput(pub Arc<ScriptedInput>);

impl AudioInput for SharedInput {
    fn acquire(&self) -> Result<Box<dyn CaptureDevice>, EngineError> {
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDevice(Arc::clone(&self.0))))
    }
}

impl CaptureDevice for ScriptedDevice {
    fn begin(&mut self) -> Result<watch::Receiver<PitchReading>, EngineError> {
        if self.0.fail_begin.load(Ordering::SeqCst) {
            return Err(EngineError::DeviceUnavailable("input disappeared".into()));
        }
        self.0.begun.fetch_add(1, Ordering::SeqCst);
        let reading = *self.0.reading.lock().unwrap();
        let (tx, rx) = watch::channel(reading);
        self.0.feeds.lock().unwrap().push(tx);
        Ok(rx)
    }

    fn release(&mut self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn input(scripted: &Arc<ScriptedInput>) -> Arc<dyn AudioInput> {
    Arc::new(SharedInput(Arc::clone(scripted)))
}

pub fn track(id: &str, expected_duration_seconds: f64) -> TrackMetadata {
    TrackMetadata {
        id: id.into(),
        expected_duration_seconds,
        ..TrackMetadata::default()
    }
}

pub fn summary(song_id: &str, accuracy_score: f64, sample_count: u32) -> SessionSummary {
    SessionSummary {
        song_id: song_id.into(),
        duration_seconds: 30,
        accuracy_score,
        max_stability: 96.0,
        rhythm_precision: 100.0,
        sample_count,
        improvement_tips: Vec::new(),
    }
}

/// Fires every tick as soon as it is armed, so a whole session runs without
/// waiting on the clock.
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, _after: Duration) -> ScheduledTick {
        let (fired_tx, fired_rx) = oneshot::channel();
        let _ = fired_tx.send(());
        ScheduledTick::new(fired_rx, CancellationToken::new())
    }
}
