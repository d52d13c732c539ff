//! Live capture from the default input device.
//!
//! cpal streams are not `Send` on every platform, so the stream lives on a
//! dedicated thread for its whole life. The thread accumulates fixed-size
//! frames from the device callback, turns each one into a spectrum and
//! publishes the extractor's reading on a watch channel.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig, SupportedStreamConfigRange};
use tokio::sync::watch;

use crate::error::EngineError;
use crate::{log_error, log_info, log_warn};

use super::{AudioInput, CaptureDevice, PitchExtractor, PitchReading, Spectrum};

const ENABLE_LOGS: bool = true;

const FRAME_QUEUE_DEPTH: usize = 8;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct MicrophoneInput {
    extractor: PitchExtractor,
}

impl MicrophoneInput {
    pub fn new(extractor: PitchExtractor) -> Self {
        Self { extractor }
    }
}

impl AudioInput for MicrophoneInput {
    fn acquire(&self) -> Result<Box<dyn CaptureDevice>, EngineError> {
        let (device, config, format) = open_default_input(self.extractor.sample_rate)?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());
        log_info!(
            "Acquired input device '{}' ({} Hz, {} channel(s), {:?})",
            name,
            config.sample_rate.0,
            config.channels,
            format
        );

        let mut extractor = self.extractor;
        extractor.sample_rate = config.sample_rate.0;

        Ok(Box::new(MicrophoneDevice {
            extractor,
            worker: None,
        }))
    }
}

struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct MicrophoneDevice {
    extractor: PitchExtractor,
    worker: Option<CaptureWorker>,
}

impl CaptureDevice for MicrophoneDevice {
    fn begin(&mut self) -> Result<watch::Receiver<PitchReading>, EngineError> {
        if self.worker.is_some() {
            self.release();
        }

        let (reading_tx, reading_rx) = watch::channel(PitchReading::silence());
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), EngineError>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let extractor = self.extractor;

        let handle = thread::Builder::new()
            .name("vocalis-capture".into())
            .spawn(move || capture_thread(extractor, reading_tx, ready_tx, stop_for_thread))
            .map_err(|err| EngineError::DeviceUnavailable(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop, handle });
                Ok(reading_rx)
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::DeviceUnavailable(
                    "capture thread exited before signaling readiness".into(),
                ))
            }
        }
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::SeqCst);
            if worker.handle.join().is_err() {
                log_error!("Capture thread panicked during shutdown");
            }
            log_info!("Input device released");
        }
    }
}

impl Drop for MicrophoneDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn capture_thread(
    extractor: PitchExtractor,
    reading_tx: watch::Sender<PitchReading>,
    ready_tx: mpsc::Sender<Result<(), EngineError>>,
    stop: Arc<AtomicBool>,
) {
    let (device, config, format) = match open_default_input(extractor.sample_rate) {
        Ok(opened) => opened,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    let (frame_tx, frame_rx) = mpsc::sync_channel::<Vec<f32>>(FRAME_QUEUE_DEPTH);
    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, extractor.fft_size, frame_tx, |s| s),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, extractor.fft_size, frame_tx, i16_to_f32),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, extractor.fft_size, frame_tx, u16_to_f32),
        other => Err(EngineError::DeviceUnavailable(format!(
            "unsupported sample format {other:?}"
        ))),
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(classify_device_error(err.to_string())));
        return;
    }

    if ready_tx.send(Ok(())).is_err() {
        log_warn!("Capture requester dropped before readiness; stopping");
        return;
    }

    let mut spectrum = Spectrum::new(extractor.fft_size);
    while !stop.load(Ordering::SeqCst) {
        match frame_rx.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(frame) => {
                let magnitudes = spectrum.magnitudes(&frame);
                reading_tx.send_replace(extractor.extract(&magnitudes));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    log_info!("Capture thread shutting down");
}

/// Chunks the first channel of `T` samples into f32 frames of `fft_size`.
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    fft_size: usize,
    frame_tx: mpsc::SyncSender<Vec<f32>>,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream, EngineError>
where
    T: SizedSample + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let mut pending: Vec<f32> = Vec::with_capacity(fft_size * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                pending.extend(data.iter().step_by(channels).map(|s| convert(*s)));
                while pending.len() >= fft_size {
                    let frame: Vec<f32> = pending.drain(..fft_size).collect();
                    // A full queue means the analysis side is behind; dropping keeps latency bounded.
                    let _ = frame_tx.try_send(frame);
                }
            },
            |err| log::error!("Input stream error: {err}"),
            None,
        )
        .map_err(|err| classify_device_error(err.to_string()))
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

fn u16_to_f32(sample: u16) -> f32 {
    (f32::from(sample) - 32768.0) / 32768.0
}

fn open_default_input(
    target_rate: u32,
) -> Result<(cpal::Device, StreamConfig, SampleFormat), EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| EngineError::DeviceUnavailable("no input device available".into()))?;

    let configs = device
        .supported_input_configs()
        .map_err(|err| classify_device_error(err.to_string()))?
        .collect::<Vec<_>>();

    let range = find_supported_config(configs, target_rate).ok_or_else(|| {
        EngineError::DeviceUnavailable("no f32, i16 or u16 input format supported".into())
    })?;

    let format = range.sample_format();
    let rate = target_rate.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    let config: StreamConfig = range.with_sample_rate(cpal::SampleRate(rate)).into();
    Ok((device, config, format))
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Prefers f32, then mono, then the range closest to the target rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (rank, c)))
        .min_by_key(|(rank, c)| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range = c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_penalty = if in_range { 0 } else { min_diff.min(max_diff) };
            (*rank, c.channels() != 1, rate_penalty)
        })
        .map(|(_, c)| c)
}

/// Backends only report permission problems through their messages.
fn classify_device_error(message: String) -> EngineError {
    let lowered = message.to_lowercase();
    if lowered.contains("permission")
        || lowered.contains("denied")
        || lowered.contains("not authorized")
    {
        EngineError::PermissionDenied
    } else {
        EngineError::DeviceUnavailable(message)
    }
}
