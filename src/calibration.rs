//! Audio pipeline latency measurement.
//!
//! The user is cued and claps (or sings) once; the time until the first
//! voiced reading arrives is the round trip through the OS audio stack.
//! Sessions add it to every recording tick.

use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};

use crate::error::EngineError;
use crate::pitch::AudioInput;
use crate::settings::SettingsStore;

/// Pause after the measurement before the result is stored.
pub const CALIBRATION_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub latency_offset_ms: i64,
    /// False when no onset was heard and the previous offset was kept.
    pub measured: bool,
}

pub async fn calibrate_latency(
    input: &dyn AudioInput,
    settings: &SettingsStore,
    timeout: Duration,
) -> Result<CalibrationResult, EngineError> {
    let mut device = input.acquire()?;
    let mut feed = match device.begin() {
        Ok(feed) => feed,
        Err(err) => {
            device.release();
            return Err(err);
        }
    };

    let cue = Instant::now();
    let onset = time::timeout(timeout, async {
        loop {
            if feed.borrow_and_update().is_voiced() {
                return true;
            }
            if feed.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false);
    let measured_after = cue.elapsed();
    device.release();

    time::sleep(CALIBRATION_SETTLE).await;

    if !onset {
        let kept = settings.latency_offset_ms();
        warn!("No onset heard within {}ms; keeping latency offset {kept}ms", timeout.as_millis());
        return Ok(CalibrationResult {
            latency_offset_ms: kept,
            measured: false,
        });
    }

    let latency_offset_ms = i64::try_from(measured_after.as_millis()).unwrap_or(i64::MAX);
    settings
        .update_latency(latency_offset_ms, Utc::now())
        .map_err(EngineError::Settings)?;
    info!("Latency calibrated at {latency_offset_ms}ms");

    Ok(CalibrationResult {
        latency_offset_ms,
        measured: true,
    })
}
