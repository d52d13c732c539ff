use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
};

use crate::pitch::DEFAULT_NOISE_FLOOR;

pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub user_id: String,
    /// Measured audio pipeline delay, applied to every recording tick.
    pub latency_offset_ms: i64,
    pub calibrated_at: Option<DateTime<Utc>>,
    pub noise_floor: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID.into(),
            latency_offset_ms: 0,
            calibrated_at: None,
            noise_floor: DEFAULT_NOISE_FLOOR,
        }
    }
}

/// Engine settings persisted as JSON. Unreadable files fall back to defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self) -> EngineSettings {
        self.read().clone()
    }

    pub fn user_id(&self) -> String {
        self.read().user_id.clone()
    }

    pub fn latency_offset_ms(&self) -> i64 {
        self.read().latency_offset_ms
    }

    pub fn noise_floor(&self) -> f32 {
        self.read().noise_floor
    }

    pub fn update_latency(&self, latency_offset_ms: i64, calibrated_at: DateTime<Utc>) -> Result<()> {
        self.update(|settings| {
            settings.latency_offset_ms = latency_offset_ms;
            settings.calibrated_at = Some(calibrated_at);
        })
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) -> Result<()> {
        let user_id = user_id.into();
        self.update(|settings| settings.user_id = user_id)
    }

    fn update(&self, apply: impl FnOnce(&mut EngineSettings)) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: EngineSettings = serde_json::from_str(&contents)?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }
}
