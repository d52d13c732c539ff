//! Vocal performance session engine.
//!
//! Samples a live input for pitch, runs a timed session (countdown, recording
//! bound to the track, completion), tracks stability while recording, scores
//! the result and reconciles it with a remote profile store.

pub mod calibration;
pub mod db;
pub mod duel;
pub mod error;
pub mod models;
pub mod pitch;
pub mod scoring;
pub mod session;
pub mod settings;
pub mod sync;
pub mod telemetry;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use log::{info, warn};
use tokio::{sync::watch, task::JoinHandle};

pub use db::Database;
pub use error::EngineError;
pub use models::{SessionSummary, TrackMetadata};
pub use session::{SessionConfig, SessionOrchestrator, SessionState, TokioScheduler};
pub use settings::SettingsStore;
pub use sync::{RemoteStore, SyncReconciler};

use pitch::AudioInput;
use session::Scheduler;

pub const DEFAULT_DATA_DIR: &str = "./vocalis-data";
pub const DATABASE_FILE: &str = "vocalis.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

/// Initializes `env_logger` (honours `RUST_LOG`, defaults to info).
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Data directory from `VOCALIS_DATA_DIR`, or the default.
pub fn data_dir_from_env() -> PathBuf {
    std::env::var_os("VOCALIS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Long-lived state shared by every session of a running application.
pub struct Engine {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub reconciler: SyncReconciler,
    connectivity: watch::Sender<bool>,
}

impl Engine {
    /// Opens (or creates) the store and settings under `data_dir`. Starts
    /// offline.
    pub fn open(data_dir: &Path, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let db = Database::new(data_dir.join(DATABASE_FILE))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let reconciler = SyncReconciler::new(db.clone(), remote);
        let (connectivity, _) = watch::channel(false);

        info!("Engine opened at {}", data_dir.display());

        Ok(Self {
            db,
            settings: Arc::new(settings),
            reconciler,
            connectivity,
        })
    }

    pub fn set_online(&self, online: bool) {
        self.connectivity.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    /// A session orchestrator for the configured user that persists through
    /// this engine's store.
    pub fn orchestrator(
        &self,
        input: Arc<dyn AudioInput>,
        scheduler: Arc<dyn Scheduler>,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(input, scheduler, self.settings.user_id())
            .with_sync(self.reconciler.clone(), self.connectivity())
    }

    /// Flushes anything queued by earlier runs when already online, then
    /// reconciles again on every reconnect.
    pub async fn start_sync(&self) -> JoinHandle<()> {
        if self.is_online() {
            match self.reconciler.reconcile_all().await {
                Ok(outcomes) => {
                    for outcome in outcomes.iter().filter(|o| !o.is_complete()) {
                        warn!(
                            "{} log(s) for {} still queued after startup sync",
                            outcome.remaining, outcome.user_id
                        );
                    }
                }
                Err(err) => warn!("Startup sync failed: {err}"),
            }
        }
        self.reconciler.watch_connectivity(self.connectivity())
    }
}
