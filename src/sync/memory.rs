use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, bail};
use uuid::Uuid;

use super::remote::{RemoteFuture, RemoteStore};
use crate::db::OfflinePerformanceLog;

#[derive(Default)]
struct RemoteState {
    logs: Vec<OfflinePerformanceLog>,
    log_ids: HashSet<Uuid>,
    best_scores: HashMap<String, f64>,
    offline: bool,
    failing_appends: u32,
    failing_best_updates: u32,
    append_attempts: u32,
    best_score_attempts: u32,
}

/// In-process remote store for running without a backend.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<RemoteState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, RemoteState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("remote store state poisoned"))
    }

    fn with_state<T: Default>(&self, f: impl FnOnce(&mut RemoteState) -> T) -> T {
        match self.lock() {
            Ok(mut state) => f(&mut state),
            Err(_) => T::default(),
        }
    }

    /// While offline every write fails.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.offline = offline);
    }

    pub fn fail_next_appends(&self, count: u32) {
        self.with_state(|state| state.failing_appends = count);
    }

    pub fn fail_next_best_updates(&self, count: u32) {
        self.with_state(|state| state.failing_best_updates = count);
    }

    pub fn logs(&self) -> Vec<OfflinePerformanceLog> {
        self.with_state(|state| state.logs.clone())
    }

    pub fn best_score(&self, user_id: &str) -> Option<f64> {
        self.with_state(|state| state.best_scores.get(user_id).copied())
    }

    pub fn append_attempts(&self) -> u32 {
        self.with_state(|state| state.append_attempts)
    }

    pub fn best_score_attempts(&self) -> u32 {
        self.with_state(|state| state.best_score_attempts)
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn append_performance_log<'a>(&'a self, log: &'a OfflinePerformanceLog) -> RemoteFuture<'a> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.append_attempts += 1;
            if state.offline {
                bail!("remote store unreachable");
            }
            if state.failing_appends > 0 {
                state.failing_appends -= 1;
                bail!("injected append failure");
            }
            if state.log_ids.insert(log.id) {
                let mut stored = log.clone();
                stored.synced = true;
                state.logs.push(stored);
            }
            Ok(())
        })
    }

    fn update_best_score<'a>(&'a self, user_id: &'a str, score: f64) -> RemoteFuture<'a> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.best_score_attempts += 1;
            if state.offline {
                bail!("remote store unreachable");
            }
            if state.failing_best_updates > 0 {
                state.failing_best_updates -= 1;
                bail!("injected best score failure");
            }
            let best = state.best_scores.entry(user_id.to_string()).or_insert(score);
            if score > *best {
                *best = score;
            }
            Ok(())
        })
    }
}
