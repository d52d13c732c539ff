use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use super::remote::RemoteStore;
use crate::{
    db::{Database, MarkSynced, OfflinePerformanceLog},
    error::{EngineError, RemoteOperation},
    models::SessionSummary,
    session::MIN_SESSION_DURATION_POINTS,
};

/// One failed remote write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFailure {
    pub operation: RemoteOperation,
    pub reason: String,
}

impl From<RemoteFailure> for EngineError {
    fn from(failure: RemoteFailure) -> Self {
        EngineError::RemoteWriteFailed {
            operation: failure.operation,
            reason: failure.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PersistOutcome {
    /// Delivered to the remote store.
    Synced { log_id: Uuid },
    /// Stored locally while offline.
    Queued { log_id: Uuid },
    /// Online, but a remote write failed; the log stays queued.
    PendingRetry {
        log_id: Uuid,
        failures: Vec<RemoteFailure>,
    },
}

impl PersistOutcome {
    pub fn log_id(&self) -> Uuid {
        match self {
            PersistOutcome::Synced { log_id }
            | PersistOutcome::Queued { log_id }
            | PersistOutcome::PendingRetry { log_id, .. } => *log_id,
        }
    }
}

/// Result of one reconciliation pass for a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub user_id: String,
    pub synced: u32,
    pub remaining: u32,
    pub failures: Vec<RemoteFailure>,
    /// The log the pass stopped at, if a remote write failed.
    pub stopped_at: Option<Uuid>,
}

impl SyncOutcome {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Moves staged performance logs to the remote store, per user, in creation
/// order.
#[derive(Clone)]
pub struct SyncReconciler {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    user_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SyncReconciler {
    pub fn new(db: Database, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            db,
            remote,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.user_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops the user's lock entry once no other task holds or waits on it.
    fn prune_user_lock(&self, user_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.user_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // One reference in the map plus ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        match self.user_locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Stages a completed session and, when online, delivers it together with
    /// anything still queued for the same user.
    pub async fn persist(
        &self,
        user_id: &str,
        summary: &SessionSummary,
        online: bool,
    ) -> Result<PersistOutcome, EngineError> {
        if summary.sample_count < MIN_SESSION_DURATION_POINTS {
            return Err(EngineError::SessionTooShort {
                samples: summary.sample_count,
                required: MIN_SESSION_DURATION_POINTS,
            });
        }

        let lock = self.user_lock(user_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.persist_locked(user_id, summary, online).await
        };
        self.prune_user_lock(user_id, lock);
        outcome
    }

    async fn persist_locked(
        &self,
        user_id: &str,
        summary: &SessionSummary,
        online: bool,
    ) -> Result<PersistOutcome, EngineError> {
        let now = Utc::now();
        let log = OfflinePerformanceLog::from_summary(user_id, summary, now);
        self.db.insert_performance_log(&log).await?;
        let local_best = self
            .db
            .raise_local_best_score(user_id, summary.accuracy_score, now)
            .await?;

        if !online {
            info!(
                "Queued performance log {} for {} (local best {:.1})",
                log.id, user_id, local_best
            );
            return Ok(PersistOutcome::Queued { log_id: log.id });
        }

        let outcome = self.reconcile_locked(user_id).await?;
        let delivered = self
            .db
            .get_performance_log(log.id)
            .await?
            .map(|stored| stored.synced)
            .unwrap_or(false);

        if delivered {
            Ok(PersistOutcome::Synced { log_id: log.id })
        } else {
            warn!(
                "Performance log {} for {} left queued after {} remote failure(s)",
                log.id,
                user_id,
                outcome.failures.len()
            );
            Ok(PersistOutcome::PendingRetry {
                log_id: log.id,
                failures: outcome.failures,
            })
        }
    }

    pub async fn reconcile(&self, user_id: &str) -> Result<SyncOutcome, EngineError> {
        let lock = self.user_lock(user_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.reconcile_locked(user_id).await
        };
        self.prune_user_lock(user_id, lock);
        outcome
    }

    /// Reconciles every user with queued logs. A failing user does not hold
    /// back the others.
    pub async fn reconcile_all(&self) -> Result<Vec<SyncOutcome>, EngineError> {
        let users = self.db.list_pending_users().await?;
        let mut outcomes = Vec::with_capacity(users.len());
        for user_id in users {
            outcomes.push(self.reconcile(&user_id).await?);
        }
        Ok(outcomes)
    }

    /// Runs `reconcile_all` on every offline to online transition.
    pub fn watch_connectivity(&self, mut connectivity: watch::Receiver<bool>) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            let mut online = *connectivity.borrow_and_update();
            while connectivity.changed().await.is_ok() {
                let now_online = *connectivity.borrow_and_update();
                if now_online && !online {
                    match reconciler.reconcile_all().await {
                        Ok(outcomes) => {
                            let synced: u32 = outcomes.iter().map(|o| o.synced).sum();
                            let remaining: u32 = outcomes.iter().map(|o| o.remaining).sum();
                            info!("Reconnected: synced {synced} log(s), {remaining} still queued");
                        }
                        Err(err) => error!("Reconciliation after reconnect failed: {err}"),
                    }
                }
                online = now_online;
            }
        })
    }

    async fn reconcile_locked(&self, user_id: &str) -> Result<SyncOutcome, EngineError> {
        let pending = self.db.list_unsynced_logs(user_id).await?;
        let mut synced = 0u32;
        let mut failures = Vec::new();
        let mut stopped_at = None;

        for log in pending {
            let log_failures = self.push(&log).await;
            if !log_failures.is_empty() {
                for failure in &log_failures {
                    warn!(
                        "Remote {} failed for log {}: {}",
                        failure.operation, log.id, failure.reason
                    );
                }
                failures = log_failures;
                stopped_at = Some(log.id);
                break;
            }

            match self.db.mark_log_synced(log.id, Utc::now()).await? {
                MarkSynced::Marked => synced += 1,
                MarkSynced::AlreadySynced => {}
                MarkSynced::OutOfOrder => {
                    return Err(EngineError::SyncOrderViolation {
                        log_id: log.id,
                        user_id: user_id.to_string(),
                    });
                }
                MarkSynced::NotFound => {
                    return Err(EngineError::Storage(anyhow!(
                        "performance log {} disappeared during sync",
                        log.id
                    )));
                }
            }
        }

        let remaining = self.db.count_unsynced_logs(user_id).await?;
        Ok(SyncOutcome {
            user_id: user_id.to_string(),
            synced,
            remaining,
            failures,
            stopped_at,
        })
    }

    /// Both writes are attempted independently.
    async fn push(&self, log: &OfflinePerformanceLog) -> Vec<RemoteFailure> {
        let mut failures = Vec::new();

        if let Err(err) = self.remote.append_performance_log(log).await {
            failures.push(RemoteFailure {
                operation: RemoteOperation::AppendLog,
                reason: format!("{err:#}"),
            });
        }

        if let Err(err) = self
            .remote
            .update_best_score(&log.user_id, log.pitch_accuracy)
            .await
        {
            failures.push(RemoteFailure {
                operation: RemoteOperation::BestScore,
                reason: format!("{err:#}"),
            });
        }

        failures
    }
}
