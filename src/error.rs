//! Error types for the session engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The two independent remote writes performed for every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteOperation {
    AppendLog,
    BestScore,
}

impl RemoteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::AppendLog => "performance log insert",
            RemoteOperation::BestScore => "best score update",
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("latency offset {offset_ms}ms leaves no song progress per tick (minimum {minimum_ms}ms)")]
    InvalidLatencyOffset { offset_ms: i64, minimum_ms: i64 },

    #[error("session too short to persist: {samples} samples recorded, {required} required")]
    SessionTooShort { samples: u32, required: u32 },

    #[error("remote {operation} failed: {reason}")]
    RemoteWriteFailed {
        operation: RemoteOperation,
        reason: String,
    },

    /// Internal invariant: a later log must never be marked synced before an
    /// earlier one of the same user.
    #[error("sync order violation: log {log_id} has earlier unsynced logs for user {user_id}")]
    SyncOrderViolation { log_id: Uuid, user_id: String },

    #[error("local store error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("settings error: {0:#}")]
    Settings(anyhow::Error),
}

impl EngineError {
    /// Device and permission failures leave the session in `Idle`; the caller may
    /// simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::DeviceUnavailable(_)
                | EngineError::PermissionDenied
                | EngineError::RemoteWriteFailed { .. }
                | EngineError::Storage(_)
        )
    }
}
