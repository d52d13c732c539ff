use std::{future::Future, pin::Pin};

use crate::db::OfflinePerformanceLog;

pub type RemoteFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// The remote profile store. Both writes must be idempotent: appending a log
/// whose id is already present succeeds without duplicating it, and the best
/// score is only ever raised.
pub trait RemoteStore: Send + Sync {
    fn append_performance_log<'a>(&'a self, log: &'a OfflinePerformanceLog) -> RemoteFuture<'a>;

    fn update_best_score<'a>(&'a self, user_id: &'a str, score: f64) -> RemoteFuture<'a>;
}
