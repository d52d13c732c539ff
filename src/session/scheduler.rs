use std::time::Duration;

use tokio::{sync::oneshot, time};
use tokio_util::sync::CancellationToken;

/// Scheduling port driving the session clock: arm one tick, or cancel it.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, after: Duration) -> ScheduledTick;
}

/// A single pending tick.
pub struct ScheduledTick {
    fired: oneshot::Receiver<()>,
    token: CancellationToken,
}

impl ScheduledTick {
    pub fn new(fired: oneshot::Receiver<()>, token: CancellationToken) -> Self {
        Self { fired, token }
    }

    /// Handle that cancels this tick from elsewhere.
    pub fn canceller(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves to `true` when the tick fires, `false` when it was cancelled.
    pub async fn wait(self) -> bool {
        let ScheduledTick { fired, token } = self;
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            result = fired => result.is_ok(),
        }
    }
}

/// Production scheduler backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, after: Duration) -> ScheduledTick {
        let (fired_tx, fired_rx) = oneshot::channel();
        let token = CancellationToken::new();
        let token_for_task = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token_for_task.cancelled() => {}
                _ = time::sleep(after) => {
                    let _ = fired_tx.send(());
                }
            }
        });

        ScheduledTick::new(fired_rx, token)
    }
}
