mod machine;
mod orchestrator;
mod scheduler;
mod state;

pub use machine::{SessionMachine, Transition};
pub use orchestrator::{SessionNotice, SessionOrchestrator, SessionSnapshot};
pub use scheduler::{ScheduledTick, Scheduler, TokioScheduler};
pub use state::{
    SessionConfig, SessionEvent, SessionState, COUNTDOWN_START, COUNTDOWN_TICK,
    MIN_LATENCY_OFFSET_MS, MIN_SESSION_DURATION_POINTS, RECORDING_TICK, RECORDING_TICK_SECONDS,
};
