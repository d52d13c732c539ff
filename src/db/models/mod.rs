pub mod performance_log;
pub mod profile;

pub use performance_log::{MarkSynced, OfflinePerformanceLog};
pub use profile::UserProfile;
