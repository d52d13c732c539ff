pub mod performance_logs;
pub mod profiles;
