use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locally cached best score for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub best_score: f64,
    pub updated_at: DateTime<Utc>,
}
