use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{connection::Database, helpers::parse_datetime, models::UserProfile};

impl Database {
    /// Raises the cached best score to `score` if it is higher and returns the
    /// resulting best.
    pub async fn raise_local_best_score(
        &self,
        user_id: &str,
        score: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<f64> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO user_profiles (user_id, best_score, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     best_score = MAX(best_score, excluded.best_score),
                     updated_at = CASE WHEN excluded.best_score > best_score
                                       THEN excluded.updated_at
                                       ELSE updated_at END",
                params![user_id, score, updated_at.to_rfc3339()],
            )?;

            let best: f64 = conn.query_row(
                "SELECT best_score FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(best)
        })
        .await
    }

    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let row: Option<(String, f64, String)> = conn
                .query_row(
                    "SELECT user_id, best_score, updated_at FROM user_profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            match row {
                Some((user_id, best_score, updated_at)) => Ok(Some(UserProfile {
                    user_id,
                    best_score,
                    updated_at: parse_datetime(&updated_at, "updated_at")?,
                })),
                None => Ok(None),
            }
        })
        .await
    }
}
