use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_uuid, to_bool, to_i64, to_u32},
    models::{MarkSynced, OfflinePerformanceLog},
};

const LOG_COLUMNS: &str = "id, user_id, song_id, pitch_accuracy, rhythm_precision, vocal_stability, duration_seconds, timestamp, synced";

fn row_to_log(row: &Row) -> Result<OfflinePerformanceLog> {
    let id: String = row.get("id")?;
    let timestamp: String = row.get("timestamp")?;
    let duration_seconds: i64 = row.get("duration_seconds")?;
    let synced: i64 = row.get("synced")?;

    Ok(OfflinePerformanceLog {
        id: parse_uuid(&id, "id")?,
        user_id: row.get("user_id")?,
        song_id: row.get("song_id")?,
        pitch_accuracy: row.get("pitch_accuracy")?,
        rhythm_precision: row.get("rhythm_precision")?,
        vocal_stability: row.get("vocal_stability")?,
        duration_seconds: to_u32(duration_seconds, "duration_seconds")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        synced: to_bool(synced, "synced")?,
    })
}

impl Database {
    /// Appends a log. The creation sequence is assigned by the store.
    pub async fn insert_performance_log(&self, log: &OfflinePerformanceLog) -> Result<()> {
        let record = log.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO performance_logs (id, user_id, song_id, pitch_accuracy, rhythm_precision, vocal_stability, duration_seconds, timestamp, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.user_id,
                    record.song_id,
                    record.pitch_accuracy,
                    record.rhythm_precision,
                    record.vocal_stability,
                    to_i64(record.duration_seconds),
                    record.timestamp.to_rfc3339(),
                    record.synced,
                ],
            )
            .with_context(|| format!("failed to insert performance log {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn get_performance_log(&self, id: Uuid) -> Result<Option<OfflinePerformanceLog>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM performance_logs WHERE id = ?1"
            ))?;

            let mut rows = stmt.query(params![id.to_string()])?;
            let log = match rows.next()? {
                Some(row) => Some(row_to_log(row)?),
                None => None,
            };
            Ok(log)
        })
        .await
    }

    /// Every log of a user, oldest first.
    pub async fn list_performance_logs(&self, user_id: &str) -> Result<Vec<OfflinePerformanceLog>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM performance_logs WHERE user_id = ?1 ORDER BY seq ASC"
            ))?;

            let mut rows = stmt.query(params![user_id])?;
            let mut logs = Vec::new();
            while let Some(row) = rows.next()? {
                logs.push(row_to_log(row)?);
            }
            Ok(logs)
        })
        .await
    }

    /// Unsynced logs of a user in creation order.
    pub async fn list_unsynced_logs(&self, user_id: &str) -> Result<Vec<OfflinePerformanceLog>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM performance_logs
                 WHERE user_id = ?1 AND synced = 0
                 ORDER BY seq ASC"
            ))?;

            let mut rows = stmt.query(params![user_id])?;
            let mut logs = Vec::new();
            while let Some(row) = rows.next()? {
                logs.push(row_to_log(row)?);
            }
            Ok(logs)
        })
        .await
    }

    /// Users with queued logs, ordered by their oldest queued log.
    pub async fn list_pending_users(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM performance_logs
                 WHERE synced = 0
                 GROUP BY user_id
                 ORDER BY MIN(seq) ASC",
            )?;

            let users = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await
    }

    pub async fn count_unsynced_logs(&self, user_id: &str) -> Result<u32> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM performance_logs WHERE user_id = ?1 AND synced = 0",
                params![user_id],
                |row| row.get(0),
            )?;
            to_u32(count, "unsynced count")
        })
        .await
    }

    /// Flips a single log to synced. The ordering check and the update run
    /// in one transaction on the store thread.
    pub async fn mark_log_synced(&self, id: Uuid, synced_at: DateTime<Utc>) -> Result<MarkSynced> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let target: Option<(i64, String, i64)> = tx
                .query_row(
                    "SELECT seq, user_id, synced FROM performance_logs WHERE id = ?1",
                    params![id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((seq, user_id, synced)) = target else {
                return Ok(MarkSynced::NotFound);
            };
            if to_bool(synced, "synced")? {
                return Ok(MarkSynced::AlreadySynced);
            }

            let earlier_unsynced: i64 = tx.query_row(
                "SELECT COUNT(*) FROM performance_logs
                 WHERE user_id = ?1 AND synced = 0 AND seq < ?2",
                params![user_id, seq],
                |row| row.get(0),
            )?;
            if earlier_unsynced > 0 {
                return Ok(MarkSynced::OutOfOrder);
            }

            tx.execute(
                "UPDATE performance_logs SET synced = 1, synced_at = ?1 WHERE seq = ?2",
                params![synced_at.to_rfc3339(), seq],
            )?;
            tx.commit()?;
            Ok(MarkSynced::Marked)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_for(user: &str, song: &str) -> OfflinePerformanceLog {
        OfflinePerformanceLog {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            song_id: song.to_string(),
            pitch_accuracy: 82.5,
            rhythm_precision: 90.0,
            vocal_stability: 96.0,
            duration_seconds: 15,
            timestamp: Utc::now(),
            synced: false,
        }
    }

    fn open(dir: &TempDir) -> Database {
        Database::new(dir.path().join("vocalis.sqlite3")).unwrap()
    }

    #[tokio::test]
    async fn logs_round_trip_through_the_store() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let log = log_for("alice", "song-1");
        db.insert_performance_log(&log).await.unwrap();

        let stored = db.get_performance_log(log.id).await.unwrap().unwrap();
        assert_eq!(stored.song_id, "song-1");
        assert_eq!(stored.duration_seconds, 15);
        assert!(!stored.synced);
        assert_eq!(stored.timestamp.timestamp(), log.timestamp.timestamp());
    }

    #[tokio::test]
    async fn unsynced_logs_come_back_in_creation_order() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let first = log_for("alice", "a");
        let second = log_for("alice", "b");
        let other = log_for("bob", "c");
        db.insert_performance_log(&first).await.unwrap();
        db.insert_performance_log(&other).await.unwrap();
        db.insert_performance_log(&second).await.unwrap();

        let pending: Vec<_> = db
            .list_unsynced_logs("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|log| log.id)
            .collect();
        assert_eq!(pending, vec![first.id, second.id]);
        assert_eq!(db.list_pending_users().await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn marking_out_of_order_is_refused() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let first = log_for("alice", "a");
        let second = log_for("alice", "b");
        db.insert_performance_log(&first).await.unwrap();
        db.insert_performance_log(&second).await.unwrap();

        let now = Utc::now();
        assert_eq!(db.mark_log_synced(second.id, now).await.unwrap(), MarkSynced::OutOfOrder);
        assert_eq!(db.mark_log_synced(first.id, now).await.unwrap(), MarkSynced::Marked);
        assert_eq!(db.mark_log_synced(first.id, now).await.unwrap(), MarkSynced::AlreadySynced);
        assert_eq!(db.mark_log_synced(second.id, now).await.unwrap(), MarkSynced::Marked);
        assert_eq!(db.count_unsynced_logs("alice").await.unwrap(), 0);
        assert_eq!(
            db.mark_log_synced(Uuid::new_v4(), now).await.unwrap(),
            MarkSynced::NotFound
        );
    }

    #[tokio::test]
    async fn logs_survive_reopening_the_store() {
        let dir = TempDir::new().unwrap();
        let log = log_for("alice", "a");
        {
            let db = open(&dir);
            db.insert_performance_log(&log).await.unwrap();
        }

        let db = open(&dir);
        assert_eq!(db.count_unsynced_logs("alice").await.unwrap(), 1);
    }
}
