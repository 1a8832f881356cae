use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::StoreError;
use crate::id::{ObjectId, PlayerId};
use crate::objective::{ObjectiveRecord, PersistOp, ProgressStore};

/// Objective progress in SQLite, one row per active objective
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objective_progress (
                player_id TEXT NOT NULL,
                objective_id TEXT NOT NULL,
                data_json TEXT NOT NULL DEFAULT 'null',
                started_at TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY(player_id, objective_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ObjectiveRecord, StoreError> {
        let player: String = row.try_get("player_id")?;
        let objective: String = row.try_get("objective_id")?;
        let data_json: String = row.try_get("data_json")?;
        let started_at: String = row.try_get("started_at")?;

        Ok(ObjectiveRecord {
            player: PlayerId::new(player),
            objective: objective.parse().map_err(StoreError::Corrupted)?,
            data: serde_json::from_str(&data_json)?,
            started_at: DateTime::parse_from_rfc3339(&started_at)
                .map_err(|e| StoreError::Corrupted(format!("started_at '{}': {}", started_at, e)))?
                .with_timezone(&Utc),
        })
    }
}

const UPSERT: &str = r#"
    INSERT INTO objective_progress (player_id, objective_id, data_json, started_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(player_id, objective_id) DO UPDATE SET
        data_json = excluded.data_json,
        started_at = excluded.started_at,
        updated_at = CURRENT_TIMESTAMP
"#;

const DELETE: &str = "DELETE FROM objective_progress WHERE player_id = ? AND objective_id = ?";

impl ProgressStore for SqliteProgressStore {
    async fn load_all(&self) -> Result<Vec<ObjectiveRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT player_id, objective_id, data_json, started_at FROM objective_progress ORDER BY player_id, objective_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::record_from_row(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable progress row: {}", e),
            }
        }
        Ok(records)
    }

    async fn upsert(&self, record: &ObjectiveRecord) -> Result<(), StoreError> {
        let data_json = serde_json::to_string(&record.data)?;
        sqlx::query(UPSERT)
            .bind(record.player.as_str())
            .bind(record.objective.to_string())
            .bind(data_json)
            .bind(record.started_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, player: &PlayerId, objective: &ObjectId) -> Result<(), StoreError> {
        sqlx::query(DELETE)
            .bind(player.as_str())
            .bind(objective.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whole batch in one transaction
    async fn apply(&self, batch: &[PersistOp]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for op in batch {
            match op {
                PersistOp::Upsert(record) => {
                    let data_json = serde_json::to_string(&record.data)?;
                    sqlx::query(UPSERT)
                        .bind(record.player.as_str())
                        .bind(record.objective.to_string())
                        .bind(data_json)
                        .bind(record.started_at.to_rfc3339())
                        .execute(&mut *tx)
                        .await?;
                }
                PersistOp::Delete { player, objective } => {
                    sqlx::query(DELETE)
                        .bind(player.as_str())
                        .bind(objective.to_string())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_progress_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", temp_dir.path().join("progress.db").display());
        let store = SqliteProgressStore::new(&url).await.unwrap();

        let player = PlayerId::from("alice");
        let objective: ObjectId = "town.wolves".parse().unwrap();
        let started_at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = ObjectiveRecord {
            player: player.clone(),
            objective: objective.clone(),
            data: serde_json::json!({"left": 4}),
            started_at,
        };

        store.upsert(&record).await.unwrap();
        let updated = ObjectiveRecord {
            data: serde_json::json!({"left": 3}),
            ..record.clone()
        };
        store
            .apply(&[PersistOp::Upsert(updated.clone())])
            .await
            .unwrap();
        assert_eq!(store.load_all().await.unwrap(), vec![updated]);

        store.delete(&player, &objective).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
