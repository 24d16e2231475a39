//! SQLite-backed vector store.
//!
//! Namespaces and their vectors live in two tables; search is a brute-force scan
//! over one namespace scored with its metric.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{DistanceMetric, NamespaceInfo, ScoredRecord, VectorRecord, VectorStore};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.vector_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS namespaces (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectors (
                namespace TEXT NOT NULL REFERENCES namespaces(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                PRIMARY KEY (namespace, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_namespace(row: &sqlx::sqlite::SqliteRow) -> Result<NamespaceInfo, ApiError> {
        let metric: String = row.get("metric");
        let metric = DistanceMetric::parse(&metric)
            .ok_or_else(|| ApiError::Internal(format!("Unknown metric stored: {}", metric)))?;
        let dimension: i64 = row.get("dimension");
        Ok(NamespaceInfo {
            name: row.get("name"),
            dimension: dimension as usize,
            metric,
            created_at: row.get("created_at"),
        })
    }

    async fn require_namespace(&self, name: &str) -> Result<NamespaceInfo, ApiError> {
        self.namespace_info(name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Namespace not found: {}", name)))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn namespace_info(&self, name: &str) -> Result<Option<NamespaceInfo>, ApiError> {
        let row = sqlx::query(
            "SELECT name, dimension, metric, created_at FROM namespaces WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.as_ref().map(Self::row_to_namespace).transpose()
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT name, dimension, metric, created_at FROM namespaces ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(Self::row_to_namespace).collect()
    }

    async fn create_namespace(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), ApiError> {
        if dimension == 0 {
            return Err(ApiError::BadRequest(
                "Namespace dimension must be positive".to_string(),
            ));
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO namespaces (name, dimension, metric) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(dimension as i64)
        .bind(metric.as_str())
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::BadRequest(format!(
                "Namespace already exists: {}",
                name
            )));
        }
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize, ApiError> {
        let info = self.require_namespace(namespace).await?;
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != info.dimension) {
            return Err(ApiError::BadRequest(format!(
                "Record {} has dimension {}, namespace {} expects {}",
                bad.id,
                bad.embedding.len(),
                namespace,
                info.dimension
            )));
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for record in &records {
            let metadata = serde_json::to_string(&record.metadata).map_err(ApiError::internal)?;
            sqlx::query(
                "INSERT OR REPLACE INTO vectors (namespace, id, text, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(namespace)
            .bind(&record.id)
            .bind(&record.text)
            .bind(&metadata)
            .bind(Self::serialize_embedding(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;

        Ok(records.len())
    }

    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, ApiError> {
        let info = self.require_namespace(namespace).await?;
        if query.len() != info.dimension {
            return Err(ApiError::BadRequest(format!(
                "Query has dimension {}, namespace {} expects {}",
                query.len(),
                namespace,
                info.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, text, metadata, embedding FROM vectors WHERE namespace = ?1",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let bytes: Vec<u8> = row.get("embedding");
            let embedding = Self::deserialize_embedding(&bytes);
            let score = info.metric.score(query, &embedding)?;
            let metadata: String = row.get("metadata");
            let metadata: BTreeMap<String, String> =
                serde_json::from_str(&metadata).map_err(ApiError::internal)?;
            scored.push(ScoredRecord {
                id: row.get("id"),
                text: row.get("text"),
                metadata,
                score,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, namespace: &str) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE namespace = ?1")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }

    async fn drop_namespace(&self, name: &str) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM vectors WHERE namespace = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        let result = sqlx::query("DELETE FROM namespaces WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    async fn promote_namespace(&self, staging: &str, target: &str) -> Result<(), ApiError> {
        self.require_namespace(staging).await?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM vectors WHERE namespace = ?1")
            .bind(target)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM namespaces WHERE name = ?1")
            .bind(target)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query(
            "INSERT INTO namespaces (name, dimension, metric)
             SELECT ?1, dimension, metric FROM namespaces WHERE name = ?2",
        )
        .bind(target)
        .bind(staging)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;
        sqlx::query("UPDATE vectors SET namespace = ?1 WHERE namespace = ?2")
            .bind(target)
            .bind(staging)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM namespaces WHERE name = ?1")
            .bind(staging)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;

        tracing::debug!(staging = %staging, target = %target, "Promoted namespace");
        Ok(())
    }
}
