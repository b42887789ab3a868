use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::db::models::Asset;

#[derive(Clone)]
pub struct AssetRepository {
    pool: SqlitePool,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AssetRepository {
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // each in-memory connection is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        log::info!("Connected to asset database: {}", database_url);
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                local_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_asset(&self, asset: &Asset) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, filename, content_type, local_path, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&asset.id)
        .bind(&asset.filename)
        .bind(&asset.content_type)
        .bind(&asset.local_path)
        .bind(asset.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_asset(&self, id: &str) -> Result<Option<Asset>, RepositoryError> {
        let rec = sqlx::query_as::<_, Asset>(
            r#"
            SELECT id, filename, content_type, local_path, created_at
            FROM assets WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    pub async fn count_assets(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SubsecRound, Utc};

    async fn repository(dir: &tempfile::TempDir) -> AssetRepository {
        let url = format!("sqlite://{}", dir.path().join("app.db").display());
        let repo = AssetRepository::connect(&url).await.unwrap();
        repo.migrate().await.unwrap();
        repo
    }

    fn sample_asset() -> Asset {
        Asset {
            id: Asset::new_id(),
            filename: "t.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            local_path: "/tmp/t.jpg".to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    #[actix_web::test]
    async fn inserted_asset_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        let asset = sample_asset();

        repo.insert_asset(&asset).await.unwrap();
        let fetched = repo.get_asset(&asset.id).await.unwrap().unwrap();

        assert_eq!(fetched, asset);
        assert_eq!(repo.count_assets().await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn unknown_id_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        assert!(repo.get_asset("missing").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn duplicate_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        let asset = sample_asset();

        repo.insert_asset(&asset).await.unwrap();
        assert!(repo.insert_asset(&asset).await.is_err());
        assert_eq!(repo.count_assets().await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir).await;
        repo.migrate().await.unwrap();
    }
}
