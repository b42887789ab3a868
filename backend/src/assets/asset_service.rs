use chrono::Utc;

use crate::db::asset_repository::{AssetRepository, RepositoryError};
use crate::db::models::Asset;
use crate::request_id::RequestId;
use crate::storage::local_storage::{LocalStorage, StorageError};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct AssetService {
    db_repo: AssetRepository,
    storage: LocalStorage,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Empty file")]
    Empty,
    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for AssetError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileTooLarge { size, limit } => AssetError::TooLarge { size, limit },
            other => AssetError::Storage(other),
        }
    }
}

impl AssetService {
    pub fn new(db_repo: AssetRepository, storage: LocalStorage) -> Self {
        Self { db_repo, storage }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.storage.max_size()
    }

    /// Writes the upload to disk, then records it. Empty uploads persist nothing.
    pub async fn ingest(
        &self,
        request_id: &RequestId,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<Asset, AssetError> {
        if data.is_empty() {
            log::warn!(request_id = request_id.as_str(); "Rejected empty upload: {}", filename);
            return Err(AssetError::Empty);
        }

        let id = Asset::new_id();
        let local_path = self.storage.save_upload(data, &id, filename).await?;

        let asset = Asset {
            id,
            filename: filename.to_string(),
            content_type: content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            local_path: local_path.display().to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.db_repo.insert_asset(&asset).await {
            log::error!(
                request_id = request_id.as_str();
                "Failed to record asset {}, removing {}: {:?}",
                asset.id,
                asset.local_path,
                e
            );
            if let Err(cleanup) = self.storage.delete_upload(&local_path).await {
                log::warn!(request_id = request_id.as_str(); "Orphaned upload left behind: {}", cleanup);
            }
            return Err(e.into());
        }

        log::info!(
            request_id = request_id.as_str(), asset_id = asset.id.as_str();
            "Ingested {} ({} bytes, {})",
            asset.filename,
            data.len(),
            asset.content_type
        );
        Ok(asset)
    }

    pub async fn get_asset(&self, id: &str) -> Result<Option<Asset>, AssetError> {
        Ok(self.db_repo.get_asset(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service(dir: &tempfile::TempDir, max_size: usize) -> AssetService {
        let url = format!("sqlite://{}", dir.path().join("app.db").display());
        let repo = AssetRepository::connect(&url).await.unwrap();
        repo.migrate().await.unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        AssetService::new(repo, LocalStorage::new(uploads, max_size))
    }

    #[actix_web::test]
    async fn ingest_persists_file_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 1024).await;
        let rid = RequestId::new("test");

        let asset = service
            .ingest(&rid, b"bytes", "t.jpg", Some("image/jpeg"))
            .await
            .unwrap();

        assert_eq!(asset.filename, "t.jpg");
        assert_eq!(asset.content_type, "image/jpeg");
        assert_eq!(std::fs::read(&asset.local_path).unwrap(), b"bytes");
        assert_eq!(service.get_asset(&asset.id).await.unwrap(), Some(asset));
    }

    #[actix_web::test]
    async fn missing_content_type_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 1024).await;

        let asset = service
            .ingest(&RequestId::new("test"), b"bytes", "clip.bin", None)
            .await
            .unwrap();

        assert_eq!(asset.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[actix_web::test]
    async fn ids_are_unique_per_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 1024).await;
        let rid = RequestId::new("test");

        let a = service.ingest(&rid, b"x", "t.jpg", None).await.unwrap();
        let b = service.ingest(&rid, b"x", "t.jpg", None).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a.local_path, b.local_path);
    }

    #[actix_web::test]
    async fn empty_upload_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 1024).await;

        let err = service
            .ingest(&RequestId::new("test"), b"", "t.jpg", None)
            .await
            .unwrap_err();

        assert!(matches!(err, AssetError::Empty));
        assert_eq!(service.db_repo.count_assets().await.unwrap(), 0);
        assert_eq!(
            std::fs::read_dir(dir.path().join("uploads")).unwrap().count(),
            0
        );
    }

    #[actix_web::test]
    async fn failed_insert_removes_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("app.db").display());
        // no migration, so the insert fails after the file write
        let repo = AssetRepository::connect(&url).await.unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let service = AssetService::new(repo, LocalStorage::new(&uploads, 1024));

        let err = service
            .ingest(&RequestId::new("test"), b"bytes", "t.jpg", None)
            .await
            .unwrap_err();

        assert!(matches!(err, AssetError::Repository(_)));
        assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn oversized_upload_maps_to_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 2).await;

        let err = service
            .ingest(&RequestId::new("test"), b"abc", "t.jpg", None)
            .await
            .unwrap_err();

        assert!(matches!(err, AssetError::TooLarge { size: 3, limit: 2 }));
        assert_eq!(service.db_repo.count_assets().await.unwrap(), 0);
    }
}
