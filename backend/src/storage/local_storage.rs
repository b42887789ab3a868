use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct LocalStorage {
    upload_dir: PathBuf,
    max_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error for {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },
}

impl LocalStorage {
    pub fn new(upload_dir: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Untrusted client filenames never leave the upload directory.
    pub fn sanitize_filename(filename: &str) -> String {
        let safe: String = filename
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                c => c,
            })
            .collect();
        let safe = safe.trim();
        if safe.is_empty() || safe.chars().all(|c| c == '.') {
            "upload".to_string()
        } else {
            safe.to_string()
        }
    }

    pub fn generate_key(asset_id: &str, filename: &str) -> String {
        format!("{}_{}", asset_id, Self::sanitize_filename(filename))
    }

    pub fn validate_size(&self, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > self.max_size {
            return Err(StorageError::FileTooLarge {
                size: data.len(),
                limit: self.max_size,
            });
        }
        Ok(())
    }

    pub async fn save_upload(
        &self,
        data: &[u8],
        asset_id: &str,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        self.validate_size(data)?;

        let path = self.upload_dir.join(Self::generate_key(asset_id, filename));
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| StorageError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(path)
    }

    pub async fn delete_upload(&self, path: &Path) -> Result<(), StorageError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(LocalStorage::sanitize_filename("a/b\\c.jpg"), "a_b_c.jpg");
        assert_eq!(LocalStorage::sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(LocalStorage::sanitize_filename(""), "upload");
        assert_eq!(LocalStorage::sanitize_filename(".."), "upload");
    }

    #[actix_web::test]
    async fn save_upload_writes_bytes_under_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 1024);

        let path = storage.save_upload(b"hello", "abc", "t.jpg").await.unwrap();

        assert_eq!(path, dir.path().join("abc_t.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[actix_web::test]
    async fn same_filename_different_assets_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 1024);

        let a = storage.save_upload(b"one", "a", "t.jpg").await.unwrap();
        let b = storage.save_upload(b"two", "b", "t.jpg").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert_eq!(std::fs::read(&b).unwrap(), b"two");
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 4);

        let err = storage.save_upload(b"too big", "a", "t.jpg").await.unwrap_err();

        assert!(matches!(err, StorageError::FileTooLarge { size: 7, limit: 4 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
