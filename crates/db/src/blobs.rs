use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use claimdesk_core::lifecycle::{ReceiptBlobStore, StoreError};

/// Receipt blobs on local disk, one file per reference. References are
/// opaque to callers and always resolve inside the storage root.
pub struct FsReceiptStore {
    root: PathBuf,
    max_size_bytes: u64,
}

impl FsReceiptStore {
    pub fn new(root: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        Self { root: root.into(), max_size_bytes }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(reference);
        let traversal = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if traversal || reference.is_empty() {
            return Err(StoreError::Unavailable(format!(
                "invalid receipt reference `{reference}`"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "receipt".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ReceiptBlobStore for FsReceiptStore {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, StoreError> {
        if bytes.len() as u64 > self.max_size_bytes {
            return Err(StoreError::Unavailable(format!(
                "receipt exceeds maximum size of {} bytes",
                self.max_size_bytes
            )));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;

        let reference = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));
        let path = self.resolve(&reference)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), StoreError> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // A missing blob is already in the desired state.
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::Unavailable(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use claimdesk_core::lifecycle::ReceiptBlobStore;
    use tempfile::TempDir;

    use super::FsReceiptStore;

    #[tokio::test]
    async fn put_then_delete_round_trips_a_blob() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsReceiptStore::new(dir.path(), 1024);

        let reference = store.put(b"pdf bytes".to_vec(), "taxi receipt.pdf").await.expect("put");
        let path = dir.path().join(&reference);
        assert!(path.exists());
        assert!(reference.ends_with("taxi_receipt.pdf"));

        store.delete(&reference).await.expect("delete");
        assert!(!path.exists());

        // idempotent
        store.delete(&reference).await.expect("repeat delete");
    }

    #[tokio::test]
    async fn put_enforces_the_size_limit() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsReceiptStore::new(dir.path(), 4);

        assert!(store.put(vec![0u8; 16], "big.pdf").await.is_err());
    }

    #[tokio::test]
    async fn delete_rejects_traversal_references() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsReceiptStore::new(dir.path(), 1024);

        assert!(store.delete("../outside.pdf").await.is_err());
        assert!(store.delete("").await.is_err());
    }
}
