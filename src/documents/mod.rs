use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, Result};

pub mod gift_card;
pub mod invoice;
pub mod pdf;

pub use gift_card::render_gift_card;
pub use invoice::{render_invoice, InvoiceLine};

/// Generated documents on local disk. Paths stored in the database are
/// relative to `root` so the directory can move.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn write(&self, relative: &str, bytes: &[u8]) -> Result<String> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Cannot write {}: {}", path.display(), e)))?;

        tracing::debug!("Wrote document {}", path.display());
        Ok(relative.to_string())
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::Internal(format!("Cannot read {}: {}", path.display(), e)))
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(AppError::BadRequest(format!("Invalid document path: {}", relative)));
        }
        Ok(self.root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = std::env::temp_dir().join(format!("lerhuset-docs-{}", uuid::Uuid::new_v4()));
        let store = DocumentStore::new(&dir);

        let stored = store.write("invoices/faktura-1001.pdf", b"%PDF").await.unwrap();
        assert_eq!(stored, "invoices/faktura-1001.pdf");
        assert_eq!(store.read(&stored).await.unwrap(), b"%PDF");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let store = DocumentStore::new("/tmp/lerhuset");
        assert!(store.read("../etc/passwd").await.is_err());
        assert!(store.write("/abs.pdf", b"x").await.is_err());
    }
}
