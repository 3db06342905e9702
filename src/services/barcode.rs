//! Pre-rendered barcode images on the local filesystem

use std::path::PathBuf;

use crate::{
    config::BarcodeConfig,
    error::{AppError, AppResult},
};

/// What a barcode identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeSubject {
    Book(i32),
    User(i32),
}

impl BarcodeSubject {
    fn file_name(&self) -> String {
        match self {
            BarcodeSubject::Book(id) => format!("book_{}.png", id),
            BarcodeSubject::User(id) => format!("user_{}.png", id),
        }
    }
}

#[derive(Clone)]
pub struct BarcodeStore {
    dir: PathBuf,
}

impl BarcodeStore {
    pub fn new(config: &BarcodeConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.image_dir),
        }
    }

    /// Path of the image for `subject`, if one has been rendered
    pub async fn resolve(&self, subject: BarcodeSubject) -> AppResult<PathBuf> {
        let path = self.dir.join(subject.file_name());
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => {
                tracing::debug!("No barcode image at {}", path.display());
                Err(AppError::Barcode(format!("No barcode for {:?}", subject)))
            }
        }
    }

    /// PNG bytes of the image for `subject`
    pub async fn read(&self, subject: BarcodeSubject) -> AppResult<Vec<u8>> {
        let path = self.resolve(subject).await?;
        tokio::fs::read(&path).await.map_err(|e| {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            AppError::Barcode(format!("Cannot read barcode for {:?}", subject))
        })
    }
}
