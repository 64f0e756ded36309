use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

use super::traits::SnapshotSource;

pub struct FileSnapshot {
    path: PathBuf,
    location: String,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshot {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> Result<Bytes> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("read snapshot {}", self.location))?;
        Ok(Bytes::from(data))
    }
}
