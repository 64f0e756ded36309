use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Where an initial-state snapshot document comes from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Human-readable location, used in logs.
    fn location(&self) -> &str;

    async fn fetch(&self) -> Result<Bytes>;
}
