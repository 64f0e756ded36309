use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, warn};

use super::traits::SnapshotSource;

pub struct HttpSnapshot {
    client: Client,
    url: String,
}

impl HttpSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshot {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Bytes> {
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        debug!("snapshot fetch status={} url={}", status.as_u16(), self.url);
        if !status.is_success() {
            warn!("snapshot fetch failed status={} url={}", status.as_u16(), self.url);
            return Err(anyhow!("snapshot fetch failed: HTTP {}", status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        Ok(bytes)
    }
}
