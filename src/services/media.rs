use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};

/// Resolves a post's media reference to the bytes to upload.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

pub struct HttpMediaSource {
    client: Client,
}

impl HttpMediaSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| AppError::Publish(format!("media download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Publish(format!(
                "media download failed: HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Publish(format!("media download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
