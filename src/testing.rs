//! In-process stand-ins for the external services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ai::GenerationClient;
use crate::error::{AppError, Result};
use crate::models::PostMetrics;
use crate::services::{MediaSource, PageScraper, PublishingService};

/// Replies with queued responses in order; errors once the queue is empty.
#[derive(Default)]
pub struct FakeGenerator {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            prompts: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AppError::Generation(message)),
            None => Err(AppError::Generation("no scripted reply left".to_string())),
        }
    }

    fn model_version(&self) -> &str {
        "fake-model"
    }
}

/// Records every post it is asked to create.
#[derive(Default)]
pub struct FakePlatform {
    sent: Mutex<Vec<(String, Vec<String>)>>,
    uploads: AtomicUsize,
    delay: Option<Duration>,
    error: Option<String>,
    metrics: PostMetrics,
}

impl FakePlatform {
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn with_metrics(metrics: PostMetrics) -> Self {
        Self {
            metrics,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Vec<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishingService for FakePlatform {
    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.error {
            return Err(AppError::Publish(message.clone()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((text.to_string(), media_ids.to_vec()));
        Ok(format!("x-{}", sent.len()))
    }

    async fn upload_media(&self, _bytes: Vec<u8>) -> Result<String> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("media-{n}"))
    }

    async fn get_metrics(&self, _external_id: &str) -> Result<PostMetrics> {
        Ok(self.metrics)
    }
}

pub struct FakeMedia(std::result::Result<Vec<u8>, String>);

impl FakeMedia {
    pub fn ok(bytes: Vec<u8>) -> Self {
        Self(Ok(bytes))
    }

    pub fn failing(message: &str) -> Self {
        Self(Err(message.to_string()))
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
        self.0.clone().map_err(AppError::Publish)
    }
}

pub struct FakeScraper(pub Option<String>);

#[async_trait]
impl PageScraper for FakeScraper {
    async fn scrape(&self, _url: &str) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}
