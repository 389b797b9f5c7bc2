use std::sync::Arc;
use std::time::Duration;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::Post;
use crate::services::{MediaSource, PublishingService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Posted { external_id: String },
    Failed { reason: String },
    /// The post was claimed by someone else; nothing was sent.
    Skipped,
}

/// Sends claimed posts to the platform and records the result. Errors stop
/// here: every attempt ends as `posted` or `failed`.
pub struct Publisher {
    repository: Arc<Repository>,
    platform: Arc<dyn PublishingService>,
    media: Arc<dyn MediaSource>,
    timeout: Duration,
}

impl Publisher {
    pub fn new(
        repository: Arc<Repository>,
        platform: Arc<dyn PublishingService>,
        media: Arc<dyn MediaSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            platform,
            media,
            timeout,
        }
    }

    /// Upper bound on a single publish attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `post` must already be in `publishing`, claimed by the caller.
    pub async fn publish_claimed(&self, post: Post) -> PublishOutcome {
        let post_id = post.id;
        let attempt = match tokio::time::timeout(self.timeout, self.send(&post)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Publish(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };

        match attempt {
            Ok(external_id) => {
                match self.repository.mark_posted(post_id, external_id.clone()).await {
                    Ok(true) => tracing::info!(post_id, %external_id, "post published"),
                    Ok(false) => tracing::warn!(
                        post_id,
                        %external_id,
                        "post published but was no longer claimed when recording the result"
                    ),
                    Err(e) => tracing::error!(
                        post_id,
                        %external_id,
                        error = %e,
                        "post published but recording the result failed"
                    ),
                }
                PublishOutcome::Posted { external_id }
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(post_id, error = %reason, "publish failed");
                match self.repository.mark_failed(post_id, reason.clone()).await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(post_id, "failed post was no longer claimed"),
                    Err(e) => tracing::error!(post_id, error = %e, "recording publish failure failed"),
                }
                PublishOutcome::Failed { reason }
            }
        }
    }

    /// Media goes first so a failed upload never leaves a text-only post.
    async fn send(&self, post: &Post) -> Result<String> {
        let mut media_ids = Vec::new();
        if let Some(reference) = &post.media_url {
            let bytes = self.media.fetch(reference).await?;
            let media_id = self.platform.upload_media(bytes).await?;
            tracing::debug!(post_id = post.id, %media_id, "media uploaded");
            media_ids.push(media_id);
        }
        self.platform.create_post(&post.content, &media_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Claim;
    use crate::models::{NewPost, NewProject, PostStatus};
    use crate::testing::{FakeMedia, FakePlatform};

    async fn claimed_post(repo: &Repository, media_url: Option<&str>) -> Post {
        let project = repo
            .insert_project(
                NewProject {
                    name: "Acme".to_string(),
                    url: "https://acme.test".to_string(),
                    hashtags: None,
                },
                None,
            )
            .await
            .unwrap();
        let post = repo
            .insert_post(NewPost {
                project_id: project.id,
                content: "launch day".to_string(),
                media_url: media_url.map(str::to_string),
            })
            .await
            .unwrap();
        match repo.claim_for_publish(post.id).await.unwrap() {
            Claim::Claimed(post) => post,
            other => panic!("claim failed: {other:?}"),
        }
    }

    fn publisher(
        repo: Arc<Repository>,
        platform: Arc<FakePlatform>,
        media: FakeMedia,
        timeout: Duration,
    ) -> Publisher {
        Publisher::new(repo, platform, Arc::new(media), timeout)
    }

    #[tokio::test]
    async fn success_records_the_external_id() {
        let repo = Arc::new(Repository::open_in_memory().await.unwrap());
        let platform = Arc::new(FakePlatform::default());
        let post = claimed_post(&repo, Some("https://img.test/a.png")).await;
        let publisher = publisher(
            repo.clone(),
            platform.clone(),
            FakeMedia::ok(b"png".to_vec()),
            Duration::from_secs(5),
        );

        let outcome = publisher.publish_claimed(post.clone()).await;

        let PublishOutcome::Posted { external_id } = outcome else {
            panic!("expected a post");
        };
        let stored = repo.get_post(post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Posted);
        assert_eq!(stored.external_post_id.as_deref(), Some(external_id.as_str()));

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "launch day");
        assert_eq!(sent[0].1, vec!["media-1".to_string()]);
    }

    #[tokio::test]
    async fn media_failure_fails_the_whole_publish() {
        let repo = Arc::new(Repository::open_in_memory().await.unwrap());
        let platform = Arc::new(FakePlatform::default());
        let post = claimed_post(&repo, Some("https://img.test/missing.png")).await;
        let publisher = publisher(
            repo.clone(),
            platform.clone(),
            FakeMedia::failing("HTTP 404"),
            Duration::from_secs(5),
        );

        let outcome = publisher.publish_claimed(post.clone()).await;

        assert!(matches!(outcome, PublishOutcome::Failed { .. }));
        assert!(platform.sent().is_empty(), "no text-only post may be created");
        let stored = repo.get_post(post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.external_post_id.is_none());
        assert!(stored.publish_error.unwrap().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn platform_errors_become_failed_posts() {
        let repo = Arc::new(Repository::open_in_memory().await.unwrap());
        let platform = Arc::new(FakePlatform::failing("rate limited"));
        let post = claimed_post(&repo, None).await;
        let publisher = publisher(
            repo.clone(),
            platform,
            FakeMedia::ok(Vec::new()),
            Duration::from_secs(5),
        );

        let outcome = publisher.publish_claimed(post.clone()).await;

        assert!(matches!(outcome, PublishOutcome::Failed { reason } if reason.contains("rate limited")));
        assert_eq!(repo.get_post(post.id).await.unwrap().status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn a_hung_platform_times_out_into_failed() {
        let repo = Arc::new(Repository::open_in_memory().await.unwrap());
        let platform = Arc::new(FakePlatform::slow(Duration::from_secs(30)));
        let post = claimed_post(&repo, None).await;
        let timeout = Duration::from_millis(100);
        let publisher = publisher(
            repo.clone(),
            platform.clone(),
            FakeMedia::ok(Vec::new()),
            timeout,
        );

        let started = std::time::Instant::now();
        let outcome = publisher.publish_claimed(post.clone()).await;

        assert!(started.elapsed() < timeout + Duration::from_secs(2));
        assert!(matches!(outcome, PublishOutcome::Failed { reason } if reason.contains("timed out")));
        let stored = repo.get_post(post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(platform.sent().is_empty());
    }
}
