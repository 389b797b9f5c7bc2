use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::PostMetrics;

const X_API_URL: &str = "https://api.x.com/2";

/// The social platform posts are published to.
#[async_trait]
pub trait PublishingService: Send + Sync {
    /// Publishes `text` with already-uploaded media; returns the platform's post id.
    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<String>;

    async fn upload_media(&self, bytes: Vec<u8>) -> Result<String>;

    async fn get_metrics(&self, external_id: &str) -> Result<PostMetrics>;
}

#[derive(Debug, Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaRef<'a>>,
}

#[derive(Debug, Serialize)]
struct MediaRef<'a> {
    media_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TweetWithMetrics {
    #[serde(default)]
    public_metrics: Option<PublicMetrics>,
    #[serde(default)]
    non_public_metrics: Option<NonPublicMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    retweet_count: u32,
    #[serde(default)]
    reply_count: u32,
    #[serde(default)]
    like_count: u32,
    #[serde(default)]
    impression_count: u32,
}

#[derive(Debug, Deserialize)]
struct NonPublicMetrics {
    #[serde(default)]
    impression_count: Option<u32>,
}

impl TweetWithMetrics {
    fn into_metrics(self) -> PostMetrics {
        let public = self.public_metrics.unwrap_or_default();
        let impressions = self
            .non_public_metrics
            .and_then(|m| m.impression_count)
            .unwrap_or(public.impression_count);
        PostMetrics {
            retweet_count: public.retweet_count,
            reply_count: public.reply_count,
            like_count: public.like_count,
            impression_count: impressions,
        }
    }
}

/// X API v2 client authenticated with an OAuth 2.0 user access token.
pub struct XClient {
    client: Client,
    access_token: Option<String>,
}

impl XClient {
    pub fn new(access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            access_token,
        })
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| AppError::Publish("no X access token configured".to_string()))
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    format!("API error {}: {}", status, text)
}

#[async_trait]
impl PublishingService for XClient {
    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<String> {
        let request = CreateTweetRequest {
            text,
            media: (!media_ids.is_empty()).then_some(MediaRef { media_ids }),
        };

        let response = self
            .client
            .post(format!("{}/tweets", X_API_URL))
            .bearer_auth(self.token()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Publish(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Publish(error_body(response).await));
        }

        let created: DataEnvelope<CreatedItem> = response
            .json()
            .await
            .map_err(|e| AppError::Publish(e.to_string()))?;

        created
            .data
            .map(|item| item.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Publish("No post id returned from API".to_string()))
    }

    async fn upload_media(&self, bytes: Vec<u8>) -> Result<String> {
        let form = Form::new()
            .text("media_category", "tweet_image")
            .part("media", Part::bytes(bytes).file_name("image.jpg"));

        let response = self
            .client
            .post(format!("{}/media/upload", X_API_URL))
            .bearer_auth(self.token()?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Publish(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Publish(format!(
                "media upload failed: {}",
                error_body(response).await
            )));
        }

        let uploaded: DataEnvelope<CreatedItem> = response
            .json()
            .await
            .map_err(|e| AppError::Publish(e.to_string()))?;

        uploaded
            .data
            .map(|item| item.id)
            .ok_or_else(|| AppError::Publish("No media id returned from API".to_string()))
    }

    async fn get_metrics(&self, external_id: &str) -> Result<PostMetrics> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| AppError::Metrics("no X access token configured".to_string()))?;

        let response = self
            .client
            .get(format!("{}/tweets/{}", X_API_URL, external_id))
            .query(&[("tweet.fields", "public_metrics,non_public_metrics")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Metrics(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Metrics(error_body(response).await));
        }

        let tweet: DataEnvelope<TweetWithMetrics> = response
            .json()
            .await
            .map_err(|e| AppError::Metrics(e.to_string()))?;

        tweet
            .data
            .map(TweetWithMetrics::into_metrics)
            .ok_or_else(|| AppError::Metrics(format!("post {} not found on X", external_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_ids_are_omitted_when_empty() {
        let body = serde_json::to_value(CreateTweetRequest {
            text: "hello",
            media: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "text": "hello" }));

        let ids = vec!["123".to_string()];
        let body = serde_json::to_value(CreateTweetRequest {
            text: "hello",
            media: Some(MediaRef { media_ids: &ids }),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "text": "hello", "media": { "media_ids": ["123"] } })
        );
    }

    #[test]
    fn private_impressions_win_over_public_ones() {
        let tweet: DataEnvelope<TweetWithMetrics> = serde_json::from_str(
            r#"{"data":{"id":"1","public_metrics":{"retweet_count":2,"reply_count":3,"like_count":5,"quote_count":0,"impression_count":10},"non_public_metrics":{"impression_count":12}}}"#,
        )
        .unwrap();
        assert_eq!(
            tweet.data.unwrap().into_metrics(),
            PostMetrics {
                retweet_count: 2,
                reply_count: 3,
                like_count: 5,
                impression_count: 12,
            }
        );
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let client = XClient::new(None, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.create_post("hi", &[]).await,
            Err(AppError::Publish(_))
        ));
        assert!(matches!(
            client.get_metrics("1").await,
            Err(AppError::Metrics(_))
        ));
    }
}
