use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::error::Result;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Reduces a web page to plain text for the research-summary prompt.
#[async_trait]
pub trait PageScraper: Send + Sync {
    /// `None` when the page can't be fetched or yields too little text to be
    /// worth summarizing.
    async fn scrape(&self, url: &str) -> Result<Option<String>>;
}

pub struct ContentFetcher {
    client: Client,
    min_chars: usize,
}

impl ContentFetcher {
    pub fn new(min_chars: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, min_chars })
    }

    /// Convert HTML to readable text, dropping blank lines.
    fn extract_content(&self, html: &str) -> Option<String> {
        let text = match html2text::from_read(html.as_bytes(), 80) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Failed to convert HTML to text: {}", e);
                return None;
            }
        };

        let cleaned: String = text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if cleaned.chars().count() >= self.min_chars {
            Some(cleaned)
        } else {
            tracing::debug!("Extracted content too short ({} chars)", cleaned.len());
            None
        }
    }
}

#[async_trait]
impl PageScraper for ContentFetcher {
    async fn scrape(&self, page_url: &str) -> Result<Option<String>> {
        if Url::parse(page_url).is_err() {
            tracing::debug!("Not a valid URL: {}", page_url);
            return Ok(None);
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let response = self.client.get(page_url).headers(headers).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", page_url, response.status());
            return Ok(None);
        }

        let html = response.text().await?;
        Ok(self.extract_content(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_pages_yield_nothing() {
        let fetcher = ContentFetcher::new(100).unwrap();
        assert!(fetcher
            .extract_content("<html><body><p>Hello</p></body></html>")
            .is_none());
    }

    #[test]
    fn long_pages_are_flattened_to_text() {
        let fetcher = ContentFetcher::new(20).unwrap();
        let html = "<html><body><h1>Acme Rockets</h1>\n\n<p>We build reusable rockets for small satellites.</p></body></html>";
        let text = fetcher.extract_content(html).unwrap();
        assert!(text.contains("Acme Rockets"));
        assert!(text.contains("reusable rockets"));
        assert!(!text.contains("\n\n"));
    }

    #[tokio::test]
    async fn invalid_urls_are_skipped_without_a_request() {
        let fetcher = ContentFetcher::new(100).unwrap();
        assert!(fetcher.scrape("not a url").await.unwrap().is_none());
    }
}
