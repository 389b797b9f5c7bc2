mod content_fetcher;
mod media;
mod x_client;

pub use content_fetcher::{ContentFetcher, PageScraper};
pub use media::{HttpMediaSource, MediaSource};
pub use x_client::{PublishingService, XClient};
