use std::sync::Arc;

use futures::stream::{self, StreamExt};
use url::Url;

use crate::ai::{
    extract_json, split_blocks, GeminiClient, GenerationClient, PromptComposer, PromptContext,
};
use crate::config::Config;
use crate::db::{Claim, Repository};
use crate::error::{AppError, Result};
use crate::models::{
    Character, MediaPrompts, NewPost, NewProject, Post, PostStatus, Project, TargetPersona,
    NOTE_PROMPT_KEY, POST_PROMPT_KEY,
};
use crate::publishing::{PublishOutcome, Publisher, Scheduler};
use crate::services::{
    ContentFetcher, HttpMediaSource, MediaSource, PageScraper, PublishingService, XClient,
};

/// How much scraped text goes into the summary prompt.
const SUMMARY_SOURCE_CHARS: usize = 4000;

/// Concurrent metrics lookups when refreshing a whole project.
const METRICS_CONCURRENCY: usize = 5;

/// The external services `App` talks to.
pub struct Services {
    pub generator: Arc<dyn GenerationClient>,
    pub scraper: Arc<dyn PageScraper>,
    pub platform: Arc<dyn PublishingService>,
    pub media: Arc<dyn MediaSource>,
}

/// Context for a generation request. Ids that match nothing are ignored.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub character_id: Option<i64>,
    pub target_persona_id: Option<i64>,
    pub language: Option<String>,
}

pub struct App {
    pub repository: Arc<Repository>,
    generator: Arc<dyn GenerationClient>,
    scraper: Arc<dyn PageScraper>,
    platform: Arc<dyn PublishingService>,
    publisher: Arc<Publisher>,
    composer: PromptComposer,
    delimiter: String,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        let services = Services {
            generator: Arc::new(GeminiClient::new(
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
                config.generation_timeout(),
            )?),
            scraper: Arc::new(ContentFetcher::new(config.scrape_min_chars)?),
            platform: Arc::new(XClient::new(
                config.x_access_token.clone(),
                config.publish_timeout(),
            )?),
            media: Arc::new(HttpMediaSource::new(config.publish_timeout())?),
        };

        if config.gemini_api_key.is_none() {
            tracing::warn!("no Gemini API key configured, generation will fail");
        }
        if config.x_access_token.is_none() {
            tracing::warn!("no X access token configured, publishing will fail");
        }

        Ok(Self::with_services(repository, services, config))
    }

    pub fn with_services(repository: Arc<Repository>, services: Services, config: &Config) -> Self {
        let publisher = Arc::new(Publisher::new(
            repository.clone(),
            services.platform.clone(),
            services.media,
            config.publish_timeout(),
        ));

        Self {
            repository,
            generator: services.generator,
            scraper: services.scraper,
            platform: services.platform,
            publisher,
            composer: PromptComposer::new(config.default_language.clone()),
            delimiter: config.block_delimiter.clone(),
        }
    }

    /// A scheduler sharing this app's repository and publisher, not yet started.
    pub fn scheduler(&self, config: &Config) -> Scheduler {
        Scheduler::new(
            self.repository.clone(),
            self.publisher.clone(),
            config.scheduler_interval(),
            config.max_concurrent_publishes,
        )
    }

    // Projects

    /// Creates a project, seeding its research summary from the project page.
    /// Scraping or summarizing problems never stop the project being saved.
    pub async fn create_project(&self, project: NewProject) -> Result<Project> {
        if project.name.trim().is_empty() {
            return Err(AppError::Validation("project name must not be empty".to_string()));
        }
        Url::parse(&project.url)
            .map_err(|e| AppError::Validation(format!("invalid project URL: {e}")))?;

        let summary = self.research_summary(&project.url).await;
        let created = self.repository.insert_project(project, summary).await?;
        tracing::info!(project_id = created.id, name = %created.name, "project created");
        Ok(created)
    }

    async fn research_summary(&self, url: &str) -> Option<String> {
        let text = match self.scraper.scrape(url).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!(%url, "no usable page text, skipping summary");
                return None;
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "scraping project page failed");
                return None;
            }
        };

        let excerpt: String = text.chars().take(SUMMARY_SOURCE_CHARS).collect();
        let prompt = format!(
            "Analyze the following text extracted from a website and briefly summarize \
             the project's core value, its features and its target customers.\n\n---Text---\n{excerpt}"
        );

        match self.generator.generate(&prompt).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(%url, error = %e, "summarizing project page failed");
                Some(format!("AI summary failed: {e}"))
            }
        }
    }

    pub async fn update_project_summary(
        &self,
        project_id: i64,
        summary: String,
    ) -> Result<Project> {
        self.repository
            .update_project_summary(project_id, summary)
            .await?;
        self.repository.get_project(project_id).await
    }

    pub async fn delete_project(&self, project_id: i64) -> Result<()> {
        self.repository.delete_project(project_id).await?;
        tracing::info!(project_id, "project and its posts deleted");
        Ok(())
    }

    // Personas and templates

    pub async fn save_character(&self, character: Character) -> Result<i64> {
        self.repository.insert_character(character).await
    }

    pub async fn save_target_persona(&self, persona: TargetPersona) -> Result<i64> {
        self.repository.insert_target_persona(persona).await
    }

    pub async fn update_template(&self, key: &str, value: String) -> Result<()> {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("template '{key}' must not be empty")));
        }
        self.repository.set_template(key, value).await
    }

    /// Drafts a full character from a few seed keywords. Nothing is saved.
    pub async fn generate_character_details(&self, seed_text: &str) -> Result<Character> {
        let prompt = format!(
            "Based on the keywords below, design an appealing and consistent character persona \
             for posting on social media. Reply strictly in the JSON format shown.\n\
             # Keywords: {seed_text}\n\
             # Output format (JSON): {{\"name\": \"\", \"title\": \"\", \"expertise\": \"\", \
             \"background\": \"\", \"values_beliefs\": \"\", \"goal\": \"\", \"base_tone\": \"\", \
             \"style_features\": \"\", \"catchphrases\": \"\", \"favorite_emojis\": \"\", \
             \"impression\": \"\"}}"
        );
        let reply = self.generator.generate(&prompt).await?;
        extract_json(&reply)
    }

    /// Drafts a full target persona from a few seed keywords. Nothing is saved.
    pub async fn generate_persona_details(&self, seed_text: &str) -> Result<TargetPersona> {
        let prompt = format!(
            "Based on the keywords below, describe in detail the target reader a marketing \
             account should write for. Reply strictly in the JSON format shown.\n\
             # Keywords: {seed_text}\n\
             # Output format (JSON): {{\"name\": \"\", \"challenges\": \"\", \"goals\": \"\", \
             \"knowledge_level\": \"\", \"info_sources\": \"\", \"keywords\": \"\", \
             \"decision_triggers\": \"\"}}"
        );
        let reply = self.generator.generate(&prompt).await?;
        extract_json(&reply)
    }

    // Generation

    async fn template(&self, key: &str) -> Result<String> {
        self.repository
            .get_template(key)
            .await?
            .and_then(|t| t.value)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Validation(format!("prompt template '{key}' is not set")))
    }

    async fn compose(
        &self,
        key: &str,
        project: &Project,
        request: &GenerationRequest,
    ) -> Result<String> {
        let template = self.template(key).await?;

        let character = match request.character_id {
            Some(id) => self.repository.find_character(id).await?,
            None => None,
        };
        if let (Some(id), None) = (request.character_id, &character) {
            tracing::debug!(character_id = id, "character not found, generating without one");
        }
        let target_persona = match request.target_persona_id {
            Some(id) => self.repository.find_target_persona(id).await?,
            None => None,
        };
        if let (Some(id), None) = (request.target_persona_id, &target_persona) {
            tracing::debug!(
                target_persona_id = id,
                "target persona not found, generating without one"
            );
        }

        Ok(self.composer.compose(
            &template,
            &PromptContext {
                project,
                character: character.as_ref(),
                target_persona: target_persona.as_ref(),
                language: request.language.as_deref(),
            },
        ))
    }

    /// Generates posts for a project and stores each block of the response
    /// as a new draft, in order.
    pub async fn generate_posts(
        &self,
        project_id: i64,
        request: &GenerationRequest,
    ) -> Result<Vec<Post>> {
        let project = self.repository.get_project(project_id).await?;
        let prompt = self.compose(POST_PROMPT_KEY, &project, request).await?;

        let response = self.generator.generate(&prompt).await.inspect_err(|e| {
            tracing::warn!(project_id, error = %e, "post generation failed");
        })?;
        self.repository
            .save_ai_response(project_id, response.clone())
            .await?;

        let drafts: Vec<NewPost> = split_blocks(&response, &self.delimiter)
            .map(|block| NewPost::draft(project_id, block))
            .collect();
        if drafts.is_empty() {
            tracing::warn!(project_id, "generated response contained no posts");
            return Ok(Vec::new());
        }

        let posts = self.repository.insert_posts(drafts).await?;
        tracing::info!(
            project_id,
            count = posts.len(),
            model = self.generator.model_version(),
            "drafts generated"
        );
        Ok(posts)
    }

    /// Generates a long-form article. The text is kept as the project's
    /// latest AI response; no posts are created.
    pub async fn generate_note_article(
        &self,
        project_id: i64,
        request: &GenerationRequest,
    ) -> Result<String> {
        let project = self.repository.get_project(project_id).await?;
        let prompt = self.compose(NOTE_PROMPT_KEY, &project, request).await?;

        let article = self.generator.generate(&prompt).await?;
        self.repository
            .save_ai_response(project_id, article.clone())
            .await?;
        tracing::info!(project_id, chars = article.chars().count(), "note article generated");
        Ok(article)
    }

    pub async fn generate_media_prompts(&self, post_id: i64) -> Result<MediaPrompts> {
        let post = self.repository.get_post(post_id).await?;
        let prompt = format!(
            "You are a professional creator fluent in image and video generation models. \
             Propose one image generation prompt and one video generation prompt that best fit \
             the social media post below.\n\
             # Post text:\n{}\n\
             # Instructions:\n\
             - The image prompt is in English and names a concrete style, composition and lighting. \
             Favor ideas that work the post's own words into the image as a design element.\n\
             - The video prompt describes a short clip of 5 to 10 seconds: scene changes and text animation.\n\
             - Reply strictly in this JSON format:\n\
             {{\"image_prompt\": \"\", \"video_prompt\": \"\"}}",
            post.content
        );
        let reply = self.generator.generate(&prompt).await?;
        extract_json(&reply)
    }

    // Posts

    pub async fn list_posts(&self, project_id: i64) -> Result<Vec<Post>> {
        self.repository.list_posts(project_id).await
    }

    pub async fn create_post(&self, project_id: i64, content: String) -> Result<Post> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("post content must not be empty".to_string()));
        }
        self.repository.get_project(project_id).await?;
        self.repository
            .insert_post(NewPost::draft(project_id, content.trim()))
            .await
    }

    pub async fn edit_post(&self, post_id: i64, content: String) -> Result<Post> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("post content must not be empty".to_string()));
        }
        self.repository
            .update_post_content(post_id, content.trim().to_string())
            .await
    }

    /// `None` detaches the current media.
    pub async fn attach_media(&self, post_id: i64, media_url: Option<String>) -> Result<Post> {
        if let Some(url) = &media_url {
            Url::parse(url).map_err(|e| AppError::Validation(format!("invalid media URL: {e}")))?;
        }
        self.repository.set_post_media(post_id, media_url).await
    }

    pub async fn delete_post(&self, post_id: i64) -> Result<()> {
        self.repository.delete_post(post_id).await
    }

    pub async fn schedule_post(
        &self,
        post_id: i64,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Post> {
        let post = self
            .repository
            .schedule_post(post_id, at, chrono::Utc::now())
            .await?;
        tracing::info!(post_id, scheduled_at = %at, "post scheduled");
        Ok(post)
    }

    /// Publishes immediately, racing the scheduler for the same claim. Losing
    /// the race is not an error: the post is already being handled. Posts
    /// that are already out, or failed and not yet rescheduled, are refused.
    pub async fn publish_now(&self, post_id: i64) -> Result<PublishOutcome> {
        match self.repository.claim_for_publish(post_id).await? {
            Claim::Claimed(post) => Ok(self.publisher.publish_claimed(post).await),
            Claim::Unavailable(PostStatus::Publishing) => {
                tracing::info!(post_id, "post already claimed, nothing to publish");
                Ok(PublishOutcome::Skipped)
            }
            Claim::Unavailable(status) => Err(AppError::InvalidState {
                action: "publish",
                status,
            }),
        }
    }

    // Metrics

    pub async fn refresh_metrics(&self, post_id: i64) -> Result<Post> {
        let post = self.repository.get_post(post_id).await?;
        let external_id = match (&post.status, &post.external_post_id) {
            (PostStatus::Posted, Some(id)) => id.clone(),
            _ => {
                return Err(AppError::InvalidState {
                    action: "refresh metrics for",
                    status: post.status,
                })
            }
        };

        let metrics = self.platform.get_metrics(&external_id).await?;
        self.repository.update_post_metrics(post_id, metrics).await
    }

    /// Refreshes every posted item of a project; failures are logged and
    /// left out of the result.
    pub async fn refresh_project_metrics(&self, project_id: i64) -> Result<Vec<Post>> {
        let posted: Vec<Post> = self
            .repository
            .list_posts(project_id)
            .await?
            .into_iter()
            .filter(|p| p.status == PostStatus::Posted)
            .collect();

        let refreshed: Vec<Post> = stream::iter(posted)
            .map(|post| async move {
                match self.refresh_metrics(post.id).await {
                    Ok(updated) => Some(updated),
                    Err(e) => {
                        tracing::warn!(post_id = post.id, error = %e, "metrics refresh failed");
                        None
                    }
                }
            })
            .buffer_unordered(METRICS_CONCURRENCY)
            .filter_map(|r| async { r })
            .collect()
            .await;

        Ok(refreshed)
    }
}
