mod ai;
mod app;
mod config;
mod db;
mod error;
mod models;
mod publishing;
mod services;
#[cfg(test)]
mod testing;

use std::path::Path;

use chrono::{DateTime, Utc};

use app::{App, GenerationRequest};
use config::Config;
use error::{AppError, Result};
use models::{Character, NewProject, Post, TargetPersona, NOTE_PROMPT_KEY, POST_PROMPT_KEY};
use publishing::{CycleReport, PublishOutcome};

const USAGE: &str = "\
usage: content-scheduler [command]

Scheduler
  --serve                                   run the scheduler until Ctrl-C (default)
  --run-once                                run a single scheduler cycle

Projects
  --add-project <name> <url> [hashtags]     create a project and summarize its page
  --set-summary <project_id> <text>         replace a project's research summary
  --delete-project <project_id>             delete a project and all its posts
  --list <project_id>                       list a project's posts

Personas and templates
  --add-character <name>                    save a character with just a name
  --add-persona <name>                      save a target persona with just a name
  --character-from <seed text>              draft a character with AI and save it
  --persona-from <seed text>                draft a target persona with AI and save it
  --template <post|note>                    show a prompt template
  --set-template <post|note> <file>         replace a prompt template with a file's contents

Generation
  --generate <project_id> [character_id] [persona_id] [language]
  --note <project_id> [character_id] [persona_id] [language]
  --media-prompts <post_id>                 suggest image and video prompts for a post

Posts
  --new-post <project_id> <text>
  --edit <post_id> <text>
  --attach-media <post_id> [url]            omit the url to detach media
  --delete-post <post_id>
  --schedule <post_id> <rfc3339 time>
  --post-now <post_id>
  --metrics <post_id>
  --metrics-project <project_id>

Ids may be given as - to skip them.";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Pick up API keys from .env if there is one
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to read .env");
        }
    }

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("--serve");
    if matches!(command, "-h" | "--help") {
        println!("{USAGE}");
        return Ok(());
    }

    // Load configuration
    let config = Config::load()?;

    // Initialize app
    let app = App::new(&config).await?;

    // No command runs the scheduler daemon
    if command == "--serve" {
        return serve(&app, &config).await;
    }

    run_command(&app, &config, command, &args).await
}

async fn serve(app: &App, config: &Config) -> Result<()> {
    let mut scheduler = app.scheduler(config);
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    scheduler.stop().await;
    Ok(())
}

async fn run_command(app: &App, config: &Config, command: &str, args: &[String]) -> Result<()> {
    match command {
        "--run-once" => {
            let (report, outcomes) = app.scheduler(config).run_cycle().await?;
            print_cycle(&report, &outcomes);
        }

        // Projects
        "--add-project" => {
            let project = app
                .create_project(NewProject {
                    name: required(args, 1, "name")?.to_string(),
                    url: required(args, 2, "url")?.to_string(),
                    hashtags: args.get(3).cloned(),
                })
                .await?;
            println!("Created project {} ({})", project.id, project.name);
            if let Some(summary) = project.research_summary {
                println!("\n{summary}");
            }
        }
        "--set-summary" => {
            let project = app
                .update_project_summary(
                    id_arg(args, 1, "project_id")?,
                    required(args, 2, "text")?.to_string(),
                )
                .await?;
            println!("Updated summary of project {}", project.id);
        }
        "--delete-project" => {
            let project_id = id_arg(args, 1, "project_id")?;
            app.delete_project(project_id).await?;
            println!("Deleted project {project_id}");
        }
        "--list" => {
            for post in app.list_posts(id_arg(args, 1, "project_id")?).await? {
                print_post(&post);
            }
        }

        // Personas and templates
        "--add-character" => {
            let id = app
                .save_character(Character {
                    name: required(args, 1, "name")?.to_string(),
                    ..Default::default()
                })
                .await?;
            println!("Saved character {id}");
        }
        "--add-persona" => {
            let id = app
                .save_target_persona(TargetPersona {
                    name: required(args, 1, "name")?.to_string(),
                    ..Default::default()
                })
                .await?;
            println!("Saved target persona {id}");
        }
        "--character-from" => {
            let character = app
                .generate_character_details(required(args, 1, "seed text")?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&character)?);
            let id = app.save_character(character).await?;
            println!("Saved character {id}");
        }
        "--persona-from" => {
            let persona = app
                .generate_persona_details(required(args, 1, "seed text")?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&persona)?);
            let id = app.save_target_persona(persona).await?;
            println!("Saved target persona {id}");
        }
        "--template" => {
            let key = template_key(required(args, 1, "post|note")?)?;
            match app.repository.get_template(key).await? {
                Some(template) => {
                    if let Some(description) = template.description {
                        println!("# {} ({description})", template.key);
                    }
                    println!("{}", template.value.unwrap_or_default());
                }
                None => println!("Template {key} is not set"),
            }
        }
        "--set-template" => {
            let key = template_key(required(args, 1, "post|note")?)?;
            let value = std::fs::read_to_string(Path::new(required(args, 2, "file")?))?;
            app.update_template(key, value).await?;
            println!("Updated template {key}");
        }

        // Generation
        "--generate" => {
            let project_id = id_arg(args, 1, "project_id")?;
            let posts = app
                .generate_posts(project_id, &generation_request(args)?)
                .await?;
            println!("Generated {} drafts", posts.len());
            for post in posts {
                print_post(&post);
            }
        }
        "--note" => {
            let project_id = id_arg(args, 1, "project_id")?;
            let article = app
                .generate_note_article(project_id, &generation_request(args)?)
                .await?;
            println!("{article}");
        }
        "--media-prompts" => {
            let prompts = app
                .generate_media_prompts(id_arg(args, 1, "post_id")?)
                .await?;
            println!("Image: {}\n\nVideo: {}", prompts.image_prompt, prompts.video_prompt);
        }

        // Posts
        "--new-post" => {
            let post = app
                .create_post(
                    id_arg(args, 1, "project_id")?,
                    required(args, 2, "text")?.to_string(),
                )
                .await?;
            print_post(&post);
        }
        "--edit" => {
            let post = app
                .edit_post(
                    id_arg(args, 1, "post_id")?,
                    required(args, 2, "text")?.to_string(),
                )
                .await?;
            print_post(&post);
        }
        "--attach-media" => {
            let post = app
                .attach_media(id_arg(args, 1, "post_id")?, args.get(2).cloned())
                .await?;
            match &post.media_url {
                Some(url) => println!("Post {} will be published with {url}", post.id),
                None => println!("Post {} has no media", post.id),
            }
        }
        "--delete-post" => {
            let post_id = id_arg(args, 1, "post_id")?;
            app.delete_post(post_id).await?;
            println!("Deleted post {post_id}");
        }
        "--schedule" => {
            let post_id = id_arg(args, 1, "post_id")?;
            let at = DateTime::parse_from_rfc3339(required(args, 2, "time")?)
                .map_err(|e| AppError::Validation(format!("invalid time: {e}")))?
                .with_timezone(&Utc);
            let post = app.schedule_post(post_id, at).await?;
            println!("Post {} scheduled for {}", post.id, at.to_rfc3339());
        }
        "--post-now" => match app.publish_now(id_arg(args, 1, "post_id")?).await? {
            PublishOutcome::Posted { external_id } => println!("Posted as {external_id}"),
            PublishOutcome::Failed { reason } => println!("Publish failed: {reason}"),
            PublishOutcome::Skipped => println!("Post is already being published"),
        },
        "--metrics" => {
            let post = app.refresh_metrics(id_arg(args, 1, "post_id")?).await?;
            print_metrics(&post);
        }
        "--metrics-project" => {
            let posts = app
                .refresh_project_metrics(id_arg(args, 1, "project_id")?)
                .await?;
            println!("Refreshed {} posts", posts.len());
            for post in &posts {
                print_metrics(post);
            }
        }

        other => {
            eprintln!("unknown command: {other}\n\n{USAGE}");
            return Err(AppError::Validation(format!("unknown command: {other}")));
        }
    }
    Ok(())
}

fn print_cycle(report: &CycleReport, outcomes: &[PublishOutcome]) {
    let published = outcomes
        .iter()
        .filter(|o| matches!(o, PublishOutcome::Posted { .. }))
        .count();
    println!(
        "{} due, {} published, {} skipped, {} deferred",
        report.due, published, report.skipped, report.deferred
    );
}

fn print_post(post: &Post) {
    let when = post
        .scheduled_at
        .map(|at| format!(" @ {}", at.to_rfc3339()))
        .unwrap_or_default();
    let media = if post.media_url.is_some() { " [media]" } else { "" };
    println!("[{}] {}{}{}  {}", post.id, post.status, when, media, post.content);
}

fn print_metrics(post: &Post) {
    let m = post.metrics;
    println!(
        "[{}] likes {}  reposts {}  replies {}  impressions {}",
        post.id, m.like_count, m.retweet_count, m.reply_count, m.impression_count
    );
}

fn template_key(name: &str) -> Result<&'static str> {
    match name {
        "post" => Ok(POST_PROMPT_KEY),
        "note" => Ok(NOTE_PROMPT_KEY),
        other => Err(AppError::Validation(format!(
            "unknown template '{other}', expected post or note"
        ))),
    }
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| AppError::Validation(format!("missing argument <{name}>\n\n{USAGE}")))
}

fn id_arg(args: &[String], index: usize, name: &str) -> Result<i64> {
    parse_id(required(args, index, name)?, name)
}

fn parse_id(value: &str, name: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| AppError::Validation(format!("<{name}> must be a number, got '{value}'")))
}

/// Optional `[character_id] [persona_id] [language]` after the project id;
/// `-` skips an id.
fn generation_request(args: &[String]) -> Result<GenerationRequest> {
    let optional_id = |index: usize, name: &str| -> Result<Option<i64>> {
        match args.get(index).map(String::as_str) {
            None | Some("-") => Ok(None),
            Some(value) => parse_id(value, name).map(Some),
        }
    };
    Ok(GenerationRequest {
        character_id: optional_id(2, "character_id")?,
        target_persona_id: optional_id(3, "persona_id")?,
        language: args.get(4).cloned(),
    })
}
