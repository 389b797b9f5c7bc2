pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- projects table
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    research_summary TEXT,
    hashtags TEXT,
    latest_ai_response TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- posts table
-- scheduled_at is set only while status = 'scheduled',
-- external_post_id only once status = 'posted'.
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    scheduled_at TEXT,
    external_post_id TEXT,
    media_url TEXT,
    retweet_count INTEGER NOT NULL DEFAULT 0,
    reply_count INTEGER NOT NULL DEFAULT 0,
    like_count INTEGER NOT NULL DEFAULT 0,
    impression_count INTEGER NOT NULL DEFAULT 0,
    publish_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_project_id ON posts(project_id);
CREATE INDEX IF NOT EXISTS idx_posts_due ON posts(status, scheduled_at);

-- characters table
CREATE TABLE IF NOT EXISTS characters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    title TEXT,
    expertise TEXT,
    background TEXT,
    values_beliefs TEXT,
    goal TEXT,
    base_tone TEXT,
    style_features TEXT,
    catchphrases TEXT,
    favorite_emojis TEXT,
    impression TEXT
);

-- target_personas table
CREATE TABLE IF NOT EXISTS target_personas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    challenges TEXT,
    goals TEXT,
    knowledge_level TEXT,
    info_sources TEXT,
    keywords TEXT,
    decision_triggers TEXT
);

-- settings table (prompt templates keyed by name)
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    value TEXT,
    description TEXT,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
"#;

pub const DEFAULT_POST_PROMPT: &str = r#"You are a social media copywriter.
Write three short posts in {{language}} introducing the project below.
{{character_section}}
{{target_persona_section}}
# Project
- Name: {{project_name}}
- URL: {{project_url}}
- Research summary: {{research_summary}}
- Hashtags to include: {{hashtags}}

Each post must stay under 280 characters.
Separate the posts with a line containing only ---"#;

pub const DEFAULT_NOTE_PROMPT: &str = r#"You are a long-form blog writer.
Write an article in {{language}} about the project below, with a title and headed sections.
{{character_section}}
{{target_persona_section}}
# Project
- Name: {{project_name}}
- URL: {{project_url}}
- Research summary: {{research_summary}}
- Hashtags: {{hashtags}}"#;
