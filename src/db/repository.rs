use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    Character, NewProject, Project, PromptTemplate, TargetPersona, NOTE_PROMPT_KEY,
    POST_PROMPT_KEY,
};

use super::schema::{DEFAULT_NOTE_PROMPT, DEFAULT_POST_PROMPT, SCHEMA};

pub struct Repository {
    pub(super) conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            let seeds = [
                (POST_PROMPT_KEY, DEFAULT_POST_PROMPT, "Prompt used to generate post drafts"),
                (
                    NOTE_PROMPT_KEY,
                    DEFAULT_NOTE_PROMPT,
                    "Prompt used to generate long-form articles",
                ),
            ];
            for (key, value, description) in seeds {
                conn.execute(
                    "INSERT OR IGNORE INTO settings (key, value, description) VALUES (?1, ?2, ?3)",
                    params![key, value, description],
                )?;
            }
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Project operations

    pub async fn insert_project(
        &self,
        project: NewProject,
        research_summary: Option<String>,
    ) -> Result<Project> {
        let now = timestamp(Utc::now());
        let project = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO projects (name, url, research_summary, hashtags, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?5)"#,
                    params![project.name, project.url, research_summary, project.hashtags, now],
                )?;
                let id = conn.last_insert_rowid();
                Ok(select_project(conn, id)?)
            })
            .await?;
        Ok(project)
    }

    pub async fn get_project(&self, id: i64) -> Result<Project> {
        let project = self
            .conn
            .call(move |conn| Ok(select_project(conn, id).optional()?))
            .await?;
        project.ok_or_else(|| AppError::not_found("project", id))
    }

    pub async fn update_project_summary(&self, id: i64, summary: String) -> Result<()> {
        self.touch_project(id, "research_summary", summary).await
    }

    /// Keep the raw generation output around for auditing.
    pub async fn save_ai_response(&self, id: i64, response: String) -> Result<()> {
        self.touch_project(id, "latest_ai_response", response).await
    }

    async fn touch_project(&self, id: i64, column: &'static str, value: String) -> Result<()> {
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .call(move |conn| {
                let sql =
                    format!("UPDATE projects SET {column} = ?1, updated_at = ?2 WHERE id = ?3");
                Ok(conn.execute(&sql, params![value, now, id])?)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::not_found("project", id));
        }
        Ok(())
    }

    /// Removes the project together with every post it owns.
    pub async fn delete_project(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM posts WHERE project_id = ?1", params![id])?;
                let changed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::not_found("project", id));
        }
        Ok(())
    }

    // Character and target persona operations

    pub async fn insert_character(&self, character: Character) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO characters (name, title, expertise, background, values_beliefs, goal,
                                               base_tone, style_features, catchphrases, favorite_emojis, impression)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                    params![
                        character.name,
                        character.title,
                        character.expertise,
                        character.background,
                        character.values_beliefs,
                        character.goal,
                        character.base_tone,
                        character.style_features,
                        character.catchphrases,
                        character.favorite_emojis,
                        character.impression,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Unknown ids resolve to `None`; callers treat that as "no persona".
    pub async fn find_character(&self, id: i64) -> Result<Option<Character>> {
        let character = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, name, title, expertise, background, values_beliefs, goal,
                              base_tone, style_features, catchphrases, favorite_emojis, impression
                       FROM characters WHERE id = ?1"#,
                )?;
                Ok(stmt.query_row(params![id], character_from_row).optional()?)
            })
            .await?;
        Ok(character)
    }

    pub async fn insert_target_persona(&self, persona: TargetPersona) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO target_personas (name, challenges, goals, knowledge_level,
                                                    info_sources, keywords, decision_triggers)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        persona.name,
                        persona.challenges,
                        persona.goals,
                        persona.knowledge_level,
                        persona.info_sources,
                        persona.keywords,
                        persona.decision_triggers,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn find_target_persona(&self, id: i64) -> Result<Option<TargetPersona>> {
        let persona = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, name, challenges, goals, knowledge_level, info_sources,
                              keywords, decision_triggers
                       FROM target_personas WHERE id = ?1"#,
                )?;
                Ok(stmt.query_row(params![id], persona_from_row).optional()?)
            })
            .await?;
        Ok(persona)
    }

    // Prompt templates

    pub async fn get_template(&self, key: &str) -> Result<Option<PromptTemplate>> {
        let key = key.to_string();
        let template = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT key, value, description FROM settings WHERE key = ?1")?;
                let template = stmt
                    .query_row(params![key], |row| {
                        Ok(PromptTemplate {
                            key: row.get(0)?,
                            value: row.get(1)?,
                            description: row.get(2)?,
                        })
                    })
                    .optional()?;
                Ok(template)
            })
            .await?;
        Ok(template)
    }

    pub async fn set_template(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                       ON CONFLICT(key) DO UPDATE SET
                           value = excluded.value,
                           updated_at = excluded.updated_at"#,
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Fixed-width UTC encoding, so `TEXT` comparison in SQL orders by time.
pub(super) fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite's own datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

pub(super) fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| invalid_text(idx, format!("bad timestamp: {raw}")))
}

pub(super) fn optional_datetime_column(
    row: &Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| invalid_text(idx, format!("bad timestamp: {raw}"))),
        None => Ok(None),
    }
}

pub(super) fn invalid_text(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn select_project(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Project> {
    conn.query_row(
        r#"SELECT id, name, url, research_summary, hashtags, latest_ai_response, created_at, updated_at
           FROM projects WHERE id = ?1"#,
        params![id],
        project_from_row,
    )
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        research_summary: row.get(3)?,
        hashtags: row.get(4)?,
        latest_ai_response: row.get(5)?,
        created_at: datetime_column(row, 6)?,
        updated_at: datetime_column(row, 7)?,
    })
}

fn character_from_row(row: &Row) -> rusqlite::Result<Character> {
    Ok(Character {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        expertise: row.get(3)?,
        background: row.get(4)?,
        values_beliefs: row.get(5)?,
        goal: row.get(6)?,
        base_tone: row.get(7)?,
        style_features: row.get(8)?,
        catchphrases: row.get(9)?,
        favorite_emojis: row.get(10)?,
        impression: row.get(11)?,
    })
}

fn persona_from_row(row: &Row) -> rusqlite::Result<TargetPersona> {
    Ok(TargetPersona {
        id: row.get(0)?,
        name: row.get(1)?,
        challenges: row.get(2)?,
        goals: row.get(3)?,
        knowledge_level: row.get(4)?,
        info_sources: row.get(5)?,
        keywords: row.get(6)?,
        decision_triggers: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_project(name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            url: "https://example.com".to_string(),
            hashtags: Some("#launch".to_string()),
        }
    }

    #[tokio::test]
    async fn seeds_both_prompt_templates() {
        let repo = Repository::open_in_memory().await.unwrap();
        for key in [POST_PROMPT_KEY, NOTE_PROMPT_KEY] {
            let template = repo.get_template(key).await.unwrap().unwrap();
            assert!(template.value.unwrap().contains("{{project_name}}"));
        }
    }

    #[tokio::test]
    async fn set_template_overwrites_the_single_instance() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.set_template(POST_PROMPT_KEY, "new {{language}}".to_string())
            .await
            .unwrap();
        let template = repo.get_template(POST_PROMPT_KEY).await.unwrap().unwrap();
        assert_eq!(template.value.as_deref(), Some("new {{language}}"));
        assert!(repo.get_template("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn project_round_trip_and_ai_response() {
        let repo = Repository::open_in_memory().await.unwrap();
        let project = repo
            .insert_project(new_project("Acme"), Some("summary".to_string()))
            .await
            .unwrap();
        repo.save_ai_response(project.id, "raw output".to_string())
            .await
            .unwrap();

        let loaded = repo.get_project(project.id).await.unwrap();
        assert_eq!(loaded.name, "Acme");
        assert_eq!(loaded.research_summary.as_deref(), Some("summary"));
        assert_eq!(loaded.latest_ai_response.as_deref(), Some("raw output"));
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let repo = Repository::open_in_memory().await.unwrap();
        assert!(matches!(
            repo.get_project(42).await,
            Err(AppError::NotFound { entity: "project", .. })
        ));
        assert!(matches!(
            repo.delete_project(42).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_personas_resolve_to_none() {
        let repo = Repository::open_in_memory().await.unwrap();
        assert!(repo.find_character(7).await.unwrap().is_none());
        assert!(repo.find_target_persona(7).await.unwrap().is_none());

        let id = repo
            .insert_character(Character {
                name: "Mika".to_string(),
                base_tone: Some("casual".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let character = repo.find_character(id).await.unwrap().unwrap();
        assert_eq!(character.name, "Mika");
        assert_eq!(character.base_tone.as_deref(), Some("casual"));
    }
}
