use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::{AppError, Result};
use crate::models::{validate_schedule_time, NewPost, Post, PostMetrics, PostStatus};

use super::repository::{
    datetime_column, invalid_text, optional_datetime_column, timestamp, Repository,
};

const POST_COLUMNS: &str = "id, project_id, content, status, scheduled_at, external_post_id, \
     media_url, retweet_count, reply_count, like_count, impression_count, publish_error, \
     created_at, updated_at";

const INTERRUPTED_REASON: &str = "interrupted before completion";

/// Result of trying to take exclusive ownership of a post for publishing.
#[derive(Debug)]
pub enum Claim {
    Claimed(Post),
    /// Someone else got there first, or the post is in a state that can't be
    /// published.
    Unavailable(PostStatus),
}

/// What a conditional `UPDATE` did to a single row.
enum Transition {
    Applied(Post),
    Rejected(PostStatus),
    Missing,
}

impl Transition {
    fn into_post(self, id: i64, action: &'static str) -> Result<Post> {
        match self {
            Transition::Applied(post) => Ok(post),
            Transition::Rejected(status) => Err(AppError::InvalidState { action, status }),
            Transition::Missing => Err(AppError::not_found("post", id)),
        }
    }
}

impl Repository {
    // Post operations

    pub async fn insert_post(&self, post: NewPost) -> Result<Post> {
        let mut posts = self.insert_posts(vec![post]).await?;
        posts
            .pop()
            .ok_or_else(|| anyhow::anyhow!("insert returned no rows").into())
    }

    /// Inserts all drafts in one transaction, preserving order.
    pub async fn insert_posts(&self, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        let now = timestamp(Utc::now());
        let created = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut ids = Vec::with_capacity(posts.len());
                for post in posts {
                    tx.execute(
                        r#"INSERT INTO posts (project_id, content, status, media_url, created_at, updated_at)
                           VALUES (?1, ?2, 'draft', ?3, ?4, ?4)"#,
                        params![post.project_id, post.content, post.media_url, now],
                    )?;
                    ids.push(tx.last_insert_rowid());
                }
                let created = ids
                    .into_iter()
                    .map(|id| select_post(&tx, id))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                tx.commit()?;
                Ok(created)
            })
            .await?;
        Ok(created)
    }

    pub async fn get_post(&self, id: i64) -> Result<Post> {
        let post = self
            .conn
            .call(move |conn| Ok(select_post(conn, id).optional()?))
            .await?;
        post.ok_or_else(|| AppError::not_found("post", id))
    }

    pub async fn list_posts(&self, project_id: i64) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {POST_COLUMNS} FROM posts WHERE project_id = ?1 ORDER BY id"
                ))?;
                let posts = stmt
                    .query_map(params![project_id], post_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    pub async fn delete_post(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?))
            .await?;
        if changed == 0 {
            return Err(AppError::not_found("post", id));
        }
        Ok(())
    }

    pub async fn update_post_content(&self, id: i64, content: String) -> Result<Post> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    &format!(
                        "UPDATE posts SET content = ?1, updated_at = ?2 WHERE id = ?3 AND status IN ({})",
                        editable_statuses()
                    ),
                    params![content, now, id],
                )?;
                Ok(settle(conn, id, changed)?)
            })
            .await?
            .into_post(id, "edit")
    }

    pub async fn set_post_media(&self, id: i64, media_url: Option<String>) -> Result<Post> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    &format!(
                        "UPDATE posts SET media_url = ?1, updated_at = ?2 WHERE id = ?3 AND status IN ({})",
                        editable_statuses()
                    ),
                    params![media_url, now, id],
                )?;
                Ok(settle(conn, id, changed)?)
            })
            .await?
            .into_post(id, "attach media to")
    }

    /// `draft → scheduled` and `failed → scheduled`.
    pub async fn schedule_post(
        &self,
        id: i64,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Post> {
        validate_schedule_time(at, now)?;
        let at = timestamp(at);
        let now = timestamp(now);
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    &format!(
                        r#"UPDATE posts SET status = 'scheduled', scheduled_at = ?1, publish_error = NULL,
                                            updated_at = ?2
                           WHERE id = ?3 AND status IN ({})"#,
                        status_list(&PostStatus::sources_of(PostStatus::Scheduled))
                    ),
                    params![at, now, id],
                )?;
                Ok(settle(conn, id, changed)?)
            })
            .await?
            .into_post(id, "schedule")
    }

    /// Ids of scheduled posts due at `snapshot`, oldest schedule first.
    pub async fn due_post_ids(&self, snapshot: DateTime<Utc>) -> Result<Vec<i64>> {
        let snapshot = timestamp(snapshot);
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id FROM posts
                       WHERE status = 'scheduled' AND scheduled_at <= ?1
                       ORDER BY scheduled_at, id"#,
                )?;
                let ids = stmt
                    .query_map(params![snapshot], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    /// Scheduler claim: succeeds only while the post is still scheduled and
    /// due at `snapshot`.
    pub async fn claim_due(&self, id: i64, snapshot: DateTime<Utc>) -> Result<Claim> {
        let snapshot = timestamp(snapshot);
        let now = timestamp(Utc::now());
        self.claim_where(
            id,
            "status = 'scheduled' AND scheduled_at <= ?3".to_string(),
            Some(snapshot),
            now,
        )
        .await
    }

    /// Manual "publish now" claim from `draft` or `scheduled`, regardless of
    /// the scheduled time.
    pub async fn claim_for_publish(&self, id: i64) -> Result<Claim> {
        let now = timestamp(Utc::now());
        let clause = format!(
            "status IN ({})",
            status_list(&PostStatus::sources_of(PostStatus::Publishing))
        );
        self.claim_where(id, clause, None, now).await
    }

    async fn claim_where(
        &self,
        id: i64,
        condition: String,
        snapshot: Option<String>,
        now: String,
    ) -> Result<Claim> {
        let transition = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"UPDATE posts SET status = 'publishing', scheduled_at = NULL, updated_at = ?1
                       WHERE id = ?2 AND {condition}"#
                );
                let changed = match snapshot {
                    Some(snapshot) => conn.execute(&sql, params![now, id, snapshot])?,
                    None => conn.execute(&sql, params![now, id])?,
                };
                Ok(settle(conn, id, changed)?)
            })
            .await?;
        match transition {
            Transition::Applied(post) => Ok(Claim::Claimed(post)),
            Transition::Rejected(status) => Ok(Claim::Unavailable(status)),
            Transition::Missing => Err(AppError::not_found("post", id)),
        }
    }

    /// `publishing → posted`. Returns false if the post was no longer claimed.
    pub async fn mark_posted(&self, id: i64, external_post_id: String) -> Result<bool> {
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    r#"UPDATE posts SET status = 'posted', external_post_id = ?1, publish_error = NULL,
                                        updated_at = ?2
                       WHERE id = ?3 AND status = 'publishing'"#,
                    params![external_post_id, now, id],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    /// `publishing → failed`. Returns false if the post was no longer claimed.
    pub async fn mark_failed(&self, id: i64, reason: String) -> Result<bool> {
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    r#"UPDATE posts SET status = 'failed', publish_error = ?1, updated_at = ?2
                       WHERE id = ?3 AND status = 'publishing'"#,
                    params![reason, now, id],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    /// Fails claims last touched before `claimed_before`. Such claims belong
    /// to a publish attempt that died: a live one settles within its timeout.
    /// They can't be resumed safely because the platform may or may not have
    /// the post.
    pub async fn fail_interrupted_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize> {
        let cutoff = timestamp(claimed_before);
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    r#"UPDATE posts SET status = 'failed', publish_error = ?1, updated_at = ?2
                       WHERE status = 'publishing' AND updated_at < ?3"#,
                    params![INTERRUPTED_REASON, now, cutoff],
                )?)
            })
            .await?;
        Ok(changed)
    }

    pub async fn update_post_metrics(&self, id: i64, metrics: PostMetrics) -> Result<Post> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE posts SET retweet_count = ?1, reply_count = ?2, like_count = ?3,
                                        impression_count = ?4, updated_at = ?5
                       WHERE id = ?6 AND status = 'posted'"#,
                    params![
                        metrics.retweet_count,
                        metrics.reply_count,
                        metrics.like_count,
                        metrics.impression_count,
                        now,
                        id
                    ],
                )?;
                Ok(settle(conn, id, changed)?)
            })
            .await?
            .into_post(id, "record metrics for")
    }
}

fn status_list(statuses: &[PostStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn editable_statuses() -> String {
    let editable: Vec<_> = PostStatus::ALL
        .into_iter()
        .filter(|s| s.is_editable())
        .collect();
    status_list(&editable)
}

fn settle(conn: &rusqlite::Connection, id: i64, changed: usize) -> rusqlite::Result<Transition> {
    if changed > 0 {
        return Ok(Transition::Applied(select_post(conn, id)?));
    }
    let status = conn
        .query_row("SELECT status FROM posts WHERE id = ?1", params![id], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    match status {
        Some(raw) => raw
            .parse()
            .map(Transition::Rejected)
            .map_err(|e| invalid_text(0, e)),
        None => Ok(Transition::Missing),
    }
}

fn select_post(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Post> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        params![id],
        post_from_row,
    )
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    let status: String = row.get(3)?;
    Ok(Post {
        id: row.get(0)?,
        project_id: row.get(1)?,
        content: row.get(2)?,
        status: status.parse().map_err(|e| invalid_text(3, e))?,
        scheduled_at: optional_datetime_column(row, 4)?,
        external_post_id: row.get(5)?,
        media_url: row.get(6)?,
        metrics: PostMetrics {
            retweet_count: row.get(7)?,
            reply_count: row.get(8)?,
            like_count: row.get(9)?,
            impression_count: row.get(10)?,
        },
        publish_error: row.get(11)?,
        created_at: datetime_column(row, 12)?,
        updated_at: datetime_column(row, 13)?,
    })
}
