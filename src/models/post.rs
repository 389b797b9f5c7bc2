use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Lifecycle state of a post.
///
/// `Publishing` is the claim marker: whoever moved the post into it is the
/// only actor allowed to talk to the platform for that post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    /// Body text and media may only change before a publish is attempted.
    pub fn is_editable(self) -> bool {
        matches!(self, PostStatus::Draft | PostStatus::Scheduled)
    }

    pub fn can_transition_to(self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Failed, Scheduled)
                | (Draft, Publishing)
                | (Scheduled, Publishing)
                | (Publishing, Posted)
                | (Publishing, Failed)
        )
    }

    /// Every status from which `next` can be entered.
    pub fn sources_of(next: PostStatus) -> Vec<PostStatus> {
        PostStatus::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }

    pub const ALL: [PostStatus; 5] = [
        PostStatus::Draft,
        PostStatus::Scheduled,
        PostStatus::Publishing,
        PostStatus::Posted,
        PostStatus::Failed,
    ];
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

/// 9999-12-31T23:59:59Z. Stored timestamps compare as text, which only
/// orders correctly while the year has four digits.
const LATEST_SCHEDULE_SECS: i64 = 253_402_300_799;

/// A publish time must lie strictly after the moment the request is made.
pub fn validate_schedule_time(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if at.timestamp() > LATEST_SCHEDULE_SECS {
        return Err(AppError::Validation(format!(
            "scheduled time {} is too far in the future",
            at.to_rfc3339()
        )));
    }
    if at <= now {
        return Err(AppError::Validation(format!(
            "scheduled time {} must be in the future (now is {})",
            at.to_rfc3339(),
            now.to_rfc3339()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub retweet_count: u32,
    pub reply_count: u32,
    pub like_count: u32,
    pub impression_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub project_id: i64,
    pub content: String,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub external_post_id: Option<String>,
    pub media_url: Option<String>,
    pub metrics: PostMetrics,
    pub publish_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub project_id: i64,
    pub content: String,
    pub media_url: Option<String>,
}

impl NewPost {
    pub fn draft(project_id: i64, content: impl Into<String>) -> Self {
        Self {
            project_id,
            content: content.into(),
            media_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn failed_is_the_only_way_back_to_scheduled() {
        assert_eq!(
            PostStatus::sources_of(PostStatus::Scheduled),
            vec![PostStatus::Draft, PostStatus::Failed]
        );
        assert!(!PostStatus::Posted.can_transition_to(PostStatus::Scheduled));
        assert!(!PostStatus::Publishing.can_transition_to(PostStatus::Scheduled));
    }

    #[test]
    fn nothing_returns_to_draft() {
        assert!(PostStatus::sources_of(PostStatus::Draft).is_empty());
    }

    #[test]
    fn posted_only_follows_a_claim() {
        assert_eq!(
            PostStatus::sources_of(PostStatus::Posted),
            vec![PostStatus::Publishing]
        );
        assert!(!PostStatus::Failed.can_transition_to(PostStatus::Posted));
        assert!(!PostStatus::Scheduled.can_transition_to(PostStatus::Posted));
    }

    #[test]
    fn only_draft_and_scheduled_are_editable() {
        let editable: Vec<_> = PostStatus::ALL
            .into_iter()
            .filter(|s| s.is_editable())
            .collect();
        assert_eq!(editable, vec![PostStatus::Draft, PostStatus::Scheduled]);
    }

    #[test]
    fn status_round_trips_through_its_column_value() {
        for status in PostStatus::ALL {
            assert_eq!(status.as_str().parse::<PostStatus>(), Ok(status));
        }
        assert!("archived".parse::<PostStatus>().is_err());
    }

    #[test]
    fn schedule_time_must_be_strictly_future() {
        let now = Utc::now();
        assert!(validate_schedule_time(now + Duration::seconds(5), now).is_ok());
        assert!(matches!(
            validate_schedule_time(now, now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_schedule_time(now - Duration::minutes(1), now),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn schedule_time_must_keep_a_four_digit_year() {
        let now = Utc::now();
        let last_second = DateTime::from_timestamp(LATEST_SCHEDULE_SECS, 0).unwrap();
        assert_eq!(last_second.to_rfc3339(), "9999-12-31T23:59:59+00:00");
        assert!(validate_schedule_time(last_second, now).is_ok());
        assert!(matches!(
            validate_schedule_time(last_second + Duration::seconds(1), now),
            Err(AppError::Validation(m)) if m.contains("too far")
        ));
    }
}
