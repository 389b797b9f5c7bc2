use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub research_summary: Option<String>,
    pub hashtags: Option<String>,
    /// Raw output of the most recent generation for this project.
    pub latest_ai_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub url: String,
    pub hashtags: Option<String>,
}
