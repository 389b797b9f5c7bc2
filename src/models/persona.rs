use serde::{Deserialize, Serialize};

/// The voice a generated post is written in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    #[serde(skip_deserializing)]
    pub id: i64,
    pub name: String,
    pub title: Option<String>,
    pub expertise: Option<String>,
    pub background: Option<String>,
    pub values_beliefs: Option<String>,
    pub goal: Option<String>,
    pub base_tone: Option<String>,
    pub style_features: Option<String>,
    pub catchphrases: Option<String>,
    pub favorite_emojis: Option<String>,
    pub impression: Option<String>,
}

/// The reader a generated post is aimed at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetPersona {
    #[serde(skip_deserializing)]
    pub id: i64,
    pub name: String,
    pub challenges: Option<String>,
    pub goals: Option<String>,
    pub knowledge_level: Option<String>,
    pub info_sources: Option<String>,
    pub keywords: Option<String>,
    pub decision_triggers: Option<String>,
}
