use serde::{Deserialize, Serialize};

pub const POST_PROMPT_KEY: &str = "default_post_prompt";
pub const NOTE_PROMPT_KEY: &str = "default_note_prompt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub key: String,
    pub value: Option<String>,
    pub description: Option<String>,
}

/// Prompts the media-prompt endpoint asks the model to fill in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPrompts {
    pub image_prompt: String,
    pub video_prompt: String,
}
