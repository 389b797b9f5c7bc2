use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::Result;

static JSON_OBJECT: OnceLock<Regex> = OnceLock::new();

/// Pull the outermost `{...}` span out of a model reply (which often wraps
/// JSON in prose or code fences) and deserialize it.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let re = JSON_OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("json pattern is valid"));
    let span = re
        .find(text)
        .ok_or_else(|| anyhow::anyhow!("no JSON object in model response"))?;
    Ok(serde_json::from_str(span.as_str())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Character, MediaPrompts};

    #[test]
    fn finds_json_inside_a_code_fence() {
        let reply = "Sure!\n```json\n{\"image_prompt\": \"neon city\", \"video_prompt\": \"pan left\"}\n```";
        let prompts: MediaPrompts = extract_json(reply).unwrap();
        assert_eq!(prompts.image_prompt, "neon city");
        assert_eq!(prompts.video_prompt, "pan left");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let character: Character = extract_json(r#"{"name": "Mika", "goal": "teach"}"#).unwrap();
        assert_eq!(character.name, "Mika");
        assert_eq!(character.goal.as_deref(), Some("teach"));
        assert!(character.title.is_none());
    }

    #[test]
    fn prose_without_json_is_an_error() {
        assert!(matches!(
            extract_json::<MediaPrompts>("I can't help with that."),
            Err(AppError::Other(_))
        ));
        assert!(matches!(
            extract_json::<MediaPrompts>("{not json}"),
            Err(AppError::Json(_))
        ));
    }
}
