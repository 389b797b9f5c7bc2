mod composer;
mod extract;
mod generator;
mod splitter;

pub use composer::{PromptComposer, PromptContext};
pub use extract::extract_json;
pub use generator::{GeminiClient, GenerationClient};
pub use splitter::split_blocks;
