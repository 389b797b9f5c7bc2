mod persona;
mod post;
mod project;
mod template;

pub use persona::{Character, TargetPersona};
pub use post::{validate_schedule_time, NewPost, Post, PostMetrics, PostStatus};
pub use project::{NewProject, Project};
pub use template::{MediaPrompts, PromptTemplate, NOTE_PROMPT_KEY, POST_PROMPT_KEY};
