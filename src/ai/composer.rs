use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::{Character, Project, TargetPersona};

pub const NO_RESEARCH_SUMMARY: &str = "No research findings available.";
pub const NO_HASHTAGS: &str = "None specified";
const NOT_SPECIFIED: &str = "not specified";

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{([a-z_]+)\}\}").expect("placeholder pattern is valid")
    })
}

/// Everything a template can draw on. Persona ids have already been
/// resolved by the caller; an id that matched nothing is simply `None`.
pub struct PromptContext<'a> {
    pub project: &'a Project,
    pub character: Option<&'a Character>,
    pub target_persona: Option<&'a TargetPersona>,
    pub language: Option<&'a str>,
}

pub struct PromptComposer {
    default_language: String,
}

impl PromptComposer {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }

    /// Replaces every known `{{placeholder}}` in a single pass. Substituted
    /// text is never rescanned, so the order placeholders appear in is
    /// irrelevant. Unknown tokens are left as written.
    pub fn compose(&self, template: &str, ctx: &PromptContext<'_>) -> String {
        placeholder()
            .replace_all(template, |caps: &Captures| {
                self.value_for(&caps[1], ctx)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn value_for(&self, name: &str, ctx: &PromptContext<'_>) -> Option<String> {
        let project = ctx.project;
        let value = match name {
            "language" => ctx
                .language
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(self.default_language.as_str())
                .to_string(),
            "character_section" => ctx.character.map(character_section).unwrap_or_default(),
            "target_persona_section" => ctx
                .target_persona
                .map(target_persona_section)
                .unwrap_or_default(),
            "project_name" => project.name.clone(),
            "project_url" => project.url.clone(),
            "research_summary" => non_blank(project.research_summary.as_deref())
                .unwrap_or(NO_RESEARCH_SUMMARY)
                .to_string(),
            "hashtags" => non_blank(project.hashtags.as_deref())
                .unwrap_or(NO_HASHTAGS)
                .to_string(),
            _ => return None,
        };
        Some(value)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn trait_line(out: &mut String, label: &str, value: Option<&str>) {
    let _ = writeln!(out, "- {}: {}", label, non_blank(value).unwrap_or(NOT_SPECIFIED));
}

fn character_section(c: &Character) -> String {
    let mut out = String::from("\n# Author character\n");
    out.push_str("Write entirely in the voice of the following person.\n");
    trait_line(&mut out, "Name", Some(&c.name));
    trait_line(&mut out, "Title", c.title.as_deref());
    trait_line(&mut out, "Expertise", c.expertise.as_deref());
    trait_line(&mut out, "Background", c.background.as_deref());
    trait_line(&mut out, "Values and beliefs", c.values_beliefs.as_deref());
    trait_line(&mut out, "Goal", c.goal.as_deref());
    trait_line(&mut out, "Base tone", c.base_tone.as_deref());
    trait_line(&mut out, "Style", c.style_features.as_deref());
    trait_line(&mut out, "Catchphrases", c.catchphrases.as_deref());
    trait_line(&mut out, "Favorite emojis", c.favorite_emojis.as_deref());
    trait_line(&mut out, "Impression on readers", c.impression.as_deref());
    out
}

fn target_persona_section(p: &TargetPersona) -> String {
    let mut out = String::from("\n# Target reader\n");
    out.push_str("Write so that it resonates most with this reader.\n");
    trait_line(&mut out, "Persona", Some(&p.name));
    trait_line(&mut out, "Challenges", p.challenges.as_deref());
    trait_line(&mut out, "Goals", p.goals.as_deref());
    trait_line(&mut out, "Knowledge level", p.knowledge_level.as_deref());
    trait_line(&mut out, "Information sources", p.info_sources.as_deref());
    trait_line(&mut out, "Keywords", p.keywords.as_deref());
    trait_line(&mut out, "Decision triggers", p.decision_triggers.as_deref());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const ALL_PLACEHOLDERS: [&str; 7] = [
        "{{language}}",
        "{{character_section}}",
        "{{target_persona_section}}",
        "{{project_name}}",
        "{{project_url}}",
        "{{research_summary}}",
        "{{hashtags}}",
    ];

    fn project(summary: Option<&str>, hashtags: Option<&str>) -> Project {
        Project {
            id: 1,
            name: "Acme Rockets".to_string(),
            url: "https://acme.test".to_string(),
            research_summary: summary.map(str::to_string),
            hashtags: hashtags.map(str::to_string),
            latest_ai_response: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn substitution_is_total() {
        let project = project(Some("Cheap rockets."), Some("#space"));
        let character = Character {
            name: "Mika".to_string(),
            title: Some("Engineer".to_string()),
            ..Default::default()
        };
        let persona = TargetPersona {
            name: "Hobbyist".to_string(),
            ..Default::default()
        };
        let template = ALL_PLACEHOLDERS.join("|");
        let ctx = PromptContext {
            project: &project,
            character: Some(&character),
            target_persona: Some(&persona),
            language: Some("en"),
        };

        let prompt = PromptComposer::new("ja").compose(&template, &ctx);

        for token in ALL_PLACEHOLDERS {
            assert!(!prompt.contains(token), "{token} survived in {prompt}");
        }
        assert!(prompt.starts_with("en|"));
        assert!(prompt.contains("- Title: Engineer"));
        assert!(prompt.contains("- Expertise: not specified"));
        assert!(prompt.contains("- Persona: Hobbyist"));
        assert!(prompt.ends_with("Acme Rockets|https://acme.test|Cheap rockets.|#space"));
    }

    #[test]
    fn missing_context_degrades_to_defaults() {
        let project = project(None, Some("  "));
        let ctx = PromptContext {
            project: &project,
            character: None,
            target_persona: None,
            language: None,
        };

        let prompt = PromptComposer::new("ja").compose(
            "[{{language}}][{{character_section}}][{{target_persona_section}}][{{research_summary}}][{{hashtags}}]",
            &ctx,
        );

        assert_eq!(
            prompt,
            format!("[ja][][][{NO_RESEARCH_SUMMARY}][{NO_HASHTAGS}]")
        );
    }

    #[test]
    fn repeated_placeholders_are_replaced_identically() {
        let project = project(None, None);
        let ctx = PromptContext {
            project: &project,
            character: None,
            target_persona: None,
            language: Some("fr"),
        };

        let prompt = PromptComposer::new("ja")
            .compose("{{project_name}} / {{language}} / {{project_name}}", &ctx);

        assert_eq!(prompt, "Acme Rockets / fr / Acme Rockets");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let mut project = project(None, None);
        project.name = "{{hashtags}}".to_string();
        let ctx = PromptContext {
            project: &project,
            character: None,
            target_persona: None,
            language: None,
        };

        let composer = PromptComposer::new("ja");
        assert_eq!(composer.compose("{{project_name}}", &ctx), "{{hashtags}}");
        assert_eq!(
            composer.compose("{{unknown}} {{hashtags}}", &ctx),
            format!("{{{{unknown}}}} {NO_HASHTAGS}")
        );
    }
}
