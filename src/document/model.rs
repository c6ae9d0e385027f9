use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::status::DocumentStatus;

pub type DocumentId = uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub user_id: String,
    pub title: String,
    pub status: DocumentStatus,
    pub structure: Structure,
    #[serde(default)]
    pub gpt_settings: Option<GptSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new_draft(
        user_id: impl Into<String>,
        title: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            status: DocumentStatus::Draft,
            structure: Structure {
                topic: topic.into(),
                ..Structure::default()
            },
            gpt_settings: None,
            thread_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Objectives and an outline are both present.
    pub fn has_minimal_structure(&self) -> bool {
        !self.structure.objectives.is_empty() && !self.structure.contents.is_empty()
    }

    pub fn has_references(&self) -> bool {
        self.structure
            .references
            .iter()
            .any(|reference| !reference.trim().is_empty())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// User-supplied fields for a new DRAFT document.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub user_id: String,
    pub title: String,
    pub topic: String,
    #[serde(default)]
    pub theses: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub gpt_settings: Option<GptSettings>,
}

impl NewDocument {
    pub fn into_document(self) -> anyhow::Result<Document> {
        if self.user_id.trim().is_empty() {
            anyhow::bail!("user_id is required");
        }
        if self.title.trim().is_empty() {
            anyhow::bail!("title is required");
        }
        if self.topic.trim().is_empty() {
            anyhow::bail!("topic is required");
        }
        let mut document =
            Document::new_draft(self.user_id.trim(), self.title.trim(), self.topic.trim());
        document.structure.theses = self.theses.filter(|t| !t.trim().is_empty());
        document.structure.references = self
            .references
            .into_iter()
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty())
            .collect();
        document.gpt_settings = self.gpt_settings;
        Ok(document)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Structure {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub theses: Option<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub contents: Vec<Section>,
    #[serde(default)]
    pub references: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detailed_contents: Vec<DetailedSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detailed_objectives: Vec<DetailedObjective>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtopic {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailedSection {
    pub title: String,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub subtopics: Vec<DetailedSubtopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailedSubtopic {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailedObjective {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Per-document override of the backend used for generation. Missing fields
/// fall back to the stage defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GptSettings {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGptSettings {
    pub service: String,
    pub model: String,
    pub temperature: f32,
}

impl GptSettings {
    pub fn resolve(settings: Option<&Self>, defaults: &ResolvedGptSettings) -> ResolvedGptSettings {
        let Some(settings) = settings else {
            return defaults.clone();
        };
        ResolvedGptSettings {
            service: non_empty(settings.service.as_deref())
                .unwrap_or_else(|| defaults.service.clone()),
            model: non_empty(settings.model.as_deref()).unwrap_or_else(|| defaults.model.clone()),
            temperature: settings.temperature.unwrap_or(defaults.temperature),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ResolvedGptSettings {
        ResolvedGptSettings {
            service: "openai".to_owned(),
            model: "gpt-3.5-turbo".to_owned(),
            temperature: 0.7,
        }
    }

    #[test]
    fn resolve_without_override_uses_defaults() {
        assert_eq!(GptSettings::resolve(None, &defaults()), defaults());
    }

    #[test]
    fn resolve_merges_partial_override() {
        let settings = GptSettings {
            service: Some("  ".to_owned()),
            model: Some("gpt-4o".to_owned()),
            temperature: None,
        };
        let resolved = GptSettings::resolve(Some(&settings), &defaults());
        assert_eq!(resolved.service, "openai");
        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(resolved.temperature, 0.7);
    }

    #[test]
    fn blank_references_do_not_count() {
        let mut doc = Document::new_draft("u1", "Essay", "Topic");
        assert!(!doc.has_references());
        doc.structure.references = vec![" ".to_owned()];
        assert!(!doc.has_references());
        doc.structure.references.push("Smith, J. (2020). Plants.".to_owned());
        assert!(doc.has_references());
    }
}
