use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::document::model::{DetailedObjective, DetailedSection, Section, Structure};
use crate::generation::error::GenerationError;

/// Slices the span from the first `{` to the last `}`. Prose or markdown
/// fences around the object are tolerated; nothing inside it is repaired.
pub fn extract_json_object(text: &str) -> Result<&str, GenerationError> {
    let start = text
        .find('{')
        .ok_or_else(|| GenerationError::Parse("no `{` found in model output".to_owned()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| GenerationError::Parse("no `}` found in model output".to_owned()))?;
    if end <= start {
        return Err(GenerationError::Parse(
            "invalid json object span in model output".to_owned(),
        ));
    }
    Ok(&text[start..=end])
}

fn parse_object(raw: &str) -> Result<serde_json::Map<String, Value>, GenerationError> {
    let span = extract_json_object(raw)?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GenerationError::Parse("model output is not a JSON object".to_owned())),
        Err(err) => Err(GenerationError::Parse(format!("invalid JSON: {err}"))),
    }
}

fn required_list<T: DeserializeOwned>(
    map: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Vec<T>, GenerationError> {
    let value = map
        .get(key)
        .ok_or_else(|| GenerationError::Validation(format!("missing `{key}`")))?;
    let items: Vec<T> = serde_json::from_value(value.clone())
        .map_err(|err| GenerationError::Validation(format!("`{key}` has the wrong shape: {err}")))?;
    if items.is_empty() {
        return Err(GenerationError::Validation(format!("`{key}` is empty")));
    }
    Ok(items)
}

fn required_text(
    map: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<String, GenerationError> {
    let text = map
        .get(key)
        .ok_or_else(|| GenerationError::Validation(format!("missing `{key}`")))?
        .as_str()
        .ok_or_else(|| GenerationError::Validation(format!("`{key}` must be a string")))?
        .trim();
    if text.is_empty() {
        return Err(GenerationError::Validation(format!("`{key}` is empty")));
    }
    Ok(text.to_owned())
}

/// Objectives may come back as plain strings or as `{title, ...}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectiveItem {
    Text(String),
    Titled { title: String },
}

impl ObjectiveItem {
    fn into_text(self) -> String {
        match self {
            ObjectiveItem::Text(text) | ObjectiveItem::Titled { title: text } => {
                text.trim().to_owned()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureDraft {
    pub objectives: Vec<String>,
    pub contents: Vec<Section>,
}

impl StructureDraft {
    pub fn apply(self, structure: &mut Structure) {
        structure.objectives = self.objectives;
        structure.contents = self.contents;
    }
}

pub fn parse_structure_response(raw: &str) -> Result<StructureDraft, GenerationError> {
    let map = parse_object(raw)?;
    let objectives: Vec<String> = required_list::<ObjectiveItem>(&map, "objectives")?
        .into_iter()
        .map(ObjectiveItem::into_text)
        .filter(|objective| !objective.is_empty())
        .collect();
    if objectives.is_empty() {
        return Err(GenerationError::Validation("`objectives` is empty".to_owned()));
    }
    let contents = required_list::<Section>(&map, "contents")?;
    Ok(StructureDraft {
        objectives,
        contents,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailedDraft {
    pub introduction: String,
    pub conclusion: String,
    pub detailed_contents: Vec<DetailedSection>,
    pub detailed_objectives: Vec<DetailedObjective>,
}

impl DetailedDraft {
    pub fn apply(self, structure: &mut Structure) {
        structure.introduction = Some(self.introduction);
        structure.conclusion = Some(self.conclusion);
        structure.detailed_contents = self.detailed_contents;
        structure.detailed_objectives = self.detailed_objectives;
    }
}

/// All of `detailed_contents`, `introduction` and `conclusion` must be
/// present; there is no partial success.
pub fn parse_detailed_response(raw: &str) -> Result<DetailedDraft, GenerationError> {
    let map = parse_object(raw)?;
    let detailed_contents = required_list::<DetailedSection>(&map, "detailed_contents")?;
    let introduction = required_text(&map, "introduction")?;
    let conclusion = required_text(&map, "conclusion")?;
    let detailed_objectives = match map.get("detailed_objectives") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
            GenerationError::Validation(format!("`detailed_objectives` has the wrong shape: {err}"))
        })?,
    };
    Ok(DetailedDraft {
        introduction,
        conclusion,
        detailed_contents,
        detailed_objectives,
    })
}
