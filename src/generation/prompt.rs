use anyhow::Context as _;
use serde::Serialize;

use crate::document::Document;
use crate::document::model::Section;

pub const SYSTEM_PROMPT: &str = "You are an experienced academic writer. \
You always answer with a single JSON object and nothing else.";

#[derive(Serialize)]
struct StructureInput<'a> {
    title: &'a str,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    theses: Option<&'a str>,
    #[serde(skip_serializing_if = "no_entries")]
    references: &'a [String],
}

#[derive(Serialize)]
struct DetailedInput<'a> {
    title: &'a str,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    theses: Option<&'a str>,
    objectives: &'a [String],
    contents: &'a [Section],
    references: &'a [String],
}

fn no_entries(list: &&[String]) -> bool {
    list.is_empty()
}

pub fn structure_prompt(document: &Document) -> anyhow::Result<String> {
    let input = StructureInput {
        title: &document.title,
        topic: &document.structure.topic,
        theses: document.structure.theses.as_deref(),
        references: &document.structure.references,
    };
    let input_json =
        serde_json::to_string_pretty(&input).context("serialize structure prompt input")?;

    Ok(format!(
        "Task: Plan the structure of an academic paper.\n\
\n\
BEGIN_DOCUMENT_JSON\n\
{input_json}\n\
END_DOCUMENT_JSON\n\
\n\
Hard rules:\n\
- `objectives` MUST contain at least 3 concise research objectives.\n\
- `contents` MUST contain at least 3 sections.\n\
- Each section MUST have a non-empty `title` and at least 2 `subtopics`.\n\
- Each subtopic MUST have `title` and a one-paragraph `content` summary.\n\
\n\
Output:\n\
- Output ONLY a single JSON object (no markdown fences, no commentary).\n\
- Schema:\n\
  {{\"objectives\":[\"...\"],\"contents\":[{{\"title\":\"...\",\"subtopics\":[{{\"title\":\"...\",\"content\":\"...\"}}]}}]}}\n",
        input_json = input_json.trim_end(),
    ))
}

pub fn detailed_prompt(document: &Document) -> anyhow::Result<String> {
    let input = DetailedInput {
        title: &document.title,
        topic: &document.structure.topic,
        theses: document.structure.theses.as_deref(),
        objectives: &document.structure.objectives,
        contents: &document.structure.contents,
        references: &document.structure.references,
    };
    let input_json =
        serde_json::to_string_pretty(&input).context("serialize detailed prompt input")?;

    Ok(format!(
        "Task: Write the full text of an academic paper from its approved outline.\n\
\n\
BEGIN_DOCUMENT_JSON\n\
{input_json}\n\
END_DOCUMENT_JSON\n\
\n\
You MUST:\n\
- Keep the section order and titles from `contents`.\n\
- Expand every subtopic into several paragraphs of prose.\n\
- Cite the provided `references` where relevant.\n\
\n\
Hard rules:\n\
- `introduction` MUST be non-empty prose.\n\
- `detailed_objectives` MUST describe each objective.\n\
- `detailed_contents` MUST contain one entry per section, each subtopic with `content`, `examples` and `key_points`.\n\
- `conclusion` MUST be non-empty prose.\n\
\n\
Output:\n\
- Output ONLY a single JSON object (no markdown fences, no commentary).\n\
- Schema:\n\
  {{\"introduction\":\"...\",\"detailed_objectives\":[{{\"title\":\"...\",\"description\":\"...\"}}],\"detailed_contents\":[{{\"title\":\"...\",\"introduction\":\"...\",\"subtopics\":[{{\"title\":\"...\",\"content\":\"...\",\"examples\":[\"...\"],\"key_points\":[\"...\"]}}]}}],\"conclusion\":\"...\"}}\n",
        input_json = input_json.trim_end(),
    ))
}
