use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::{Document, DocumentId, DocumentStatus, Structure};
use crate::generation::can_start_full_generation_with_references;
use crate::guard::JobStatusReport;

const TOTAL_POINTS: f64 = 12.0;

/// Weighted score over the structural pieces present, 0..=100. Display only.
pub fn completion_percentage(structure: &Structure) -> u8 {
    let mut points = 0.0;
    if !structure.contents.is_empty() {
        points += 1.5;
    }
    if !structure.objectives.is_empty() {
        points += 1.5;
    }
    if structure.references.iter().any(|r| !r.trim().is_empty()) {
        points += 2.0;
    }
    if !structure.detailed_contents.is_empty() {
        points += 4.0;
    }
    if has_text(structure.introduction.as_deref()) {
        points += 1.5;
    }
    if has_text(structure.conclusion.as_deref()) {
        points += 1.5;
    }
    ((points / TOTAL_POINTS) * 100.0).round().min(100.0) as u8
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub status_label: &'static str,
    pub status_color: &'static str,
    pub status_icon: &'static str,
    pub is_generating: bool,
    pub is_final: bool,
    pub is_failed: bool,
    pub can_start_base_generation: bool,
    pub can_start_full_generation: bool,
    pub is_fully_generated: bool,
    pub has_references: bool,
    pub completion_percentage: u8,
    pub error: Option<String>,
    pub job: JobStatusReport,
    pub updated_at: DateTime<Utc>,
}

impl StatusReport {
    pub fn new(document: &Document, job: JobStatusReport) -> Self {
        let status = document.status;
        let meta = status.meta();
        Self {
            document_id: document.id,
            status,
            status_label: meta.label,
            status_color: meta.color,
            status_icon: meta.icon,
            is_generating: status.is_generating(),
            is_final: status.is_final(),
            is_failed: status.is_failed(),
            can_start_base_generation: status.can_start_base_generation(),
            can_start_full_generation: can_start_full_generation_with_references(document),
            is_fully_generated: status.is_fully_generated(),
            has_references: document.has_references(),
            completion_percentage: completion_percentage(&document.structure),
            error: document.error_message.clone(),
            job,
            updated_at: document.updated_at,
        }
    }
}
