use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    PreGenerating,
    PreGenerated,
    PreGenerationFailed,
    FullGenerating,
    FullGenerated,
    FullGenerationFailed,
    Approved,
    Rejected,
}

use DocumentStatus::*;

/// Every permitted edge of the document lifecycle. Nothing outside this table
/// may change a document's status.
const TRANSITIONS: &[(DocumentStatus, DocumentStatus)] = &[
    (Draft, PreGenerating),
    (PreGenerating, PreGenerated),
    (PreGenerating, PreGenerationFailed),
    (PreGenerationFailed, PreGenerating),
    (PreGenerated, FullGenerating),
    (FullGenerating, FullGenerated),
    (FullGenerating, FullGenerationFailed),
    (FullGenerationFailed, FullGenerating),
    (FullGenerated, Approved),
    (FullGenerated, Rejected),
];

pub struct StatusMeta {
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 9] = [
        Draft,
        PreGenerating,
        PreGenerated,
        PreGenerationFailed,
        FullGenerating,
        FullGenerated,
        FullGenerationFailed,
        Approved,
        Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Draft => "draft",
            PreGenerating => "pre_generating",
            PreGenerated => "pre_generated",
            PreGenerationFailed => "pre_generation_failed",
            FullGenerating => "full_generating",
            FullGenerated => "full_generated",
            FullGenerationFailed => "full_generation_failed",
            Approved => "approved",
            Rejected => "rejected",
        }
    }

    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        TRANSITIONS
            .iter()
            .any(|&(from, to)| from == self && to == next)
    }

    pub fn is_generating(self) -> bool {
        matches!(self, PreGenerating | FullGenerating)
    }

    /// No automatic transition leaves this state without a user or operator.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            FullGenerated | Approved | Rejected | PreGenerationFailed | FullGenerationFailed
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self, PreGenerationFailed | FullGenerationFailed)
    }

    pub fn can_start_base_generation(self) -> bool {
        self.can_transition_to(PreGenerating)
    }

    pub fn can_start_full_generation(self) -> bool {
        self.can_transition_to(FullGenerating)
    }

    pub fn is_fully_generated(self) -> bool {
        matches!(self, FullGenerated | Approved | Rejected)
    }

    /// Ordinal position along the happy path; failure states sit with the
    /// stage they failed in.
    pub fn rank(self) -> u8 {
        match self {
            Draft => 0,
            PreGenerating | PreGenerationFailed => 1,
            PreGenerated => 2,
            FullGenerating | FullGenerationFailed => 3,
            FullGenerated => 4,
            Approved | Rejected => 5,
        }
    }

    pub fn meta(self) -> StatusMeta {
        let (label, color, icon) = match self {
            Draft => ("Draft", "gray", "edit"),
            PreGenerating => ("Generating structure", "blue", "hourglass"),
            PreGenerated => ("Structure ready", "cyan", "list"),
            PreGenerationFailed => ("Structure generation failed", "red", "alert"),
            FullGenerating => ("Generating document", "indigo", "hourglass"),
            FullGenerated => ("Document ready", "green", "check"),
            FullGenerationFailed => ("Document generation failed", "red", "alert"),
            Approved => ("Approved", "teal", "thumb-up"),
            Rejected => ("Rejected", "orange", "thumb-down"),
        };
        StatusMeta { label, color, icon }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_permitted() {
        let path = [
            Draft,
            PreGenerating,
            PreGenerated,
            FullGenerating,
            FullGenerated,
            Approved,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_states_allow_retry_only_of_their_own_stage() {
        assert!(PreGenerationFailed.can_transition_to(PreGenerating));
        assert!(!PreGenerationFailed.can_transition_to(FullGenerating));
        assert!(FullGenerationFailed.can_transition_to(FullGenerating));
        assert!(!FullGenerationFailed.can_transition_to(PreGenerating));
    }

    #[test]
    fn fully_generated_never_moves_backward() {
        for next in DocumentStatus::ALL {
            if FullGenerated.can_transition_to(next) {
                assert!(next.rank() > FullGenerated.rank(), "regressed to {next}");
            }
        }
    }

    #[test]
    fn no_status_transitions_to_itself() {
        for status in DocumentStatus::ALL {
            assert!(!status.can_transition_to(status), "{status}");
        }
    }

    #[test]
    fn start_predicates_follow_the_table() {
        let base: Vec<_> = DocumentStatus::ALL
            .into_iter()
            .filter(|s| s.can_start_base_generation())
            .collect();
        assert_eq!(base, vec![Draft, PreGenerationFailed]);

        let full: Vec<_> = DocumentStatus::ALL
            .into_iter()
            .filter(|s| s.can_start_full_generation())
            .collect();
        assert_eq!(full, vec![PreGenerated, FullGenerationFailed]);
    }

    #[test]
    fn generating_and_final_are_disjoint() {
        for status in DocumentStatus::ALL {
            assert!(!(status.is_generating() && status.is_final()), "{status}");
        }
    }

    #[test]
    fn serde_uses_snake_case() -> anyhow::Result<()> {
        let json = serde_json::to_string(&FullGenerationFailed)?;
        assert_eq!(json, "\"full_generation_failed\"");
        let back: DocumentStatus = serde_json::from_str("\"pre_generated\"")?;
        assert_eq!(back, PreGenerated);
        Ok(())
    }
}
