//! The closed set of error categories an annotator can attach to a span.
//!
//! The display name is the serialised form, matching what the annotation
//! service stores in a label's `type` field. Parsing is lenient: display
//! names, kebab-case keys and snake_case keys are all accepted, ignoring case.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelCategory {
    #[serde(rename = "Incorrect definitions")]
    IncorrectDefinitions,
    #[serde(rename = "Incorrect synonyms")]
    IncorrectSynonyms,
    #[serde(rename = "Entity errors")]
    EntityErrors,
    #[serde(rename = "Contradiction")]
    Contradiction,
    #[serde(rename = "Omission")]
    Omission,
    #[serde(rename = "Jumping to conclusions")]
    JumpingToConclusions,
    #[serde(rename = "Misinterpretation")]
    Misinterpretation,
    #[serde(rename = "Structural error")]
    StructuralError,
    #[serde(rename = "Hallucination")]
    Hallucination,
    #[serde(rename = "Grammatical error")]
    GrammaticalError,
    #[serde(rename = "Feedback")]
    Feedback,
}

impl LabelCategory {
    /// Every category, in picker order.
    pub const ALL: [LabelCategory; 11] = [
        Self::IncorrectDefinitions,
        Self::IncorrectSynonyms,
        Self::EntityErrors,
        Self::Contradiction,
        Self::Omission,
        Self::JumpingToConclusions,
        Self::Misinterpretation,
        Self::StructuralError,
        Self::Hallucination,
        Self::GrammaticalError,
        Self::Feedback,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::IncorrectDefinitions => "Incorrect definitions",
            Self::IncorrectSynonyms => "Incorrect synonyms",
            Self::EntityErrors => "Entity errors",
            Self::Contradiction => "Contradiction",
            Self::Omission => "Omission",
            Self::JumpingToConclusions => "Jumping to conclusions",
            Self::Misinterpretation => "Misinterpretation",
            Self::StructuralError => "Structural error",
            Self::Hallucination => "Hallucination",
            Self::GrammaticalError => "Grammatical error",
            Self::Feedback => "Feedback",
        }
    }

    /// Short kebab-case key, convenient for typed commands.
    pub fn key(self) -> &'static str {
        match self {
            Self::IncorrectDefinitions => "incorrect-definitions",
            Self::IncorrectSynonyms => "incorrect-synonyms",
            Self::EntityErrors => "entity-errors",
            Self::Contradiction => "contradiction",
            Self::Omission => "omission",
            Self::JumpingToConclusions => "jumping-to-conclusions",
            Self::Misinterpretation => "misinterpretation",
            Self::StructuralError => "structural-error",
            Self::Hallucination => "hallucination",
            Self::GrammaticalError => "grammatical-error",
            Self::Feedback => "feedback",
        }
    }
}

impl fmt::Display for LabelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for LabelCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_all_spellings() {
        for input in ["Entity errors", "entity-errors", "entity_errors", "ENTITY ERRORS"] {
            assert_eq!(
                input.parse::<LabelCategory>().unwrap(),
                LabelCategory::EntityErrors,
                "failed for {input:?}"
            );
        }
    }

    #[test]
    fn parse_unknown_is_error() {
        let err = "typo".parse::<LabelCategory>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownCategory(s) if s == "typo"));
    }

    #[test]
    fn every_key_parses_back() {
        for category in LabelCategory::ALL {
            assert_eq!(category.key().parse::<LabelCategory>().unwrap(), category);
            assert_eq!(
                category.display_name().parse::<LabelCategory>().unwrap(),
                category
            );
        }
    }

    #[test]
    fn serialises_as_display_name() {
        let json = serde_json::to_string(&LabelCategory::JumpingToConclusions).unwrap();
        assert_eq!(json, "\"Jumping to conclusions\"");
        let parsed: LabelCategory = serde_json::from_str("\"Omission\"").unwrap();
        assert_eq!(parsed, LabelCategory::Omission);
    }
}
