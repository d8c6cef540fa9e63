//! Per-document ratings and the record handed to persistence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::label::{Label, LabelStore};

pub const UNSET: u8 = 0;
pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// The quality dimensions every summary is rated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
    Comprehensiveness,
    Layness,
    Factuality,
    Usefulness,
}

impl Aspect {
    pub const ALL: [Aspect; 4] = [
        Self::Comprehensiveness,
        Self::Layness,
        Self::Factuality,
        Self::Usefulness,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Comprehensiveness => "comprehensiveness",
            Self::Layness => "layness",
            Self::Factuality => "factuality",
            Self::Usefulness => "usefulness",
        }
    }

    /// Guidance shown next to the rating control.
    pub fn description(self) -> &'static str {
        match self {
            Self::Comprehensiveness => "Is all necessary information captured in the summary?",
            Self::Layness => "How easy is it for a non-expert to understand the summary?",
            Self::Factuality => {
                "How accurately does the summary represent the facts from the original text?"
            }
            Self::Usefulness => {
                "How valuable is this summary for understanding the key points of the original text?"
            }
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Aspect {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        // "readability" is the older name for layness.
        let wanted = match lowered.as_str() {
            "readability" => "layness",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|a| a.name() == wanted || (wanted.len() >= 3 && a.name().starts_with(wanted)))
            .ok_or_else(|| CoreError::UnknownAspect(s.to_string()))
    }
}

/// The four ratings; `0` means not yet rated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub comprehensiveness: u8,
    pub layness: u8,
    pub factuality: u8,
    pub usefulness: u8,
}

impl Scores {
    pub fn new(comprehensiveness: u8, layness: u8, factuality: u8, usefulness: u8) -> Self {
        Self {
            comprehensiveness,
            layness,
            factuality,
            usefulness,
        }
    }

    pub fn get(&self, aspect: Aspect) -> u8 {
        match aspect {
            Aspect::Comprehensiveness => self.comprehensiveness,
            Aspect::Layness => self.layness,
            Aspect::Factuality => self.factuality,
            Aspect::Usefulness => self.usefulness,
        }
    }

    /// Set one rating. Accepts `1..=5`, or `0` to clear it.
    pub fn set(&mut self, aspect: Aspect, value: u8) -> Result<(), CoreError> {
        if value > MAX_SCORE {
            return Err(CoreError::InvalidScore { aspect, value });
        }
        let slot = match aspect {
            Aspect::Comprehensiveness => &mut self.comprehensiveness,
            Aspect::Layness => &mut self.layness,
            Aspect::Factuality => &mut self.factuality,
            Aspect::Usefulness => &mut self.usefulness,
        };
        *slot = value;
        Ok(())
    }

    /// All four ratings are in `1..=5`.
    pub fn is_complete(&self) -> bool {
        Aspect::ALL
            .iter()
            .all(|&a| (MIN_SCORE..=MAX_SCORE).contains(&self.get(a)))
    }

    /// At least one rating has been given.
    pub fn is_started(&self) -> bool {
        Aspect::ALL.iter().any(|&a| self.get(a) != UNSET)
    }

    /// Reject anything outside `0..=5`.
    pub fn validate(&self) -> Result<(), CoreError> {
        for aspect in Aspect::ALL {
            let value = self.get(aspect);
            if value > MAX_SCORE {
                return Err(CoreError::InvalidScore { aspect, value });
            }
        }
        Ok(())
    }
}

/// Ratings plus labels for one document, owned by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub scores: Scores,
    pub labels: LabelStore,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete once every rating is given; labels do not matter.
    pub fn is_complete(&self) -> bool {
        self.scores.is_complete()
    }

    pub fn is_started(&self) -> bool {
        self.scores.is_started()
    }

    pub fn to_record(&self, document_id: impl Into<String>) -> AnnotationRecord {
        AnnotationRecord {
            document_id: document_id.into(),
            scores: self.scores,
            labels: self.labels.as_slice().to_vec(),
        }
    }

    /// Overwrite ratings and labels from a saved record.
    pub fn restore(&mut self, record: AnnotationRecord) {
        self.scores = record.scores;
        self.labels.replace(record.labels);
    }
}

/// What gets persisted for one (user, document) pair.
///
/// Serialises to the service's submit body:
/// `{textId, comprehensiveness, layness, factuality, usefulness, labels}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "textId")]
    pub document_id: String,
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl AnnotationRecord {
    /// Check score bounds and that every label span is non-empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.scores.validate()?;
        if let Some(label) = self.labels.iter().find(|l| l.start >= l.end) {
            return Err(CoreError::InvalidRange {
                start: label.start,
                end: label.end,
            });
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.scores.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::LabelCategory;

    #[test]
    fn completion_gating() {
        assert!(!Scores::new(3, 0, 4, 5).is_complete());
        assert!(Scores::new(3, 2, 4, 5).is_complete());
    }

    #[test]
    fn completion_ignores_labels() {
        let mut annotation = Annotation::new();
        annotation.scores = Scores::new(3, 2, 4, 5);
        assert!(annotation.is_complete());
        annotation
            .labels
            .add(LabelCategory::Omission, "x", 0, 1, None);
        assert!(annotation.is_complete());
        annotation.scores = Scores::new(3, 0, 4, 5);
        assert!(!annotation.is_complete());
    }

    #[test]
    fn new_annotation_is_unset() {
        let annotation = Annotation::new();
        assert_eq!(annotation.scores, Scores::new(0, 0, 0, 0));
        assert!(annotation.labels.is_empty());
        assert!(!annotation.is_started());
    }

    #[test]
    fn set_rejects_out_of_range() {
        let mut scores = Scores::default();
        assert!(scores.set(Aspect::Factuality, 5).is_ok());
        assert!(matches!(
            scores.set(Aspect::Factuality, 6),
            Err(CoreError::InvalidScore {
                aspect: Aspect::Factuality,
                value: 6
            })
        ));
        assert_eq!(scores.factuality, 5);
        scores.set(Aspect::Factuality, 0).unwrap();
        assert!(!scores.is_started());
    }

    #[test]
    fn aspect_parsing() {
        assert_eq!("Layness".parse::<Aspect>().unwrap(), Aspect::Layness);
        assert_eq!("readability".parse::<Aspect>().unwrap(), Aspect::Layness);
        assert_eq!("fact".parse::<Aspect>().unwrap(), Aspect::Factuality);
        assert!("co".parse::<Aspect>().is_err());
        assert!("speed".parse::<Aspect>().is_err());
    }

    #[test]
    fn record_json_matches_submit_body() {
        let mut annotation = Annotation::new();
        annotation.scores = Scores::new(3, 2, 4, 5);
        annotation
            .labels
            .add(LabelCategory::EntityErrors, "50%", 29, 32, Some("30%".into()));
        let record = annotation.to_record("summary-1");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["textId"], "summary-1");
        assert_eq!(json["comprehensiveness"], 3);
        assert_eq!(json["layness"], 2);
        assert_eq!(json["usefulness"], 5);
        assert_eq!(json["labels"][0]["type"], "Entity errors");

        let parsed: AnnotationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn record_without_labels_parses() {
        let json = r#"{"textId": "s", "comprehensiveness": 1, "layness": 2, "factuality": 3, "usefulness": 4}"#;
        let record: AnnotationRecord = serde_json::from_str(json).unwrap();
        assert!(record.labels.is_empty());
        assert!(record.is_complete());
    }

    #[test]
    fn validate_rejects_empty_label_span() {
        let mut record = Annotation::new().to_record("s");
        assert!(record.validate().is_ok());
        record.labels.push(Label {
            category: LabelCategory::Feedback,
            original_text: String::new(),
            corrected_text: None,
            start: 4,
            end: 4,
        });
        assert!(matches!(
            record.validate(),
            Err(CoreError::InvalidRange { start: 4, end: 4 })
        ));
    }

    #[test]
    fn restore_replaces_labels_and_bumps_revision() {
        let mut annotation = Annotation::new();
        let revision = annotation.labels.revision();
        let mut saved = Annotation::new();
        saved.scores = Scores::new(1, 1, 1, 1);
        saved.labels.add(LabelCategory::Omission, "a", 0, 1, None);
        annotation.restore(saved.to_record("s"));
        assert_eq!(annotation, saved);
        assert!(annotation.labels.revision() > revision);
    }
}
