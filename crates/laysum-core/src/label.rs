//! Labels, the pending selection, and the ordered label collection.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Document;
use crate::category::LabelCategory;

/// A typed error span over a [`Document`], with an optional correction.
///
/// Serialises to the service's label shape:
/// `{type, text, correctedText?, startIndex, endIndex}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(rename = "type")]
    pub category: LabelCategory,
    #[serde(rename = "text")]
    pub original_text: String,
    #[serde(
        rename = "correctedText",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub corrected_text: Option<String>,
    #[serde(rename = "startIndex")]
    pub start: usize,
    #[serde(rename = "endIndex")]
    pub end: usize,
}

impl Label {
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The suggested replacement, if it actually differs from the original.
    pub fn correction(&self) -> Option<&str> {
        effective_correction(&self.original_text, self.corrected_text.as_deref())
    }

    pub fn has_correction(&self) -> bool {
        self.correction().is_some()
    }

    /// Whether the recorded text no longer matches the document slice.
    pub fn is_stale(&self, document: &Document) -> bool {
        document.slice(self.span()) != Some(self.original_text.as_str()) || self.start >= self.end
    }
}

fn effective_correction<'a>(original: &str, corrected: Option<&'a str>) -> Option<&'a str> {
    corrected.filter(|c| *c != original)
}

/// The in-flight selection before a category has been chosen.
///
/// At most one exists per session; it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelection {
    pub original_text: String,
    pub corrected_text: Option<String>,
    pub start: usize,
    pub end: usize,
}

impl PendingSelection {
    pub fn new(original_text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            original_text: original_text.into(),
            corrected_text: None,
            start,
            end,
        }
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn correction(&self) -> Option<&str> {
        effective_correction(&self.original_text, self.corrected_text.as_deref())
    }

    /// Commit this selection under `category`.
    pub fn into_label(self, category: LabelCategory) -> Label {
        Label {
            category,
            original_text: self.original_text,
            corrected_text: self.corrected_text,
            start: self.start,
            end: self.end,
        }
    }
}

/// Ordered label collection for the document currently displayed.
///
/// Labels keep insertion order and are addressed by position. Overlapping
/// spans are allowed; the renderer deals with them. Every mutation bumps
/// [`revision`](Self::revision), which render caches key on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Label>", into = "Vec<Label>")]
pub struct LabelStore {
    labels: Vec<Label>,
    revision: u64,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new label. No merging or deduplication happens here.
    pub fn add(
        &mut self,
        category: LabelCategory,
        original_text: impl Into<String>,
        start: usize,
        end: usize,
        corrected_text: Option<String>,
    ) {
        self.push(Label {
            category,
            original_text: original_text.into(),
            corrected_text,
            start,
            end,
        });
    }

    pub fn push(&mut self, label: Label) {
        self.labels.push(label);
        self.revision += 1;
    }

    /// Remove the label at `index` in collection order.
    ///
    /// Out-of-range indices are a no-op and return `None`.
    pub fn remove_at(&mut self, index: usize) -> Option<Label> {
        if index >= self.labels.len() {
            debug!(index, len = self.labels.len(), "ignoring out-of-range label removal");
            return None;
        }
        self.revision += 1;
        Some(self.labels.remove(index))
    }

    /// Swap in a whole collection, e.g. when restoring a saved annotation.
    pub fn replace(&mut self, labels: Vec<Label>) {
        self.labels = labels;
        self.revision += 1;
    }

    pub fn get(&self, index: usize) -> Option<&Label> {
        self.labels.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.labels.iter()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl PartialEq for LabelStore {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for LabelStore {}

impl From<Vec<Label>> for LabelStore {
    fn from(labels: Vec<Label>) -> Self {
        Self {
            labels,
            revision: 0,
        }
    }
}

impl From<LabelStore> for Vec<Label> {
    fn from(store: LabelStore) -> Self {
        store.labels
    }
}

impl<'a> IntoIterator for &'a LabelStore {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}
