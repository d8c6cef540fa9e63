//! Documents under annotation and the assignment records that carry them.

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The immutable summary text being annotated.
///
/// All label and segment offsets are byte offsets into this string and must
/// fall on `char` boundaries. Cloning is cheap: the text is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: String,
    text: Arc<str>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Slice the document, or `None` if the range is reversed, out of bounds,
    /// or splits a code point.
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        self.text.get(range)
    }

    /// Whether `[start, end)` is a non-empty, valid slice of this document.
    pub fn is_valid_span(&self, start: usize, end: usize) -> bool {
        start < end && self.slice(start..end).is_some()
    }

    /// Whether both handles share the same underlying text allocation.
    pub fn same_text(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.text, &other.text)
    }

    /// Largest char boundary at or below `index`, clamped to the text length.
    pub(crate) fn floor_boundary(&self, index: usize) -> usize {
        let mut index = index.min(self.text.len());
        while !self.text.is_char_boundary(index) {
            index -= 1;
        }
        index
    }
}

/// One text/summary pair assigned to an annotator.
///
/// Field names follow the JSON shape served by the annotation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentItem {
    pub id: String,
    /// The source text the summary was written from.
    #[serde(rename = "text")]
    pub source_text: String,
    /// The candidate summary; this is what gets labelled.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl DocumentItem {
    pub fn new(
        id: impl Into<String>,
        source_text: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            summary: summary.into(),
            assigned_at: None,
            completed: false,
        }
    }

    /// Build the labelled [`Document`] for this item's summary.
    pub fn document(&self) -> Document {
        Document::new(self.id.clone(), self.summary.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_rejects_invalid_ranges() {
        let doc = Document::new("d1", "naïve text");
        assert_eq!(doc.slice(0..5), Some("naïv"));
        // 'ï' is two bytes starting at offset 2.
        assert_eq!(doc.slice(0..3), None);
        assert_eq!(doc.slice(4..2), None);
        assert_eq!(doc.slice(0..100), None);
    }

    #[test]
    fn valid_span_requires_non_empty() {
        let doc = Document::new("d1", "abc");
        assert!(doc.is_valid_span(0, 1));
        assert!(!doc.is_valid_span(1, 1));
        assert!(!doc.is_valid_span(2, 4));
    }

    #[test]
    fn floor_boundary_steps_back_inside_code_point() {
        let doc = Document::new("d1", "aé");
        assert_eq!(doc.floor_boundary(2), 1);
        assert_eq!(doc.floor_boundary(99), 3);
    }

    #[test]
    fn clones_share_text() {
        let doc = Document::new("d1", "shared");
        let other = doc.clone();
        assert!(doc.same_text(&other));
        assert!(!doc.same_text(&Document::new("d1", "shared")));
    }

    #[test]
    fn item_json_uses_service_field_names() {
        let json = r#"{
            "id": "s1",
            "text": "Original abstract.",
            "summary": "Plain summary.",
            "assigned_at": "2025-02-01T10:00:00Z",
            "completed": false
        }"#;
        let item: DocumentItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.source_text, "Original abstract.");
        assert!(item.assigned_at.is_some());
        assert_eq!(item.document().text(), "Plain summary.");
    }

    #[test]
    fn item_json_optional_fields_default() {
        let item: DocumentItem =
            serde_json::from_str(r#"{"id": "s2", "text": "t", "summary": "s"}"#).unwrap();
        assert!(item.assigned_at.is_none());
        assert!(!item.completed);
    }
}
