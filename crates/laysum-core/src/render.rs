//! Highlight rendering: document + labels → ordered display segments.
//!
//! Concatenating the `text` of every emitted segment reproduces the document
//! exactly, for any collection of well-formed labels, overlapping or not.
//!
//! Highlights are processed in ascending start order; co-starting labels
//! keep collection order and the pending selection sorts after them. A
//! highlight that starts inside text already emitted is still emitted as its
//! own segment with its full `span` and metadata, but its `text` only covers
//! the part not yet emitted, which is empty for a fully nested label.
//!
//! A stale label (recorded text no longer matching the document) is drawn
//! with its recorded text, unless it starts inside text already emitted, in
//! which case it is clipped like any other stacked highlight.

use std::ops::Range;

use tracing::warn;

use crate::category::LabelCategory;
use crate::document::Document;
use crate::label::{LabelStore, PendingSelection};
use crate::resolver::TextLeaf;

/// How a highlighted segment should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HighlightStyle {
    /// A committed label suggesting a real substitution.
    Corrected,
    /// A committed label with no correction, or an identity correction.
    Uncorrected,
    /// The unconfirmed in-flight selection.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub text: String,
    /// Document range of `text`.
    pub range: Range<usize>,
    /// Full range of the label this segment draws.
    pub span: Range<usize>,
    /// `None` for the pending selection.
    pub category: Option<LabelCategory>,
    pub corrected_text: Option<String>,
    /// Position in the label collection; `None` for the pending selection.
    pub label_index: Option<usize>,
    pub style: HighlightStyle,
}

impl Highlight {
    /// Whether part of this label's span was already drawn by an earlier one.
    pub fn is_stacked(&self) -> bool {
        self.range.start > self.span.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain { text: String, range: Range<usize> },
    Highlight(Highlight),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain { text, .. } => text,
            Segment::Highlight(h) => &h.text,
        }
    }

    pub fn range(&self) -> Range<usize> {
        match self {
            Segment::Plain { range, .. } => range.clone(),
            Segment::Highlight(h) => h.range.clone(),
        }
    }

    pub fn highlight(&self) -> Option<&Highlight> {
        match self {
            Segment::Highlight(h) => Some(h),
            Segment::Plain { .. } => None,
        }
    }

    pub fn label_index(&self) -> Option<usize> {
        self.highlight().and_then(|h| h.label_index)
    }
}

impl TextLeaf for Segment {
    fn text(&self) -> &str {
        Segment::text(self)
    }

    fn doc_range(&self) -> Range<usize> {
        self.range()
    }
}

/// Concatenate segment texts; equals the document for well-formed input.
pub fn reassemble(segments: &[Segment]) -> String {
    segments.iter().map(Segment::text).collect()
}

struct Mark<'a> {
    start: usize,
    end: usize,
    original_text: &'a str,
    corrected_text: Option<&'a str>,
    category: Option<LabelCategory>,
    label_index: Option<usize>,
    style: HighlightStyle,
}

/// Render `document` with `labels` and an optional pending selection.
pub fn render(
    document: &Document,
    labels: &LabelStore,
    pending: Option<&PendingSelection>,
) -> Vec<Segment> {
    let mut marks: Vec<Mark<'_>> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| Mark {
            start: label.start,
            end: label.end,
            original_text: &label.original_text,
            corrected_text: label.corrected_text.as_deref(),
            category: Some(label.category),
            label_index: Some(index),
            style: if label.has_correction() {
                HighlightStyle::Corrected
            } else {
                HighlightStyle::Uncorrected
            },
        })
        .collect();
    if let Some(p) = pending {
        marks.push(Mark {
            start: p.start,
            end: p.end,
            original_text: &p.original_text,
            corrected_text: p.corrected_text.as_deref(),
            category: None,
            label_index: None,
            style: HighlightStyle::Pending,
        });
    }
    // Stable: co-starting marks keep collection order, pending last.
    marks.sort_by_key(|m| m.start);

    let mut segments = Vec::with_capacity(marks.len() * 2 + 1);
    let mut last_end = 0;

    for mark in &marks {
        let fresh = document.is_valid_span(mark.start, mark.end)
            && document.slice(mark.start..mark.end) == Some(mark.original_text);

        let start = document.floor_boundary(mark.start);
        let end = document.floor_boundary(mark.end).max(start);

        if start > last_end {
            push_plain(document, &mut segments, last_end..start);
        }

        let from = start.max(last_end);
        let to = end.max(from);
        if !fresh {
            warn!(
                document = document.id(),
                label_index = ?mark.label_index,
                start = mark.start,
                end = mark.end,
                recorded = mark.original_text,
                "stale label: recorded text does not match document"
            );
        }
        // The recorded text can only stand in for its whole range; once part
        // of that range has been drawn, the rest comes from the document.
        let text = if fresh || from > start {
            document.text()[from..to].to_string()
        } else {
            mark.original_text.to_string()
        };
        let range = from..to;

        segments.push(Segment::Highlight(Highlight {
            text,
            range,
            span: mark.start..mark.end,
            category: mark.category,
            corrected_text: mark.corrected_text.map(str::to_string),
            label_index: mark.label_index,
            style: mark.style,
        }));

        last_end = last_end.max(end);
    }

    if last_end < document.len() {
        push_plain(document, &mut segments, last_end..document.len());
    }
    segments
}

fn push_plain(document: &Document, segments: &mut Vec<Segment>, range: Range<usize>) {
    let text = document.text()[range.clone()].to_string();
    segments.push(Segment::Plain { text, range });
}

/// Memoised [`render`] output, keyed on the document, the label store
/// revision and the pending selection.
#[derive(Debug, Default)]
pub struct RenderCache {
    key: Option<CacheKey>,
    segments: Vec<Segment>,
}

#[derive(Debug)]
struct CacheKey {
    document: Document,
    revision: u64,
    pending: Option<PendingSelection>,
}

impl CacheKey {
    fn matches(
        &self,
        document: &Document,
        labels: &LabelStore,
        pending: Option<&PendingSelection>,
    ) -> bool {
        self.document.same_text(document)
            && self.document.id() == document.id()
            && self.revision == labels.revision()
            && self.pending.as_ref() == pending
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments for the given inputs, re-rendering only if they changed.
    pub fn get_or_render(
        &mut self,
        document: &Document,
        labels: &LabelStore,
        pending: Option<&PendingSelection>,
    ) -> &[Segment] {
        let fresh = self
            .key
            .as_ref()
            .is_some_and(|key| key.matches(document, labels, pending));
        if !fresh {
            self.segments = render(document, labels, pending);
            self.key = Some(CacheKey {
                document: document.clone(),
                revision: labels.revision(),
                pending: pending.cloned(),
            });
        }
        &self.segments
    }

    /// Segments from the last render, if any.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "The drug reduced symptoms by 50%.";

    fn plain(text: &str, range: Range<usize>) -> Segment {
        Segment::Plain {
            text: text.into(),
            range,
        }
    }

    #[test]
    fn no_labels_single_plain_segment() {
        let doc = Document::new("d", "The drug reduced symptoms.");
        let segments = render(&doc, &LabelStore::new(), None);
        assert_eq!(segments, vec![plain("The drug reduced symptoms.", 0..26)]);
    }

    #[test]
    fn empty_document_renders_nothing() {
        let doc = Document::new("d", "");
        assert!(render(&doc, &LabelStore::new(), None).is_empty());
    }

    #[test]
    fn single_correction_three_segments() {
        let doc = Document::new("d", DOC);
        assert_eq!(doc.len(), 33);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "50%", 29, 32, Some("30%".into()));

        let segments = render(&doc, &labels, None);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], plain("The drug reduced symptoms by ", 0..29));
        let h = segments[1].highlight().unwrap();
        assert_eq!(h.text, "50%");
        assert_eq!(h.range, 29..32);
        assert_eq!(h.style, HighlightStyle::Corrected);
        assert_eq!(h.category, Some(LabelCategory::EntityErrors));
        assert_eq!(h.corrected_text.as_deref(), Some("30%"));
        assert_eq!(h.label_index, Some(0));
        assert_eq!(segments[2], plain(".", 32..33));
        assert_eq!(reassemble(&segments), DOC);
    }

    #[test]
    fn delete_then_rerender_matches_no_labels() {
        let doc = Document::new("d", DOC);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "50%", 29, 32, Some("30%".into()));
        labels.remove_at(0).unwrap();
        assert!(labels.is_empty());
        assert_eq!(render(&doc, &labels, None), render(&doc, &LabelStore::new(), None));
        assert_eq!(render(&doc, &labels, None), vec![plain(DOC, 0..33)]);
    }

    #[test]
    fn identity_correction_renders_uncorrected() {
        let doc = Document::new("d", DOC);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "50%", 29, 32, Some("50%".into()));
        labels.add(LabelCategory::Omission, "drug", 4, 8, None);
        let segments = render(&doc, &labels, None);
        let styles: Vec<_> = segments
            .iter()
            .filter_map(|s| s.highlight().map(|h| h.style))
            .collect();
        assert_eq!(
            styles,
            vec![HighlightStyle::Uncorrected, HighlightStyle::Uncorrected]
        );
    }

    #[test]
    fn label_index_is_collection_order_not_render_order() {
        let doc = Document::new("d", DOC);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "50%", 29, 32, None);
        labels.add(LabelCategory::Omission, "drug", 4, 8, None);
        let indices: Vec<_> = render(&doc, &labels, None)
            .iter()
            .filter_map(Segment::label_index)
            .collect();
        assert_eq!(indices, vec![1, 0]);
    }

    #[test]
    fn overlapping_labels_keep_round_trip() {
        let text = "abcdefghijklmnopqrst";
        let doc = Document::new("d", text);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Contradiction, &text[0..10], 0, 10, None);
        labels.add(LabelCategory::Hallucination, &text[5..15], 5, 15, None);

        let segments = render(&doc, &labels, None);
        assert_eq!(reassemble(&segments), text);
        assert_eq!(reassemble(&segments).len(), 20);

        let second = segments[1].highlight().unwrap();
        assert_eq!(second.span, 5..15);
        assert_eq!(second.range, 10..15);
        assert!(second.is_stacked());

        assert_eq!(labels.get(0).unwrap().span(), 0..10);
        assert_eq!(labels.get(1).unwrap().span(), 5..15);
    }

    #[test]
    fn nested_label_emits_empty_segment() {
        let text = "abcdefghijklmnopqrst";
        let doc = Document::new("d", text);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Contradiction, &text[2..12], 2, 12, None);
        labels.add(LabelCategory::Feedback, &text[4..6], 4, 6, None);

        let segments = render(&doc, &labels, None);
        assert_eq!(reassemble(&segments), text);
        let nested = segments
            .iter()
            .filter_map(Segment::highlight)
            .find(|h| h.label_index == Some(1))
            .unwrap();
        assert_eq!(nested.text, "");
        assert_eq!(nested.span, 4..6);
    }

    #[test]
    fn co_starting_labels_keep_collection_order() {
        let text = "abcdefghijklmnopqrst";
        let doc = Document::new("d", text);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Omission, &text[3..5], 3, 5, None);
        labels.add(LabelCategory::Feedback, &text[3..9], 3, 9, None);
        let pending = PendingSelection::new(&text[3..4], 3, 4);

        let segments = render(&doc, &labels, Some(&pending));
        let order: Vec<_> = segments
            .iter()
            .filter_map(Segment::highlight)
            .map(|h| (h.label_index, h.style))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some(0), HighlightStyle::Uncorrected),
                (Some(1), HighlightStyle::Uncorrected),
                (None, HighlightStyle::Pending),
            ]
        );
        assert_eq!(reassemble(&segments), text);
    }

    #[test]
    fn pending_selection_renders_pending_style() {
        let doc = Document::new("d", DOC);
        let pending = PendingSelection::new("drug", 4, 8);
        let segments = render(&doc, &LabelStore::new(), Some(&pending));
        assert_eq!(segments.len(), 3);
        let h = segments[1].highlight().unwrap();
        assert_eq!(h.style, HighlightStyle::Pending);
        assert_eq!(h.label_index, None);
        assert_eq!(h.category, None);
        assert_eq!(reassemble(&segments), DOC);
    }

    #[test]
    fn round_trip_over_many_layouts() {
        let text = "Patients given the drug slept longer and reported fewer headaches.";
        let doc = Document::new("d", text);
        let spans = [(0, 8), (6, 14), (15, 23), (15, 20), (40, 66), (50, 55), (60, 66)];
        for mask in 0u32..(1 << spans.len()) {
            let mut labels = LabelStore::new();
            for (i, &(s, e)) in spans.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    labels.add(LabelCategory::Feedback, &text[s..e], s, e, None);
                }
            }
            let pending = PendingSelection::new(&text[10..30], 10, 30);
            assert_eq!(reassemble(&render(&doc, &labels, None)), text, "mask {mask}");
            assert_eq!(
                reassemble(&render(&doc, &labels, Some(&pending))),
                text,
                "mask {mask} with pending"
            );
        }
    }

    #[test]
    fn multibyte_text_round_trips() {
        let text = "Übelkeit trat bei 5 % auf — selten.";
        let doc = Document::new("d", text);
        let start = text.find("5 %").unwrap();
        let end = start + "5 %".len();
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "5 %", start, end, Some("15 %".into()));
        labels.add(LabelCategory::Feedback, "Übelkeit", 0, "Übelkeit".len(), None);
        assert_eq!(reassemble(&render(&doc, &labels, None)), text);
    }

    #[test]
    fn stale_label_renders_recorded_text() {
        let doc = Document::new("d", DOC);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "40%", 29, 32, None);
        let segments = render(&doc, &labels, None);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].text(), "40%");
        assert_eq!(segments[1].range(), 29..32);
    }

    #[test]
    fn stale_label_overlapping_earlier_label_is_clipped() {
        let text = "abcdefghijklmnopqrst";
        let doc = Document::new("d", text);
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Contradiction, &text[0..10], 0, 10, None);
        labels.add(LabelCategory::Hallucination, "zzzzzzzzzz", 5, 15, None);

        let segments = render(&doc, &labels, None);
        assert_eq!(segments.len(), 3);
        let stale = segments[1].highlight().unwrap();
        assert_eq!(stale.text, "klmno");
        assert_eq!(stale.range, 10..15);
        assert_eq!(stale.span, 5..15);
        assert_eq!(reassemble(&segments), text);

        let ranges: Vec<_> = segments.iter().map(Segment::range).collect();
        assert!(ranges.windows(2).all(|w| w[0].end <= w[1].start));
    }

    #[test]
    fn stale_label_out_of_bounds_does_not_panic() {
        let doc = Document::new("d", "short");
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Omission, "gone", 10, 14, None);
        let segments = render(&doc, &labels, None);
        assert_eq!(segments[0].text(), "short");
        assert_eq!(segments[1].text(), "gone");
        assert_eq!(segments[1].range(), 5..5);
    }

    #[test]
    fn cache_reuses_until_inputs_change() {
        let doc = Document::new("d", DOC);
        let mut labels = LabelStore::new();
        let mut cache = RenderCache::new();

        let first = cache.get_or_render(&doc, &labels, None).to_vec();
        assert_eq!(first.len(), 1);

        labels.add(LabelCategory::EntityErrors, "50%", 29, 32, None);
        assert_eq!(cache.get_or_render(&doc, &labels, None).len(), 3);

        let pending = PendingSelection::new("drug", 4, 8);
        assert_eq!(cache.get_or_render(&doc, &labels, Some(&pending)).len(), 5);
        assert_eq!(cache.get_or_render(&doc, &labels, None).len(), 3);

        let other = Document::new("e", "Different text.");
        assert_eq!(
            reassemble(cache.get_or_render(&other, &LabelStore::new(), None)),
            "Different text."
        );
    }
}
