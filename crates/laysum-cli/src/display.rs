//! Terminal rendering for annotation sessions.
//!
//! Everything here builds strings so it can be tested without a terminal.
//! With `color` off, highlights are drawn with bracket markers instead of
//! crossterm styles.

use std::fmt::Write as _;

use crossterm::style::Stylize;

use laysum_core::annotation::{MAX_SCORE, UNSET};
use laysum_core::session::Progress;
use laysum_core::{
    Annotation, Aspect, Document, DocumentItem, HighlightStyle, LabelCategory, LabelStore, Segment,
};

const RULE: &str = "────────────────────────────────────────────────────────────";

/// Draw the summary with its highlights.
///
/// Plain markers: `[text => correction]` for corrected labels, `[text]` for
/// uncorrected ones and `<text>` for the pending selection. Labels whose
/// text is entirely covered by an earlier one are skipped; a covered pending
/// selection is still drawn, with its own text taken from `document`.
pub fn format_segments(document: &Document, segments: &[Segment], color: bool) -> String {
    let mut out = String::new();
    for segment in segments {
        let h = match segment {
            Segment::Plain { text, .. } => {
                out.push_str(text);
                continue;
            }
            Segment::Highlight(h) => h,
        };
        let text = match (h.style, h.text.is_empty()) {
            (HighlightStyle::Pending, true) => {
                document.slice(h.span.clone()).unwrap_or_default()
            }
            (_, true) => continue,
            (_, false) => h.text.as_str(),
        };
        let correction = h.corrected_text.as_deref().unwrap_or_default();
        match (h.style, color) {
            (HighlightStyle::Corrected, true) => {
                let _ = write!(
                    out,
                    "{}{}",
                    text.black().on_red(),
                    format!(" → {correction}").green()
                );
            }
            (HighlightStyle::Uncorrected, true) => {
                let _ = write!(out, "{}", text.black().on_yellow());
            }
            (HighlightStyle::Pending, true) => {
                let _ = write!(out, "{}", text.blue().underlined());
            }
            (HighlightStyle::Corrected, false) => {
                let _ = write!(out, "[{text} => {correction}]");
            }
            (HighlightStyle::Uncorrected, false) => {
                let _ = write!(out, "[{text}]");
            }
            (HighlightStyle::Pending, false) => {
                let _ = write!(out, "<{text}>");
            }
        }
    }
    out
}

/// Numbered label list, 1-based to match the `delete` command.
pub fn format_labels(labels: &LabelStore, document: &Document) -> String {
    if labels.is_empty() {
        return "  (no labels)\n".to_string();
    }
    let mut out = String::new();
    for (i, label) in labels.iter().enumerate() {
        let _ = write!(
            out,
            "  {:>2}. {:<24} {:>4}..{:<4} \"{}\"",
            i + 1,
            label.category.display_name(),
            label.start,
            label.end,
            label.original_text
        );
        if let Some(correction) = label.correction() {
            let _ = write!(out, " => \"{correction}\"");
        }
        if label.is_stale(document) {
            out.push_str("  (stale)");
        }
        out.push('\n');
    }
    out
}

/// Pager line: page numbers with ellipses over gaps, then progress.
pub fn format_nav(pages: &[usize], current: usize, progress: Progress) -> String {
    let mut out = String::new();
    let mut previous: Option<usize> = None;
    for &page in pages {
        if previous.is_some_and(|p| page > p + 1) {
            out.push_str(" …");
        }
        if page == current {
            let _ = write!(out, " *{}*", page + 1);
        } else {
            let _ = write!(out, " {}", page + 1);
        }
        previous = Some(page);
    }
    let _ = write!(
        out,
        "   {}/{} rated ({}%)",
        progress.started,
        progress.total,
        progress.percent()
    );
    out.trim_start().to_string()
}

fn format_score(value: u8) -> String {
    if value == UNSET {
        "-".to_string()
    } else {
        format!("{value}/{MAX_SCORE}")
    }
}

/// Full view of one item: source text, rendered summary, scores, labels.
pub fn format_card(
    index: usize,
    total: usize,
    item: &DocumentItem,
    annotation: &Annotation,
    document: &Document,
    segments: &[Segment],
    color: bool,
) -> String {
    let mut out = String::new();
    let status = if item.completed { "completed" } else { "open" };
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Summary {}/{}  [{}]  ({status})", index + 1, total, item.id);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Original text:\n{}\n", item.source_text);
    let _ = writeln!(out, "Summary:\n{}\n", format_segments(document, segments, color));

    out.push_str("Ratings:\n");
    for aspect in Aspect::ALL {
        let _ = writeln!(
            out,
            "  {:<18} {:>4}   {}",
            aspect.name(),
            format_score(annotation.scores.get(aspect)),
            aspect.description()
        );
    }
    out.push_str("\nLabels:\n");
    out.push_str(&format_labels(&annotation.labels, document));
    out
}

pub fn format_categories() -> String {
    let mut out = String::new();
    for category in LabelCategory::ALL {
        let _ = writeln!(out, "  {:<24} ({})", category.display_name(), category.key());
    }
    out
}

pub const HELP: &str = "\
Navigation:
  next | n, prev | p, first, last, goto <n>
Selecting text (byte offsets into the summary):
  select <start> <end>     select a range
  find <text>              select the first occurrence of text
  correct [text]           suggest a correction for the selection (empty clears)
  label <category>         confirm the selection with a category
  cancel                   drop the selection
Labels and ratings:
  delete <n>               delete label n
  rate <aspect> <0-5>      comprehensiveness, layness, factuality, usefulness
  categories               list label categories
Other:
  show, labels, submit, help, quit
";

#[cfg(test)]
mod tests {
    use super::*;
    use laysum_core::{PendingSelection, render};

    const SUMMARY: &str = "The drug reduced symptoms by 50%.";

    fn document() -> Document {
        Document::new("s1", SUMMARY)
    }

    fn labels() -> LabelStore {
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::EntityErrors, "50%", 29, 32, Some("30%".into()));
        labels.add(LabelCategory::Omission, "drug", 4, 8, None);
        labels
    }

    #[test]
    fn plain_markers() {
        let doc = document();
        let pending = PendingSelection::new("symptoms", 17, 25);
        let segments = render(&doc, &labels(), Some(&pending));
        assert_eq!(
            format_segments(&doc, &segments, false),
            "The [drug] reduced <symptoms> by [50% => 30%]."
        );
    }

    #[test]
    fn colored_output_keeps_text() {
        let doc = document();
        let segments = render(&doc, &labels(), None);
        let out = format_segments(&doc, &segments, true);
        assert!(out.contains("drug"));
        assert!(out.contains("→ 30%"));
        assert!(!out.contains("[drug]"));
    }

    #[test]
    fn nested_highlight_is_not_drawn_twice() {
        let doc = document();
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Feedback, "drug reduced", 4, 16, None);
        labels.add(LabelCategory::Omission, "drug", 4, 8, None);
        let segments = render(&doc, &labels, None);
        assert_eq!(
            format_segments(&doc, &segments, false),
            "The [drug reduced] symptoms by 50%."
        );
    }

    #[test]
    fn pending_inside_label_is_still_drawn() {
        let doc = document();
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Feedback, "drug reduced", 4, 16, None);
        let pending = PendingSelection::new("reduced", 9, 16);
        let segments = render(&doc, &labels, Some(&pending));
        assert_eq!(
            format_segments(&doc, &segments, false),
            "The [drug reduced]<reduced> symptoms by 50%."
        );
    }

    #[test]
    fn label_list_is_one_based() {
        let out = format_labels(&labels(), &document());
        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].trim_start().starts_with("1. Entity errors"));
        assert!(lines[0].ends_with("=> \"30%\""));
        assert!(lines[1].contains("\"drug\""));
        assert!(!out.contains("stale"));
    }

    #[test]
    fn stale_labels_are_marked() {
        let mut labels = LabelStore::new();
        labels.add(LabelCategory::Omission, "pill", 4, 8, None);
        assert!(format_labels(&labels, &document()).contains("(stale)"));
        assert_eq!(
            format_labels(&LabelStore::new(), &document()),
            "  (no labels)\n"
        );
    }

    #[test]
    fn nav_with_gaps() {
        let progress = Progress {
            started: 5,
            total: 20,
        };
        let nav = format_nav(&[0, 6, 7, 8, 19], 7, progress);
        assert_eq!(nav, "1 … 7 *8* 9 … 20   5/20 rated (25%)");
    }

    #[test]
    fn card_shows_scores_and_source() {
        let item = DocumentItem::new("s1", "Original abstract.", SUMMARY);
        let mut annotation = Annotation::new();
        annotation.scores.layness = 4;
        annotation.labels = labels();
        let doc = item.document();
        let segments = render(&doc, &annotation.labels, None);
        let card = format_card(0, 3, &item, &annotation, &doc, &segments, false);
        assert!(card.contains("Summary 1/3  [s1]  (open)"));
        assert!(card.contains("Original abstract."));
        assert!(card.contains("4/5"));
        assert!(card.contains("[50% => 30%]"));
        assert!(card.contains(" 2. Omission"));
    }

    #[test]
    fn categories_listed_with_keys() {
        let out = format_categories();
        assert_eq!(out.lines().count(), LabelCategory::ALL.len());
        assert!(out.contains("(entity-errors)"));
    }
}
