//! Offset resolution: rendered selection endpoints → document offsets.
//!
//! A rendered document is a sequence of text-bearing leaves (plain runs and
//! highlighted runs). A selection names its endpoints as `(leaf, offset)`
//! pairs in that sequence. Because each leaf knows which document range it
//! came from, mapping back never depends on how much markup wraps the
//! leaves before it.
//!
//! The inverse, [`point_for_offset`], walks the same leaves accumulating
//! length; front ends without a native selection API (the terminal client)
//! use it to build selections from document offsets.

use std::ops::Range;

use tracing::warn;

use crate::document::Document;
use crate::error::SelectionError;

/// A rendered run of document text with a known document range.
pub trait TextLeaf {
    /// The text this leaf displays.
    fn text(&self) -> &str;

    /// The document range the displayed text was taken from.
    fn doc_range(&self) -> Range<usize>;
}

/// One selection endpoint: a leaf index plus a byte offset inside that leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SelectionPoint {
    pub leaf: usize,
    pub offset: usize,
}

impl SelectionPoint {
    pub fn new(leaf: usize, offset: usize) -> Self {
        Self { leaf, offset }
    }
}

/// A live selection as reported by the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Where the drag started.
    pub anchor: SelectionPoint,
    /// Where the drag currently ends; may precede the anchor.
    pub focus: SelectionPoint,
    /// The text the front end believes is selected, if it reports one.
    pub reported_text: Option<String>,
}

impl Selection {
    pub fn new(anchor: SelectionPoint, focus: SelectionPoint) -> Self {
        Self {
            anchor,
            focus,
            reported_text: None,
        }
    }

    pub fn with_reported_text(mut self, text: impl Into<String>) -> Self {
        self.reported_text = Some(text.into());
        self
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Endpoints in tree order: the start container comes first.
    fn ordered(&self) -> (SelectionPoint, SelectionPoint) {
        if self.focus < self.anchor {
            (self.focus, self.anchor)
        } else {
            (self.anchor, self.focus)
        }
    }
}

/// A selection mapped onto the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Map `selection` onto `document` through the rendered `leaves`.
///
/// Returns `Ok(None)` for a collapsed selection (including one that is only
/// whitespace when `trim` is set). Endpoints that do not land inside a known
/// leaf are a [`SelectionError`]; nothing is partially resolved.
pub fn resolve_selection<L: TextLeaf>(
    document: &Document,
    leaves: &[L],
    selection: &Selection,
    trim: bool,
) -> Result<Option<ResolvedSelection>, SelectionError> {
    if selection.is_collapsed() {
        return Ok(None);
    }

    let (first, last) = selection.ordered();
    let mut start = locate(document, leaves, first)?;
    let mut end = locate(document, leaves, last)?;
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    if start == end {
        return Ok(None);
    }

    let raw = document
        .slice(start..end)
        .ok_or(SelectionError::InvalidLeafRange(first.leaf))?;
    let text = if trim {
        let leading = raw.len() - raw.trim_start().len();
        let trailing = raw.len() - raw.trim_end().len();
        if leading == raw.len() {
            return Ok(None);
        }
        start += leading;
        end -= trailing;
        &raw[leading..raw.len() - trailing]
    } else {
        raw
    };

    if cfg!(debug_assertions)
        && let Some(reported) = selection.reported_text.as_deref()
    {
        let reported = if trim { reported.trim() } else { reported };
        if reported != text {
            warn!(
                start,
                end,
                reported,
                resolved = text,
                "selection text disagrees with resolved document slice"
            );
        }
    }

    Ok(Some(ResolvedSelection {
        start,
        end,
        text: text.to_string(),
    }))
}

/// Document offset of one endpoint.
fn locate<L: TextLeaf>(
    document: &Document,
    leaves: &[L],
    point: SelectionPoint,
) -> Result<usize, SelectionError> {
    let leaf = leaves
        .get(point.leaf)
        .ok_or(SelectionError::UnknownLeaf(point.leaf))?;
    let range = leaf.doc_range();
    if range.start > range.end || document.slice(range.clone()).is_none() {
        return Err(SelectionError::InvalidLeafRange(point.leaf));
    }
    let len = range.end - range.start;
    if point.offset > len {
        return Err(SelectionError::OffsetOutOfLeaf {
            leaf: point.leaf,
            offset: point.offset,
            len,
        });
    }
    let position = range.start + point.offset;
    if !document.text().is_char_boundary(position) {
        return Err(SelectionError::OffsetOutOfLeaf {
            leaf: point.leaf,
            offset: point.offset,
            len,
        });
    }
    Ok(position)
}

/// Find the leaf and in-leaf offset that display document offset `offset`.
///
/// Walks the leaves in order accumulating consumed length. An offset on the
/// boundary between two leaves belongs to the later one, except at the very
/// end of the document, which belongs to the last leaf that reaches it.
/// Zero-width leaves are skipped.
pub fn point_for_offset<L: TextLeaf>(leaves: &[L], offset: usize) -> Option<SelectionPoint> {
    let mut consumed = 0;
    let mut last_reaching = None;
    for (index, leaf) in leaves.iter().enumerate() {
        let range = leaf.doc_range();
        if range.start >= range.end {
            continue;
        }
        // Leaves are contiguous for well-formed renders; trust the range.
        consumed = consumed.max(range.start);
        if (consumed..range.end).contains(&offset) {
            return Some(SelectionPoint::new(index, offset - range.start));
        }
        if range.end == offset {
            last_reaching = Some(SelectionPoint::new(index, range.end - range.start));
        }
        consumed = range.end;
    }
    last_reaching
}

/// Build a selection spanning document range `[start, end)`.
pub fn selection_for_range<L: TextLeaf>(
    leaves: &[L],
    start: usize,
    end: usize,
) -> Option<Selection> {
    Some(Selection::new(
        point_for_offset(leaves, start)?,
        point_for_offset(leaves, end)?,
    ))
}
