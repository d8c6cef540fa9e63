//! The navigable annotation session: one active document at a time.
//!
//! The session owns every item's [`Annotation`], the single pending
//! selection, and the render cache. Front ends feed it interaction events
//! and read segments back; persistence happens outside, with the outcome
//! reported through [`record_save_result`](AnnotationSession::record_save_result).
//! Saves are optimistic: local state is never rolled back on failure.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, warn};

use crate::CoreError;
use crate::annotation::{Annotation, AnnotationRecord, Aspect};
use crate::category::LabelCategory;
use crate::config::SessionConfig;
use crate::document::{Document, DocumentItem};
use crate::label::{Label, PendingSelection};
use crate::render::{RenderCache, Segment};
use crate::resolver::{Selection, resolve_selection, selection_for_range};

/// Page buttons shown around the current item in the pager.
const PAGE_WINDOW: usize = 8;

#[derive(Debug)]
struct SessionItem {
    item: DocumentItem,
    document: Document,
    annotation: Annotation,
    /// Changed since the last successful save.
    dirty: bool,
    /// A saved annotation has been looked up for this item.
    loaded: bool,
}

/// A user-facing message about the last persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Saved { document_id: String },
    SaveFailed { document_id: String, message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Saved { document_id } => write!(f, "Annotation for {document_id} saved."),
            Notice::SaveFailed {
                document_id,
                message,
            } => write!(
                f,
                "Failed to save annotation for {document_id}: {message}. Your changes are kept; please try again."
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub started: usize,
    pub total: usize,
}

impl Progress {
    /// Rounded percentage of started items.
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        (self.started * 100 + self.total / 2) / self.total
    }

    pub fn all_started(&self) -> bool {
        self.started == self.total
    }
}

#[derive(Debug)]
pub struct AnnotationSession {
    config: SessionConfig,
    items: Vec<SessionItem>,
    current: usize,
    pending: Option<PendingSelection>,
    cache: RenderCache,
    notice: Option<Notice>,
}

impl AnnotationSession {
    pub fn new(items: Vec<DocumentItem>, config: SessionConfig) -> Self {
        info!(count = items.len(), "annotation session started");
        let items = items
            .into_iter()
            .map(|item| SessionItem {
                document: item.document(),
                item,
                annotation: Annotation::new(),
                dirty: false,
                loaded: false,
            })
            .collect();
        Self {
            config,
            items,
            current: 0,
            pending: None,
            cache: RenderCache::new(),
            notice: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_item(&self) -> Option<&DocumentItem> {
        self.items.get(self.current).map(|i| &i.item)
    }

    pub fn current_document(&self) -> Option<&Document> {
        self.items.get(self.current).map(|i| &i.document)
    }

    pub fn current_annotation(&self) -> Option<&Annotation> {
        self.items.get(self.current).map(|i| &i.annotation)
    }

    pub fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    /// Whether the current item has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.items.get(self.current).is_some_and(|i| i.dirty)
    }

    // ── Navigation ──

    /// Move to `index`, clamped to the item list. Switching items discards
    /// the pending selection. Returns whether the current item changed.
    pub fn goto(&mut self, index: usize) -> bool {
        let Some(last) = self.items.len().checked_sub(1) else {
            return false;
        };
        let index = index.min(last);
        if index == self.current {
            return false;
        }
        debug!(from = self.current, to = index, "switching item");
        self.current = index;
        self.pending = None;
        true
    }

    pub fn next(&mut self) -> bool {
        self.goto(self.current.saturating_add(1))
    }

    pub fn previous(&mut self) -> bool {
        self.goto(self.current.saturating_sub(1))
    }

    pub fn first(&mut self) -> bool {
        self.goto(0)
    }

    pub fn last(&mut self) -> bool {
        self.goto(usize::MAX)
    }

    /// Item indices for the pager: first, last, and a window around the
    /// current item. Callers draw an ellipsis wherever consecutive entries
    /// are not adjacent.
    pub fn page_numbers(&self) -> Vec<usize> {
        let Some(last) = self.items.len().checked_sub(1) else {
            return Vec::new();
        };
        let mut pages = BTreeSet::from([0, last]);
        let start = self.current.saturating_sub(PAGE_WINDOW / 2);
        let end = last.min(start + PAGE_WINDOW);
        pages.extend(start..=end);
        pages.into_iter().collect()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            started: self.items.iter().filter(|i| i.annotation.is_started()).count(),
            total: self.items.len(),
        }
    }

    // ── Rendering and selection ──

    /// Display segments for the current item, memoised.
    pub fn segments(&mut self) -> &[Segment] {
        match self.items.get(self.current) {
            Some(item) => self.cache.get_or_render(
                &item.document,
                &item.annotation.labels,
                self.pending.as_ref(),
            ),
            None => &[],
        }
    }

    /// Resolve a selection made over the current segments.
    ///
    /// A collapsed selection clears the pending selection. A selection that
    /// cannot be resolved is an error and leaves all state untouched.
    pub fn select(&mut self, selection: &Selection) -> Result<Option<&PendingSelection>, CoreError> {
        let item = self.items.get(self.current).ok_or(CoreError::NoDocument)?;
        let segments =
            self.cache
                .get_or_render(&item.document, &item.annotation.labels, self.pending.as_ref());
        let resolved = resolve_selection(
            &item.document,
            segments,
            selection,
            self.config.trim_selection,
        )
        .inspect_err(|e| debug!(error = %e, "selection ignored"))?;

        self.pending = resolved.map(|r| PendingSelection::new(r.text, r.start, r.end));
        Ok(self.pending.as_ref())
    }

    /// Select document range `[start, end)` through the current segments.
    pub fn select_range(
        &mut self,
        start: usize,
        end: usize,
    ) -> Result<Option<&PendingSelection>, CoreError> {
        let selection = selection_for_range(self.segments(), start, end)
            .ok_or(CoreError::InvalidRange { start, end })?;
        self.select(&selection)
    }

    /// Set or clear the suggested correction on the pending selection.
    pub fn set_correction(&mut self, corrected: Option<String>) -> Result<(), CoreError> {
        let pending = self.pending.as_mut().ok_or(CoreError::NoPendingSelection)?;
        pending.corrected_text = corrected;
        Ok(())
    }

    pub fn cancel_selection(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Commit the pending selection as a label. Returns its index.
    pub fn confirm(&mut self, category: LabelCategory) -> Result<usize, CoreError> {
        let item = self
            .items
            .get_mut(self.current)
            .ok_or(CoreError::NoDocument)?;
        let pending = self.pending.as_ref().ok_or(CoreError::NoPendingSelection)?;
        if !item.document.is_valid_span(pending.start, pending.end) {
            return Err(CoreError::InvalidRange {
                start: pending.start,
                end: pending.end,
            });
        }
        let Some(pending) = self.pending.take() else {
            return Err(CoreError::NoPendingSelection);
        };
        item.annotation.labels.push(pending.into_label(category));
        item.dirty = true;
        Ok(item.annotation.labels.len() - 1)
    }

    /// Delete a label by collection index; out-of-range is a no-op.
    pub fn delete_label(&mut self, index: usize) -> Option<Label> {
        let item = self.items.get_mut(self.current)?;
        let removed = item.annotation.labels.remove_at(index);
        if removed.is_some() {
            item.dirty = true;
        }
        removed
    }

    pub fn rate(&mut self, aspect: Aspect, value: u8) -> Result<(), CoreError> {
        let item = self
            .items
            .get_mut(self.current)
            .ok_or(CoreError::NoDocument)?;
        item.annotation.scores.set(aspect, value)?;
        item.dirty = true;
        Ok(())
    }

    // ── Persistence handoff ──

    /// The record to submit for the current item, if it may be submitted.
    pub fn submission(&self) -> Result<AnnotationRecord, CoreError> {
        let item = self.items.get(self.current).ok_or(CoreError::NoDocument)?;
        if !item.annotation.is_complete() {
            return Err(CoreError::Incomplete);
        }
        if self.config.require_all_started && !self.progress().all_started() {
            return Err(CoreError::NotAllStarted);
        }
        Ok(item.annotation.to_record(item.item.id.clone()))
    }

    /// With autosave on, the record to persist after a mutation.
    pub fn take_autosave(&mut self) -> Option<AnnotationRecord> {
        if !self.config.autosave {
            return None;
        }
        let item = self.items.get_mut(self.current)?;
        if !item.dirty {
            return None;
        }
        item.dirty = false;
        Some(item.annotation.to_record(item.item.id.clone()))
    }

    /// Report how a save went. Failures keep local state as is.
    pub fn record_save_result(&mut self, document_id: &str, result: Result<(), String>) {
        let Some(item) = self.items.iter_mut().find(|i| i.item.id == document_id) else {
            warn!(document_id, "save result for unknown item");
            return;
        };
        self.notice = Some(match result {
            Ok(()) => {
                item.dirty = false;
                item.item.completed = item.annotation.is_complete();
                Notice::Saved {
                    document_id: document_id.to_string(),
                }
            }
            Err(message) => {
                warn!(document_id, error = %message, "annotation save failed");
                item.dirty = true;
                Notice::SaveFailed {
                    document_id: document_id.to_string(),
                    message,
                }
            }
        });
    }

    /// An autosave the store declined to send, typically because the item is
    /// not fully rated yet. The item stays dirty and no notice is raised.
    pub fn defer_save(&mut self, document_id: &str) {
        if let Some(item) = self.items.iter_mut().find(|i| i.item.id == document_id) {
            debug!(document_id, "autosave deferred");
            item.dirty = true;
        }
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// The current item's id if its saved annotation has not been looked up.
    pub fn current_needs_load(&self) -> Option<&str> {
        self.items
            .get(self.current)
            .filter(|i| !i.loaded)
            .map(|i| i.item.id.as_str())
    }

    /// Apply a looked-up annotation to the item it belongs to.
    ///
    /// Local edits made before the lookup finished win over the saved copy.
    pub fn apply_loaded(&mut self, document_id: &str, record: Option<AnnotationRecord>) {
        let Some(item) = self.items.iter_mut().find(|i| i.item.id == document_id) else {
            return;
        };
        item.loaded = true;
        if let Some(record) = record
            && !item.dirty
        {
            item.annotation.restore(record);
        }
    }
}
