//! Process-local store for offline sessions and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use laysum_core::config::DEFAULT_WINDOW_DAYS;
use laysum_core::{AnnotationRecord, DocumentItem};

use crate::traits::{annotation_owner, check_window, within_window};
use crate::{AdminStore, AnnotationStore, StoreError, UserSettings};

#[derive(Debug)]
struct Assignment {
    user: String,
    document_id: String,
    assigned_at: DateTime<Utc>,
    completed: bool,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<String, UserSettings>,
    documents: BTreeMap<String, DocumentItem>,
    assignments: Vec<Assignment>,
    annotations: BTreeMap<(String, String), AnnotationRecord>,
}

/// Everything lives behind one mutex; nothing survives the process.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    default_window_days: i32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            default_window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    /// Window used for users without a settings row.
    pub fn with_default_window(mut self, days: i32) -> Self {
        self.default_window_days = days;
        self
    }

    /// A store holding `documents`, all assigned to `user` at `now`.
    pub fn seeded(
        user: &str,
        documents: Vec<DocumentItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let store = Self::new();
        for document in documents {
            let id = document.id.clone();
            store.add_document(document)?;
            store.assign(user, &id, now)?;
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Other("memory store lock poisoned".into()))
    }

    pub fn add_user(&self, user: UserSettings) -> Result<(), StoreError> {
        check_window(user.summary_window_days)?;
        self.lock()?.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn add_document(&self, document: DocumentItem) -> Result<(), StoreError> {
        self.lock()?.documents.insert(document.id.clone(), document);
        Ok(())
    }

    /// Assign a known document to `user`. Re-assigning resets the time but
    /// keeps the completion flag.
    pub fn assign(
        &self,
        user: &str,
        document_id: &str,
        assigned_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.documents.contains_key(document_id) {
            return Err(StoreError::NotFound(format!("document {document_id}")));
        }
        let existing = state
            .assignments
            .iter()
            .position(|a| a.user == user && a.document_id == document_id);
        match existing {
            Some(i) => state.assignments[i].assigned_at = assigned_at,
            None => state.assignments.push(Assignment {
                user: user.to_string(),
                document_id: document_id.to_string(),
                assigned_at,
                completed: false,
            }),
        }
        Ok(())
    }

    fn window_days(&self, state: &State, user: &str) -> i32 {
        state
            .users
            .get(user)
            .map_or(self.default_window_days, |u| u.summary_window_days)
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn assigned_documents(&self, user: &str) -> Result<Vec<DocumentItem>, StoreError> {
        let state = self.lock()?;
        let days = self.window_days(&state, user);
        let now = Utc::now();

        let mut items: Vec<DocumentItem> = state
            .assignments
            .iter()
            .filter(|a| a.user == user)
            .filter(|a| within_window(Some(a.assigned_at), a.completed, days, now))
            .filter_map(|a| {
                let mut item = state.documents.get(&a.document_id)?.clone();
                item.assigned_at = Some(a.assigned_at);
                item.completed = a.completed;
                Some(item)
            })
            .collect();
        // Stable: ties keep assignment order.
        items.sort_by_key(|item| item.assigned_at);
        debug!(user, count = items.len(), "assigned documents");
        Ok(items)
    }

    async fn load_annotation(
        &self,
        user: &str,
        document_id: &str,
    ) -> Result<Option<AnnotationRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .annotations
            .get(&(user.to_string(), document_id.to_string()))
            .cloned())
    }

    async fn save_annotation(
        &self,
        user: &str,
        record: &AnnotationRecord,
    ) -> Result<(), StoreError> {
        record.validate()?;
        let mut state = self.lock()?;
        if !state.documents.contains_key(&record.document_id) {
            return Err(StoreError::NotFound(format!(
                "document {}",
                record.document_id
            )));
        }
        if record.is_complete()
            && let Some(assignment) = state
                .assignments
                .iter_mut()
                .find(|a| a.user == user && a.document_id == record.document_id)
        {
            assignment.completed = true;
        }
        state.annotations.insert(
            (user.to_string(), record.document_id.clone()),
            record.clone(),
        );
        info!(user, document_id = %record.document_id, labels = record.labels.len(), "annotation saved");
        Ok(())
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn list_users(&self) -> Result<Vec<UserSettings>, StoreError> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn set_summary_window(&self, user: &str, days: i32) -> Result<(), StoreError> {
        check_window(days)?;
        let mut state = self.lock()?;
        let settings = state
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))?;
        settings.summary_window_days = days;
        info!(user, days, "summary window updated");
        Ok(())
    }

    async fn annotations_for_user(
        &self,
        caller: &str,
        target: Option<&str>,
    ) -> Result<Vec<AnnotationRecord>, StoreError> {
        let state = self.lock()?;
        let is_admin = state.users.get(caller).is_some_and(|u| u.is_admin);
        let owner = annotation_owner(caller, is_admin, target);
        Ok(state
            .annotations
            .iter()
            .filter(|((user, _), _)| user == owner)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
