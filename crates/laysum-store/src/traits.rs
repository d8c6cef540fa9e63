//! The persistence boundary seen by annotation front ends.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use laysum_core::config::DEFAULT_WINDOW_DAYS;
use laysum_core::{AnnotationRecord, DocumentItem};

use crate::StoreError;

/// Where annotators' work is read from and written to.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Documents assigned to `user` that fall inside their assignment
    /// window, in a stable order.
    async fn assigned_documents(&self, user: &str) -> Result<Vec<DocumentItem>, StoreError>;

    /// The saved annotation for (`user`, `document_id`), if any.
    async fn load_annotation(
        &self,
        user: &str,
        document_id: &str,
    ) -> Result<Option<AnnotationRecord>, StoreError>;

    /// Upsert scores and labels for (`user`, `record.document_id`).
    ///
    /// A complete record also marks the assignment completed.
    async fn save_annotation(
        &self,
        user: &str,
        record: &AnnotationRecord,
    ) -> Result<(), StoreError>;
}

/// Administrative queries over users and their work.
#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserSettings>, StoreError>;

    /// Set how many days of completed assignments `user` keeps seeing.
    async fn set_summary_window(&self, user: &str, days: i32) -> Result<(), StoreError>;

    /// Annotations saved by `target`, or by `caller` when no target is
    /// given or the caller is not an admin.
    async fn annotations_for_user(
        &self,
        caller: &str,
        target: Option<&str>,
    ) -> Result<Vec<AnnotationRecord>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub summary_window_days: i32,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserSettings {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            summary_window_days: DEFAULT_WINDOW_DAYS,
            is_admin: false,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// Whether an assignment is still shown: open ones always are, completed
/// ones only while assigned within the last `days` days.
pub fn within_window(
    assigned_at: Option<DateTime<Utc>>,
    completed: bool,
    days: i32,
    now: DateTime<Utc>,
) -> bool {
    if !completed {
        return true;
    }
    assigned_at.is_none_or(|at| at >= window_start(days, now))
}

pub(crate) fn window_start(days: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - TimeDelta::days(i64::from(days))
}

pub(crate) fn check_window(days: i32) -> Result<(), StoreError> {
    if days < 0 {
        return Err(StoreError::InvalidWindow(days));
    }
    Ok(())
}

/// Whose annotations an admin query returns.
pub(crate) fn annotation_owner<'a>(
    caller: &'a str,
    caller_is_admin: bool,
    target: Option<&'a str>,
) -> &'a str {
    match target {
        Some(target) if caller_is_admin => target,
        _ => caller,
    }
}
