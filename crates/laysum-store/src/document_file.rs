//! Documents read from a JSON file for offline sessions.
//!
//! The file holds an array of `{"id", "text", "summary"}` objects, the
//! same shape the annotation service returns.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use laysum_core::DocumentItem;

use crate::StoreError;

pub fn load_documents(path: &Path) -> Result<Vec<DocumentItem>, StoreError> {
    let json = std::fs::read_to_string(path)?;
    let items = parse_documents(&json)?;
    info!(count = items.len(), path = %path.display(), "loaded documents");
    Ok(items)
}

pub fn parse_documents(json: &str) -> Result<Vec<DocumentItem>, StoreError> {
    let items: Vec<DocumentItem> = serde_json::from_str(json)?;
    let mut seen = HashSet::with_capacity(items.len());
    if let Some(dup) = items.iter().find(|item| !seen.insert(item.id.as_str())) {
        return Err(StoreError::Other(format!("duplicate document id {}", dup.id)));
    }
    Ok(items)
}
