use thiserror::Error;

use crate::annotation::Aspect;

/// A selection endpoint could not be mapped onto the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("selection endpoint refers to unknown leaf {0}")]
    UnknownLeaf(usize),

    #[error("offset {offset} is outside leaf {leaf} (length {len})")]
    OffsetOutOfLeaf { leaf: usize, offset: usize, len: usize },

    #[error("leaf {0} does not map onto the document")]
    InvalidLeafRange(usize),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{aspect} score must be between 1 and 5 (or 0 to clear), got {value}")]
    InvalidScore { aspect: Aspect, value: u8 },

    #[error("annotation is incomplete: rate all four aspects before submitting")]
    Incomplete,

    #[error("every summary must be rated before submitting")]
    NotAllStarted,

    #[error("invalid label range {start}..{end}")]
    InvalidRange { start: usize, end: usize },

    #[error("no text is selected")]
    NoPendingSelection,

    #[error("no document is loaded")]
    NoDocument,

    #[error("unknown label category: {0}")]
    UnknownCategory(String),

    #[error("unknown rating aspect: {0}")]
    UnknownAspect(String),

    #[error("selection could not be resolved: {0}")]
    Selection(#[from] SelectionError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
