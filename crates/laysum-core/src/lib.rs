//! Annotation model for rating lay summaries and labelling error spans.

pub mod annotation;
pub mod category;
pub mod config;
pub mod document;
pub mod error;
pub mod label;
pub mod render;
pub mod resolver;
pub mod session;

pub use annotation::{Annotation, AnnotationRecord, Aspect, Scores};
pub use category::LabelCategory;
pub use config::SessionConfig;
pub use document::{Document, DocumentItem};
pub use error::{CoreError, SelectionError};
pub use label::{Label, LabelStore, PendingSelection};
pub use render::{Highlight, HighlightStyle, RenderCache, Segment, reassemble, render};
pub use resolver::{Selection, SelectionPoint, TextLeaf, resolve_selection};
pub use session::{AnnotationSession, Notice, Progress};
