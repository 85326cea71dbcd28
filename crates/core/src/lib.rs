//! Derived-document engine for sift: source loading, identities, the
//! record/content store and the content provider serving derived documents.

pub mod events;
pub mod file_monitor;
pub mod identity;
pub mod provider;
pub mod source;
pub mod store;

pub use events::{Event, EventQueue, Notice, NoticeLevel};
pub use file_monitor::{SourceChange, SourceEvent, SourceWatchError, SourceWatcher};
pub use identity::{DerivedId, DERIVED_SCHEME, LABEL_LIMIT, PATTERN_LIMIT};
pub use provider::{
    CleanupReport, ContentProvider, MaterializeOptions, ProviderError, ReadOutcome,
    LOADING_PLACEHOLDER,
};
pub use source::{
    split_lines, FsSourceLoader, MemorySources, SourceError, SourceId, SourceLoader, SourceText,
    TextEncoding,
};
pub use store::{ChainRecord, DerivedStore};
