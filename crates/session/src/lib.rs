//! Session state for sift: the derived-document forest, highlight state,
//! snapshot persistence and the [`Session`] aggregate tying them together.
//! sift 的工作階段：衍生文件樹、醒目提示、快照保存與整合它們的 [`Session`]。

mod util;

pub mod highlights;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod tree;

pub use highlights::{Highlight, HighlightState};
pub use scheduler::PersistScheduler;
pub use session::{Origin, Session, SessionConfig, SessionError};
pub use snapshot::{SessionSnapshot, SnapshotError, SnapshotStore};
pub use tree::{Forest, NodeId, NodeKind, TreeError, TreeNode};
