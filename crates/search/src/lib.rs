//! Line filtering engine used across sift components.
//!
//! A [`Chain`] is an ordered list of [`Query`] steps (literal text or regex,
//! optionally inverted or case-sensitive). Evaluation narrows a set of source
//! lines step by step and records how many lines survived each step, which
//! [`render_header`] turns into the summary block shown above derived documents.

mod engine;
mod header;
mod query;

pub use engine::{
    evaluate_chain, evaluate_step, replay_chain, validate_chain, ChainOutcome, FilterError,
    StepStat, ValidationError,
};
pub use header::render_header;
pub use query::{Chain, Query, QueryKind, DOT_ALL_FLAG};
