//! Working-copy merge engine.
//!
//! This crate applies tree changes to a working copy: a streaming three-way
//! line merge with conflict markers, diff callbacks that either print a
//! unified diff or merge into the working copy, and the merge result / action
//! state machine that decides how each merged file is installed, preserved
//! or marked conflicted.

pub mod callback;
pub mod cancel;
pub mod config;
pub mod errors;
pub mod logging;
pub mod merge;
pub mod resolve;
pub mod sequence;
pub mod wc;

// Re-exports for convenience.
pub use callback::{DiffCallback, FileChange, FileStatus, MergeCallback, PrintDiffCallback, StatusType};
pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use errors::CoreError;
pub use merge::{MergeOutcome, ThreeWayMerger};
pub use resolve::{MergeAction, TextMerger};
pub use wc::fs::FsWorkingCopy;
