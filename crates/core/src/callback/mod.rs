//! Diff callbacks.
//!
//! A tree-change driver reports structural changes path by path: parents
//! before children for additions, children before parents for deletions.
//! A [`DiffCallback`] turns each notification into a status. Structural
//! outcomes (obstructed, missing, conflicted) are ordinary return values;
//! only I/O failures, checksum mismatches and cancellation are errors.

pub mod merge;
pub mod print;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::wc::props::{PropChange, PropMap};

pub use merge::MergeCallback;
pub use print::PrintDiffCallback;

/// Status reported for a content or property change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    Unknown,
    Unchanged,
    Changed,
    Merged,
    Conflicted,
    /// A resolver explicitly postponed the conflict.
    ConflictedUnresolved,
    /// An unexpected node blocks the operation.
    Obstructed,
    /// The target or its parent is absent.
    Missing,
}

impl StatusType {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted | Self::ConflictedUnresolved)
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Merged => "merged",
            Self::Conflicted => "conflicted",
            Self::ConflictedUnresolved => "conflicted_unresolved",
            Self::Obstructed => "obstructed",
            Self::Missing => "missing",
        };
        write!(f, "{s}")
    }
}

/// Content and property status of a file notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub content: StatusType,
    pub props: StatusType,
}

impl FileStatus {
    pub fn new(content: StatusType, props: StatusType) -> Self {
        Self { content, props }
    }

    /// Both halves set to `status`.
    pub fn both(status: StatusType) -> Self {
        Self::new(status, status)
    }
}

/// One file-level change between a left and a right tree.
#[derive(Debug, Clone, Default)]
pub struct FileChange {
    /// Working-copy relative path, `/`-separated.
    pub path: String,
    /// Left (older) content in normal form; `None` when the file is added.
    pub left_file: Option<PathBuf>,
    /// Right (newer) content in normal form; `None` when the file is deleted.
    pub right_file: Option<PathBuf>,
    /// Negative for the working copy.
    pub left_revision: i64,
    pub right_revision: i64,
    pub left_mime_type: Option<String>,
    pub right_mime_type: Option<String>,
    /// Properties the changes were computed against.
    pub original_props: PropMap,
    pub prop_changes: Vec<PropChange>,
    /// Expected hex SHA-256 of `right_file`.
    pub right_checksum: Option<String>,
}

impl FileChange {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_left(mut self, file: impl Into<PathBuf>, revision: i64) -> Self {
        self.left_file = Some(file.into());
        self.left_revision = revision;
        self
    }

    pub fn with_right(mut self, file: impl Into<PathBuf>, revision: i64) -> Self {
        self.right_file = Some(file.into());
        self.right_revision = revision;
        self
    }

    pub fn with_mime_types(mut self, left: Option<&str>, right: Option<&str>) -> Self {
        self.left_mime_type = left.map(str::to_string);
        self.right_mime_type = right.map(str::to_string);
        self
    }

    pub fn with_props(mut self, original: PropMap, changes: Vec<PropChange>) -> Self {
        self.original_props = original;
        self.prop_changes = changes;
        self
    }

    pub fn with_right_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.right_checksum = Some(checksum.into());
        self
    }
}

/// Receiver of structural tree changes.
pub trait DiffCallback {
    fn directory_added(&mut self, path: &str, revision: i64) -> Result<StatusType, CoreError>;

    fn directory_deleted(&mut self, path: &str) -> Result<StatusType, CoreError>;

    fn file_added(&mut self, change: &FileChange) -> Result<FileStatus, CoreError>;

    fn file_changed(&mut self, change: &FileChange) -> Result<FileStatus, CoreError>;

    fn file_deleted(&mut self, change: &FileChange) -> Result<StatusType, CoreError>;

    fn properties_changed(
        &mut self,
        path: &str,
        original: &PropMap,
        changes: &[PropChange],
    ) -> Result<StatusType, CoreError>;
}

/// `true` when `path` is `ancestor` or lies below it.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Display label for a revision: `(revision N)`, or `(working copy)` when negative.
pub fn revision_label(revision: i64) -> String {
    if revision < 0 {
        "(working copy)".to_string()
    } else {
        format!("(revision {revision})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ancestor() {
        assert!(is_ancestor("", "a/b"));
        assert!(is_ancestor("a", "a"));
        assert!(is_ancestor("a", "a/b/c"));
        assert!(!is_ancestor("a", "ab"));
        assert!(!is_ancestor("a/b", "a"));
    }

    #[test]
    fn test_revision_label() {
        assert_eq!(revision_label(7), "(revision 7)");
        assert_eq!(revision_label(-1), "(working copy)");
    }

    #[test]
    fn test_status_display_and_conflict_flag() {
        assert_eq!(StatusType::ConflictedUnresolved.to_string(), "conflicted_unresolved");
        assert!(StatusType::ConflictedUnresolved.is_conflicted());
        assert!(!StatusType::Merged.is_conflicted());
    }

    #[test]
    fn test_file_change_builder() {
        let change = FileChange::new("a.txt")
            .with_left("/tmp/l", 3)
            .with_right("/tmp/r", 5)
            .with_mime_types(None, Some("image/png"));
        assert_eq!(change.left_revision, 3);
        assert_eq!(change.right_revision, 5);
        assert_eq!(change.right_mime_type.as_deref(), Some("image/png"));
    }
}
