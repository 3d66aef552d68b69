//! Working-copy collaborators.
//!
//! The merge core talks to the working copy only through the [`WorkingCopy`]
//! trait: entry lookup, properties, scheduling adds and deletes, local
//! modification checks and an admin scratch area. [`fs::FsWorkingCopy`] is a
//! directory-backed implementation keeping its entries in memory.

pub mod content;
pub mod events;
pub mod fs;
pub mod log;
pub mod props;
pub mod translate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WcError;
use props::PropMap;
use translate::Translation;

/// Entry attributes recording the three files of a text conflict.
pub const CONFLICT_OLD: &str = "conflict-old";
pub const CONFLICT_NEW: &str = "conflict-new";
pub const CONFLICT_WORKING: &str = "conflict-wrk";

/// Kind of a node, either versioned or on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    None,
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Normal,
    Add,
    Delete,
    Replace,
}

/// Admin record of one versioned path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub kind: NodeKind,
    pub schedule: Schedule,
    pub revision: i64,
    pub url: Option<String>,
    pub committed_rev: Option<i64>,
    pub committed_author: Option<String>,
    pub committed_date: Option<DateTime<Utc>>,
    /// Held lock; suppresses read-only for `svn:needs-lock` files.
    pub lock_token: Option<String>,
    /// Entry-scoped attributes such as conflict file references.
    pub attributes: BTreeMap<String, String>,
}

impl Entry {
    fn new(kind: NodeKind, revision: i64) -> Self {
        Self {
            kind,
            schedule: Schedule::Normal,
            revision,
            url: None,
            committed_rev: None,
            committed_author: None,
            committed_date: None,
            lock_token: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn file(revision: i64) -> Self {
        Self::new(NodeKind::File, revision)
    }

    pub fn dir(revision: i64) -> Self {
        Self::new(NodeKind::Dir, revision)
    }

    pub fn is_scheduled_delete(&self) -> bool {
        self.schedule == Schedule::Delete
    }

    /// `true` while the entry references conflict files.
    pub fn is_text_conflicted(&self) -> bool {
        [CONFLICT_OLD, CONFLICT_NEW, CONFLICT_WORKING]
            .iter()
            .any(|name| self.attributes.contains_key(*name))
    }
}

/// Narrow interface to a working copy. Paths are relative to the working
/// copy root with `/` separators; the root itself is `""`.
pub trait WorkingCopy {
    fn root(&self) -> &Path;

    fn abspath(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root().to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    fn entry(&self, path: &str) -> Option<&Entry>;

    /// Working properties of `path`; empty when unversioned.
    fn props(&self, path: &str) -> PropMap;

    fn set_prop(&mut self, path: &str, name: &str, value: Option<&str>) -> Result<(), WcError>;

    fn set_entry_attribute(
        &mut self,
        path: &str,
        name: &str,
        value: Option<String>,
    ) -> Result<(), WcError>;

    /// Schedule a directory for addition, creating it when absent.
    fn add_directory(&mut self, path: &str) -> Result<(), WcError>;

    /// Install an incoming file (normal form) at `path` and schedule it for
    /// addition with `props`.
    fn add_repository_file(
        &mut self,
        path: &str,
        source: &Path,
        props: &PropMap,
    ) -> Result<(), WcError>;

    /// Remove `path` from disk and schedule it for deletion.
    fn delete(&mut self, path: &str) -> Result<(), WcError>;

    /// Working file differs from its text base (compared in normal form).
    fn has_text_modifications(&self, path: &str) -> Result<bool, WcError>;

    /// Text, property or schedule changes at or below `path`.
    fn has_local_modifications(&self, path: &str) -> Result<bool, WcError>;

    /// Admin scratch area for temporary files and saved logs.
    fn tmp_dir(&self) -> PathBuf;

    fn translation(&self, path: &str) -> Translation {
        Translation::for_file(path, &self.props(path), self.entry(path))
    }
}

/// Parent of a working-copy relative path (`""` for top-level paths).
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// Final component of a working-copy relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_path("a/b/c.txt"), "a/b");
        assert_eq!(parent_path("c.txt"), "");
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("c.txt"), "c.txt");
    }

    #[test]
    fn test_entry_conflict_flag() {
        let mut entry = Entry::file(3);
        assert!(!entry.is_text_conflicted());
        entry
            .attributes
            .insert(CONFLICT_WORKING.into(), "a.txt.working".into());
        assert!(entry.is_text_conflicted());
    }
}
