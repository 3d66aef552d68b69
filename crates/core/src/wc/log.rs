//! Structured, replayable work log.
//!
//! File effects of a merge are staged as [`WorkItem`]s, saved as JSON in the
//! admin scratch area, then run. Every item can be replayed after a crash:
//! moves and deletes whose effect is already visible are skipped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::WcError;
use crate::wc::content::{node_kind, write_atomic};
use crate::wc::props::{EXECUTABLE, NEEDS_LOCK};
use crate::wc::translate::Direction;
use crate::wc::{NodeKind, WorkingCopy};

/// One replayable file or entry operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkItem {
    /// Copy `src` to `dst`, translating with the settings of versioned `target`.
    CopyAndTranslate {
        src: PathBuf,
        dst: PathBuf,
        target: String,
        direction: Direction,
    },
    Move {
        src: PathBuf,
        dst: PathBuf,
    },
    Delete {
        path: PathBuf,
    },
    /// Set the executable bits when `svn:executable` is present.
    MaybeSetExecutable {
        path: String,
    },
    /// Make the file read-only when `svn:needs-lock` is set and no lock is held.
    MaybeSetReadonly {
        path: String,
    },
    /// Set or clear (`value == None`) an entry attribute.
    SetEntryProperty {
        path: String,
        name: String,
        value: Option<String>,
    },
}

impl WorkItem {
    fn name(&self) -> &'static str {
        match self {
            Self::CopyAndTranslate { .. } => "copy-and-translate",
            Self::Move { .. } => "move",
            Self::Delete { .. } => "delete",
            Self::MaybeSetExecutable { .. } => "maybe-set-executable",
            Self::MaybeSetReadonly { .. } => "maybe-set-readonly",
            Self::SetEntryProperty { .. } => "set-entry-property",
        }
    }

    fn run(&self, wc: &mut dyn WorkingCopy) -> Result<(), WcError> {
        match self {
            Self::CopyAndTranslate {
                src,
                dst,
                target,
                direction,
            } => {
                if node_kind(src) == NodeKind::None {
                    if node_kind(dst) != NodeKind::None {
                        debug!(src = %src.display(), "copy already replayed");
                        return Ok(());
                    }
                    return Err(WcError::LogReplay {
                        item: self.name().to_string(),
                        detail: format!("source '{}' does not exist", src.display()),
                    });
                }
                wc.translation(target).copy_file(src, dst, *direction)
            }
            Self::Move { src, dst } => {
                if node_kind(src) == NodeKind::None && node_kind(dst) != NodeKind::None {
                    debug!(src = %src.display(), "move already replayed");
                    return Ok(());
                }
                std::fs::rename(src, dst).map_err(|e| WcError::io(src, e))
            }
            Self::Delete { path } => match node_kind(path) {
                NodeKind::None => Ok(()),
                NodeKind::Dir => std::fs::remove_dir_all(path).map_err(|e| WcError::io(path, e)),
                _ => std::fs::remove_file(path).map_err(|e| WcError::io(path, e)),
            },
            Self::MaybeSetExecutable { path } => {
                if wc.props(path).contains_key(EXECUTABLE) {
                    set_executable(&wc.abspath(path))?;
                }
                Ok(())
            }
            Self::MaybeSetReadonly { path } => {
                let locked = wc.entry(path).is_some_and(|e| e.lock_token.is_some());
                if !locked && wc.props(path).contains_key(NEEDS_LOCK) {
                    set_readonly(&wc.abspath(path))?;
                }
                Ok(())
            }
            Self::SetEntryProperty { path, name, value } => {
                wc.set_entry_attribute(path, name, value.clone())
            }
        }
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), WcError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| WcError::io(path, e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).map_err(|e| WcError::io(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), WcError> {
    Ok(())
}

fn set_readonly(path: &Path) -> Result<(), WcError> {
    let mut perms = std::fs::metadata(path)
        .map_err(|e| WcError::io(path, e))?
        .permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(path, perms).map_err(|e| WcError::io(path, e))
}

/// An ordered batch of work items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLog {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    items: Vec<WorkItem>,
}

impl Default for WorkLog {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkLog {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// File name the log is saved under.
    pub fn file_name(&self) -> String {
        format!("log-{}.json", self.id)
    }

    /// Save as JSON into `dir`, returning the written path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, WcError> {
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &json)?;
        debug!(log_id = %self.id, path = %path.display(), "work log saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, WcError> {
        let data = std::fs::read(path).map_err(|e| WcError::io(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Run every item in order. Safe to call again on a partially run log.
    pub fn run(&self, wc: &mut dyn WorkingCopy) -> Result<(), WcError> {
        info!(log_id = %self.id, items = self.items.len(), "running work log");
        for item in &self.items {
            debug!(op = item.name(), "work item");
            item.run(wc)?;
        }
        Ok(())
    }

    /// Save into the admin scratch area, run, then remove the saved copy.
    pub fn commit(self, wc: &mut dyn WorkingCopy) -> Result<(), WcError> {
        if self.is_empty() {
            return Ok(());
        }
        let saved = self.save(&wc.tmp_dir())?;
        self.run(wc)?;
        std::fs::remove_file(&saved).map_err(|e| WcError::io(&saved, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wc::fs::FsWorkingCopy;
    use crate::wc::props::PropMap;

    fn setup() -> (tempfile::TempDir, FsWorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = FsWorkingCopy::create(dir.path()).unwrap();
        (dir, wc)
    }

    #[test]
    fn test_save_and_load() {
        let (dir, _wc) = setup();
        let mut log = WorkLog::new();
        log.push(WorkItem::Delete {
            path: dir.path().join("x"),
        });
        log.push(WorkItem::SetEntryProperty {
            path: "a.txt".into(),
            name: "conflict-old".into(),
            value: None,
        });
        let saved = log.save(dir.path()).unwrap();
        let loaded = WorkLog::load(&saved).unwrap();
        assert_eq!(loaded, log);

        let json = std::fs::read_to_string(&saved).unwrap();
        assert!(json.contains("\"op\": \"set_entry_property\""));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let (dir, mut wc) = setup();
        let src = dir.path().join("scratch");
        let moved = dir.path().join("moved");
        let doomed = dir.path().join("doomed");
        std::fs::write(&src, b"data").unwrap();
        std::fs::write(&doomed, b"x").unwrap();

        let mut log = WorkLog::new();
        log.push(WorkItem::Move {
            src: src.clone(),
            dst: moved.clone(),
        });
        log.push(WorkItem::Delete {
            path: doomed.clone(),
        });
        log.run(&mut wc).unwrap();
        log.run(&mut wc).unwrap();

        assert_eq!(std::fs::read(&moved).unwrap(), b"data");
        assert!(!doomed.exists());
        assert!(!src.exists());
    }

    #[test]
    fn test_copy_with_missing_source_fails() {
        let (dir, mut wc) = setup();
        let mut log = WorkLog::new();
        log.push(WorkItem::CopyAndTranslate {
            src: dir.path().join("none"),
            dst: dir.path().join("also-none"),
            target: "a.txt".into(),
            direction: Direction::ToWorking,
        });
        let err = log.run(&mut wc).unwrap_err();
        assert!(matches!(err, WcError::LogReplay { .. }));
    }

    #[test]
    fn test_commit_removes_saved_log() {
        let (_dir, mut wc) = setup();
        wc.import_file("a.txt", b"a\n", PropMap::new(), 1).unwrap();
        let mut log = WorkLog::new();
        log.push(WorkItem::SetEntryProperty {
            path: "a.txt".into(),
            name: "conflict-wrk".into(),
            value: Some("a.txt.working".into()),
        });
        log.commit(&mut wc).unwrap();

        assert!(wc.entry("a.txt").unwrap().is_text_conflicted());
        let leftovers = std::fs::read_dir(wc.tmp_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_maybe_set_executable_and_readonly() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, mut wc) = setup();
        let props: PropMap = [
            (EXECUTABLE.to_string(), "*".to_string()),
            (NEEDS_LOCK.to_string(), "*".to_string()),
        ]
        .into();
        wc.import_file("run.sh", b"#!/bin/sh\n", props, 1).unwrap();

        let mut log = WorkLog::new();
        log.push(WorkItem::MaybeSetExecutable {
            path: "run.sh".into(),
        });
        log.push(WorkItem::MaybeSetReadonly {
            path: "run.sh".into(),
        });
        log.run(&mut wc).unwrap();

        let meta = std::fs::metadata(wc.abspath("run.sh")).unwrap();
        assert_ne!(meta.permissions().mode() & 0o111, 0);
        assert!(meta.permissions().readonly());
    }
}
