//! Directory-backed working copy.
//!
//! Working files live under the root; pristine text bases and scratch files
//! live in the `.wcmerge` admin directory. Entries and properties are held
//! in memory for the lifetime of the value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::WcError;
use crate::wc::content::{node_kind, read_file, write_atomic};
use crate::wc::props::PropMap;
use crate::wc::translate::Direction;
use crate::wc::{parent_path, Entry, NodeKind, Schedule, WorkingCopy};

pub const ADMIN_DIR: &str = ".wcmerge";

#[derive(Debug)]
pub struct FsWorkingCopy {
    root: PathBuf,
    entries: BTreeMap<String, Entry>,
    props: BTreeMap<String, PropMap>,
    base_props: BTreeMap<String, PropMap>,
}

impl FsWorkingCopy {
    /// Initialise an empty working copy rooted at `root` (at revision 0).
    pub fn create(root: &Path) -> Result<Self, WcError> {
        let wc = Self {
            root: root.to_path_buf(),
            entries: BTreeMap::from([(String::new(), Entry::dir(0))]),
            props: BTreeMap::new(),
            base_props: BTreeMap::new(),
        };
        for dir in [wc.tmp_dir(), wc.admin_dir().join("text-base")] {
            std::fs::create_dir_all(&dir).map_err(|e| WcError::io(&dir, e))?;
        }
        info!(root = %root.display(), "working copy created");
        Ok(wc)
    }

    fn admin_dir(&self) -> PathBuf {
        self.root.join(ADMIN_DIR)
    }

    /// Pristine copy (normal form) of a versioned file.
    pub fn text_base(&self, path: &str) -> PathBuf {
        self.admin_dir()
            .join("text-base")
            .join(format!("{path}.base"))
    }

    fn require_versioned_dir(&self, path: &str) -> Result<(), WcError> {
        match self.entries.get(path) {
            Some(entry) if entry.kind == NodeKind::Dir && !entry.is_scheduled_delete() => Ok(()),
            Some(_) => Err(WcError::NotADirectory(path.to_string())),
            None => Err(WcError::NotVersioned(path.to_string())),
        }
    }

    /// Record a checked-out directory.
    pub fn import_dir(&mut self, path: &str, revision: i64) -> Result<(), WcError> {
        self.require_versioned_dir(parent_path(path))?;
        let abs = self.abspath(path);
        std::fs::create_dir_all(&abs).map_err(|e| WcError::io(&abs, e))?;
        self.entries.insert(path.to_string(), Entry::dir(revision));
        Ok(())
    }

    /// Record a checked-out file: `content` is stored as the text base and
    /// written to the working file in working form.
    pub fn import_file(
        &mut self,
        path: &str,
        content: &[u8],
        props: PropMap,
        revision: i64,
    ) -> Result<(), WcError> {
        self.require_versioned_dir(parent_path(path))?;
        let mut entry = Entry::file(revision);
        entry.committed_rev = Some(revision);
        self.entries.insert(path.to_string(), entry);
        self.base_props.insert(path.to_string(), props.clone());
        self.props.insert(path.to_string(), props);

        let base = self.text_base(path);
        if let Some(dir) = base.parent() {
            std::fs::create_dir_all(dir).map_err(|e| WcError::io(dir, e))?;
        }
        write_atomic(&base, content)?;
        let working = self.translation(path).apply(content, Direction::ToWorking);
        write_atomic(&self.abspath(path), &working)?;
        debug!(path, revision, "file imported");
        Ok(())
    }

    /// Attach or release a lock token.
    pub fn set_lock_token(&mut self, path: &str, token: Option<String>) -> Result<(), WcError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| WcError::NotVersioned(path.to_string()))?;
        entry.lock_token = token;
        Ok(())
    }

    fn paths_at_or_below(&self, path: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|p| is_at_or_below(path, p))
            .cloned()
            .collect()
    }

    fn schedule_for_add(&self, path: &str) -> Schedule {
        match self.entries.get(path) {
            Some(entry) if entry.is_scheduled_delete() => Schedule::Replace,
            _ => Schedule::Add,
        }
    }
}

fn is_at_or_below(ancestor: &str, path: &str) -> bool {
    ancestor.is_empty()
        || path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

impl WorkingCopy for FsWorkingCopy {
    fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    fn props(&self, path: &str) -> PropMap {
        self.props.get(path).cloned().unwrap_or_default()
    }

    fn set_prop(&mut self, path: &str, name: &str, value: Option<&str>) -> Result<(), WcError> {
        if !self.entries.contains_key(path) {
            return Err(WcError::NotVersioned(path.to_string()));
        }
        let props = self.props.entry(path.to_string()).or_default();
        match value {
            Some(value) => props.insert(name.to_string(), value.to_string()),
            None => props.remove(name),
        };
        Ok(())
    }

    fn set_entry_attribute(
        &mut self,
        path: &str,
        name: &str,
        value: Option<String>,
    ) -> Result<(), WcError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| WcError::NotVersioned(path.to_string()))?;
        match value {
            Some(value) => entry.attributes.insert(name.to_string(), value),
            None => entry.attributes.remove(name),
        };
        Ok(())
    }

    fn add_directory(&mut self, path: &str) -> Result<(), WcError> {
        self.require_versioned_dir(parent_path(path))?;
        let abs = self.abspath(path);
        match node_kind(&abs) {
            NodeKind::None => std::fs::create_dir_all(&abs).map_err(|e| WcError::io(&abs, e))?,
            NodeKind::Dir => {}
            _ => return Err(WcError::Obstructed(path.to_string())),
        }
        let mut entry = Entry::dir(0);
        entry.schedule = self.schedule_for_add(path);
        self.entries.insert(path.to_string(), entry);
        info!(path, "directory scheduled for addition");
        Ok(())
    }

    fn add_repository_file(
        &mut self,
        path: &str,
        source: &Path,
        props: &PropMap,
    ) -> Result<(), WcError> {
        self.require_versioned_dir(parent_path(path))?;
        let mut entry = Entry::file(0);
        entry.schedule = self.schedule_for_add(path);
        self.entries.insert(path.to_string(), entry);
        self.props.insert(path.to_string(), props.clone());
        self.base_props.insert(path.to_string(), props.clone());

        let content = read_file(source)?;
        let base = self.text_base(path);
        if let Some(dir) = base.parent() {
            std::fs::create_dir_all(dir).map_err(|e| WcError::io(dir, e))?;
        }
        write_atomic(&base, &content)?;
        let working = self.translation(path).apply(&content, Direction::ToWorking);
        write_atomic(&self.abspath(path), &working)?;
        info!(path, "file scheduled for addition");
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), WcError> {
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| WcError::NotVersioned(path.to_string()))?;
        let was_added = entry.schedule == Schedule::Add;

        let abs = self.abspath(path);
        match node_kind(&abs) {
            NodeKind::None => {}
            NodeKind::Dir => std::fs::remove_dir_all(&abs).map_err(|e| WcError::io(&abs, e))?,
            _ => std::fs::remove_file(&abs).map_err(|e| WcError::io(&abs, e))?,
        }

        for p in self.paths_at_or_below(path) {
            if was_added {
                self.entries.remove(&p);
                self.props.remove(&p);
                self.base_props.remove(&p);
            } else if let Some(entry) = self.entries.get_mut(&p) {
                entry.schedule = Schedule::Delete;
            }
        }
        info!(path, "scheduled for deletion");
        Ok(())
    }

    fn has_text_modifications(&self, path: &str) -> Result<bool, WcError> {
        let abs = self.abspath(path);
        if node_kind(&abs) != NodeKind::File {
            return Ok(false);
        }
        let base = self.text_base(path);
        if node_kind(&base) != NodeKind::File {
            return Ok(true);
        }
        let working = self
            .translation(path)
            .apply(&read_file(&abs)?, Direction::ToNormal);
        Ok(working != read_file(&base)?)
    }

    fn has_local_modifications(&self, path: &str) -> Result<bool, WcError> {
        for p in self.paths_at_or_below(path) {
            let Some(entry) = self.entries.get(&p) else {
                continue;
            };
            if entry.schedule != Schedule::Normal {
                return Ok(true);
            }
            if self.props.get(&p) != self.base_props.get(&p) {
                return Ok(true);
            }
            if entry.kind == NodeKind::File && self.has_text_modifications(&p)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn tmp_dir(&self) -> PathBuf {
        self.admin_dir().join("tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FsWorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let mut wc = FsWorkingCopy::create(dir.path()).unwrap();
        wc.import_dir("trunk", 1).unwrap();
        wc.import_file("trunk/a.txt", b"a\nb\n", PropMap::new(), 1)
            .unwrap();
        (dir, wc)
    }

    #[test]
    fn test_import_and_text_modifications() {
        let (_dir, wc) = setup();
        assert!(!wc.has_text_modifications("trunk/a.txt").unwrap());
        assert!(!wc.has_local_modifications("").unwrap());

        std::fs::write(wc.abspath("trunk/a.txt"), b"changed\n").unwrap();
        assert!(wc.has_text_modifications("trunk/a.txt").unwrap());
        assert!(wc.has_local_modifications("trunk").unwrap());
    }

    #[test]
    fn test_eol_only_difference_is_not_a_modification() {
        let dir = tempfile::tempdir().unwrap();
        let mut wc = FsWorkingCopy::create(dir.path()).unwrap();
        let props: PropMap = [("svn:eol-style".to_string(), "CRLF".to_string())].into();
        wc.import_file("a.txt", b"x\ny\n", props, 2).unwrap();
        assert_eq!(std::fs::read(wc.abspath("a.txt")).unwrap(), b"x\r\ny\r\n");
        assert!(!wc.has_text_modifications("a.txt").unwrap());
    }

    #[test]
    fn test_prop_change_is_local_modification() {
        let (_dir, mut wc) = setup();
        wc.set_prop("trunk/a.txt", "color", Some("red")).unwrap();
        assert!(wc.has_local_modifications("trunk/a.txt").unwrap());
        assert!(matches!(
            wc.set_prop("trunk/zz", "color", None),
            Err(WcError::NotVersioned(_))
        ));
    }

    #[test]
    fn test_delete_schedules_subtree() {
        let (_dir, mut wc) = setup();
        wc.delete("trunk").unwrap();
        assert!(!wc.abspath("trunk").exists());
        assert!(wc.entry("trunk").unwrap().is_scheduled_delete());
        assert!(wc.entry("trunk/a.txt").unwrap().is_scheduled_delete());
    }

    #[test]
    fn test_delete_of_added_path_forgets_entry() {
        let (_dir, mut wc) = setup();
        wc.add_directory("trunk/new").unwrap();
        assert_eq!(wc.entry("trunk/new").unwrap().schedule, Schedule::Add);
        wc.delete("trunk/new").unwrap();
        assert!(wc.entry("trunk/new").is_none());
    }

    #[test]
    fn test_add_directory_replaces_deleted_and_rejects_file() {
        let (_dir, mut wc) = setup();
        assert!(matches!(
            wc.add_directory("trunk/a.txt"),
            Err(WcError::Obstructed(_))
        ));
        wc.delete("trunk/a.txt").unwrap();
        wc.add_directory("trunk/a.txt").unwrap();
        assert_eq!(wc.entry("trunk/a.txt").unwrap().schedule, Schedule::Replace);
    }

    #[test]
    fn test_add_repository_file() {
        let (dir, mut wc) = setup();
        let incoming = dir.path().join("incoming");
        std::fs::write(&incoming, b"new\n").unwrap();
        let props: PropMap = [("color".to_string(), "red".to_string())].into();
        wc.add_repository_file("trunk/b.txt", &incoming, &props)
            .unwrap();
        assert_eq!(std::fs::read(wc.abspath("trunk/b.txt")).unwrap(), b"new\n");
        assert_eq!(wc.entry("trunk/b.txt").unwrap().schedule, Schedule::Add);
        assert_eq!(wc.props("trunk/b.txt").get("color").unwrap(), "red");
        assert!(!wc.has_text_modifications("trunk/b.txt").unwrap());
    }

    #[test]
    fn test_unversioned_parent_rejected() {
        let (_dir, mut wc) = setup();
        assert!(matches!(
            wc.import_file("nope/a.txt", b"", PropMap::new(), 1),
            Err(WcError::NotVersioned(_))
        ));
    }
}
