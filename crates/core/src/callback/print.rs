//! Diff callback that renders a unified diff and never touches the working copy.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::callback::{revision_label, DiffCallback, FileChange, FileStatus, StatusType};
use crate::errors::{CoreError, MergeError};
use crate::wc::content::read_file;
use crate::wc::props::{categorize, is_binary_mime_type, PropChange, PropMap};

const HEADER_RULE: &str = "===================================================================";
const PROPERTY_RULE: &str = "___________________________________________________________________";

pub struct PrintDiffCallback<W: Write> {
    out: W,
    diff_added: bool,
    diff_deleted: bool,
}

impl<W: Write> PrintDiffCallback<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            diff_added: true,
            diff_deleted: true,
        }
    }

    /// Print the content of added files.
    pub fn with_diff_added(mut self, enabled: bool) -> Self {
        self.diff_added = enabled;
        self
    }

    /// Print the content of deleted files.
    pub fn with_diff_deleted(mut self, enabled: bool) -> Self {
        self.diff_deleted = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, path: &str, text: &str) -> Result<(), CoreError> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| MergeError::io(path, e))?;
        Ok(())
    }

    fn write_header(&mut self, path: &str, left_revision: i64, right_revision: i64) -> Result<(), CoreError> {
        let header = format!(
            "Index: {path}\n{HEADER_RULE}\n--- {path}\t{}\n+++ {path}\t{}\n",
            revision_label(left_revision),
            revision_label(right_revision),
        );
        self.write(path, &header)
    }

    /// Missing sides compare as empty content.
    fn display_file_diff(
        &mut self,
        change: &FileChange,
        left: Option<&Path>,
        right: Option<&Path>,
    ) -> Result<(), CoreError> {
        let path = change.path.as_str();
        let load = |file: Option<&Path>| -> Result<Vec<u8>, CoreError> {
            match file {
                Some(file) => Ok(read_file(file)?),
                None => Ok(Vec::new()),
            }
        };
        let old = load(left)?;
        let new = load(right)?;
        if old == new {
            debug!(path, "identical content, nothing to print");
            return Ok(());
        }

        let binary = is_binary_mime_type(change.left_mime_type.as_deref())
            || is_binary_mime_type(change.right_mime_type.as_deref());
        let text = match (std::str::from_utf8(&old), std::str::from_utf8(&new)) {
            (Ok(old), Ok(new)) if !binary => Some((old, new)),
            _ => None,
        };

        let Some((old, new)) = text else {
            let block = format!("Index: {path}\n{HEADER_RULE}\n(Binary files differ)\n");
            return self.write(path, &block);
        };

        self.write_header(path, change.left_revision, change.right_revision)?;
        let patch = diffy::create_patch(old, new).to_string();
        let hunks: String = patch
            .split_inclusive('\n')
            .skip_while(|line| !line.starts_with("@@"))
            .collect();
        self.write(path, &hunks)
    }

    fn display_prop_diff(
        &mut self,
        path: &str,
        original: &PropMap,
        changes: &[PropChange],
    ) -> Result<(), CoreError> {
        let regular = categorize(changes).regular;
        if regular.is_empty() {
            return Ok(());
        }
        let mut block = format!("\nProperty changes on: {path}\n{PROPERTY_RULE}\n");
        for change in &regular {
            match (original.get(&change.name), &change.value) {
                (None, Some(new)) => {
                    block.push_str(&format!("Added: {}\n   + {new}\n", change.name));
                }
                (Some(old), None) => {
                    block.push_str(&format!("Deleted: {}\n   - {old}\n", change.name));
                }
                (Some(old), Some(new)) => {
                    block.push_str(&format!(
                        "Modified: {}\n   - {old}\n   + {new}\n",
                        change.name
                    ));
                }
                (None, None) => {}
            }
        }
        block.push('\n');
        self.write(path, &block)
    }
}

impl<W: Write> DiffCallback for PrintDiffCallback<W> {
    fn directory_added(&mut self, path: &str, revision: i64) -> Result<StatusType, CoreError> {
        debug!(path, revision, "directory added");
        Ok(StatusType::Unknown)
    }

    fn directory_deleted(&mut self, path: &str) -> Result<StatusType, CoreError> {
        debug!(path, "directory deleted");
        Ok(StatusType::Unknown)
    }

    fn file_added(&mut self, change: &FileChange) -> Result<FileStatus, CoreError> {
        if self.diff_added {
            if change.right_file.is_some() {
                self.display_file_diff(change, None, change.right_file.as_deref())?;
            }
            self.display_prop_diff(&change.path, &change.original_props, &change.prop_changes)?;
        }
        Ok(FileStatus::both(StatusType::Unknown))
    }

    fn file_changed(&mut self, change: &FileChange) -> Result<FileStatus, CoreError> {
        if change.left_file.is_some() {
            self.display_file_diff(change, change.left_file.as_deref(), change.right_file.as_deref())?;
        }
        self.display_prop_diff(&change.path, &change.original_props, &change.prop_changes)?;
        Ok(FileStatus::both(StatusType::Unknown))
    }

    fn file_deleted(&mut self, change: &FileChange) -> Result<StatusType, CoreError> {
        if self.diff_deleted && change.left_file.is_some() {
            self.display_file_diff(change, change.left_file.as_deref(), None)?;
        }
        Ok(StatusType::Unknown)
    }

    fn properties_changed(
        &mut self,
        path: &str,
        original: &PropMap,
        changes: &[PropChange],
    ) -> Result<StatusType, CoreError> {
        self.display_prop_diff(path, original, changes)?;
        Ok(StatusType::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_inputs(left: &[u8], right: &[u8]) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let l = dir.path().join("left");
        let r = dir.path().join("right");
        std::fs::write(&l, left).unwrap();
        std::fs::write(&r, right).unwrap();
        (dir, l, r)
    }

    fn render(cb: PrintDiffCallback<Vec<u8>>) -> String {
        String::from_utf8(cb.into_inner()).unwrap()
    }

    #[test]
    fn test_text_diff_has_header_and_hunk() {
        let (_dir, l, r) = write_inputs(b"a\nb\n", b"a\nc\n");
        let mut cb = PrintDiffCallback::new(Vec::new());
        let change = FileChange::new("f.txt").with_left(&l, 3).with_right(&r, -1);
        cb.file_changed(&change).unwrap();

        let out = render(cb);
        assert!(out.starts_with(&format!("Index: f.txt\n{HEADER_RULE}\n")));
        assert!(out.contains("--- f.txt\t(revision 3)\n"));
        assert!(out.contains("+++ f.txt\t(working copy)\n"));
        assert!(out.contains("@@ -1,2 +1,2 @@\n a\n-b\n+c\n"));
        assert!(!out.contains("original"));
    }

    #[test]
    fn test_identical_content_prints_nothing() {
        let (_dir, l, r) = write_inputs(b"same\n", b"same\n");
        let mut cb = PrintDiffCallback::new(Vec::new());
        let change = FileChange::new("f.txt").with_left(&l, 1).with_right(&r, 2);
        cb.file_changed(&change).unwrap();
        assert_eq!(render(cb), "");
    }

    #[test]
    fn test_binary_is_not_diffed() {
        let (_dir, l, r) = write_inputs(b"\x00\x01", b"\x00\x02");
        let mut cb = PrintDiffCallback::new(Vec::new());
        let change = FileChange::new("img.png")
            .with_left(&l, 1)
            .with_right(&r, 2)
            .with_mime_types(Some("image/png"), Some("image/png"));
        cb.file_changed(&change).unwrap();
        assert_eq!(render(cb), format!("Index: img.png\n{HEADER_RULE}\n(Binary files differ)\n"));
    }

    #[test]
    fn test_added_and_deleted_switches() {
        let (_dir, l, r) = write_inputs(b"old\n", b"new\n");
        let mut cb = PrintDiffCallback::new(Vec::new()).with_diff_added(false);
        cb.file_added(&FileChange::new("n.txt").with_right(&r, 2)).unwrap();
        cb.file_deleted(&FileChange::new("o.txt").with_left(&l, 1)).unwrap();

        let out = render(cb);
        assert!(!out.contains("n.txt"));
        assert!(out.contains("Index: o.txt\n"));
        assert!(out.contains("-old\n"));
    }

    #[test]
    fn test_property_block_lists_regular_changes() {
        let mut cb = PrintDiffCallback::new(Vec::new());
        let original: PropMap = [
            ("color".to_string(), "red".to_string()),
            ("size".to_string(), "xl".to_string()),
        ]
        .into();
        let changes = vec![
            PropChange::set("color", "blue"),
            PropChange::delete("size"),
            PropChange::set("owner", "ops"),
            PropChange::set("svn:entry:committed-rev", "9"),
        ];
        let status = cb.properties_changed("dir", &original, &changes).unwrap();
        assert_eq!(status, StatusType::Unknown);

        let out = render(cb);
        assert!(out.contains(&format!("Property changes on: dir\n{PROPERTY_RULE}\n")));
        assert!(out.contains("Modified: color\n   - red\n   + blue\n"));
        assert!(out.contains("Deleted: size\n   - xl\n"));
        assert!(out.contains("Added: owner\n   + ops\n"));
        assert!(!out.contains("committed-rev"));
    }
}
