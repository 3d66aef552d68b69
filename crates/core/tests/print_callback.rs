//! Rendering a small tree walk through `PrintDiffCallback`.

use tempfile::TempDir;

use wcmerge_core::callback::{DiffCallback, FileChange, PrintDiffCallback, StatusType};
use wcmerge_core::wc::props::{PropChange, PropMap};

#[test]
fn tree_walk_renders_each_file_once() {
    let dir = TempDir::new().unwrap();
    let write = |name: &str, data: &[u8]| {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    };
    let changed_left = write("changed.left", b"one\ntwo\n");
    let changed_right = write("changed.right", b"one\n2\n");
    let added = write("added", b"fresh\n");
    let deleted = write("deleted", b"stale\n");

    let mut cb = PrintDiffCallback::new(Vec::new());
    assert_eq!(cb.directory_added("docs", 7).unwrap(), StatusType::Unknown);
    cb.file_changed(
        &FileChange::new("src/lib.rs")
            .with_left(&changed_left, 6)
            .with_right(&changed_right, 7),
    )
    .unwrap();
    cb.file_added(
        &FileChange::new("docs/new.md")
            .with_right(&added, 7)
            .with_props(PropMap::new(), vec![PropChange::set("svn:eol-style", "native")]),
    )
    .unwrap();
    cb.file_deleted(&FileChange::new("old.txt").with_left(&deleted, 6))
        .unwrap();
    assert_eq!(cb.directory_deleted("attic").unwrap(), StatusType::Unknown);

    let out = String::from_utf8(cb.into_inner()).unwrap();
    assert_eq!(out.matches("Index: ").count(), 3);
    assert!(out.contains("--- src/lib.rs\t(revision 6)\n+++ src/lib.rs\t(revision 7)\n"));
    assert!(out.contains("-two\n+2\n"));
    assert!(out.contains("+fresh\n"));
    assert!(out.contains("Property changes on: docs/new.md\n"));
    assert!(out.contains("Added: svn:eol-style\n   + native\n"));
    assert!(out.contains("-stale\n"));
    assert!(!out.contains("docs\n") && !out.contains("attic"));
}

#[test]
fn working_copy_side_is_labelled() {
    let dir = TempDir::new().unwrap();
    let left = dir.path().join("l");
    let right = dir.path().join("r");
    std::fs::write(&left, b"x\n").unwrap();
    std::fs::write(&right, b"y\n").unwrap();

    let mut cb = PrintDiffCallback::new(Vec::new());
    cb.file_changed(&FileChange::new("a.txt").with_left(&left, 12).with_right(&right, -1))
        .unwrap();
    let out = String::from_utf8(cb.into_inner()).unwrap();
    assert!(out.contains("+++ a.txt\t(working copy)\n"));
}
