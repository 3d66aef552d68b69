//! Diff callback that applies changes to a working copy.
//!
//! Directory and file additions and deletions are applied directly. Text
//! changes go through the [`TextMerger`]. Binary changes take an equality
//! shortcut when possible. In dry-run mode nothing on disk changes, but
//! every status matches what a real run would report.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::callback::{is_ancestor, DiffCallback, FileChange, FileStatus, StatusType};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::errors::{ConfigError, CoreError, WcError};
use crate::resolve::{ConflictResolver, MergeAction, MergeRequest, TextMerger};
use crate::wc::content::{files_equal, node_kind, verify_checksum};
use crate::wc::events::{Event, EventAction, EventSink, TracingEventSink};
use crate::wc::log::{WorkItem, WorkLog};
use crate::wc::props::{
    categorize, is_binary_mime_type, merge_properties, regular_props, PropChange, PropMap,
    MIME_TYPE,
};
use crate::wc::translate::Direction;
use crate::wc::{parent_path, NodeKind, WorkingCopy};

pub struct MergeCallback<W: WorkingCopy> {
    wc: W,
    text_merger: TextMerger,
    dry_run: bool,
    force: bool,
    /// Last directory "added" during a dry run; its descendants have no
    /// versioned parent on disk.
    added_path: Option<String>,
    deleted_paths: HashSet<String>,
    events: Box<dyn EventSink>,
    cancel: CancelToken,
}

impl<W: WorkingCopy> MergeCallback<W> {
    pub fn new(wc: W, text_merger: TextMerger) -> Self {
        Self {
            wc,
            text_merger,
            dry_run: false,
            force: false,
            added_path: None,
            deleted_paths: HashSet::new(),
            events: Box::new(TracingEventSink),
            cancel: CancelToken::new(),
        }
    }

    /// Build from the `[merge]`, `[markers]`, `[labels]` and `[session]` settings.
    pub fn from_config(config: &EngineConfig, wc: W) -> Result<Self, ConfigError> {
        let merger = config.three_way_merger()?;
        Ok(Self::new(wc, TextMerger::new(merger, config.labels.clone()))
            .with_dry_run(config.session.dry_run)
            .with_force(config.session.force))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Delete locally modified paths instead of reporting them obstructed.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_event_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.text_merger = self.text_merger.with_resolver(resolver);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn added_path(&self) -> Option<&str> {
        self.added_path.as_deref()
    }

    /// `true` when `path` was deleted earlier in this dry-run session.
    pub fn is_path_deleted(&self, path: &str) -> bool {
        self.deleted_paths.contains(path)
    }

    /// Forget deletions; call between independent diff sessions.
    pub fn clear_deleted_paths(&mut self) {
        self.deleted_paths.clear();
    }

    pub fn working_copy(&self) -> &W {
        &self.wc
    }

    pub fn into_working_copy(self) -> W {
        self.wc
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn has_versioned_parent(&self, path: &str) -> bool {
        let parent = parent_path(path);
        self.wc.entry(parent).is_some_and(|e| e.kind == NodeKind::Dir)
            && node_kind(&self.wc.abspath(parent)) == NodeKind::Dir
    }

    fn under_dry_run_addition(&self, path: &str) -> bool {
        self.dry_run
            && self
                .added_path
                .as_deref()
                .is_some_and(|added| is_ancestor(added, path))
    }

    fn deleted_in_dry_run(&self, path: &str) -> bool {
        self.dry_run && self.is_path_deleted(path)
    }

    fn emit(&mut self, path: &str, action: EventAction, status: FileStatus) {
        let event = Event::new(path, action, status.content, status.props);
        self.events.handle_event(&event);
    }

    fn schedule_directory_add(&mut self, path: &str) -> Result<(), CoreError> {
        if self.dry_run {
            self.added_path = Some(path.to_string());
        } else {
            self.wc.add_directory(path)?;
        }
        Ok(())
    }

    /// Remove a versioned node, refusing local modifications unless forced.
    fn delete_node(&mut self, path: &str) -> Result<StatusType, CoreError> {
        if self.wc.entry(path).is_none() {
            debug!(path, "refusing to delete unversioned path");
            return Ok(StatusType::Obstructed);
        }
        if !self.force && self.wc.has_local_modifications(path)? {
            info!(path, "locally modified, not deleted");
            return Ok(StatusType::Obstructed);
        }
        if self.dry_run {
            self.deleted_paths.insert(path.to_string());
            return Ok(StatusType::Changed);
        }
        match self.wc.delete(path) {
            Ok(()) => Ok(StatusType::Changed),
            Err(WcError::NotVersioned(_)) | Err(WcError::Obstructed(_)) => Ok(StatusType::Obstructed),
            Err(e) => Err(e.into()),
        }
    }

    fn merge_props(
        &mut self,
        path: &str,
        original: &PropMap,
        changes: &[PropChange],
    ) -> Result<StatusType, CoreError> {
        if categorize(changes).regular.is_empty() {
            return Ok(StatusType::Unknown);
        }
        Ok(merge_properties(&mut self.wc, path, original, changes, self.dry_run)?)
    }

    /// Binary files skip the line merge when the outcome is already known.
    fn binary_shortcut(
        &mut self,
        change: &FileChange,
        left: &Path,
        right: &Path,
        text_modified: bool,
        add_necessitated: bool,
    ) -> Result<Option<StatusType>, CoreError> {
        let working = self.wc.abspath(&change.path);
        if files_equal(&working, right)? {
            // an add that lands on identical content still counts as the add
            let status = if add_necessitated && !text_modified {
                StatusType::Changed
            } else {
                StatusType::Unchanged
            };
            return Ok(Some(status));
        }
        if files_equal(left, right)? {
            return Ok(Some(StatusType::Unchanged));
        }
        if text_modified || add_necessitated || !files_equal(left, &working)? {
            return Ok(None);
        }
        if !self.dry_run {
            let mut log = WorkLog::new();
            log.push(WorkItem::CopyAndTranslate {
                src: right.to_path_buf(),
                dst: working,
                target: change.path.clone(),
                direction: Direction::ToWorking,
            });
            log.push(WorkItem::MaybeSetExecutable {
                path: change.path.clone(),
            });
            log.push(WorkItem::MaybeSetReadonly {
                path: change.path.clone(),
            });
            log.commit(&mut self.wc)?;
        }
        Ok(Some(StatusType::Changed))
    }

    fn merge_file(&mut self, change: &FileChange, add_necessitated: bool) -> Result<FileStatus, CoreError> {
        let path = change.path.as_str();
        if !self.has_versioned_parent(path)
            || self.wc.entry(path).is_none()
            || node_kind(&self.wc.abspath(path)) != NodeKind::File
        {
            return Ok(FileStatus::both(StatusType::Missing));
        }

        let mut status = FileStatus::both(StatusType::Unchanged);
        if !change.prop_changes.is_empty() {
            status.props = self.merge_props(path, &change.original_props, &change.prop_changes)?;
        }

        let Some(right) = change.right_file.as_deref() else {
            return Ok(status);
        };
        if let Some(expected) = &change.right_checksum {
            verify_checksum(right, expected)?;
        }

        // An added file has no left side; merge it against empty content.
        let empty_base;
        let left = match change.left_file.as_deref() {
            Some(left) => left,
            None if add_necessitated => {
                empty_base = tempfile::NamedTempFile::new_in(self.wc.tmp_dir())
                    .map_err(|e| WcError::io(self.wc.tmp_dir(), e))?
                    .into_temp_path();
                &*empty_base
            }
            None => return Ok(status),
        };

        let text_modified = self.wc.has_text_modifications(path)?;
        let binary_change = is_binary_mime_type(change.left_mime_type.as_deref())
            || is_binary_mime_type(change.right_mime_type.as_deref());
        if binary_change {
            if let Some(content) =
                self.binary_shortcut(change, left, right, text_modified, add_necessitated)?
            {
                status.content = content;
                return Ok(status);
            }
        }

        let working_props = self.wc.props(path);
        let request = MergeRequest {
            target: path,
            left,
            right,
            left_revision: change.left_revision,
            right_revision: change.right_revision,
            binary: binary_change || is_binary_mime_type(working_props.get(MIME_TYPE).map(String::as_str)),
            dry_run: self.dry_run,
        };
        let done = self
            .text_merger
            .merge_text(&mut self.wc, &request, &self.cancel)?;

        status.content = if done.status.is_conflicted() {
            done.status
        } else if text_modified {
            StatusType::Merged
        } else if done.status == StatusType::Merged {
            StatusType::Changed
        } else {
            StatusType::Unchanged
        };
        if done.action == MergeAction::MarkResolved {
            self.emit(path, EventAction::Resolved, status);
        }
        Ok(status)
    }
}

fn file_event(status: FileStatus) -> EventAction {
    match status.content {
        StatusType::Missing | StatusType::Obstructed => EventAction::Skip,
        StatusType::Conflicted | StatusType::ConflictedUnresolved => EventAction::Conflict,
        StatusType::Merged => EventAction::Merge,
        _ if status.props.is_conflicted() => EventAction::Conflict,
        _ => EventAction::Update,
    }
}

fn structural_event(status: StatusType, action: EventAction) -> EventAction {
    match status {
        StatusType::Changed => action,
        _ => EventAction::Skip,
    }
}

// ---------------------------------------------------------------------------
// DiffCallback
// ---------------------------------------------------------------------------

impl<W: WorkingCopy> DiffCallback for MergeCallback<W> {
    fn directory_added(&mut self, path: &str, revision: i64) -> Result<StatusType, CoreError> {
        self.cancel.check()?;
        let status = if !self.has_versioned_parent(path) {
            if self.under_dry_run_addition(path) {
                StatusType::Changed
            } else {
                StatusType::Missing
            }
        } else {
            let entry = self.wc.entry(path).map(|e| e.is_scheduled_delete());
            match node_kind(&self.wc.abspath(path)) {
                NodeKind::None | NodeKind::Dir if entry.is_none() || entry == Some(true) => {
                    self.schedule_directory_add(path)?;
                    StatusType::Changed
                }
                NodeKind::None => StatusType::Obstructed,
                NodeKind::Dir => {
                    if self.deleted_in_dry_run(path) {
                        StatusType::Changed
                    } else {
                        StatusType::Obstructed
                    }
                }
                NodeKind::File | NodeKind::Symlink => {
                    if self.dry_run {
                        self.added_path = None;
                    }
                    if entry.is_some() && self.deleted_in_dry_run(path) {
                        StatusType::Changed
                    } else {
                        StatusType::Obstructed
                    }
                }
            }
        };
        debug!(path, revision, %status, "directory added");
        self.emit(
            path,
            structural_event(status, EventAction::Add),
            FileStatus::new(status, StatusType::Unknown),
        );
        Ok(status)
    }

    fn directory_deleted(&mut self, path: &str) -> Result<StatusType, CoreError> {
        self.cancel.check()?;
        let status = if !self.has_versioned_parent(path) {
            StatusType::Missing
        } else {
            match node_kind(&self.wc.abspath(path)) {
                NodeKind::Dir => self.delete_node(path)?,
                NodeKind::File | NodeKind::Symlink => StatusType::Obstructed,
                NodeKind::None => StatusType::Missing,
            }
        };
        debug!(path, %status, "directory deleted");
        self.emit(
            path,
            structural_event(status, EventAction::Delete),
            FileStatus::new(status, StatusType::Unknown),
        );
        Ok(status)
    }

    fn file_added(&mut self, change: &FileChange) -> Result<FileStatus, CoreError> {
        self.cancel.check()?;
        let path = change.path.as_str();

        let added_props = if change.prop_changes.is_empty() {
            StatusType::Unknown
        } else {
            StatusType::Changed
        };

        let status = if !self.has_versioned_parent(path) {
            if self.under_dry_run_addition(path) {
                FileStatus::new(StatusType::Changed, added_props)
            } else {
                FileStatus::new(StatusType::Missing, StatusType::Unknown)
            }
        } else {
            let entry = self.wc.entry(path).map(|e| e.is_scheduled_delete());
            match node_kind(&self.wc.abspath(path)) {
                NodeKind::None => {
                    if entry == Some(false) {
                        FileStatus::new(StatusType::Obstructed, StatusType::Unknown)
                    } else if let Some(right) = change.right_file.as_deref() {
                        if let Some(expected) = &change.right_checksum {
                            verify_checksum(right, expected)?;
                        }
                        if !self.dry_run {
                            let mut props = regular_props(&change.original_props);
                            for prop in categorize(&change.prop_changes).regular {
                                match prop.value {
                                    Some(value) => props.insert(prop.name, value),
                                    None => props.remove(&prop.name),
                                };
                            }
                            self.wc.add_repository_file(path, right, &props)?;
                        }
                        FileStatus::new(StatusType::Changed, added_props)
                    } else {
                        warn!(path, "file added without content");
                        FileStatus::both(StatusType::Unknown)
                    }
                }
                NodeKind::Dir | NodeKind::Symlink => {
                    let content = if self.deleted_in_dry_run(path) {
                        StatusType::Changed
                    } else {
                        StatusType::Obstructed
                    };
                    FileStatus::new(content, StatusType::Unknown)
                }
                NodeKind::File => {
                    if entry.is_none() || entry == Some(true) {
                        FileStatus::new(StatusType::Obstructed, StatusType::Unknown)
                    } else if self.deleted_in_dry_run(path) {
                        FileStatus::new(StatusType::Changed, StatusType::Unknown)
                    } else {
                        debug!(path, "file already versioned, merging addition as change");
                        self.merge_file(change, true)?
                    }
                }
            }
        };

        debug!(path, content = %status.content, props = %status.props, "file added");
        let action = match status.content {
            StatusType::Changed => EventAction::Add,
            _ => file_event(status),
        };
        self.emit(path, action, status);
        Ok(status)
    }

    fn file_changed(&mut self, change: &FileChange) -> Result<FileStatus, CoreError> {
        self.cancel.check()?;
        let status = self.merge_file(change, false)?;
        debug!(path = %change.path, content = %status.content, props = %status.props, "file changed");
        self.emit(&change.path, file_event(status), status);
        Ok(status)
    }

    fn file_deleted(&mut self, change: &FileChange) -> Result<StatusType, CoreError> {
        self.cancel.check()?;
        let path = change.path.as_str();
        let status = if !self.has_versioned_parent(path) {
            StatusType::Missing
        } else {
            match node_kind(&self.wc.abspath(path)) {
                NodeKind::File | NodeKind::Symlink => self.delete_node(path)?,
                NodeKind::Dir => StatusType::Obstructed,
                NodeKind::None => StatusType::Missing,
            }
        };
        debug!(path, %status, "file deleted");
        self.emit(
            path,
            structural_event(status, EventAction::Delete),
            FileStatus::new(status, StatusType::Unknown),
        );
        Ok(status)
    }

    fn properties_changed(
        &mut self,
        path: &str,
        original: &PropMap,
        changes: &[PropChange],
    ) -> Result<StatusType, CoreError> {
        self.cancel.check()?;
        let status = self.merge_props(path, original, changes)?;
        debug!(path, %status, "properties changed");
        let action = match status {
            StatusType::Missing => EventAction::Skip,
            StatusType::Conflicted => EventAction::Conflict,
            _ => EventAction::Update,
        };
        self.emit(path, action, FileStatus::new(StatusType::Unknown, status));
        Ok(status)
    }
}
