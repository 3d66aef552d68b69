//! Merge result / action state machine.
//!
//! `PendingMerge` → `CompletedMerge` → `ChosenAction` → `FinalizedMerge`.
//! Each transition consumes the previous stage. Scratch files (the merge
//! result and a detranslated local copy) are owned as [`TempPath`]s, so they
//! disappear on every exit path, including errors and cancellation.

use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, info};

use crate::callback::StatusType;
use crate::cancel::CancelToken;
use crate::config::MergeLabels;
use crate::errors::{CoreError, WcError};
use crate::merge::{MergeOutcome, ThreeWayMerger};
use crate::resolve::{ConflictResolver, MergeAction, MergeRequest};
use crate::wc::content::{files_equal, node_kind};
use crate::wc::log::{WorkItem, WorkLog};
use crate::wc::translate::Direction;
use crate::wc::{file_name, NodeKind, WorkingCopy, CONFLICT_NEW, CONFLICT_OLD, CONFLICT_WORKING};

// ---------------------------------------------------------------------------
// File set
// ---------------------------------------------------------------------------

/// The files taking part in one merge and resolution cycle.
#[derive(Debug, Clone)]
pub struct MergeFileSet {
    /// Working-copy relative path of the merge target.
    pub target: String,
    /// Left side, normal form.
    pub base_file: PathBuf,
    /// Right side, normal form.
    pub repository_file: PathBuf,
    /// The working file on disk.
    pub working_file: PathBuf,
    /// Local merge input: a detranslated scratch copy, or the working file
    /// itself when no translation applies.
    pub local_file: PathBuf,
    /// Scratch file receiving the merge result.
    pub result_file: PathBuf,
    pub labels: MergeLabels,
    pub binary: bool,
    pub dry_run: bool,
}

impl MergeFileSet {
    /// `true` when the local input is a relocated scratch copy.
    pub fn has_relocated_local(&self) -> bool {
        self.local_file != self.working_file
    }
}

struct Scratch {
    result: TempPath,
    local_copy: Option<TempPath>,
}

fn scratch_path(dir: &Path) -> Result<TempPath, WcError> {
    tempfile::Builder::new()
        .prefix("merge-")
        .tempfile_in(dir)
        .map(|f| f.into_temp_path())
        .map_err(|e| WcError::io(dir, e))
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Inputs staged, merge not yet run.
pub struct PendingMerge {
    files: MergeFileSet,
    scratch: Scratch,
}

impl PendingMerge {
    /// Stage a merge of `request` against the working copy. A text target
    /// with EOL or keyword translation is merged from a normal-form copy.
    pub fn prepare(
        wc: &dyn WorkingCopy,
        request: &MergeRequest<'_>,
        labels: MergeLabels,
    ) -> Result<Self, CoreError> {
        let tmp = wc.tmp_dir();
        let working_file = wc.abspath(request.target);
        let result = scratch_path(&tmp)?;

        let translation = wc.translation(request.target);
        let local_copy = if !request.binary && !translation.is_identity() {
            let copy = scratch_path(&tmp)?;
            translation.copy_file(&working_file, &copy, Direction::ToNormal)?;
            debug!(path = request.target, "merging from detranslated local copy");
            Some(copy)
        } else {
            None
        };

        let files = MergeFileSet {
            target: request.target.to_string(),
            base_file: request.left.to_path_buf(),
            repository_file: request.right.to_path_buf(),
            local_file: local_copy
                .as_ref()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| working_file.clone()),
            working_file,
            result_file: result.to_path_buf(),
            labels,
            binary: request.binary,
            dry_run: request.dry_run,
        };
        Ok(Self {
            files,
            scratch: Scratch { result, local_copy },
        })
    }

    pub fn files(&self) -> &MergeFileSet {
        &self.files
    }

    /// Run the three-way merge, or the byte comparison for binary files.
    /// A clean merge reproducing the working content is downgraded to
    /// [`StatusType::Unchanged`].
    pub fn run(self, merger: &ThreeWayMerger, cancel: &CancelToken) -> Result<CompletedMerge, CoreError> {
        cancel.check()?;
        let files = &self.files;

        let (status, outcome) = if files.binary {
            if files_equal(&files.local_file, &files.repository_file)? {
                (StatusType::Unchanged, None)
            } else {
                (StatusType::Conflicted, None)
            }
        } else {
            let outcome = merger.merge_files(
                &files.base_file,
                &files.local_file,
                &files.repository_file,
                &files.result_file,
                cancel,
            )?;
            let status = if outcome.is_conflicted() {
                StatusType::Conflicted
            } else if files_equal(&files.result_file, &files.local_file)? {
                StatusType::Unchanged
            } else {
                StatusType::Merged
            };
            (status, Some(outcome))
        };

        info!(path = %files.target, binary = files.binary, %status, "merge complete");
        Ok(CompletedMerge {
            files: self.files,
            scratch: self.scratch,
            status,
            outcome,
        })
    }
}

/// Merge has run; status known, no action chosen yet.
pub struct CompletedMerge {
    files: MergeFileSet,
    scratch: Scratch,
    status: StatusType,
    outcome: Option<MergeOutcome>,
}

impl fmt::Debug for CompletedMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedMerge")
            .field("files", &self.files)
            .field("status", &self.status)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl CompletedMerge {
    pub fn files(&self) -> &MergeFileSet {
        &self.files
    }

    /// `Unchanged`, `Merged` or `Conflicted`.
    pub fn status(&self) -> StatusType {
        self.status
    }

    /// Line merge outcome; `None` for binary files.
    pub fn outcome(&self) -> Option<MergeOutcome> {
        self.outcome
    }

    /// Default policy: conflicts are marked, everything else takes the merged
    /// file. On conflict `resolver` may override with any action.
    pub fn choose(self, resolver: &mut dyn ConflictResolver) -> ChosenAction {
        let (action, explicit) = if self.status.is_conflicted() {
            match resolver.choose(&self) {
                Some(action) => (action, true),
                None => (MergeAction::MarkConflicted, false),
            }
        } else {
            (MergeAction::ChooseMergedFile, false)
        };
        info!(path = %self.files.target, %action, explicit, "merge action chosen");
        ChosenAction {
            merge: self,
            action,
            explicit,
        }
    }
}

/// Action chosen; files not touched yet.
pub struct ChosenAction {
    merge: CompletedMerge,
    action: MergeAction,
    explicit: bool,
}

/// References to the preserved copies of a text conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFiles {
    pub base: PathBuf,
    pub working: PathBuf,
    pub repository: PathBuf,
}

/// Outcome of a finished merge and resolution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedMerge {
    pub status: StatusType,
    pub action: MergeAction,
    pub outcome: Option<MergeOutcome>,
    /// Set when conflict copies were (or, in a dry run, would be) preserved.
    pub conflict_files: Option<ConflictFiles>,
}

impl ChosenAction {
    pub fn action(&self) -> MergeAction {
        self.action
    }

    pub fn merge(&self) -> &CompletedMerge {
        &self.merge
    }

    /// Apply the action through a work log. Dry runs compute the same status
    /// without building a log.
    pub fn finalize(self, wc: &mut dyn WorkingCopy) -> Result<FinalizedMerge, CoreError> {
        let files = &self.merge.files;
        let merged_status = self.merge.status;
        let conflicted = merged_status.is_conflicted();
        let mut log = WorkLog::new();
        let mut conflict_files = None;

        let status = match self.action {
            MergeAction::MarkConflicted => {
                conflict_files = Some(self.preserve_conflict_files(&mut log));
                if self.explicit {
                    StatusType::ConflictedUnresolved
                } else {
                    StatusType::Conflicted
                }
            }
            MergeAction::ChooseBase => {
                self.install(&files.base_file, &mut log);
                StatusType::Merged
            }
            MergeAction::ChooseRepository => {
                self.install(&files.repository_file, &mut log);
                StatusType::Merged
            }
            MergeAction::ChooseWorking => StatusType::Merged,
            // the marker-laden result is kept alongside the usual conflict copies
            MergeAction::ChooseMergedFile if conflicted => {
                conflict_files = Some(self.preserve_conflict_files(&mut log));
                StatusType::Merged
            }
            MergeAction::ChooseMergedFile | MergeAction::MarkResolved => {
                if !files.binary && merged_status != StatusType::Unchanged {
                    self.install(&files.result_file, &mut log);
                }
                if self.action == MergeAction::MarkResolved {
                    for name in [CONFLICT_OLD, CONFLICT_NEW, CONFLICT_WORKING] {
                        log.push(WorkItem::SetEntryProperty {
                            path: files.target.clone(),
                            name: name.to_string(),
                            value: None,
                        });
                    }
                }
                if conflicted {
                    StatusType::Merged
                } else {
                    merged_status
                }
            }
        };

        if files.dry_run {
            debug!(path = %files.target, %status, "dry run, work log discarded");
        } else {
            self.post_merge_cleanup(&mut log);
            log.commit(wc)?;
        }

        info!(path = %files.target, action = %self.action, %status, "merge finalized");
        Ok(FinalizedMerge {
            status,
            action: self.action,
            outcome: self.merge.outcome,
            conflict_files: if files.dry_run { None } else { conflict_files },
        })
    }

    /// Copy `source` (normal form) over the working file in working form.
    fn install(&self, source: &Path, log: &mut WorkLog) {
        let files = &self.merge.files;
        log.push(WorkItem::CopyAndTranslate {
            src: source.to_path_buf(),
            dst: files.working_file.clone(),
            target: files.target.clone(),
            direction: Direction::ToWorking,
        });
    }

    fn preserve_conflict_files(&self, log: &mut WorkLog) -> ConflictFiles {
        let files = &self.merge.files;
        let dir = files
            .working_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let name = file_name(&files.target);

        let mut taken = Vec::new();
        let working = unique_conflict_path(&dir, name, &files.labels.working, &taken);
        taken.push(working.clone());
        let base = unique_conflict_path(&dir, name, &files.labels.base, &taken);
        taken.push(base.clone());
        let repository = unique_conflict_path(&dir, name, &files.labels.repository, &taken);

        for (src, dst) in [
            (&files.local_file, &working),
            (&files.base_file, &base),
            (&files.repository_file, &repository),
        ] {
            log.push(WorkItem::CopyAndTranslate {
                src: src.clone(),
                dst: dst.clone(),
                target: files.target.clone(),
                direction: Direction::ToWorking,
            });
        }
        if !files.binary {
            self.install(&files.result_file, log);
        }

        for (attribute, path) in [
            (CONFLICT_OLD, &base),
            (CONFLICT_NEW, &repository),
            (CONFLICT_WORKING, &working),
        ] {
            let value = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            log.push(WorkItem::SetEntryProperty {
                path: files.target.clone(),
                name: attribute.to_string(),
                value: Some(value),
            });
        }

        ConflictFiles {
            base,
            working,
            repository,
        }
    }

    /// Remove scratch files and reconcile permission bits.
    fn post_merge_cleanup(&self, log: &mut WorkLog) {
        let scratch = &self.merge.scratch;
        log.push(WorkItem::Delete {
            path: scratch.result.to_path_buf(),
        });
        if let Some(copy) = &scratch.local_copy {
            log.push(WorkItem::Delete {
                path: copy.to_path_buf(),
            });
        }
        let target = self.merge.files.target.clone();
        log.push(WorkItem::MaybeSetExecutable {
            path: target.clone(),
        });
        log.push(WorkItem::MaybeSetReadonly { path: target });
    }
}

/// `<name><label>`, or `<name>.<n><label>` when that is taken.
fn unique_conflict_path(dir: &Path, name: &str, label: &str, taken: &[PathBuf]) -> PathBuf {
    let is_free = |p: &PathBuf| node_kind(p) == NodeKind::None && !taken.contains(p);
    let first = dir.join(format!("{name}{label}"));
    if is_free(&first) {
        return first;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{name}.{n}{label}"));
        if is_free(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
