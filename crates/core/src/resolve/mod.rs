//! Text merge with conflict resolution.
//!
//! [`TextMerger::merge_text`] drives one file through the
//! [`pipeline`] stages: stage inputs, merge, pick a [`MergeAction`], apply it
//! through a work log.

pub mod pipeline;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::LabelConfig;
use crate::errors::CoreError;
use crate::merge::ThreeWayMerger;
use crate::wc::WorkingCopy;

pub use pipeline::{CompletedMerge, ConflictFiles, FinalizedMerge, MergeFileSet, PendingMerge};

/// What to do with a finished merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    /// Preserve the three inputs next to the working file and record them.
    MarkConflicted,
    /// Replace the working file with the left side.
    ChooseBase,
    /// Replace the working file with the right side.
    ChooseRepository,
    /// Keep the working file as is.
    ChooseWorking,
    /// Install the merge result.
    ChooseMergedFile,
    /// Install the merge result and clear recorded conflict files.
    MarkResolved,
}

impl fmt::Display for MergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MarkConflicted => "mark_conflicted",
            Self::ChooseBase => "choose_base",
            Self::ChooseRepository => "choose_repository",
            Self::ChooseWorking => "choose_working",
            Self::ChooseMergedFile => "choose_merged_file",
            Self::MarkResolved => "mark_resolved",
        };
        write!(f, "{s}")
    }
}

/// Consulted for conflicted merges only. `None` keeps the default
/// ([`MergeAction::MarkConflicted`]).
pub trait ConflictResolver {
    fn choose(&mut self, merge: &CompletedMerge) -> Option<MergeAction>;
}

/// Never overrides the default action.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl ConflictResolver for DefaultResolver {
    fn choose(&mut self, _merge: &CompletedMerge) -> Option<MergeAction> {
        None
    }
}

/// Answers every conflict with the same action.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysChoose(pub MergeAction);

impl ConflictResolver for AlwaysChoose {
    fn choose(&mut self, _merge: &CompletedMerge) -> Option<MergeAction> {
        Some(self.0)
    }
}

/// One file to merge into the working copy.
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    pub target: &'a str,
    /// Left side, normal form.
    pub left: &'a Path,
    /// Right side, normal form.
    pub right: &'a Path,
    pub left_revision: i64,
    pub right_revision: i64,
    pub binary: bool,
    pub dry_run: bool,
}

/// Line merger plus resolution policy.
pub struct TextMerger {
    merger: ThreeWayMerger,
    labels: LabelConfig,
    resolver: Box<dyn ConflictResolver>,
}

impl Default for TextMerger {
    fn default() -> Self {
        Self::new(ThreeWayMerger::default(), LabelConfig::default())
    }
}

impl TextMerger {
    pub fn new(merger: ThreeWayMerger, labels: LabelConfig) -> Self {
        Self {
            merger,
            labels,
            resolver: Box::new(DefaultResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn merger(&self) -> &ThreeWayMerger {
        &self.merger
    }

    /// Merge `request.left → request.right` into the working file.
    pub fn merge_text(
        &mut self,
        wc: &mut dyn WorkingCopy,
        request: &MergeRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<FinalizedMerge, CoreError> {
        let labels = self
            .labels
            .for_revisions(request.left_revision, request.right_revision);
        let pending = PendingMerge::prepare(&*wc, request, labels)?;
        let completed = pending.run(&self.merger, cancel)?;
        completed.choose(self.resolver.as_mut()).finalize(wc)
    }
}
