//! Sequence differencer.
//!
//! Computes the [`DiffBlock`]s between two line sequences with the Myers
//! algorithm from `similar`, run over the simplified line keys.

use std::hash::Hash;
use std::ops::Range;

use similar::{Algorithm, DiffTag};
use tracing::trace;

use super::line::LineSequence;

/// A span of the left (base) sequence replaced by a span of the right
/// (changed) sequence. An empty `left` range is a pure insertion before
/// `left.start`; an empty `right` range is a pure deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBlock {
    pub left: Range<usize>,
    pub right: Range<usize>,
}

impl DiffBlock {
    pub fn new(left: Range<usize>, right: Range<usize>) -> Self {
        Self { left, right }
    }

    /// `true` when no base line is consumed.
    pub fn is_insertion(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left_len(&self) -> usize {
        self.left.len()
    }

    pub fn right_len(&self) -> usize {
        self.right.len()
    }
}

/// Diff two line sequences by their comparison keys.
pub fn diff_sequences(left: &LineSequence, right: &LineSequence) -> Vec<DiffBlock> {
    diff_keys(&left.keys(), &right.keys())
}

/// Diff two slices of comparable items. Blocks come back ordered and
/// non-overlapping in both coordinates.
pub fn diff_keys<T: Eq + Hash + Ord>(left: &[T], right: &[T]) -> Vec<DiffBlock> {
    let ops = similar::capture_diff_slices(Algorithm::Myers, left, right);

    let mut blocks: Vec<DiffBlock> = Vec::new();
    for op in &ops {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        // a delete directly followed by an insert is one replaced span
        match blocks.last_mut() {
            Some(last) if last.left.end == old.start && last.right.end == new.start => {
                last.left.end = old.end;
                last.right.end = new.end;
            }
            _ => blocks.push(DiffBlock::new(old, new)),
        }
    }

    trace!(
        left_len = left.len(),
        right_len = right.len(),
        blocks = blocks.len(),
        "computed diff blocks"
    );
    blocks
}
