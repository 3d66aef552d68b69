//! Three-way line merge.
//!
//! The merger diffs base→local and base→latest, then walks both block lists
//! in lock-step. Identical edits collapse into one, overlapping edits grow
//! into a bracketed conflict region, and everything else is interleaved in
//! base order. Unchanged regions are replayed from *local*, so local's exact
//! bytes survive even when only the comparison keys matched.

use std::cmp::{max, min};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::errors::MergeError;
use crate::merge::markers::ConflictMarkers;
use crate::sequence::{diff_sequences, DiffBlock, DiffOptions, LineSequence, Simplifier};

/// Algorithm-level result of a merge. Priority: conflicted > merged > not modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The result equals local.
    NotModified,
    /// Latest's edits were folded into local without conflicts.
    Merged,
    /// At least one conflict region was written.
    Conflicted,
}

impl MergeOutcome {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted)
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotModified => write!(f, "not_modified"),
            Self::Merged => write!(f, "merged"),
            Self::Conflicted => write!(f, "conflicted"),
        }
    }
}

/// Line-based three-way merger with configurable markers and comparison options.
#[derive(Debug, Clone, Default)]
pub struct ThreeWayMerger {
    markers: ConflictMarkers,
    options: DiffOptions,
}

impl ThreeWayMerger {
    pub fn new(markers: ConflictMarkers, options: DiffOptions) -> Self {
        Self { markers, options }
    }

    pub fn markers(&self) -> &ConflictMarkers {
        &self.markers
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Merge in-memory contents into `result`.
    pub fn merge<W: Write>(
        &self,
        base: &[u8],
        local: &[u8],
        latest: &[u8],
        result: &mut W,
        cancel: &CancelToken,
    ) -> Result<MergeOutcome, MergeError> {
        let simplifier = Simplifier::from_options(&self.options);
        let base = LineSequence::from_bytes(base, &simplifier);
        let local = LineSequence::from_bytes(local, &simplifier);
        let latest = LineSequence::from_bytes(latest, &simplifier);
        self.merge_lines(
            &base,
            &local,
            &latest,
            result,
            Path::new("<merge result>"),
            cancel,
        )
    }

    /// Merge three files into `result`. Output goes to a scratch file in the
    /// result's directory that replaces `result` only when the merge succeeds.
    pub fn merge_files(
        &self,
        base: &Path,
        local: &Path,
        latest: &Path,
        result: &Path,
        cancel: &CancelToken,
    ) -> Result<MergeOutcome, MergeError> {
        let simplifier = Simplifier::from_options(&self.options);
        let base_lines = LineSequence::open(base, &simplifier)?;
        let local_lines = LineSequence::open(local, &simplifier)?;
        let latest_lines = LineSequence::open(latest, &simplifier)?;

        let dir = result
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::NamedTempFile::new_in(dir).map_err(|e| MergeError::io(dir, e))?;

        let outcome = {
            let mut writer = BufWriter::new(scratch.as_file());
            let outcome = self.merge_lines(
                &base_lines,
                &local_lines,
                &latest_lines,
                &mut writer,
                result,
                cancel,
            )?;
            writer.flush().map_err(|e| MergeError::io(result, e))?;
            outcome
        };

        scratch
            .persist(result)
            .map_err(|e| MergeError::io(result, e.error))?;
        info!(
            base = %base.display(),
            result = %result.display(),
            %outcome,
            "three-way merge written"
        );
        Ok(outcome)
    }

    fn merge_lines<W: Write>(
        &self,
        base: &LineSequence,
        local: &LineSequence,
        latest: &LineSequence,
        out: &mut W,
        result_path: &Path,
        cancel: &CancelToken,
    ) -> Result<MergeOutcome, MergeError> {
        let local_blocks = diff_sequences(base, local);
        let latest_blocks = diff_sequences(base, latest);
        debug!(
            base_lines = base.len(),
            local_blocks = local_blocks.len(),
            latest_blocks = latest_blocks.len(),
            "merging change blocks"
        );

        let base_len = base.len();
        let mut emitter = Emitter {
            local,
            latest,
            slots: align_local_lines(&local_blocks, base_len),
            next_base: 0,
            markers: &self.markers,
            out,
            result_path,
        };

        let (mut li, mut ti) = (0usize, 0usize);
        let (mut conflicted, mut merged) = (false, false);

        while li < local_blocks.len() || ti < latest_blocks.len() {
            cancel.check()?;

            if let (Some(l), Some(r)) = (local_blocks.get(li), latest_blocks.get(ti)) {
                if is_equal_change(l, r, local, latest) {
                    emitter.append_block(l, Side::Local)?;
                    li += 1;
                    ti += 1;
                    continue;
                }

                let (local_start, latest_start) = (li, ti);
                if grow_conflict(
                    &local_blocks,
                    &latest_blocks,
                    &mut li,
                    &mut ti,
                    local,
                    latest,
                    base_len,
                ) {
                    emitter.write_conflict(
                        (&local_blocks[local_start], &local_blocks[li]),
                        (&latest_blocks[latest_start], &latest_blocks[ti]),
                    )?;
                    li += 1;
                    ti += 1;
                    conflicted = true;
                    continue;
                }
            }

            let latest_block = latest_blocks.get(ti);
            if let Some(l) = local_blocks.get(li) {
                if latest_block.map_or(true, |r| is_before(l, r)) {
                    emitter.append_block(l, Side::Local)?;
                    li += 1;
                    merged = true;
                    continue;
                }
            }

            if let Some(r) = latest_block {
                emitter.append_block(r, Side::Latest)?;
                ti += 1;
                merged = true;
            }
        }

        emitter.replay_local(base_len)?;

        let outcome = if conflicted {
            MergeOutcome::Conflicted
        } else if merged {
            MergeOutcome::Merged
        } else {
            MergeOutcome::NotModified
        };
        debug!(%outcome, "merge finished");
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Block relations
// ---------------------------------------------------------------------------

/// Both sides replaced the same base span with the same lines.
fn is_equal_change(
    local_block: &DiffBlock,
    latest_block: &DiffBlock,
    local: &LineSequence,
    latest: &LineSequence,
) -> bool {
    if local_block.left != latest_block.left || local_block.right_len() != latest_block.right_len()
    {
        return false;
    }
    local_block
        .right
        .clone()
        .zip(latest_block.right.clone())
        .all(|(i, j)| local.line(i) == latest.line(j))
}

/// `first` ends strictly before `second` starts, in base coordinates.
fn is_before(first: &DiffBlock, second: &DiffBlock) -> bool {
    first.left.end <= second.left.start
}

/// Whether two blocks touch the same base lines. Two insertions intersect
/// only at the same position. An insertion at end of file intersects any
/// block reaching the last base line, so competing appends conflict.
fn intersects(a: &DiffBlock, b: &DiffBlock, base_len: usize) -> bool {
    match (a.is_insertion(), b.is_insertion()) {
        (true, true) => a.left.start == b.left.start,
        (true, false) => insertion_touches(a.left.start, b, base_len),
        (false, true) => insertion_touches(b.left.start, a, base_len),
        (false, false) => {
            (a.left.start >= b.left.start && a.left.start < b.left.end)
                || (b.left.start >= a.left.start && b.left.start < a.left.end)
        }
    }
}

fn insertion_touches(position: usize, block: &DiffBlock, base_len: usize) -> bool {
    if position == base_len && block.left.end >= base_len {
        return true;
    }
    position >= block.left.start && position < block.left.end
}

/// Extend the conflict starting at the current blocks for as long as the
/// side with the lower base end has a next block intersecting the other
/// side's current block. Leaves the cursors on the last absorbed blocks.
fn grow_conflict(
    local_blocks: &[DiffBlock],
    latest_blocks: &[DiffBlock],
    li: &mut usize,
    ti: &mut usize,
    local: &LineSequence,
    latest: &LineSequence,
    base_len: usize,
) -> bool {
    let mut conflict = false;
    loop {
        let (l, r) = (&local_blocks[*li], &latest_blocks[*ti]);
        if !intersects(l, r, base_len) || is_equal_change(l, r, local, latest) {
            break;
        }
        conflict = true;

        if l.left.end <= r.left.end {
            match local_blocks.get(*li + 1) {
                Some(next) if intersects(next, r, base_len) => *li += 1,
                _ => break,
            }
        } else {
            match latest_blocks.get(*ti + 1) {
                Some(next) if intersects(l, next, base_len) => *ti += 1,
                _ => break,
            }
        }
    }
    conflict
}

/// Local line index for every base line untouched by a local change.
fn align_local_lines(local_blocks: &[DiffBlock], base_len: usize) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(base_len);
    let (mut base_index, mut local_index) = (0usize, 0usize);
    for block in local_blocks {
        while base_index < block.left.start {
            slots.push(Slot::Kept(local_index));
            base_index += 1;
            local_index += 1;
        }
        slots.extend(block.left.clone().map(|_| Slot::Consumed));
        base_index = block.left.end;
        local_index = block.right.end;
    }
    while base_index < base_len {
        slots.push(Slot::Kept(local_index));
        base_index += 1;
        local_index += 1;
    }
    slots
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// What a base position maps to on the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Unchanged by local; the local line index holding it.
    Kept(usize),
    /// Replaced or deleted by a local block.
    Consumed,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Local,
    Latest,
}

struct Emitter<'a, W: Write> {
    local: &'a LineSequence,
    latest: &'a LineSequence,
    slots: Vec<Slot>,
    /// First base line not yet accounted for in the output.
    next_base: usize,
    markers: &'a ConflictMarkers,
    out: &'a mut W,
    result_path: &'a Path,
}

impl<W: Write> Emitter<'_, W> {
    fn io_error(&self, e: std::io::Error) -> MergeError {
        MergeError::io(PathBuf::from(self.result_path), e)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), MergeError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.out.write_all(bytes).map_err(|e| self.io_error(e))
    }

    fn write_range(&mut self, side: Side, lines: std::ops::Range<usize>) -> Result<(), MergeError> {
        let seq = match side {
            Side::Local => self.local,
            Side::Latest => self.latest,
        };
        for index in lines {
            self.write_bytes(seq.content(index))?;
        }
        Ok(())
    }

    /// Copy local's lines for the untouched base lines up to `to`.
    fn replay_local(&mut self, to: usize) -> Result<(), MergeError> {
        while self.next_base < to {
            match self.slots[self.next_base] {
                Slot::Kept(local_index) => {
                    let local = self.local;
                    self.write_bytes(local.content(local_index))?;
                }
                Slot::Consumed => unreachable!(
                    "base line {} was consumed by a local change but replayed as unchanged",
                    self.next_base
                ),
            }
            self.next_base += 1;
        }
        Ok(())
    }

    fn append_block(&mut self, block: &DiffBlock, side: Side) -> Result<(), MergeError> {
        self.replay_local(block.left.start)?;
        self.write_range(side, block.right.clone())?;
        self.next_base = block.left.end;
        Ok(())
    }

    fn write_conflict(
        &mut self,
        (local_start, local_end): (&DiffBlock, &DiffBlock),
        (latest_start, latest_end): (&DiffBlock, &DiffBlock),
    ) -> Result<(), MergeError> {
        let base_from = min(local_start.left.start, latest_start.left.start);
        let base_end = max(local_end.left.end, latest_end.left.end);

        self.replay_local(base_from)?;

        let local_range = widen(local_start, local_end, base_from, base_end, self.local.len());
        let latest_range = widen(latest_start, latest_end, base_from, base_end, self.latest.len());

        let markers = self.markers;
        markers
            .write_start(&mut *self.out)
            .map_err(|e| self.io_error(e))?;
        self.write_range(Side::Local, local_range)?;
        markers
            .write_separator(&mut *self.out)
            .map_err(|e| self.io_error(e))?;
        self.write_range(Side::Latest, latest_range)?;
        markers
            .write_end(&mut *self.out)
            .map_err(|e| self.io_error(e))?;

        self.next_base = base_end;
        Ok(())
    }
}

/// Lines of one side covering base `[base_from, base_end)`: the blocks'
/// own lines plus the side's unchanged lines aligned with the widened span.
fn widen(
    start: &DiffBlock,
    end: &DiffBlock,
    base_from: usize,
    base_end: usize,
    side_len: usize,
) -> std::ops::Range<usize> {
    let from = start
        .right
        .start
        .saturating_sub(start.left.start - base_from);
    let to = min(side_len, end.right.end + (base_end - end.left.end));
    from..to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::markers::MarkerEol;

    /// Turn "abc" into "a\nb\nc\n" so single letters stand for lines.
    fn lines(s: &str) -> String {
        s.chars().map(|c| format!("{c}\n")).collect()
    }

    fn merger() -> ThreeWayMerger {
        let markers = ConflictMarkers::new(">", "=", "<", MarkerEol::Lf).unwrap();
        ThreeWayMerger::new(markers, DiffOptions::default())
    }

    fn run(base: &str, local: &str, latest: &str) -> (String, MergeOutcome) {
        run_with(&merger(), base, local, latest)
    }

    fn run_with(m: &ThreeWayMerger, base: &str, local: &str, latest: &str) -> (String, MergeOutcome) {
        let mut out = Vec::new();
        let outcome = m
            .merge(
                base.as_bytes(),
                local.as_bytes(),
                latest.as_bytes(),
                &mut out,
                &CancelToken::new(),
            )
            .unwrap();
        (String::from_utf8(out).unwrap(), outcome)
    }

    fn check(base: &str, local: &str, latest: &str, expected: &str, outcome: MergeOutcome) {
        let (result, actual) = run(&lines(base), &lines(local), &lines(latest));
        assert_eq!(result, lines(expected), "base={base} local={local} latest={latest}");
        assert_eq!(actual, outcome, "base={base} local={local} latest={latest}");
    }

    #[test]
    fn test_not_modified() {
        check("", "", "", "", MergeOutcome::NotModified);
        check("a", "a", "a", "a", MergeOutcome::NotModified);
        check("abc", "abc", "abc", "abc", MergeOutcome::NotModified);
    }

    #[test]
    fn test_local_only_change_is_merged_flagged() {
        check("abc", "xabc", "abc", "xabc", MergeOutcome::Merged);
        check("abc", "abcx", "abc", "abcx", MergeOutcome::Merged);
        check("abc", "axxxbc", "abc", "axxxbc", MergeOutcome::Merged);
    }

    #[test]
    fn test_disjoint_changes_interleave() {
        // scenario: a X c / a b Y
        check("abc", "xbc", "aby", "xby", MergeOutcome::Merged);
        check("abcd", "xbcd", "abyd", "xbyd", MergeOutcome::Merged);
        check("abc", "xbc", "ac", "xc", MergeOutcome::Merged);
        check("abc", "axxxbc", "abyyyc", "axxxbyyyc", MergeOutcome::Merged);
        check("abcd", "xbcd", "aycd", "xycd", MergeOutcome::Merged);
        check("abcd", "xbcd", "aybcd", "xybcd", MergeOutcome::Merged);
    }

    #[test]
    fn test_identical_edits_collapse() {
        check("abc", "abx", "abx", "abx", MergeOutcome::NotModified);
        check("abc", "ab", "ab", "ab", MergeOutcome::NotModified);
        check("abc", "", "", "", MergeOutcome::NotModified);

        // identical edit next to a disjoint latest edit
        check("abcde", "xbcde", "xbcdy", "xbcdy", MergeOutcome::Merged);
    }

    #[test]
    fn test_idempotent_self_merge() {
        let base = lines("abcdef");
        let local = lines("axcdyfz");
        let (result, outcome) = run(&base, &local, &local);
        assert_eq!(result, local);
        assert_eq!(outcome, MergeOutcome::NotModified);
    }

    #[test]
    fn test_overlapping_edits_conflict() {
        // scenario: a L / a R
        check("ab", "al", "ar", "a>l=r<", MergeOutcome::Conflicted);
        check("abc", "axc", "ayc", "a>x=y<c", MergeOutcome::Conflicted);
        check("abc", "axxc", "ayc", "a>xx=y<c", MergeOutcome::Conflicted);
        check("abc", "xbc", "yby", ">x=y<by", MergeOutcome::Conflicted);
        check("abc", "xbc", "bc", ">x=<bc", MergeOutcome::Conflicted);
        check("abcd", "abcy", "abc", "abc>y=<", MergeOutcome::Conflicted);
    }

    #[test]
    fn test_trailing_appends_conflict() {
        check("abc", "abcd", "abce", "abc>d=e<", MergeOutcome::Conflicted);
    }

    #[test]
    fn test_append_conflicts_with_change_of_last_line() {
        // latest changes the last line, local appends after it
        check("abc", "abcd", "aby", "ab>cd=y<", MergeOutcome::Conflicted);
    }

    #[test]
    fn test_conflict_grows_across_alternating_blocks() {
        // latest replaces b..d; both local blocks fall inside it
        check("abcde", "axcxe", "aye", "a>xcx=y<e", MergeOutcome::Conflicted);
        // latest touches only c..d; the first local block merges cleanly
        check("abcde", "axcxe", "abye", "ax>cx=y<e", MergeOutcome::Conflicted);
    }

    #[test]
    fn test_separate_conflict_clusters_are_bracketed_separately() {
        check(
            "abcdefg",
            "axcdefz",
            "aycdefw",
            "a>x=y<cdef>z=w<",
            MergeOutcome::Conflicted,
        );
    }

    #[test]
    fn test_conflict_wins_over_merged() {
        check("abcde", "xbcdz", "abcdy", "xbcd>z=y<", MergeOutcome::Conflicted);
    }

    #[test]
    fn test_unterminated_last_lines() {
        let (result, outcome) = run("a\nb", "a\nx", "a\ny");
        assert_eq!(result, "a\n>\nx=\ny<\n");
        assert_eq!(outcome, MergeOutcome::Conflicted);

        let (result, outcome) = run("Aa\nBb\nCc\n", "Xx\nBb\nCc\n", "Aa\nBb\nCc");
        assert_eq!(result, "Xx\nBb\nCc");
        assert_eq!(outcome, MergeOutcome::Merged);
    }

    #[test]
    fn test_ignore_whitespace_keeps_local_bytes() {
        let m = ThreeWayMerger::new(
            ConflictMarkers::new(">", "=", "<", MarkerEol::Lf).unwrap(),
            DiffOptions {
                ignore_eol_style: false,
                ignore_all_whitespace: true,
                ignore_amount_of_whitespace: true,
            },
        );
        let (result, outcome) = run_with(
            &m,
            "Aa\nBb\nCc\n",
            "    Aa\nB b\nC c\n",
            "A  a\nBb \n Cc\nNew line in iota\n",
        );
        assert_eq!(result, "    Aa\nB b\nC c\nNew line in iota\n");
        assert_eq!(outcome, MergeOutcome::Merged);
    }

    #[test]
    fn test_ignore_eol_style_keeps_local_bytes() {
        let m = ThreeWayMerger::new(
            ConflictMarkers::new(">", "=", "<", MarkerEol::Lf).unwrap(),
            DiffOptions {
                ignore_eol_style: true,
                ..Default::default()
            },
        );
        let (result, outcome) = run_with(
            &m,
            "Aa\r\nBb\r\nCc\r\n",
            "Aa\nBb\rCc\n",
            "Aa\rBb\nCc\rNew line in iota\n",
        );
        assert_eq!(result, "Aa\nBb\rCc\nNew line in iota\n");
        assert_eq!(outcome, MergeOutcome::Merged);
    }

    #[test]
    fn test_cancelled_merge_fails_fast() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let result = merger().merge(b"a\n", b"b\n", b"a\n", &mut out, &cancel);
        assert!(matches!(result, Err(MergeError::Cancelled)));
    }

    #[test]
    fn test_merge_files_replaces_result_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let local = dir.path().join("local");
        let latest = dir.path().join("latest");
        let result = dir.path().join("result");
        std::fs::write(&base, "a\nb\nc\n").unwrap();
        std::fs::write(&local, "a\nX\nc\n").unwrap();
        std::fs::write(&latest, "a\nb\nY\n").unwrap();

        let outcome = merger()
            .merge_files(&base, &local, &latest, &result, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Merged);
        assert_eq!(std::fs::read_to_string(&result).unwrap(), "a\nX\nY\n");

        std::fs::write(&result, "previous").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = merger()
            .merge_files(&base, &local, &latest, &result, &cancel)
            .unwrap_err();
        assert!(matches!(err, MergeError::Cancelled));
        assert_eq!(std::fs::read_to_string(&result).unwrap(), "previous");
        // scratch file was cleaned up
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = merger()
            .merge_files(&missing, &missing, &missing, &dir.path().join("r"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, MergeError::Io { .. }));
    }
}
