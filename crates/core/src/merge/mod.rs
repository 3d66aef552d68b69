//! Three-way text merging and conflict markers.

pub mod markers;
pub mod three_way;

pub use markers::{
    ConflictMarkers, MarkerEol, DEFAULT_END_MARKER, DEFAULT_SEPARATOR_MARKER,
    DEFAULT_START_MARKER,
};
pub use three_way::{MergeOutcome, ThreeWayMerger};
