//! Line sequencing and sequence differencing.

pub mod differ;
pub mod line;

pub use differ::{diff_sequences, DiffBlock};
pub use line::{DiffOptions, Line, LineSequence, Simplifier, WhitespaceMode};
