//! Conflict marker writer.
//!
//! A conflict region is written as a start marker, the local lines, a
//! separator marker, the latest lines and an end marker. Each marker line is
//! followed by the configured marker EOL; an empty marker writes nothing.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::errors::MergeError;

pub const DEFAULT_START_MARKER: &str = "<<<<<<< .working";
pub const DEFAULT_SEPARATOR_MARKER: &str = "=======";
pub const DEFAULT_END_MARKER: &str = ">>>>>>> .merge-right";

/// Line terminator written after marker lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerEol {
    /// The platform line separator.
    #[default]
    Native,
    Lf,
    Crlf,
    Cr,
}

impl MarkerEol {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Native => {
                if cfg!(windows) {
                    b"\r\n"
                } else {
                    b"\n"
                }
            }
            Self::Lf => b"\n",
            Self::Crlf => b"\r\n",
            Self::Cr => b"\r",
        }
    }
}

/// The three marker lines bracketing a conflict region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMarkers {
    start: Vec<u8>,
    separator: Vec<u8>,
    end: Vec<u8>,
    eol: MarkerEol,
}

impl Default for ConflictMarkers {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.as_bytes().to_vec(),
            separator: DEFAULT_SEPARATOR_MARKER.as_bytes().to_vec(),
            end: DEFAULT_END_MARKER.as_bytes().to_vec(),
            eol: MarkerEol::Native,
        }
    }
}

impl ConflictMarkers {
    /// Build markers, rejecting any that contain a line break.
    pub fn new(
        start: impl Into<Vec<u8>>,
        separator: impl Into<Vec<u8>>,
        end: impl Into<Vec<u8>>,
        eol: MarkerEol,
    ) -> Result<Self, MergeError> {
        let markers = Self {
            start: start.into(),
            separator: separator.into(),
            end: end.into(),
            eol,
        };
        for marker in [&markers.start, &markers.separator, &markers.end] {
            if marker.iter().any(|b| *b == b'\n' || *b == b'\r') {
                return Err(MergeError::InvalidMarker(
                    String::from_utf8_lossy(marker).into_owned(),
                ));
            }
        }
        Ok(markers)
    }

    pub fn eol(&self) -> MarkerEol {
        self.eol
    }

    pub fn write_start<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.write_marker(out, &self.start)
    }

    pub fn write_separator<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.write_marker(out, &self.separator)
    }

    pub fn write_end<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.write_marker(out, &self.end)
    }

    fn write_marker<W: Write>(&self, out: &mut W, marker: &[u8]) -> std::io::Result<()> {
        if marker.is_empty() {
            return Ok(());
        }
        out.write_all(marker)?;
        out.write_all(self.eol.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_lines_end_with_eol() {
        let markers = ConflictMarkers::new("<", "=", ">", MarkerEol::Crlf).unwrap();
        let mut out = Vec::new();
        markers.write_start(&mut out).unwrap();
        markers.write_separator(&mut out).unwrap();
        markers.write_end(&mut out).unwrap();
        assert_eq!(out, b"<\r\n=\r\n>\r\n");
    }

    #[test]
    fn test_empty_marker_writes_nothing() {
        let markers = ConflictMarkers::new("<", "", ">", MarkerEol::Lf).unwrap();
        let mut out = Vec::new();
        markers.write_separator(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_rejects_line_breaks() {
        let result = ConflictMarkers::new("<\n", "=", ">", MarkerEol::Lf);
        assert!(matches!(result, Err(MergeError::InvalidMarker(_))));
    }

    #[test]
    fn test_defaults() {
        let markers = ConflictMarkers::default();
        let mut out = Vec::new();
        markers.write_start(&mut out).unwrap();
        assert!(out.starts_with(b"<<<<<<<"));
    }
}
