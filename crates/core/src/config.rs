//! TOML-based configuration for the merge engine.
//!
//! The configuration is an explicit value: callers load it, validate it and
//! hand the pieces they need (diff options, markers, labels, session flags)
//! down to the callbacks. Every section is optional and falls back to the
//! built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::merge::{
    ConflictMarkers, MarkerEol, ThreeWayMerger, DEFAULT_END_MARKER, DEFAULT_SEPARATOR_MARKER,
    DEFAULT_START_MARKER,
};
use crate::sequence::DiffOptions;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Comparison options and marker line endings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Conflict marker lines.
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Suffixes of preserved conflict files.
    #[serde(default)]
    pub labels: LabelConfig,

    /// Per-run behaviour.
    #[serde(default)]
    pub session: SessionConfig,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Treat `\n`, `\r\n` and `\r` as equal when comparing lines.
    #[serde(default)]
    pub ignore_eol_style: bool,

    /// Ignore all whitespace when comparing lines.
    #[serde(default)]
    pub ignore_all_whitespace: bool,

    /// Treat whitespace runs as a single space when comparing lines.
    #[serde(default)]
    pub ignore_amount_of_whitespace: bool,

    /// Line ending written after marker lines.
    #[serde(default)]
    pub marker_eol: MarkerEol,
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_start_marker")]
    pub start: String,

    #[serde(default = "default_separator_marker")]
    pub separator: String,

    #[serde(default = "default_end_marker")]
    pub end: String,
}

fn default_start_marker() -> String {
    DEFAULT_START_MARKER.into()
}
fn default_separator_marker() -> String {
    DEFAULT_SEPARATOR_MARKER.into()
}
fn default_end_marker() -> String {
    DEFAULT_END_MARKER.into()
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            start: default_start_marker(),
            separator: default_separator_marker(),
            end: default_end_marker(),
        }
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Suffixes appended to a file name for the preserved conflict copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_working_label")]
    pub working: String,

    #[serde(default = "default_merge_left_label")]
    pub merge_left: String,

    #[serde(default = "default_merge_right_label")]
    pub merge_right: String,
}

fn default_working_label() -> String {
    ".working".into()
}
fn default_merge_left_label() -> String {
    ".merge-left".into()
}
fn default_merge_right_label() -> String {
    ".merge-right".into()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            working: default_working_label(),
            merge_left: default_merge_left_label(),
            merge_right: default_merge_right_label(),
        }
    }
}

/// Concrete labels of one merge, revision suffixes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLabels {
    pub working: String,
    pub base: String,
    pub repository: String,
}

impl LabelConfig {
    /// `.working`, `.merge-left.r<left>`, `.merge-right.r<right>` with the defaults.
    pub fn for_revisions(&self, left_revision: i64, right_revision: i64) -> MergeLabels {
        MergeLabels {
            working: self.working.clone(),
            base: format!("{}.r{left_revision}", self.merge_left),
            repository: format!("{}.r{right_revision}", self.merge_right),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Compute statuses without touching the working copy.
    #[serde(default)]
    pub dry_run: bool,

    /// Delete locally modified nodes instead of reporting them obstructed.
    #[serde(default)]
    pub force: bool,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl EngineConfig {
    /// Load an [`EngineConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate marker lines and the log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("markers.start", &self.markers.start),
            ("markers.end", &self.markers.end),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "marker must not be empty".into(),
                });
            }
        }
        for (field, value) in [
            ("markers.start", &self.markers.start),
            ("markers.separator", &self.markers.separator),
            ("markers.end", &self.markers.end),
        ] {
            if value.contains(|c: char| c == '\n' || c == '\r') {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "marker must not contain a line break".into(),
                });
            }
        }
        if self.labels.working.is_empty()
            || self.labels.merge_left.is_empty()
            || self.labels.merge_right.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "labels".into(),
                detail: "conflict file labels must not be empty".into(),
            });
        }
        if !matches!(
            self.session.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::InvalidValue {
                field: "session.log_level".into(),
                detail: format!("unknown level '{}'", self.session.log_level),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            ignore_eol_style: self.merge.ignore_eol_style,
            ignore_all_whitespace: self.merge.ignore_all_whitespace,
            ignore_amount_of_whitespace: self.merge.ignore_amount_of_whitespace,
        }
    }

    pub fn conflict_markers(&self) -> Result<ConflictMarkers, ConfigError> {
        ConflictMarkers::new(
            self.markers.start.as_str(),
            self.markers.separator.as_str(),
            self.markers.end.as_str(),
            self.merge.marker_eol,
        )
        .map_err(|e| ConfigError::InvalidValue {
            field: "markers".into(),
            detail: e.to_string(),
        })
    }

    /// A three-way merger configured from the `[merge]` and `[markers]` sections.
    pub fn three_way_merger(&self) -> Result<ThreeWayMerger, ConfigError> {
        Ok(ThreeWayMerger::new(
            self.conflict_markers()?,
            self.diff_options(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[merge]
ignore_eol_style = true
ignore_amount_of_whitespace = true
marker_eol = "crlf"

[markers]
start = "<<<<<<< mine"
separator = "||||||| ====="
end = ">>>>>>> theirs"

[labels]
working = ".mine"
merge_left = ".old"
merge_right = ".new"

[session]
dry_run = true
force = true
log_level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml(sample_toml()).expect("failed to parse toml");
        assert!(config.merge.ignore_eol_style);
        assert!(!config.merge.ignore_all_whitespace);
        assert_eq!(config.merge.marker_eol, MarkerEol::Crlf);
        assert_eq!(config.markers.start, "<<<<<<< mine");
        assert_eq!(config.labels.working, ".mine");
        assert!(config.session.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wcmerge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = EngineConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.session.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = EngineConfig::load_from_file("/nonexistent/wcmerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = EngineConfig::from_toml("[merge]\nmarker_eol = \"sideways\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.markers.start, DEFAULT_START_MARKER);
        assert_eq!(config.merge.marker_eol, MarkerEol::Native);
        assert_eq!(config.session.log_level, "info");
        assert!(!config.session.dry_run);
        assert_eq!(config.diff_options(), DiffOptions::default());
    }

    #[test]
    fn test_validate_rejects_empty_start_marker() {
        let mut config = EngineConfig::default();
        config.markers.start = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "markers.start"
        ));
    }

    #[test]
    fn test_validate_rejects_line_break_in_marker() {
        let mut config = EngineConfig::default();
        config.markers.separator = "==\n==".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "markers.separator"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = EngineConfig::default();
        config.session.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_labels_for_revisions() {
        let labels = LabelConfig::default().for_revisions(3, 5);
        assert_eq!(labels.working, ".working");
        assert_eq!(labels.base, ".merge-left.r3");
        assert_eq!(labels.repository, ".merge-right.r5");
    }

    #[test]
    fn test_three_way_merger_from_config() {
        let config = EngineConfig::from_toml(sample_toml()).unwrap();
        let merger = config.three_way_merger().unwrap();
        assert_eq!(merger.markers().eol(), MarkerEol::Crlf);
        assert!(merger.options().ignore_eol_style);
    }
}
