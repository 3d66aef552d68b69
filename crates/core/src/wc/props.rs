//! Versioned property names, categorisation and property merging.
//!
//! Property names fall into three buckets: regular (user-visible, diffed and
//! merged), entry-scoped (`svn:entry:*`, bookkeeping owned by the admin area)
//! and working-copy-scoped (`svn:wc:*`, cache values). Only regular
//! properties ever reach a human-readable diff or the property merge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::callback::StatusType;
use crate::errors::WcError;
use crate::wc::WorkingCopy;

pub const MIME_TYPE: &str = "svn:mime-type";
pub const EOL_STYLE: &str = "svn:eol-style";
pub const KEYWORDS: &str = "svn:keywords";
pub const EXECUTABLE: &str = "svn:executable";
pub const NEEDS_LOCK: &str = "svn:needs-lock";

pub const ENTRY_PREFIX: &str = "svn:entry:";
pub const WC_PREFIX: &str = "svn:wc:";

/// Entry attribute holding the description of the last property conflict.
pub const PROP_CONFLICT: &str = "prop-conflict";

/// Property name → value.
pub type PropMap = BTreeMap<String, String>;

/// Which bucket a property name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Regular,
    Entry,
    WorkingCopy,
}

impl PropKind {
    pub fn of(name: &str) -> Self {
        if name.starts_with(ENTRY_PREFIX) {
            Self::Entry
        } else if name.starts_with(WC_PREFIX) {
            Self::WorkingCopy
        } else {
            Self::Regular
        }
    }
}

/// A single property change. `value == None` deletes the property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropChange {
    pub name: String,
    pub value: Option<String>,
}

impl PropChange {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Property changes split by [`PropKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizedProps {
    pub regular: Vec<PropChange>,
    pub entry: Vec<PropChange>,
    pub working_copy: Vec<PropChange>,
}

pub fn categorize(changes: &[PropChange]) -> CategorizedProps {
    let mut out = CategorizedProps::default();
    for change in changes {
        match PropKind::of(&change.name) {
            PropKind::Regular => out.regular.push(change.clone()),
            PropKind::Entry => out.entry.push(change.clone()),
            PropKind::WorkingCopy => out.working_copy.push(change.clone()),
        }
    }
    out
}

/// Regular properties of a full property map.
pub fn regular_props(props: &PropMap) -> PropMap {
    props
        .iter()
        .filter(|(name, _)| PropKind::of(name) == PropKind::Regular)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A mime type is binary unless it is absent or starts with `text/`.
pub fn is_binary_mime_type(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|m| !m.starts_with("text/"))
}

/// Merge incoming regular property changes into the working properties of
/// `path`. `original` holds the properties the changes were computed against.
///
/// A change whose new value already matches the working value is a no-op.
/// A change applies when the working value still equals the original value.
/// Anything else conflicts: the working value is kept and the conflict
/// description is recorded in the entry's [`PROP_CONFLICT`] attribute.
pub fn merge_properties(
    wc: &mut dyn WorkingCopy,
    path: &str,
    original: &PropMap,
    changes: &[PropChange],
    dry_run: bool,
) -> Result<StatusType, WcError> {
    if wc.entry(path).is_none() {
        debug!(path, "property merge on unversioned path");
        return Ok(StatusType::Missing);
    }

    let working = wc.props(path);
    let mut status = StatusType::Unchanged;
    let mut conflicts = Vec::new();

    for change in categorize(changes).regular {
        let current = working.get(&change.name);
        let base = original.get(&change.name);

        if current == change.value.as_ref() {
            continue;
        }
        if current == base {
            if !dry_run {
                wc.set_prop(path, &change.name, change.value.as_deref())?;
            }
            if status != StatusType::Conflicted {
                status = StatusType::Changed;
            }
            continue;
        }

        warn!(path, property = %change.name, "property conflict");
        conflicts.push(describe_conflict(&change, base, current));
        status = StatusType::Conflicted;
    }

    if !conflicts.is_empty() && !dry_run {
        wc.set_entry_attribute(path, PROP_CONFLICT, Some(conflicts.join("\n")))?;
    }
    Ok(status)
}

fn describe_conflict(change: &PropChange, base: Option<&String>, current: Option<&String>) -> String {
    match (base, &change.value, current) {
        (None, Some(new), Some(cur)) => format!(
            "Trying to add new property '{}' with value '{new}', but property already exists with value '{cur}'.",
            change.name
        ),
        (Some(old), None, Some(cur)) => format!(
            "Trying to delete property '{}' with value '{old}' but it has been modified from '{old}' to '{cur}'.",
            change.name
        ),
        (Some(old), None, None) | (Some(old), Some(_), None) => format!(
            "Trying to change property '{}' from '{old}', but the property has been locally deleted.",
            change.name
        ),
        (old, new, cur) => format!(
            "Trying to change property '{}' from '{}' to '{}', but property has been locally changed to '{}'.",
            change.name,
            old.map(String::as_str).unwrap_or(""),
            new.as_deref().unwrap_or(""),
            cur.map(String::as_str).unwrap_or(""),
        ),
    }
}
