//! Conversion between normal form and working form.
//!
//! Normal form is what the text base stores and what merges operate on:
//! `\n` line endings and contracted keywords (`$Rev$`). Working form applies
//! the file's `svn:eol-style` and expands the keywords listed in
//! `svn:keywords` from entry values.

use std::path::Path;

use chrono::{DateTime, Utc};
use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::WcError;
use crate::sequence::line::{line_spans, split_terminator};
use crate::wc::content::{read_file, write_atomic};
use crate::wc::props::{PropMap, EOL_STYLE, KEYWORDS};
use crate::wc::Entry;

/// Line ending configured by `svn:eol-style`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolStyle {
    Native,
    Lf,
    Crlf,
    Cr,
}

impl EolStyle {
    pub fn from_prop(value: &str) -> Option<Self> {
        match value.trim() {
            "native" => Some(Self::Native),
            "LF" => Some(Self::Lf),
            "CRLF" => Some(Self::Crlf),
            "CR" => Some(Self::Cr),
            _ => None,
        }
    }

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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Working form to normal form.
    ToNormal,
    /// Normal form to working form.
    ToWorking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Revision,
    Author,
    Date,
    Url,
    Id,
}

impl Keyword {
    const ALL: [Keyword; 5] = [
        Keyword::Revision,
        Keyword::Author,
        Keyword::Date,
        Keyword::Url,
        Keyword::Id,
    ];

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Revision => &["LastChangedRevision", "Revision", "Rev"],
            Self::Author => &["LastChangedBy", "Author"],
            Self::Date => &["LastChangedDate", "Date"],
            Self::Url => &["HeadURL", "URL"],
            Self::Id => &["Id"],
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| {
            k.aliases()
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
        })
    }
}

/// The EOL and keyword translation of one versioned file.
#[derive(Debug, Clone, Default)]
pub struct Translation {
    eol: Option<EolStyle>,
    /// Enabled keywords with their expanded value, if known.
    keywords: Vec<(Keyword, Option<String>)>,
    pattern: Option<Regex>,
}

impl Translation {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build the translation of `path` from its properties and entry.
    pub fn for_file(path: &str, props: &PropMap, entry: Option<&Entry>) -> Self {
        let eol = props.get(EOL_STYLE).and_then(|value| {
            let style = EolStyle::from_prop(value);
            if style.is_none() {
                warn!(path, value = %value, "unrecognized eol style ignored");
            }
            style
        });

        let mut keywords: Vec<(Keyword, Option<String>)> = Vec::new();
        if let Some(list) = props.get(KEYWORDS) {
            for name in list.split_whitespace() {
                if let Some(keyword) = Keyword::parse(name) {
                    if !keywords.iter().any(|(k, _)| *k == keyword) {
                        keywords.push((keyword, keyword_value(keyword, path, entry)));
                    }
                }
            }
        }

        let pattern = if keywords.is_empty() {
            None
        } else {
            let names: Vec<&str> = keywords
                .iter()
                .flat_map(|(k, _)| k.aliases().iter().copied())
                .collect();
            let source = format!(r"\$({})(?::[^$\r\n]*)?\$", names.join("|"));
            match Regex::new(&source) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(path, error = %e, "keyword pattern rejected, keywords not translated");
                    None
                }
            }
        };

        Self {
            eol,
            keywords,
            pattern,
        }
    }

    pub fn eol(&self) -> Option<EolStyle> {
        self.eol
    }

    pub fn has_keywords(&self) -> bool {
        self.pattern.is_some()
    }

    /// `true` when translation never changes any bytes.
    pub fn is_identity(&self) -> bool {
        self.eol.is_none() && self.pattern.is_none()
    }

    pub fn apply(&self, data: &[u8], direction: Direction) -> Vec<u8> {
        if self.is_identity() {
            return data.to_vec();
        }
        let data = match self.eol {
            Some(style) => {
                let eol: &[u8] = match direction {
                    Direction::ToNormal => b"\n",
                    Direction::ToWorking => style.as_bytes(),
                };
                convert_eol(data, eol)
            }
            None => data.to_vec(),
        };
        self.translate_keywords(data, direction)
    }

    /// Translate `src` into `dst`, replacing `dst` atomically.
    pub fn copy_file(&self, src: &Path, dst: &Path, direction: Direction) -> Result<(), WcError> {
        let data = read_file(src)?;
        write_atomic(dst, &self.apply(&data, direction))
    }

    fn translate_keywords(&self, data: Vec<u8>, direction: Direction) -> Vec<u8> {
        let Some(pattern) = &self.pattern else {
            return data;
        };
        let text = match String::from_utf8(data) {
            Ok(text) => text,
            Err(e) => {
                debug!("content is not UTF-8, keywords left untranslated");
                return e.into_bytes();
            }
        };

        let translated = pattern.replace_all(&text, |caps: &Captures| {
            let name = &caps[1];
            let value = match direction {
                Direction::ToNormal => None,
                Direction::ToWorking => self.value_of(name),
            };
            match value {
                Some(value) => format!("${name}: {value} $"),
                None => format!("${name}$"),
            }
        });
        translated.into_owned().into_bytes()
    }

    fn value_of(&self, name: &str) -> Option<&str> {
        let keyword = Keyword::parse(name)?;
        self.keywords
            .iter()
            .find(|(k, _)| *k == keyword)
            .and_then(|(_, v)| v.as_deref())
    }
}

fn keyword_value(keyword: Keyword, path: &str, entry: Option<&Entry>) -> Option<String> {
    let entry = entry?;
    match keyword {
        Keyword::Revision => entry.committed_rev.map(|r| r.to_string()),
        Keyword::Author => entry.committed_author.clone(),
        Keyword::Date => entry.committed_date.map(long_date),
        Keyword::Url => entry.url.clone(),
        Keyword::Id => {
            let rev = entry.committed_rev?;
            let name = path.rsplit('/').next().unwrap_or(path);
            let date = entry
                .committed_date
                .map(|d| d.format("%Y-%m-%d %H:%M:%SZ").to_string())
                .unwrap_or_default();
            let author = entry.committed_author.clone().unwrap_or_default();
            Some(format!("{name} {rev} {date} {author}").trim_end().to_string())
        }
    }
}

fn long_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S +0000 (%a, %d %b %Y)").to_string()
}

fn convert_eol(data: &[u8], eol: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for span in line_spans(data) {
        let (body, terminator) = split_terminator(&data[span]);
        out.extend_from_slice(body);
        if !terminator.is_empty() {
            out.extend_from_slice(eol);
        }
    }
    out
}
