#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Parser for semi-structured `Key: Value` documents.
//!
//! A new key starts on any unindented line containing a colon. Everything else
//! (indented lines, blank lines, unindented text without a colon) continues
//! the value of the key that is currently open.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Serialize;

/// Ordered mapping from document key to its (possibly multi-line) value.
///
/// Inserting a key that already exists replaces the earlier value but keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawRecord {
    /// Committed `(key, value)` pairs in document order.
    entries: Vec<(String, String)>,
}

impl RawRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the committed value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key was committed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes the record back into document form.
    ///
    /// The first line of each value follows the key, later lines are indented
    /// with four spaces and empty lines are kept empty, so parsing the output
    /// yields the same record.
    pub fn to_document(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            let mut lines = value.split('\n');
            match lines.next() {
                Some(first) if !first.is_empty() => {
                    out.push_str(&format!("{key}: {first}\n"));
                }
                _ => out.push_str(&format!("{key}:\n")),
            }
            for line in lines {
                if line.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&format!("    {line}\n"));
                }
            }
        }
        out
    }
}

/// How a single line of a document is interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    /// Unindented line with a colon: key and the seed of its value.
    Key(&'a str, &'a str),
    /// Indented line, or unindented text without a colon.
    Continuation(&'a str),
    /// Whitespace-only line, kept as a paragraph break.
    Blank,
}

/// Whether a line starts with a tab or a four-space indent.
fn is_indented(line: &str) -> bool {
    line.starts_with('\t') || line.starts_with("    ")
}

/// Classifies one line; the first matching rule wins.
fn classify(line: &str) -> Line<'_> {
    if !is_indented(line)
        && let Some((key, value)) = line.split_once(':')
    {
        return Line::Key(key.trim(), value.trim());
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        Line::Blank
    } else {
        Line::Continuation(trimmed)
    }
}

/// Joins the buffered lines of `key` and commits them to `record`.
fn commit(record: &mut RawRecord, key: Option<String>, buffer: &mut Vec<String>) {
    if let Some(key) = key {
        record.insert(key, buffer.join("\n").trim());
    }
    buffer.clear();
}

/// Parses a `Key: Value` document into a [`RawRecord`].
///
/// Lines that appear before the first key are ignored. A key line whose key
/// is empty closes the open key; its continuation lines are dropped until the
/// next key.
pub fn parse_document(text: &str) -> RawRecord {
    let mut record = RawRecord::new();
    let mut current: Option<String> = None;
    let mut buffer: Vec<String> = Vec::new();

    for (number, line) in text.lines().enumerate() {
        match classify(line) {
            Line::Key(key, value) => {
                commit(&mut record, current.take(), &mut buffer);
                buffer.push(value.to_string());
                if key.is_empty() {
                    tracing::warn!("Line {}: `:` without a key, ignoring its value", number + 1);
                } else {
                    current = Some(key.to_string());
                }
            }
            Line::Continuation(text) if current.is_some() => buffer.push(text.to_string()),
            Line::Blank if current.is_some() => buffer.push(String::new()),
            Line::Continuation(_) | Line::Blank => {}
        }
    }
    commit(&mut record, current, &mut buffer);

    record
}

/// Raw field values produced from a [`RawRecord`] through a key mapping.
///
/// A field is `None` when its document key was absent.
#[derive(Debug, Default)]
pub struct RawFields {
    /// `(field name, raw value)` pairs.
    values: Vec<(&'static str, Option<String>)>,
}

impl RawFields {
    /// Removes and returns the raw value of `field`.
    pub fn take(&mut self, field: &str) -> Option<String> {
        self.values
            .iter_mut()
            .find(|(name, _)| *name == field)
            .and_then(|(_, value)| value.take())
    }
}

/// A typed record built from a `Key: Value` document.
///
/// Implementors declare which document keys feed which fields and perform
/// their own field cleanup in [`TextRecord::from_fields`].
pub trait TextRecord: Sized {
    /// `(document key, field name)` pairs.
    const KEY_MAPPING: &'static [(&'static str, &'static str)];

    /// Builds the record from raw field values.
    fn from_fields(fields: RawFields) -> Self;

    /// Applies the key mapping to a parsed document and builds the record.
    ///
    /// Missing keys are logged and leave their field empty.
    fn from_raw(raw: &RawRecord) -> Self {
        let values = Self::KEY_MAPPING
            .iter()
            .map(|(key, field)| {
                let value = raw.get(key).map(str::to_owned);
                if value.is_none() {
                    tracing::warn!("Key `{key}` not found in document, `{field}` left empty");
                }
                (*field, value)
            })
            .collect();

        Self::from_fields(RawFields { values })
    }

    /// Parses a document and builds the record.
    fn parse(text: &str) -> Result<Self> {
        let raw = parse_document(text.trim_start_matches('\u{feff}'));
        ensure!(!raw.is_empty(), "Document has no `Key: Value` lines");
        Ok(Self::from_raw(&raw))
    }

    /// Reads and parses the document at `path`.
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Could not parse {}", path.display()))
    }
}
