#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::{Deserialize, Serialize};

use super::{
    parser::{RawFields, TextRecord},
    parsers::fields,
};
use crate::constants::{NO_COMMENTS, NO_SUBMISSION_TEXT};

/// One attached file as declared in a submission's `Files` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Name of the file as the student uploaded it.
    original_filename: String,
    /// Name the grading platform stored it under, next to the document.
    filename:          String,
}

impl FileEntry {
    /// Creates a new entry.
    pub fn new(original_filename: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            original_filename: original_filename.into(),
            filename:          filename.into(),
        }
    }

    /// Name of the file as the student uploaded it.
    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    /// Storage filename, relative to the submission document's directory.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// The structured parts of a `Name` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentName {
    /// `"<name> (<alt>)"`.
    display_name: String,
    /// Declared major.
    major:        String,
    /// Student identifier.
    student_id:   String,
}

impl StudentName {
    /// Builds the cleaned name parts from the raw grammar captures.
    pub fn new(name: &str, alt: &str, major: &str, student_id: &str) -> Self {
        Self {
            display_name: format!("{} ({})", name.trim(), alt.trim()),
            major:        major.trim().to_string(),
            student_id:   student_id.trim().to_string(),
        }
    }

    /// Parses a raw `Name` field value.
    pub fn parse(raw: &str) -> Option<Self> {
        fields::student_name(raw.trim()).ok()
    }

    /// `"<name> (<alt>)"`.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Declared major.
    pub fn major(&self) -> &str {
        &self.major
    }

    /// Student identifier.
    pub fn student_id(&self) -> &str {
        &self.student_id
    }
}

/// One student's submission metadata, as exported by the grading platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Display name, or the raw `Name` value when it could not be split.
    name:            Option<String>,
    /// Student identifier; present exactly when `major` is.
    student_id:      Option<String>,
    /// Declared major; present exactly when `student_id` is.
    major:           Option<String>,
    /// Assignment label.
    assignment:      Option<String>,
    /// Submission date, verbatim.
    date_submitted:  Option<String>,
    /// Current numeric grade, if the platform had one.
    current_grade:   Option<i64>,
    /// Text typed into the submission field.
    submission_text: Option<String>,
    /// Student comments.
    comments:        Option<String>,
    /// Declared attachments, in manifest order.
    files:           Vec<FileEntry>,
}

impl SubmissionRecord {
    /// Display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Student identifier.
    pub fn student_id(&self) -> Option<&str> {
        self.student_id.as_deref()
    }

    /// Declared major.
    pub fn major(&self) -> Option<&str> {
        self.major.as_deref()
    }

    /// Assignment label.
    pub fn assignment(&self) -> Option<&str> {
        self.assignment.as_deref()
    }

    /// Submission date.
    pub fn date_submitted(&self) -> Option<&str> {
        self.date_submitted.as_deref()
    }

    /// Current numeric grade.
    pub fn current_grade(&self) -> Option<i64> {
        self.current_grade
    }

    /// Submission field text, `None` for the platform's "no data" placeholder.
    pub fn submission_text(&self) -> Option<&str> {
        self.submission_text.as_deref()
    }

    /// Student comments, `None` for the platform's "no comments" placeholder.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Declared attachments.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

impl TextRecord for SubmissionRecord {
    const KEY_MAPPING: &'static [(&'static str, &'static str)] = &[
        ("Name", "name"),
        ("Assignment", "assignment"),
        ("Date Submitted", "date_submitted"),
        ("Current Grade", "current_grade"),
        ("Submission Field", "submission_text"),
        ("Comments", "comments"),
        ("Files", "files"),
    ];

    fn from_fields(mut fields: RawFields) -> Self {
        let (name, identity) = match fields.take("name") {
            Some(raw) => match StudentName::parse(&raw) {
                Some(parsed) => (Some(parsed.display_name.clone()), Some(parsed)),
                None => {
                    tracing::warn!(
                        "Name `{raw}` is not of the form `Name(Alt) Major (ID)`; keeping it as-is"
                    );
                    (Some(raw), None)
                }
            },
            None => (None, None),
        };
        let (major, student_id) = match identity {
            Some(parsed) => (Some(parsed.major), Some(parsed.student_id)),
            None => (None, None),
        };

        Self {
            name,
            student_id,
            major,
            assignment: fields.take("assignment"),
            date_submitted: fields.take("date_submitted"),
            current_grade: fields.take("current_grade").and_then(|raw| parse_grade(&raw)),
            submission_text: fields
                .take("submission_text")
                .filter(|raw| !is_placeholder(raw, NO_SUBMISSION_TEXT)),
            comments: fields
                .take("comments")
                .filter(|raw| !is_placeholder(raw, NO_COMMENTS)),
            files: fields
                .take("files")
                .map(|raw| parse_files(&raw))
                .unwrap_or_default(),
        }
    }
}

/// Parses the `Current Grade` value; anything but an integer is "no grade".
fn parse_grade(raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(grade) => Some(grade),
        Err(_) => {
            tracing::debug!("Current grade `{raw}` is not an integer, leaving it empty");
            None
        }
    }
}

/// Whether `raw` is the platform's placeholder sentence `phrase`.
///
/// Case and a trailing period are ignored.
fn is_placeholder(raw: &str, phrase: &str) -> bool {
    let normalized = raw.trim().trim_end_matches('.').trim_end();
    normalized.eq_ignore_ascii_case(phrase)
}

/// Splits the `Files` value on blank lines and parses every block.
///
/// Blocks that are not `Original filename` / `Filename` pairs are logged and
/// skipped.
fn parse_files(raw: &str) -> Vec<FileEntry> {
    raw.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .filter_map(|block| match fields::file_block(block) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Skipping unreadable file block ({err}):\n{block}");
                None
            }
        })
        .collect()
}
