#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::{constants::UNKNOWN_STUDENT, records::SubmissionRecord};

/// Encodings tried, in order, when reading an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// UTF-8, with an optional byte-order mark.
    Utf8,
    /// GBK, a superset of GB2312.
    Gbk,
    /// ISO-8859-1; every byte sequence decodes.
    Latin1,
}

impl SourceEncoding {
    /// Fallback order.
    pub const FALLBACK: [Self; 3] = [Self::Utf8, Self::Gbk, Self::Latin1];

    /// Decodes `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_owned)
            }
            Self::Gbk => encoding_rs::GBK
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
            Self::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Decodes attachment bytes with the first encoding in
/// [`SourceEncoding::FALLBACK`] that accepts them.
pub fn decode_source(bytes: &[u8]) -> Option<(String, SourceEncoding)> {
    SourceEncoding::FALLBACK
        .into_iter()
        .find_map(|encoding| encoding.decode(bytes).map(|text| (text, encoding)))
}

/// A source file attached to a submission, with its content read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentAttachment {
    /// File content; empty when the file could not be read.
    content:           String,
    /// Resolved path of the stored file.
    path:              PathBuf,
    /// Name the student uploaded the file under.
    original_filename: String,
}

impl AssignmentAttachment {
    /// Reads the stored file at `path`.
    ///
    /// Read and decode failures are logged and leave the content empty.
    pub fn load(path: PathBuf, original_filename: impl Into<String>) -> Self {
        let content = match std::fs::read(&path) {
            Ok(bytes) => match decode_source(&bytes) {
                Some((text, encoding)) => {
                    if encoding != SourceEncoding::Utf8 {
                        tracing::debug!("Decoded {} as {encoding:?}", path.display());
                    }
                    text
                }
                None => {
                    tracing::warn!("Could not decode {} with any encoding", path.display());
                    String::new()
                }
            },
            Err(err) => {
                tracing::warn!("Could not read attachment {}: {err}", path.display());
                String::new()
            }
        };

        Self::from_parts(content, path, original_filename)
    }

    /// Builds an attachment from content that is already in memory.
    pub fn from_parts(
        content: impl Into<String>,
        path: PathBuf,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            path,
            original_filename: original_filename.into(),
        }
    }

    /// File content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Resolved path of the stored file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the student uploaded the file under.
    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    /// Code fence language tag, taken from the original filename's extension.
    pub fn language(&self) -> String {
        Path::new(&self.original_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// A student and the source attachments of their submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    /// Student identifier, empty when the name field could not be split.
    student_id:  String,
    /// Display name.
    name:        String,
    /// Source attachments, in manifest order.
    attachments: Vec<AssignmentAttachment>,
    /// Submission document the student was read from, if any.
    document:    Option<PathBuf>,
}

impl Student {
    /// Builds a student from a parsed record.
    ///
    /// Only attachments whose original filename has one of `extensions`
    /// (case-insensitive) are kept. Stored filenames are resolved against
    /// `base_dir`; a stored filename that is absolute or climbs out of
    /// `base_dir` drops the attachment.
    pub fn from_record(record: &SubmissionRecord, base_dir: &Path, extensions: &[String]) -> Self {
        let attachments = record
            .files()
            .iter()
            .filter(|file| has_extension(file.original_filename(), extensions))
            .filter_map(|file| {
                let Some(path) = resolve_stored(base_dir, file.filename()) else {
                    tracing::warn!(
                        "Ignoring {}: stored filename `{}` points outside {}",
                        file.original_filename(),
                        file.filename(),
                        base_dir.display()
                    );
                    return None;
                };
                Some(AssignmentAttachment::load(path, file.original_filename()))
            })
            .collect();

        Self::new(
            record.student_id().unwrap_or_default(),
            record.name().unwrap_or_default(),
            attachments,
        )
    }

    /// Creates a student from its parts.
    pub fn new(
        student_id: impl Into<String>,
        name: impl Into<String>,
        attachments: Vec<AssignmentAttachment>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
            attachments,
            document: None,
        }
    }

    /// Records the submission document the student was read from.
    pub fn with_document(mut self, document: impl Into<PathBuf>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Student identifier, empty when unknown.
    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    /// Student identifier, or a fixed marker for logs and filenames.
    pub fn label(&self) -> &str {
        if self.student_id.is_empty() { UNKNOWN_STUDENT } else { &self.student_id }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source attachments.
    pub fn attachments(&self) -> &[AssignmentAttachment] {
        &self.attachments
    }

    /// Submission document the student was read from.
    pub fn document(&self) -> Option<&Path> {
        self.document.as_deref()
    }

    /// Key telling two students apart within a run.
    ///
    /// Students sharing an identifier are the same student; without an
    /// identifier, each submission document is its own student.
    pub fn identity(&self) -> String {
        match (&self.student_id, &self.document) {
            (id, _) if !id.is_empty() => format!("id:{id}"),
            (_, Some(document)) => format!("document:{}", document.display()),
            (_, None) => format!("name:{}", self.name),
        }
    }
}

/// Joins `stored` onto `base_dir` when it is a plain relative path.
///
/// Only normal components are accepted: no root, prefix, `.` or `..`.
pub fn resolve_stored(base_dir: &Path, stored: &str) -> Option<PathBuf> {
    let stored = Path::new(stored);
    let mut components = stored.components().peekable();
    components.peek()?;
    components
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| base_dir.join(stored))
}

/// Whether `filename` ends in `.<ext>` for one of `extensions`.
fn has_extension(filename: &str, extensions: &[String]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
