#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Score recorded when no score could be found in the review text.
pub const PENDING_SCORE: &str = "pending";

/// Score recorded when the review service call failed.
pub const FAILED_SCORE: &str = "0";

/// Maximum score the extracted score is normalized against.
pub const SCORE_SCALE: u32 = 100;

/// Display name used in report filenames when a student identifier is missing.
pub const UNKNOWN_STUDENT: &str = "unknown";

/// Suffix (before the extension) shared by every report artifact.
pub const REPORT_SUFFIX: &str = "_feedback";

/// File extension of report artifacts.
pub const REPORT_EXTENSION: &str = "md";

/// Characters that may not appear in a report filename component.
pub const UNSAFE_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Placeholder written by the grading platform when a student typed nothing
/// into the submission field.
pub const NO_SUBMISSION_TEXT: &str = "There is no student submission text data for this assignment";

/// Placeholder written by the grading platform when a student left no
/// comments.
pub const NO_COMMENTS: &str = "There are no student comments for this assignment";

/// Tokens accepted as `true` when coercing a tabular cell to a boolean.
pub const TRUTHY_TOKENS: &[&str] = &["true", "1", "t", "y", "yes"];

/// Source extensions treated as reviewable attachments by default.
pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &["c"];

/// Extension of per-student submission documents inside an export.
pub const SUBMISSION_DOCUMENT_EXTENSION: &str = "txt";

/// Format used for the generation timestamp inside reports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
