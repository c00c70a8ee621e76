#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Generic `Key: Value` document parser and the typed-record trait built on
/// top of it.
pub mod parser;
/// Grammars for the structured values inside submission documents.
pub mod parsers;
/// The roster row type.
pub mod roster;
/// Submission records and their field cleanup.
pub mod submission;
/// Schema-driven loader for delimited tabular exports.
pub mod tabular;

pub use parser::{RawRecord, TextRecord, parse_document};
pub use roster::RosterRow;
pub use submission::{FileEntry, StudentName, SubmissionRecord};
pub use tabular::{
    FieldKind, FieldSpec, FieldValue, RowError, RowValues, SchemaError, TabularLoader, TabularRow,
};
