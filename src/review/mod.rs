#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Attachment resolution and decoding.
pub mod attachment;
/// Batch orchestration over a whole export.
pub mod batch;
/// Review service boundary.
pub mod gateway;
/// Prompt definitions and filename matching.
pub mod prompt;
/// Report rendering, naming, and the read-only report store.
pub mod report;
/// Score extraction from review text.
pub mod score;

pub use attachment::{AssignmentAttachment, SourceEncoding, Student, decode_source, resolve_stored};
pub use batch::{
    BatchOrchestrator, DocumentFailure, RunOptions, RunSummary, UnitOutcome, UnitRecord,
};
pub use gateway::{OpenAiGateway, ReviewError, ReviewGateway, ReviewRequest};
pub use prompt::{PromptDefinition, load_prompts, match_prompt};
pub use report::{
    ReportEntry, ReportStore, render_report, report_filename, sanitize_component,
    sanitize_student_id,
};
pub use score::{ReviewResult, extract_score};
