#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Batch review runs over a grading-platform export.
//!
//! A run loads the roster (optional), parses every submission document,
//! skips to the resume offset, and reviews each student's source attachments.
//! Failures are isolated: a bad document skips one student, a missing prompt
//! skips one attachment, a failed review still produces a report. Only
//! configuration problems abort a run.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result, ensure};
use chrono::{Local, NaiveDateTime};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::Instrument;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::{
    attachment::{AssignmentAttachment, Student},
    gateway::{ReviewGateway, ReviewRequest},
    prompt::{PromptDefinition, match_prompt},
    report::{render_report, report_filename},
    score::ReviewResult,
};
use crate::{
    config::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ReviewPrompts},
    constants::{DEFAULT_SOURCE_EXTENSIONS, SUBMISSION_DOCUMENT_EXTENSION, TIMESTAMP_FORMAT},
    records::{RosterRow, SubmissionRecord, TabularLoader, TextRecord},
    util::find_files,
};

/// Default accepted attachment extensions.
pub fn default_extensions() -> Vec<String> {
    DEFAULT_SOURCE_EXTENSIONS
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Options of one batch run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RunOptions {
    /// Directory holding the per-student submission documents and their
    /// stored attachments.
    #[builder(setter(into))]
    pub submissions_dir: PathBuf,
    /// Directory reports are written to; created if needed.
    #[builder(setter(into))]
    pub output_dir:      PathBuf,
    /// Roster export, if any.
    #[builder(default)]
    pub roster:          Option<PathBuf>,
    /// Explicit roster column list; the row type's default when `None`.
    #[builder(default)]
    pub roster_columns:  Option<Vec<String>>,
    /// Attachment extensions to review, without the dot.
    #[builder(default = default_extensions())]
    pub extensions:      Vec<String>,
    /// Number of students (in document order) to skip.
    #[builder(default)]
    pub resume_from:     usize,
    /// Maximum number of students to process after the offset.
    #[builder(default)]
    pub limit:           Option<usize>,
    /// Number of students reviewed at the same time.
    #[builder(default = 1)]
    pub concurrency:     usize,
    /// Timestamp written into every report; the run's start time when `None`.
    #[builder(default)]
    pub generated_at:    Option<NaiveDateTime>,
    /// Sampling temperature sent with each review.
    #[builder(default = DEFAULT_TEMPERATURE)]
    pub temperature:     f32,
    /// Output token limit sent with each review.
    #[builder(default = DEFAULT_MAX_TOKENS)]
    pub max_tokens:      u32,
}

/// What happened to one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// A report with a review was written.
    Generated {
        /// Report path.
        report: PathBuf,
        /// Extracted score.
        score:  String,
    },
    /// The review failed; a report carrying the failure was written.
    Degraded {
        /// Report path.
        report: PathBuf,
        /// Why the review failed.
        reason: String,
    },
    /// No report was attempted.
    Skipped {
        /// Why.
        reason: String,
    },
    /// The report could not be written.
    PersistFailed {
        /// Report path.
        report: PathBuf,
        /// Why.
        reason: String,
    },
}

impl UnitOutcome {
    /// Short status word for tables.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Generated { .. } => "generated",
            Self::Degraded { .. } => "degraded",
            Self::Skipped { .. } => "skipped",
            Self::PersistFailed { .. } => "persist failed",
        }
    }

    /// Path of the written report, if one was written.
    pub fn report(&self) -> Option<&Path> {
        match self {
            Self::Generated { report, .. } | Self::Degraded { report, .. } => {
                Some(report.as_path())
            }
            Self::Skipped { .. } | Self::PersistFailed { .. } => None,
        }
    }
}

/// Outcome of one (student, attachment) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    /// Student identifier, or the unknown marker.
    pub student_id: String,
    /// Original filename of the attachment.
    pub attachment: String,
    /// What happened.
    pub outcome:    UnitOutcome,
}

/// A submission document that could not be turned into a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    /// Document path.
    pub path:   PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifier of the run, also recorded on its log span.
    pub run_id:             Uuid,
    /// Students parsed from the submissions directory.
    pub students_found:     usize,
    /// Students reviewed in this run.
    pub students_processed: usize,
    /// Students skipped by the resume offset.
    pub resumed_past:       usize,
    /// Documents skipped because they could not be parsed.
    pub documents_failed:   Vec<DocumentFailure>,
    /// Per-attachment outcomes.
    pub units:              Vec<UnitRecord>,
}

impl RunSummary {
    /// Counts units whose outcome has the given status word.
    fn count(&self, status: &str) -> usize {
        self.units
            .iter()
            .filter(|unit| unit.outcome.status() == status)
            .count()
    }

    /// Number of reports written with a review.
    pub fn generated(&self) -> usize {
        self.count("generated")
    }

    /// Number of reports written for failed reviews.
    pub fn degraded(&self) -> usize {
        self.count("degraded")
    }

    /// Number of attachments skipped.
    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    /// Number of reports that could not be written.
    pub fn persist_failed(&self) -> usize {
        self.count("persist failed")
    }

    /// Paths of every written report.
    pub fn reports(&self) -> Vec<&Path> {
        self.units
            .iter()
            .filter_map(|unit| unit.outcome.report())
            .collect()
    }
}

/// Drives a review run with a given gateway.
pub struct BatchOrchestrator<G> {
    /// Review service.
    gateway:     G,
    /// System instructions and user template.
    prompts:     ReviewPrompts,
    /// Problems, matched to attachments by filename.
    definitions: Vec<PromptDefinition>,
    /// Run options.
    options:     RunOptions,
    /// One async lock per report path, so no two units write the same file
    /// at once.
    write_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    /// Report paths claimed during the current run, with the identity of the
    /// student that claimed each.
    owners:      Mutex<HashMap<PathBuf, String>>,
}

impl<G: ReviewGateway> BatchOrchestrator<G> {
    /// Creates an orchestrator.
    pub fn new(
        gateway: G,
        prompts: ReviewPrompts,
        definitions: Vec<PromptDefinition>,
        options: RunOptions,
    ) -> Self {
        Self {
            gateway,
            prompts,
            definitions,
            options,
            write_locks: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Run options.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Review service used by this orchestrator.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Loads the roster lookup table keyed by username, if a roster is
    /// configured. Mapping errors are fatal.
    pub fn load_roster(&self) -> Result<Option<HashMap<String, RosterRow>>> {
        let Some(path) = &self.options.roster else {
            return Ok(None);
        };

        let loader = match &self.options.roster_columns {
            Some(columns) => TabularLoader::<RosterRow>::with_columns(columns.clone())?,
            None => TabularLoader::<RosterRow>::new()?,
        };
        let table = loader.load_as_dict(path, "username")?;
        tracing::info!("Loaded {} roster rows from {}", table.len(), path.display());

        Ok(Some(table))
    }

    /// Parses every submission document, in path order.
    ///
    /// Documents that cannot be read or parsed are returned as failures
    /// instead of students.
    pub fn load_students(&self) -> Result<(Vec<Student>, Vec<DocumentFailure>)> {
        let dir = &self.options.submissions_dir;
        ensure!(
            dir.is_dir(),
            "Submissions directory {} does not exist",
            dir.display()
        );

        let mut documents = find_files(SUBMISSION_DOCUMENT_EXTENSION, 0, dir)?;
        documents.sort();

        let mut students = Vec::new();
        let mut failures = Vec::new();
        for path in documents {
            match SubmissionRecord::load(&path) {
                Ok(record) => {
                    let base_dir = path.parent().unwrap_or(dir.as_path());
                    let student = Student::from_record(&record, base_dir, &self.options.extensions)
                        .with_document(&path);
                    students.push(student);
                }
                Err(err) => {
                    tracing::warn!("Skipping {}: {err:#}", path.display());
                    failures.push(DocumentFailure {
                        path,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        Ok((students, failures))
    }

    /// Runs the whole batch.
    ///
    /// Errors are only returned for configuration problems found before any
    /// review starts; everything else ends up in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("review_run", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    /// Body of [`BatchOrchestrator::run`], inside the run span.
    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary> {
        let output_dir = &self.options.output_dir;
        tokio::fs::create_dir_all(output_dir).await.with_context(|| {
            format!("Could not create output directory {}", output_dir.display())
        })?;
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let roster = self.load_roster()?;
        let (students, documents_failed) = self.load_students()?;
        tracing::info!("Found {} students", students.len());

        if let Some(roster) = &roster {
            for student in &students {
                match roster.get(student.student_id()) {
                    Some(row) => tracing::debug!(
                        "{} is on the roster as {}",
                        student.label(),
                        row.first_name.as_deref().unwrap_or("(no first name)")
                    ),
                    None => tracing::warn!("{} is not on the roster", student.label()),
                }
            }
        }

        let offset = self.options.resume_from;
        if offset > 0 {
            tracing::info!(
                "Resuming at student {}, skipping {} already processed",
                offset + 1,
                offset.min(students.len())
            );
            if offset >= students.len() {
                tracing::warn!(
                    "Resume offset {offset} is past the last of {} students, nothing to do",
                    students.len()
                );
            }
        }
        if let Some(limit) = self.options.limit {
            tracing::info!("Processing at most {limit} students");
        }

        let generated_at = self
            .options
            .generated_at
            .unwrap_or_else(|| Local::now().naive_local())
            .format(TIMESTAMP_FORMAT)
            .to_string();

        let total = students.len();
        let selected: Vec<(usize, &Student)> = students
            .iter()
            .enumerate()
            .skip(offset)
            .take(self.options.limit.unwrap_or(usize::MAX))
            .collect();
        let students_processed = selected.len();

        let units: Vec<UnitRecord> = stream::iter(selected)
            .map(|(index, student)| self.process_student(student, index + 1, total, &generated_at))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let summary = RunSummary {
            run_id,
            students_found: total,
            students_processed,
            resumed_past: offset.min(total),
            documents_failed,
            units,
        };
        tracing::info!(
            "Done: {} generated, {} degraded, {} skipped, {} not written",
            summary.generated(),
            summary.degraded(),
            summary.skipped(),
            summary.persist_failed()
        );

        Ok(summary)
    }

    /// Reviews every attachment of one student, one after another.
    async fn process_student(
        &self,
        student: &Student,
        position: usize,
        total: usize,
        generated_at: &str,
    ) -> Vec<UnitRecord> {
        tracing::info!(
            "Student [{position}/{total}]: {} ({})",
            student.name(),
            student.label()
        );
        if student.attachments().is_empty() {
            tracing::info!("{} has no source attachments", student.label());
        }

        let mut units = Vec::with_capacity(student.attachments().len());
        for attachment in student.attachments() {
            let outcome = self
                .process_attachment(student, attachment, generated_at)
                .instrument(tracing::info_span!(
                    "unit",
                    student = student.label(),
                    file = attachment.original_filename()
                ))
                .await;
            units.push(UnitRecord {
                student_id: student.label().to_string(),
                attachment: attachment.original_filename().to_string(),
                outcome,
            });
        }
        units
    }

    /// Match, review, score, render, persist.
    async fn process_attachment(
        &self,
        student: &Student,
        attachment: &AssignmentAttachment,
        generated_at: &str,
    ) -> UnitOutcome {
        let Some(prompt) = match_prompt(attachment.original_filename(), &self.definitions) else {
            tracing::warn!(
                "No prompt matches {}, skipping it",
                attachment.original_filename()
            );
            return UnitOutcome::Skipped {
                reason: "no matching prompt".to_string(),
            };
        };

        let report = self.options.output_dir.join(report_filename(
            Some(student.student_id()),
            attachment.original_filename(),
        ));
        if let Err(owner) = self.claim(&report, student.identity()) {
            tracing::warn!(
                "{} was already written for {owner} in this run, skipping",
                report.display()
            );
            return UnitOutcome::Skipped {
                reason: format!("report name is taken by {owner}"),
            };
        }

        let request = ReviewRequest::builder()
            .system_instructions(self.prompts.system_message())
            .problem(prompt.problem.as_str())
            .code(attachment.content())
            .user_message(self.prompts.render_user_message(
                &prompt.problem,
                attachment.content(),
                &attachment.language(),
            ))
            .temperature(self.options.temperature)
            .max_tokens(self.options.max_tokens)
            .build();

        tracing::debug!("Requesting review");
        let (result, failure) = match self.gateway.review(&request).await {
            Ok(feedback) => (ReviewResult::from_feedback(feedback), None),
            Err(err) => {
                tracing::warn!("Review failed: {err}");
                (ReviewResult::failed(&err), Some(err.to_string()))
            }
        };

        let content = render_report(student, attachment, prompt, &result, generated_at);

        let lock = self.write_lock(&report);
        let _guard = lock.lock().await;
        if let Err(err) = tokio::fs::write(&report, content).await {
            tracing::error!("Could not write {}: {err}", report.display());
            return UnitOutcome::PersistFailed {
                report,
                reason: err.to_string(),
            };
        }

        tracing::info!("Wrote {} (score: {})", report.display(), result.score);
        match failure {
            None => UnitOutcome::Generated {
                report,
                score: result.score,
            },
            Some(reason) => UnitOutcome::Degraded { report, reason },
        }
    }

    /// Claims `report` for the student `identity` for the rest of the run.
    ///
    /// Fails with the current owner when another student claimed it first.
    fn claim(&self, report: &Path, identity: String) -> Result<(), String> {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        match owners.get(report) {
            Some(owner) if *owner != identity => Err(owner.clone()),
            Some(_) => Ok(()),
            None => {
                owners.insert(report.to_path_buf(), identity);
                Ok(())
            }
        }
    }

    /// Returns the write lock of `path`, creating it on first use.
    fn write_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}
