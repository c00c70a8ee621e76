#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::Serialize;

use super::{
    attachment::{AssignmentAttachment, Student},
    prompt::PromptDefinition,
    score::ReviewResult,
};
use crate::{
    constants::{REPORT_EXTENSION, REPORT_SUFFIX, UNKNOWN_STUDENT, UNSAFE_FILENAME_CHARS},
    util::find_files,
};

/// Replaces every character that is unsafe in a filename with `_`.
pub fn sanitize_component(component: &str) -> String {
    component.replace(UNSAFE_FILENAME_CHARS, "_")
}

/// Student identifier as it appears in report filenames.
///
/// Sanitized like any component, then every `_` becomes `-`, so the first
/// `_` of a report filename always ends the identifier.
pub fn sanitize_student_id(student_id: &str) -> String {
    sanitize_component(student_id).replace('_', "-")
}

/// Assignment label of an attachment: its original filename without the
/// extension, eg. `pa6p1` for `pa6p1.c`.
pub fn assignment_stem(original_filename: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(original_filename);
    if stem.is_empty() { "file".to_string() } else { sanitize_component(stem) }
}

/// `<student id>_<assignment>_feedback.md`, both parts sanitized.
pub fn report_filename(student_id: Option<&str>, original_filename: &str) -> String {
    let student_id = student_id
        .filter(|id| !id.is_empty())
        .map_or_else(|| UNKNOWN_STUDENT.to_string(), sanitize_student_id);
    format!(
        "{student_id}_{}{REPORT_SUFFIX}.{REPORT_EXTENSION}",
        assignment_stem(original_filename)
    )
}

/// Renders the markdown report for one reviewed attachment.
pub fn render_report(
    student: &Student,
    attachment: &AssignmentAttachment,
    prompt: &PromptDefinition,
    result: &ReviewResult,
    generated_at: &str,
) -> String {
    format!(
        r#"# Code Review Report

## Student
- **Student ID**: {student_id}
- **Name**: {name}
- **File**: {file}
- **Suggested score**: {score}
- **Generated at**: {generated_at}

## Problem statement
{problem}

## Student code
```{language}
{code}
```

## Review

{feedback}

---
*This review was generated automatically and should be checked by a member of the course staff.*
"#,
        student_id = student.student_id(),
        name = student.name(),
        file = attachment.original_filename(),
        score = result.score,
        problem = prompt.problem.trim(),
        language = attachment.language(),
        code = attachment.content().trim_end(),
        feedback = result.feedback.trim(),
    )
}

/// One stored report as seen by the read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// Report filename.
    pub filename:   String,
    /// Assignment label taken from the filename.
    pub assignment: String,
}

/// Read-only view over a directory of generated reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    /// Report directory.
    dir: PathBuf,
}

impl ReportStore {
    /// Creates a store over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Report directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filenames of every report in the directory.
    fn report_names(&self) -> Result<Vec<String>> {
        ensure!(
            self.dir.is_dir(),
            "Report directory {} does not exist",
            self.dir.display()
        );

        let suffix = format!("{REPORT_SUFFIX}.{REPORT_EXTENSION}");
        Ok(find_files(REPORT_EXTENSION, 0, &self.dir)?
            .into_iter()
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_owned)
            })
            .filter(|name| name.ends_with(&suffix))
            .collect())
    }

    /// Reports of one student, sorted by assignment.
    ///
    /// `student_id` goes through the same sanitizing as report filenames, so
    /// both `A_1` and `A-1` find the reports of student `A_1`.
    pub fn list_for_student(&self, student_id: &str) -> Result<Vec<ReportEntry>> {
        let prefix = format!("{}_", sanitize_student_id(student_id));
        let suffix = format!("{REPORT_SUFFIX}.{REPORT_EXTENSION}");

        Ok(self
            .report_names()?
            .into_iter()
            .filter_map(|filename| {
                let assignment = filename
                    .strip_prefix(&prefix)?
                    .strip_suffix(&suffix)?
                    .to_string();
                Some(ReportEntry {
                    filename,
                    assignment,
                })
            })
            .sorted_by(|a, b| a.assignment.cmp(&b.assignment))
            .collect())
    }

    /// Content of one report, `None` when it does not exist.
    pub fn fetch(&self, student_id: &str, assignment: &str) -> Result<Option<String>> {
        ensure!(
            self.dir.is_dir(),
            "Report directory {} does not exist",
            self.dir.display()
        );

        let path = self.dir.join(format!(
            "{}_{}{REPORT_SUFFIX}.{REPORT_EXTENSION}",
            sanitize_student_id(student_id),
            sanitize_component(assignment)
        ));
        if !path.is_file() {
            return Ok(None);
        }

        std::fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Could not read report {}", path.display()))
    }

    /// Identifiers of every student with at least one report, sorted.
    ///
    /// These are the filename forms, with `_` already turned into `-`.
    pub fn students(&self) -> Result<Vec<String>> {
        Ok(self
            .report_names()?
            .into_iter()
            .filter_map(|name| name.split_once('_').map(|(id, _)| id.to_string()))
            .sorted()
            .dedup()
            .collect())
    }
}
