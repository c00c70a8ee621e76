//! # ta-review
//!
//! Batch reviewer for grading-platform exports. Parses per-student submission
//! documents and the course roster, pairs each source attachment with its
//! assignment problem, asks a text-generation service for a review, and
//! writes one markdown report per student and assignment.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Review service settings and prompt assets.
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Submission documents, roster rows, and the loaders behind them.
pub mod records;
/// Attachments, prompt matching, reviews, reports, and batch runs.
pub mod review;
/// Read-only HTTP access to generated reports.
pub mod server;
/// Utility functions for convenience
pub mod util;
