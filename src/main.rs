#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # ta-review
//!
//! Reviews a grading-platform export: every source attachment that matches
//! an assignment problem is sent to a text-generation service and the review
//! is written to `<student id>_<assignment>_feedback.md`.
//!
//! Service settings come from the environment (or a `.env` file):
//! `OPENAI_ENDPOINT`, `OPENAI_API_KEY`, `OPENAI_MODEL`, and optionally
//! `OPENAI_TEMPERATURE`, `OPENAI_MAX_TOKENS`, `OPENAI_TOKEN_LIMIT_FIELD`
//! (`max_tokens` or `max_completion_tokens`), `REVIEW_TIMEOUT_SECS`.

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use anyhow::{Context, Result};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use ta_review::{
    config::{OpenAiEnv, ReviewPrompts},
    records::{RosterRow, SubmissionRecord, TabularLoader, TextRecord},
    review::{
        BatchOrchestrator, OpenAiGateway, ReportStore, RunOptions, RunSummary, UnitOutcome,
        batch::default_extensions, load_prompts,
    },
    server,
};
use tabled::{
    Table, Tabled,
    settings::{Modify, Panel, Style, Width, object::Rows},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Arguments of the `review` command.
#[derive(Debug, Clone)]
struct ReviewArgs {
    /// Directory with the submission documents.
    submissions:    PathBuf,
    /// JSON file with the prompt definitions.
    prompts:        PathBuf,
    /// Report directory.
    output:         PathBuf,
    /// Roster export.
    roster:         Option<PathBuf>,
    /// Explicit roster columns.
    roster_columns: Vec<String>,
    /// Attachment extensions to review.
    extensions:     Vec<String>,
    /// Students to skip.
    resume_from:    usize,
    /// Maximum number of students.
    limit:          Option<usize>,
    /// Students reviewed at the same time.
    jobs:           usize,
    /// User message template override.
    template:       Option<PathBuf>,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Run a batch review
    Review(ReviewArgs),
    /// Parse one submission document
    Parse(PathBuf),
    /// Load and print a roster
    Roster(Vec<String>, PathBuf),
    /// Serve generated reports
    Serve(PathBuf, SocketAddr),
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Opts {
    /// Debug logging.
    verbose: bool,
    /// Command to run.
    cmd:     Cmd,
}

/// Parse the command line arguments
fn options() -> Opts {
    /// parses repeated roster column names
    fn columns() -> impl Parser<Vec<String>> {
        long("roster-column")
            .help("Roster column bound to the next roster field, in order")
            .argument::<String>("COLUMN")
            .many()
    }

    let submissions = long("submissions")
        .short('s')
        .help("Directory with the per-student submission documents")
        .argument::<PathBuf>("DIR");
    let prompts = long("prompts")
        .short('p')
        .help("JSON file with the assignment problems")
        .argument::<PathBuf>("FILE");
    let output = long("output")
        .short('o')
        .help("Directory the reports are written to")
        .argument::<PathBuf>("DIR")
        .fallback(PathBuf::from("feedback_output"));
    let roster = long("roster")
        .help("Roster export (CSV)")
        .argument::<PathBuf>("FILE")
        .optional();
    let roster_columns = columns();
    let extensions = long("extension")
        .help("Attachment extension to review, repeatable (default: c)")
        .argument::<String>("EXT")
        .many();
    let resume_from = long("resume-from")
        .help("Number of students to skip, in document order")
        .argument::<usize>("N")
        .fallback(0);
    let limit = long("limit")
        .help("Review at most N students")
        .argument::<usize>("N")
        .optional();
    let jobs = long("jobs")
        .short('j')
        .help("Number of students reviewed at the same time")
        .argument::<usize>("N")
        .fallback(1);
    let template = long("template")
        .help("User message template with {problem} and {code} placeholders")
        .argument::<PathBuf>("FILE")
        .optional();

    let review = construct!(ReviewArgs {
        submissions,
        prompts,
        output,
        roster,
        roster_columns,
        extensions,
        resume_from,
        limit,
        jobs,
        template,
    })
    .to_options()
    .command("review")
    .help("Review every matching attachment of an export")
    .map(Cmd::Review);

    let document = positional::<PathBuf>("FILE").help("Submission document");
    let parse = construct!(Cmd::Parse(document))
        .to_options()
        .command("parse")
        .help("Print a submission document as JSON");

    let roster_file = positional::<PathBuf>("FILE").help("Roster export (CSV)");
    let roster = construct!(Cmd::Roster(columns(), roster_file))
        .to_options()
        .command("roster")
        .help("Print a roster export as a table");

    let reports = long("reports")
        .short('r')
        .help("Directory with generated reports")
        .argument::<PathBuf>("DIR")
        .fallback(PathBuf::from("feedback_output"));
    let addr = long("addr")
        .help("Address to listen on")
        .argument::<SocketAddr>("ADDR")
        .fallback(SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)));
    let serve = construct!(Cmd::Serve(reports, addr))
        .to_options()
        .command("serve")
        .help("Serve generated reports over HTTP");

    let verbose = long("verbose")
        .short('v')
        .help("Log debug messages")
        .switch();
    let cmd = construct!([review, parse, roster, serve]);

    construct!(Opts { verbose, cmd })
        .to_options()
        .descr("Batch reviewer for grading-platform exports")
        .run()
}

/// One line of the run summary table.
#[derive(Tabled)]
struct UnitRow {
    /// Student identifier.
    #[tabled(rename = "Student")]
    student: String,
    /// Attachment.
    #[tabled(rename = "File")]
    file:    String,
    /// Outcome word.
    #[tabled(rename = "Status")]
    status:  String,
    /// Score, report, or reason.
    #[tabled(rename = "Detail")]
    detail:  String,
}

/// Prints the per-unit table and the totals.
fn print_summary(summary: &RunSummary) {
    let rows: Vec<UnitRow> = summary
        .units
        .iter()
        .map(|unit| UnitRow {
            student: unit.student_id.clone(),
            file:    unit.attachment.clone(),
            status:  unit.outcome.status().to_string(),
            detail:  match &unit.outcome {
                UnitOutcome::Generated { score, .. } => score.clone(),
                UnitOutcome::Degraded { reason, .. }
                | UnitOutcome::Skipped { reason }
                | UnitOutcome::PersistFailed { reason, .. } => reason.clone(),
            },
        })
        .collect();

    if !rows.is_empty() {
        println!(
            "{}",
            Table::new(&rows)
                .with(Panel::header(format!("Run {}", summary.run_id)))
                .with(Modify::new(Rows::new(1..)).with(Width::wrap(48).keep_words(true)))
                .with(Style::modern())
        );
    }

    for failure in &summary.documents_failed {
        eprintln!(
            "{} {}: {}",
            "unreadable".red(),
            failure.path.display(),
            failure.reason
        );
    }

    println!(
        "{} students reviewed ({} found, {} resumed past): {} generated, {} degraded, {} skipped, \
         {} not written",
        summary.students_processed,
        summary.students_found,
        summary.resumed_past,
        summary.generated().to_string().green(),
        summary.degraded().to_string().yellow(),
        summary.skipped().to_string().yellow(),
        summary.persist_failed().to_string().red(),
    );
}

/// Runs the `review` command.
async fn review(args: ReviewArgs) -> Result<()> {
    let env = OpenAiEnv::from_env()?;
    let gateway = OpenAiGateway::new(&env)?;
    let prompts = match &args.template {
        Some(path) => ReviewPrompts::from_template_file(path)?,
        None => ReviewPrompts::load(),
    };
    let definitions = load_prompts(&args.prompts)?;
    if definitions.is_empty() {
        tracing::warn!(
            "{} defines no problems, every attachment will be skipped",
            args.prompts.display()
        );
    }

    let options = RunOptions::builder()
        .submissions_dir(args.submissions)
        .output_dir(args.output)
        .roster(args.roster)
        .roster_columns((!args.roster_columns.is_empty()).then_some(args.roster_columns))
        .extensions(if args.extensions.is_empty() {
            default_extensions()
        } else {
            args.extensions
        })
        .resume_from(args.resume_from)
        .limit(args.limit)
        .concurrency(args.jobs)
        .temperature(env.temperature())
        .max_tokens(env.max_tokens())
        .build();

    let orchestrator = BatchOrchestrator::new(gateway, prompts, definitions, options);
    let summary = orchestrator.run().await?;
    print_summary(&summary);
    println!(
        "Reports are in {}",
        orchestrator.options().output_dir.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let level = if opts.verbose { Level::DEBUG } else { Level::INFO };
    let filter_layer = LevelFilter::from_level(level);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match opts.cmd {
        Cmd::Review(args) => review(args).await?,
        Cmd::Parse(path) => {
            let record = SubmissionRecord::load(&path)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("Could not serialize record")?
            );
        }
        Cmd::Roster(columns, path) => {
            let loader = if columns.is_empty() {
                TabularLoader::<RosterRow>::new()?
            } else {
                TabularLoader::<RosterRow>::with_columns(columns)?
            };
            match loader.columns() {
                Some(columns) => tracing::debug!("Binding roster columns {columns:?}"),
                None => tracing::debug!("Binding roster columns by header name"),
            }
            let rows = loader.load(&path)?;
            println!("{}", Table::new(&rows).with(Style::modern()));
        }
        Cmd::Serve(dir, addr) => server::serve(ReportStore::new(dir), addr).await?,
    }

    Ok(())
}
