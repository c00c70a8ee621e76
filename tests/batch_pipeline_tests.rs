use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use chrono::{NaiveDate, NaiveDateTime};
use ta_review::{
    config::ReviewPrompts,
    review::{
        BatchOrchestrator, PromptDefinition, ReviewError, ReviewGateway, ReviewRequest,
        RunOptions, UnitOutcome,
    },
};
use uuid::Uuid;

/// Code containing this marker makes the scripted gateway fail.
const OUTAGE_MARKER: &str = "TRIGGER_OUTAGE";

/// Deterministic stand-in for the review service.
#[derive(Default)]
struct ScriptedGateway {
    calls:         AtomicUsize,
    in_flight:     AtomicUsize,
    max_in_flight: AtomicUsize,
    delay:         Option<Duration>,
}

impl ScriptedGateway {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

impl ReviewGateway for ScriptedGateway {
    async fn review(&self, request: &ReviewRequest) -> Result<String, ReviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request.code.contains(OUTAGE_MARKER) {
            return Err(ReviewError::Other("scripted outage".into()));
        }
        assert!(request.user_message.contains(&request.problem));
        assert!(request.user_message.contains(&request.code));

        Ok(format!(
            "The program compiles and handles the sample input.\n\nSuggested score: {}/100",
            60 + request.code.len() % 40
        ))
    }
}

struct Export {
    root:        PathBuf,
    submissions: PathBuf,
    output:      PathBuf,
}

impl Export {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("ta-review-batch-{}", Uuid::new_v4()));
        let submissions = root.join("gradebook");
        fs::create_dir_all(&submissions).expect("create submissions dir");
        Self {
            output: root.join("feedback_output"),
            root,
            submissions,
        }
    }

    /// Writes one submission document and its stored attachments.
    fn student(&self, document: &str, id: &str, files: &[(&str, &str)]) {
        let mut text = format!(
            "Name: Student {id}(Stu {id}) Computer Science ({id})\nAssignment: PA6\nDate \
             Submitted: Saturday, October 25, 2025 10:15:03 PM CST\nCurrent Grade: Needs \
             Grading\n\nFiles:\n"
        );
        for (original, content) in files {
            let stored = format!("PA6_{id}_attempt_{original}");
            text.push_str(&format!(
                "\tOriginal filename: {original}\n\tFilename: {stored}\n\n"
            ));
            fs::write(self.submissions.join(&stored), content).expect("write attachment");
        }
        fs::write(self.submissions.join(document), text).expect("write document");
    }

    fn options(&self) -> RunOptions {
        RunOptions::builder()
            .submissions_dir(self.submissions.clone())
            .output_dir(self.output.clone())
            .generated_at(Some(fixed_time()))
            .build()
    }

    fn reports(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.output)
            .expect("read output dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn report(&self, name: &str) -> String {
        fs::read_to_string(self.output.join(name)).expect("read report")
    }
}

impl Drop for Export {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 10, 25)
        .and_then(|date| date.and_hms_opt(22, 57, 45))
        .expect("valid timestamp")
}

fn definitions() -> Vec<PromptDefinition> {
    vec![PromptDefinition::new(
        "Find the minimum, maximum and average of N integers.",
        "pa6p1.c",
    )]
}

fn orchestrator(
    gateway: ScriptedGateway,
    options: RunOptions,
) -> BatchOrchestrator<ScriptedGateway> {
    BatchOrchestrator::new(gateway, ReviewPrompts::load(), definitions(), options)
}

#[tokio::test]
async fn unmatched_attachment_is_skipped_without_aborting() {
    let export = Export::new();
    export.student(
        "PA6_12210211_attempt.txt",
        "12210211",
        &[
            ("pa6p1.c", "int main(void) { return 0; }\n"),
            ("pa6p2.c", "int main(void) { return 1; }\n"),
        ],
    );

    let summary = orchestrator(ScriptedGateway::default(), export.options())
        .run()
        .await
        .expect("run");

    assert_eq!(summary.students_found, 1);
    assert_eq!(summary.generated(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.degraded(), 0);
    assert_eq!(export.reports(), ["12210211_pa6p1_feedback.md"]);

    let skipped = summary
        .units
        .iter()
        .find(|unit| unit.attachment == "pa6p2.c")
        .expect("unit for pa6p2.c");
    assert!(matches!(skipped.outcome, UnitOutcome::Skipped { .. }));

    let report = export.report("12210211_pa6p1_feedback.md");
    assert!(report.contains("- **Student ID**: 12210211"));
    assert!(report.contains("- **Name**: Student 12210211 (Stu 12210211)"));
    assert!(report.contains("- **File**: pa6p1.c"));
    assert!(report.contains("- **Generated at**: 2025-10-25 22:57:45"));
    assert!(report.contains("Find the minimum, maximum and average of N integers."));
    assert!(report.contains("```c\nint main(void) { return 0; }\n```"));
    assert!(report.contains("Suggested score: "));
}

#[tokio::test]
async fn failed_review_degrades_and_later_students_continue() {
    let export = Export::new();
    export.student("a.txt", "1001", &[("pa6p1.c", "/* TRIGGER_OUTAGE */")]);
    export.student("b.txt", "1002", &[("pa6p1.c", "int main(void) { return 0; }")]);

    let gateway = ScriptedGateway::default();
    let summary = orchestrator(gateway, export.options())
        .run()
        .await
        .expect("run");

    assert_eq!(summary.degraded(), 1);
    assert_eq!(summary.generated(), 1);
    assert_eq!(
        export.reports(),
        ["1001_pa6p1_feedback.md", "1002_pa6p1_feedback.md"]
    );

    let failed = export.report("1001_pa6p1_feedback.md");
    assert!(failed.contains("- **Suggested score**: 0\n"));
    assert!(failed.contains("scripted outage"));

    let passed = export.report("1002_pa6p1_feedback.md");
    assert!(passed.contains("/100"));
}

#[tokio::test]
async fn rerun_overwrites_reports_with_identical_content() {
    let export = Export::new();
    export.student("a.txt", "1001", &[("pa6p1.c", "int a;")]);
    export.student("b.txt", "1002", &[("pa6p1.c", "int bb;")]);

    orchestrator(ScriptedGateway::default(), export.options())
        .run()
        .await
        .expect("first run");
    let first: Vec<(String, String)> = export
        .reports()
        .into_iter()
        .map(|name| {
            let content = export.report(&name);
            (name, content)
        })
        .collect();

    orchestrator(ScriptedGateway::default(), export.options())
        .run()
        .await
        .expect("second run");
    let second: Vec<(String, String)> = export
        .reports()
        .into_iter()
        .map(|name| {
            let content = export.report(&name);
            (name, content)
        })
        .collect();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn resume_offset_and_limit_select_a_window() {
    let export = Export::new();
    export.student("a.txt", "1001", &[("pa6p1.c", "int a;")]);
    export.student("b.txt", "1002", &[("pa6p1.c", "int b;")]);
    export.student("c.txt", "1003", &[("pa6p1.c", "int c;")]);

    let mut options = export.options();
    options.resume_from = 1;
    options.limit = Some(1);

    let summary = orchestrator(ScriptedGateway::default(), options)
        .run()
        .await
        .expect("run");

    assert_eq!(summary.students_found, 3);
    assert_eq!(summary.resumed_past, 1);
    assert_eq!(summary.students_processed, 1);
    assert_eq!(export.reports(), ["1002_pa6p1_feedback.md"]);

    let mut options = export.options();
    options.resume_from = 10;
    let summary = orchestrator(ScriptedGateway::default(), options)
        .run()
        .await
        .expect("run past the end");
    assert_eq!(summary.students_processed, 0);
    assert!(summary.units.is_empty());
}

#[tokio::test]
async fn unparsable_document_skips_only_that_student() {
    let export = Export::new();
    export.student("a.txt", "1001", &[("pa6p1.c", "int a;")]);
    fs::write(export.submissions.join("b.txt"), "\n\n   \n").expect("write empty document");
    export.student("c.txt", "1003", &[("pa6p1.c", "int c;")]);

    let summary = orchestrator(ScriptedGateway::default(), export.options())
        .run()
        .await
        .expect("run");

    assert_eq!(summary.documents_failed.len(), 1);
    assert!(summary.documents_failed[0].path.ends_with("b.txt"));
    assert_eq!(summary.students_found, 2);
    assert_eq!(summary.generated(), 2);
}

#[tokio::test]
async fn concurrent_students_are_bounded_and_all_reported() {
    let export = Export::new();
    for id in 1001..1007 {
        export.student(&format!("{id}.txt"), &id.to_string(), &[(
            "pa6p1.c",
            "int main(void) { return 0; }",
        )]);
    }
    // Two documents for the same student and file write the same report.
    export.student("1006_resubmission.txt", "1006", &[("pa6p1.c", "int main(void);")]);

    let mut options = export.options();
    options.concurrency = 3;
    let orchestrator = orchestrator(
        ScriptedGateway::with_delay(Duration::from_millis(20)),
        options,
    );
    let summary = orchestrator.run().await.expect("run");

    assert_eq!(summary.generated(), 7);
    assert_eq!(summary.persist_failed(), 0);
    assert_eq!(export.reports().len(), 6);
    for report in summary.reports() {
        assert!(report.starts_with(&export.output));
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_the_configured_bound() {
    let export = Export::new();
    for id in 2001..2009 {
        export.student(&format!("{id}.txt"), &id.to_string(), &[("pa6p1.c", "int x;")]);
    }

    let mut options = export.options();
    options.concurrency = 2;
    let orchestrator = orchestrator(
        ScriptedGateway::with_delay(Duration::from_millis(10)),
        options,
    );
    orchestrator.run().await.expect("run");

    let gateway_max = max_in_flight(&orchestrator);
    assert!(gateway_max <= 2, "saw {gateway_max} reviews at once");
}

fn max_in_flight(orchestrator: &BatchOrchestrator<ScriptedGateway>) -> usize {
    orchestrator.gateway().max_in_flight.load(Ordering::SeqCst)
}

#[tokio::test]
async fn configuration_errors_abort_before_reviewing() {
    let export = Export::new();
    export.student("a.txt", "1001", &[("pa6p1.c", "int a;")]);

    let mut options = export.options();
    options.roster = Some(export.root.join("missing_roster.csv"));
    assert!(
        orchestrator(ScriptedGateway::default(), options)
            .run()
            .await
            .is_err()
    );

    let roster = export.root.join("roster.csv");
    fs::write(&roster, "Username,First Name\n1001,Ada\n").expect("write roster");
    let mut options = export.options();
    options.roster = Some(roster.clone());
    options.roster_columns = Some(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
    assert!(
        orchestrator(ScriptedGateway::default(), options)
            .run()
            .await
            .is_err()
    );

    let mut options = export.options();
    options.submissions_dir = export.root.join("no_such_dir");
    assert!(
        orchestrator(ScriptedGateway::default(), options)
            .run()
            .await
            .is_err()
    );

    let mut options = export.options();
    options.roster = Some(roster);
    let summary = orchestrator(ScriptedGateway::default(), options)
        .run()
        .await
        .expect("roster is a side input");
    assert_eq!(summary.generated(), 1);
}

#[tokio::test]
async fn only_configured_extensions_are_reviewed() {
    let export = Export::new();
    export.student("a.txt", "1001", &[
        ("pa6p1.c", "int a;"),
        ("pa6p1.h", "int a;"),
        ("readme.md", "# hi"),
    ]);

    let gateway = ScriptedGateway::default();
    let orchestrator = orchestrator(gateway, export.options());
    let summary = orchestrator.run().await.expect("run");

    assert_eq!(summary.units.len(), 1);
    assert_eq!(orchestrator.gateway().calls.load(Ordering::SeqCst), 1);
    assert_eq!(export.reports(), ["1001_pa6p1_feedback.md"]);
}

#[tokio::test]
async fn unidentified_students_do_not_overwrite_each_other() {
    let export = Export::new();
    for (document, name, code) in [("a.txt", "Alice", "int alice;"), ("b.txt", "Bob", "int bob;")] {
        let stored = format!("{name}_pa6p1.c");
        fs::write(export.submissions.join(&stored), code).expect("write attachment");
        fs::write(
            export.submissions.join(document),
            format!(
                "Name: {name}\nAssignment: PA6\nFiles:\n\tOriginal filename: pa6p1.c\n\tFilename: \
                 {stored}\n"
            ),
        )
        .expect("write document");
    }

    let summary = orchestrator(ScriptedGateway::default(), export.options())
        .run()
        .await
        .expect("run");

    assert_eq!(export.reports(), ["unknown_pa6p1_feedback.md"]);
    assert_eq!(summary.generated(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.reports().len(), 1);

    let report = export.report("unknown_pa6p1_feedback.md");
    assert!(report.contains("- **Name**: Alice"));
    assert!(report.contains("int alice;"));

    let bob = summary
        .units
        .iter()
        .find(|unit| matches!(unit.outcome, UnitOutcome::Skipped { .. }))
        .expect("skipped unit");
    assert_eq!(bob.attachment, "pa6p1.c");
}

#[tokio::test]
async fn unwritable_report_is_recorded_and_later_students_continue() {
    let export = Export::new();
    export.student("a.txt", "1001", &[("pa6p1.c", "int a;")]);
    export.student("b.txt", "1002", &[("pa6p1.c", "int b;")]);
    fs::create_dir_all(export.output.join("1001_pa6p1_feedback.md"))
        .expect("block the first report path");

    let summary = orchestrator(ScriptedGateway::default(), export.options())
        .run()
        .await
        .expect("run");

    assert_eq!(summary.persist_failed(), 1);
    assert_eq!(summary.generated(), 1);

    let failed = summary
        .units
        .iter()
        .find(|unit| unit.student_id == "1001")
        .expect("unit for 1001");
    match &failed.outcome {
        UnitOutcome::PersistFailed { report, reason } => {
            assert!(report.ends_with("1001_pa6p1_feedback.md"));
            assert!(!reason.is_empty());
        }
        other => panic!("expected a persist failure, got {other:?}"),
    }
    assert!(failed.outcome.report().is_none());

    assert!(export.report("1002_pa6p1_feedback.md").contains("int b;"));
}
