use std::{fs, path::PathBuf};

use ta_review::records::{
    FileEntry, RawRecord, StudentName, SubmissionRecord, TextRecord, parse_document,
};
use uuid::Uuid;

const SUBMISSION: &str = "Name: 张三(Zhang San) Computer Science (12210211)
Assignment: PA6
Date Submitted: Saturday, October 25, 2025 10:15:03 PM CST
Current Grade: Needs Grading

Submission Field:
There is no student submission text data for this assignment.

Comments:
There are no student comments for this assignment.

Files:
\tOriginal filename: pa6p1.c
\tFilename: PA6_12210211_attempt_2025-10-25-22-15-03_pa6p1.c

\tOriginal filename: pa6p2.c
\tFilename: PA6_12210211_attempt_2025-10-25-22-15-03_pa6p2.c
";

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("ta-review-records-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

#[test]
fn parses_a_full_submission_document() {
    let record = SubmissionRecord::parse(SUBMISSION).expect("parse submission");

    assert_eq!(record.name(), Some("张三 (Zhang San)"));
    assert_eq!(record.major(), Some("Computer Science"));
    assert_eq!(record.student_id(), Some("12210211"));
    assert_eq!(record.assignment(), Some("PA6"));
    assert_eq!(
        record.date_submitted(),
        Some("Saturday, October 25, 2025 10:15:03 PM CST")
    );
    assert_eq!(record.current_grade(), None);
    assert_eq!(record.submission_text(), None);
    assert_eq!(record.comments(), None);
    assert_eq!(
        record.files(),
        &[
            FileEntry::new("pa6p1.c", "PA6_12210211_attempt_2025-10-25-22-15-03_pa6p1.c"),
            FileEntry::new("pa6p2.c", "PA6_12210211_attempt_2025-10-25-22-15-03_pa6p2.c"),
        ]
    );
}

#[test]
fn continuation_lines_join_the_open_key() {
    let raw = parse_document(
        "Comments: first line\n    indented line\nplain line without colon\n\n\tafter a \
         blank\nNext: value",
    );

    assert_eq!(
        raw.get("Comments"),
        Some("first line\nindented line\nplain line without colon\n\nafter a blank")
    );
    assert_eq!(raw.get("Next"), Some("value"));
    assert_eq!(raw.len(), 2);
}

#[test]
fn value_keeps_everything_after_the_first_colon() {
    let raw = parse_document("Date Submitted: 10:15:03 PM\nLink: http://example.com/a");
    assert_eq!(raw.get("Date Submitted"), Some("10:15:03 PM"));
    assert_eq!(raw.get("Link"), Some("http://example.com/a"));
}

#[test]
fn text_before_the_first_key_and_after_an_empty_key_is_dropped() {
    let raw = parse_document("preamble\n\nName: Bo\n: orphan\n    still orphan\nAssignment: PA1");

    let keys: Vec<_> = raw.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["Name", "Assignment"]);
    assert_eq!(raw.get("Name"), Some("Bo"));
}

#[test]
fn repeated_key_keeps_the_last_value() {
    let raw = parse_document("Comments: one\nComments: two");
    assert_eq!(raw.get("Comments"), Some("two"));
    assert_eq!(raw.len(), 1);
}

#[test]
fn reserializing_preserves_committed_values() {
    let mut record = RawRecord::new();
    record.insert("Name", "Bo (Bo) Physics (1)");
    record.insert("Comments", "line one\n\nline three: with a colon\nline four");
    record.insert("Submission Field", "");
    record.insert("Files", "Original filename: a.c\nFilename: b.c");

    let reparsed = parse_document(&record.to_document());
    assert_eq!(reparsed, record);
}

#[test]
fn unmatched_name_falls_back_to_the_raw_value() {
    let record = SubmissionRecord::parse("Name: Just A Name\nAssignment: PA1").expect("parse");

    assert_eq!(record.name(), Some("Just A Name"));
    assert_eq!(record.student_id(), None);
    assert_eq!(record.major(), None);
}

#[test]
fn name_grammar_splits_all_parts() {
    let name = StudentName::parse("  Li Si(Li Si)  Electrical Engineering (12110001) ")
        .expect("parse name");
    assert_eq!(name.display_name(), "Li Si (Li Si)");
    assert_eq!(name.major(), "Electrical Engineering");
    assert_eq!(name.student_id(), "12110001");

    assert!(StudentName::parse("Li Si(Li Si) Electrical Engineering").is_none());
}

#[test]
fn grade_and_free_text_cleanup() {
    let record = SubmissionRecord::parse(
        "Current Grade: 85\nSubmission Field: See attached\nComments: THERE ARE NO STUDENT \
         COMMENTS FOR THIS ASSIGNMENT",
    )
    .expect("parse");

    assert_eq!(record.current_grade(), Some(85));
    assert_eq!(record.submission_text(), Some("See attached"));
    assert_eq!(record.comments(), None);
}

#[test]
fn malformed_file_blocks_are_skipped() {
    let record = SubmissionRecord::parse(
        "Files:\n\tOriginal filename: a.c\n\n\tOriginal filename: b.c\n\tFilename: stored_b.c\n\n\
         \tsomething unrelated\n\tsecond line",
    )
    .expect("parse");

    assert_eq!(record.files(), &[FileEntry::new("b.c", "stored_b.c")]);
}

#[test]
fn missing_keys_leave_fields_empty() {
    let record = SubmissionRecord::parse("Assignment: PA2").expect("parse");

    assert_eq!(record.assignment(), Some("PA2"));
    assert_eq!(record.name(), None);
    assert_eq!(record.current_grade(), None);
    assert!(record.files().is_empty());
}

#[test]
fn document_without_keys_is_rejected() {
    assert!(SubmissionRecord::parse("no keys here\n\n    nor here").is_err());
    assert!(SubmissionRecord::parse("").is_err());
}

#[test]
fn load_reads_documents_with_a_byte_order_mark() {
    let root = temp_root();
    let path = root.join("student.txt");
    fs::write(&path, format!("\u{feff}{SUBMISSION}")).expect("write document");

    let record = SubmissionRecord::load(&path).expect("load");
    assert_eq!(record.name(), Some("张三 (Zhang San)"));
    assert!(SubmissionRecord::load(&root.join("missing.txt")).is_err());

    let _ = fs::remove_dir_all(root);
}
