//! Typed model of a conformance report and its parser
//!
//! A test run leaves one JUnit-style XML document per suite in the test-run
//! directory (`TEST-*.xml`). [`parse_report_dir`] walks that directory and
//! produces an ordered list of [`TestSuite`]s, each owning its
//! [`TestCase`]s in document order.
//!
//! ## Resilience
//!
//! The report schema belongs to the external tool and changes between tool
//! releases, so the parser tolerates schema drift: unknown verdict strings
//! map to [`Verdict::Undefined`], a malformed case record is skipped with a logged
//! warning, a document that is not well-formed XML is skipped as a whole,
//! and a missing report directory yields an empty suite list. None of these
//! conditions fail the run; a crash before any report is written is visible
//! through the process exit code instead.

use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::warn;

/// Errors raised while reading a single report document.
///
/// Only surfaced by [`parse_report_file`]; the directory-level walk downgrades
/// them to warnings.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot read report document: {0}")]
    Io(#[from] std::io::Error),

    #[error("report document is not well-formed: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Outcome classification of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
    NotApplicable,
    /// The report used a verdict string this harness does not know.
    Undefined,
}

impl Verdict {
    /// Map a verdict string from the report vocabulary. Unknown strings
    /// become [`Verdict::Undefined`] rather than failing the parse.
    pub fn from_report(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "PASSED" | "PASS" => Verdict::Passed,
            "FAILED" | "FAIL" | "FAILURE" | "ERROR" => Verdict::Failed,
            "SKIPPED" | "SKIP" => Verdict::Skipped,
            "NOT_APPLICABLE" => Verdict::NotApplicable,
            _ => Verdict::Undefined,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
            Verdict::Skipped => "SKIPPED",
            Verdict::NotApplicable => "NOT_APPLICABLE",
            Verdict::Undefined => "UNDEFINED",
        };
        f.write_str(text)
    }
}

/// One check within a suite, immutable once parsed.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Case name, unique within its suite.
    pub name: String,
    /// Qualified origin of the case, when the report provides one.
    pub class_name: Option<String>,
    pub verdict: Verdict,
    /// Free-text diagnostic, only meaningful for non-passed verdicts and
    /// absent when the report omits it.
    pub detail: Option<String>,
}

/// A named group of test cases, in document order.
#[derive(Debug, Clone)]
pub struct TestSuite {
    pub name: String,
    cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, cases: Vec<TestCase>) -> Self {
        Self {
            name: name.into(),
            cases,
        }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Number of cases with the given verdict. Counts are derived on demand
    /// so they cannot drift from the case list.
    pub fn count(&self, verdict: Verdict) -> usize {
        self.cases.iter().filter(|c| c.verdict == verdict).count()
    }

    pub fn passed(&self) -> usize {
        self.count(Verdict::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(Verdict::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(Verdict::Skipped)
    }
}

/// Parse every report document under `root`, in lexicographic file order.
///
/// A missing directory is a legitimate "no report produced" outcome and
/// yields an empty list. Documents that cannot be parsed are skipped with a
/// warning so one corrupt file cannot invalidate the rest of the run.
pub fn parse_report_dir(root: &Path) -> Vec<TestSuite> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut documents: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_report_document(path))
        .collect();
    documents.sort();

    let mut suites = Vec::new();
    for document in documents {
        match parse_report_file(&document) {
            Ok(parsed) => suites.extend(parsed),
            Err(error) => {
                warn!(document = %document.display(), %error, "skipping unreadable report document");
            }
        }
    }
    suites
}

fn is_report_document(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("TEST-") && n.ends_with(".xml"))
}

/// Parse one report document into its suites.
pub fn parse_report_file(path: &Path) -> Result<Vec<TestSuite>, ReportError> {
    let mut reader = Reader::from_file(path)?;
    reader.trim_text(true);

    let mut suites = Vec::new();
    let mut suite: Option<(String, Vec<TestCase>)> = None;
    let mut case: Option<CaseRecord> = None;
    // Set while inside a failure/error/skipped child, so stray text (e.g.
    // system-out bodies) is not mistaken for diagnostic detail.
    let mut in_detail = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"testsuite" => {
                    suite = Some((attr(e, b"name").unwrap_or_default(), Vec::new()));
                }
                b"testcase" if suite.is_some() => {
                    case = CaseRecord::open(e);
                }
                b"failure" | b"error" => {
                    if let Some(record) = case.as_mut() {
                        record.mark(Verdict::Failed, attr(e, b"message"));
                        in_detail = true;
                    }
                }
                b"skipped" => {
                    if let Some(record) = case.as_mut() {
                        record.mark(Verdict::Skipped, attr(e, b"message"));
                        in_detail = true;
                    }
                }
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"testsuite" => {
                    suites.push(TestSuite::new(attr(e, b"name").unwrap_or_default(), Vec::new()));
                }
                b"testcase" => {
                    if let Some((_, cases)) = suite.as_mut() {
                        if let Some(record) = CaseRecord::open(e) {
                            cases.push(record.finish());
                        }
                    }
                }
                b"failure" | b"error" => {
                    if let Some(record) = case.as_mut() {
                        record.mark(Verdict::Failed, attr(e, b"message"));
                    }
                }
                b"skipped" => {
                    if let Some(record) = case.as_mut() {
                        record.mark(Verdict::Skipped, attr(e, b"message"));
                    }
                }
                _ => {}
            },
            Event::Text(ref t) => {
                if in_detail {
                    if let (Some(record), Ok(text)) = (case.as_mut(), t.unescape()) {
                        record.append_detail(&text);
                    }
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"testsuite" => {
                    if let Some((name, cases)) = suite.take() {
                        suites.push(TestSuite::new(name, cases));
                    }
                }
                b"testcase" => {
                    if let (Some((_, cases)), Some(record)) = (suite.as_mut(), case.take()) {
                        cases.push(record.finish());
                    }
                    in_detail = false;
                }
                b"failure" | b"error" | b"skipped" => {
                    in_detail = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(suites)
}

/// A test case while its element is still open.
struct CaseRecord {
    name: String,
    class_name: Option<String>,
    status: Option<String>,
    child_verdict: Option<Verdict>,
    detail: Option<String>,
}

impl CaseRecord {
    /// `None` when the record is malformed (no `name` attribute); the caller
    /// skips it and the rest of the document still parses.
    fn open(e: &BytesStart<'_>) -> Option<Self> {
        let Some(name) = attr(e, b"name") else {
            warn!("skipping test case record without a name attribute");
            return None;
        };
        Some(Self {
            name,
            class_name: attr(e, b"classname"),
            status: attr(e, b"status"),
            child_verdict: None,
            detail: None,
        })
    }

    fn mark(&mut self, verdict: Verdict, message: Option<String>) {
        self.child_verdict = Some(verdict);
        if self.detail.is_none() {
            self.detail = message;
        }
    }

    fn append_detail(&mut self, text: &str) {
        match self.detail.as_mut() {
            Some(detail) => {
                detail.push('\n');
                detail.push_str(text);
            }
            None => self.detail = Some(text.to_string()),
        }
    }

    fn finish(self) -> TestCase {
        // An explicit status attribute wins over child elements; the children
        // then only contribute detail text.
        let verdict = match self.status.as_deref() {
            Some(status) => Verdict::from_report(status),
            None => self.child_verdict.unwrap_or(Verdict::Passed),
        };
        let detail = match verdict {
            Verdict::Passed => None,
            _ => self.detail,
        };
        TestCase {
            name: self.name,
            class_name: self.class_name,
            verdict,
            detail,
        }
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attribute in e.attributes() {
        match attribute {
            Ok(attribute) if attribute.key.as_ref() == key => {
                return attribute
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .map_err(|error| {
                        warn!(%error, "undecodable attribute value in report document");
                    })
                    .ok();
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "malformed attribute in report document");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_report(dir: &Path, file: &str, body: &str) {
        let mut f = fs::File::create(dir.join(file)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    const TWO_SUITES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="MDPWS" tests="2">
    <testcase name="R5039" classname="direct"/>
    <testcase name="R5040" classname="direct">
      <failure message="state mismatch">expected 3 context states, got 2</failure>
    </testcase>
  </testsuite>
  <testsuite name="BICEPS" tests="2">
    <testcase name="R6039" classname="invariant"/>
    <testcase name="R6040" classname="invariant">
      <skipped message="requirement disabled"/>
    </testcase>
  </testsuite>
</testsuites>
"#;

    #[test]
    fn parses_suites_and_cases_in_document_order() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), "TEST-direct.xml", TWO_SUITES);

        let suites = parse_report_dir(dir.path());
        assert_eq!(suites.len(), 2);
        assert_eq!(suites[0].name, "MDPWS");
        assert_eq!(suites[1].name, "BICEPS");

        let cases = suites[0].cases();
        assert_eq!(cases[0].name, "R5039");
        assert_eq!(cases[0].verdict, Verdict::Passed);
        assert!(cases[0].detail.is_none());
        assert_eq!(cases[1].verdict, Verdict::Failed);
        assert_eq!(
            cases[1].detail.as_deref(),
            Some("state mismatch\nexpected 3 context states, got 2")
        );

        assert_eq!(suites[1].cases()[1].verdict, Verdict::Skipped);
        assert_eq!(
            suites[1].cases()[1].detail.as_deref(),
            Some("requirement disabled")
        );
    }

    #[test]
    fn derived_counts_follow_the_case_list() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), "TEST-direct.xml", TWO_SUITES);

        let suites = parse_report_dir(dir.path());
        assert_eq!(suites[0].passed(), 1);
        assert_eq!(suites[0].failed(), 1);
        assert_eq!(suites[0].skipped(), 0);
        assert_eq!(suites[1].skipped(), 1);
    }

    #[test]
    fn status_attribute_wins_and_unknown_maps_to_undefined() {
        let dir = tempfile::tempdir().unwrap();
        write_report(
            dir.path(),
            "TEST-x.xml",
            r#"<testsuite name="S">
                 <testcase name="a" status="NOT_APPLICABLE"/>
                 <testcase name="b" status="EXPLODED"/>
                 <testcase name="c" status="failed"/>
               </testsuite>"#,
        );

        let suites = parse_report_dir(dir.path());
        let cases = suites[0].cases();
        assert_eq!(cases[0].verdict, Verdict::NotApplicable);
        assert_eq!(cases[1].verdict, Verdict::Undefined);
        assert_eq!(cases[2].verdict, Verdict::Failed);
    }

    #[test]
    fn malformed_case_is_skipped_without_failing_the_document() {
        let dir = tempfile::tempdir().unwrap();
        write_report(
            dir.path(),
            "TEST-x.xml",
            r#"<testsuite name="S">
                 <testcase name="good-1"/>
                 <testcase/>
                 <testcase name="good-2"/>
               </testsuite>"#,
        );

        let suites = parse_report_dir(dir.path());
        assert_eq!(suites.len(), 1);
        let names: Vec<_> = suites[0].cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["good-1", "good-2"]);
    }

    #[test]
    fn corrupt_document_does_not_invalidate_the_others() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), "TEST-a.xml", "<testsuite name=\"A\"><unclosed");
        write_report(
            dir.path(),
            "TEST-b.xml",
            r#"<testsuite name="B"><testcase name="ok"/></testsuite>"#,
        );

        let suites = parse_report_dir(dir.path());
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].name, "B");
    }

    #[test]
    fn missing_report_directory_yields_no_suites() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        assert!(parse_report_dir(&missing).is_empty());
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), "notes.txt", "not a report");
        write_report(
            dir.path(),
            "TEST-b.xml",
            r#"<testsuite name="B"><testcase name="ok"/></testsuite>"#,
        );

        let suites = parse_report_dir(dir.path());
        assert_eq!(suites.len(), 1);
    }

    #[test]
    fn verdict_vocabulary_is_case_insensitive() {
        assert_eq!(Verdict::from_report("passed"), Verdict::Passed);
        assert_eq!(Verdict::from_report("Error"), Verdict::Failed);
        assert_eq!(Verdict::from_report("not_applicable"), Verdict::NotApplicable);
        assert_eq!(Verdict::from_report("???"), Verdict::Undefined);
    }
}
