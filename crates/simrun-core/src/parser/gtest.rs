//! Parser for GTest console output.

use super::{OutputParser, Status, TestLedger};

const RUN: &str = "[ RUN      ] ";
const OK: &str = "[       OK ] ";
const FAILED: &str = "[  FAILED  ] ";
const SUMMARY: &str = "[==========] ";

/// Classifies the output of a GTest binary.
///
/// ```
/// use simrun_core::parser::{GTestParser, OutputParser};
///
/// let mut parser = GTestParser::new();
/// for line in [
///     "[ RUN      ] Math.Adds",
///     "[       OK ] Math.Adds (0 ms)",
///     "[==========] 1 test from 1 test suite ran. (0 ms total)",
/// ] {
///     parser.process_line(line);
/// }
/// assert_eq!(parser.passed_tests(false), vec!["Math.Adds"]);
/// assert!(parser.completed_without_failure());
/// ```
#[derive(Debug, Default)]
pub struct GTestParser {
    ledger: TestLedger,
    completed: bool,
}

impl GTestParser {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Extracts the test name from the remainder of a status line,
/// e.g. `Suite.Case (12 ms)` → `Suite.Case`.
///
/// Parameterized tests are followed by a comma and their parameter, as in
/// `Inst/Codec.Decodes/0, where GetParam() = 4 (1 ms)`.
fn test_name(rest: &str) -> Option<&str> {
    let name = rest
        .split(|c: char| c.is_whitespace() || c == ',')
        .next()
        .filter(|name| !name.is_empty())?;
    name.contains('.').then_some(name)
}

impl OutputParser for GTestParser {
    fn process_line(&mut self, line: &str) {
        if let Some(name) = line.strip_prefix(RUN).and_then(test_name) {
            self.ledger.start(name);
        } else if let Some(name) = line.strip_prefix(OK).and_then(test_name) {
            self.ledger.finish(name, Status::Passed);
        } else if let Some(name) = line.strip_prefix(FAILED).and_then(test_name) {
            // The summary at the end lists every failed test a second time.
            let is_listing = self.ledger.current.as_deref() != Some(name)
                && self.ledger.contains(name);
            if !is_listing {
                self.ledger.finish(name, Status::Failed);
            }
        } else if line.starts_with(SUMMARY) && line.contains(" ran.") {
            self.completed = true;
        } else {
            self.ledger.note(line);
        }
    }

    fn passed_tests(&self, include_flaky: bool) -> Vec<String> {
        self.ledger.passed(include_flaky)
    }

    fn failed_tests(&self, include_flaky: bool) -> Vec<String> {
        self.ledger.failed(include_flaky)
    }

    fn failure_description(&self, test: &str) -> Vec<String> {
        self.ledger.description(test)
    }

    fn completed_without_failure(&self) -> bool {
        self.completed && self.failed_tests(false).is_empty()
    }
}
