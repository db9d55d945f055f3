//! Parser for XCTest console output.
//!
//! XCTest reports test cases as `-[Class method]`; they are normalised to
//! `Class.method` so the rest of the driver can treat both flavours alike.

use super::{OutputParser, Status, TestLedger};

const TEST_CASE: &str = "Test Case '-[";
const TOP_LEVEL_SUITES: [&str; 2] = ["Test Suite 'All tests'", "Test Suite 'Selected tests'"];

/// Classifies the output of an XCTest bundle.
#[derive(Debug, Default)]
pub struct XCTestParser {
    ledger: TestLedger,
    completed: bool,
}

impl XCTestParser {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Splits `Test Case '-[Class method]' <verb> ...` into (`Class.method`, verb).
fn test_case(line: &str) -> Option<(String, &str)> {
    let rest = line.strip_prefix(TEST_CASE)?;
    let (selector, verb) = rest.split_once("]' ")?;
    let (class, method) = selector.split_once(' ')?;
    let verb = verb.split_whitespace().next()?.trim_end_matches('.');
    Some((format!("{}.{}", class, method), verb))
}

impl OutputParser for XCTestParser {
    fn process_line(&mut self, line: &str) {
        if let Some((name, verb)) = test_case(line) {
            match verb {
                "started" => self.ledger.start(&name),
                "passed" => self.ledger.finish(&name, Status::Passed),
                "failed" => self.ledger.finish(&name, Status::Failed),
                _ => self.ledger.note(line),
            }
            return;
        }

        let top_level = TOP_LEVEL_SUITES.iter().any(|suite| line.starts_with(suite));
        if top_level && (line.contains("' passed at") || line.contains("' failed at")) {
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
