//! Line-oriented classifiers for test process output.
//!
//! A parser is fed the process output one line at a time and is queried once
//! the process has exited. Two flavours exist:
//!
//! - [`GTestParser`] for standalone GTest binaries;
//! - [`XCTestParser`] for XCTest bundles run through the UI test host.
//!
//! Both report tests by `<group>.<case>` name and represent a test that was
//! still running when the output stopped as a failure whose description ends
//! in [`INCOMPLETE_MARKER`](crate::result::INCOMPLETE_MARKER).

mod gtest;
mod xctest;

use std::collections::HashMap;

pub use gtest::GTestParser;
pub use xctest::XCTestParser;

use crate::filter::is_flaky;
use crate::result::INCOMPLETE_MARKER;

/// A push-based classifier for test output.
pub trait OutputParser {
    /// Consumes one line of output, without its trailing newline.
    fn process_line(&mut self, line: &str);

    /// Tests that passed. FLAKY_ tests are omitted unless `include_flaky`.
    fn passed_tests(&self, include_flaky: bool) -> Vec<String>;

    /// Tests that failed or never finished. FLAKY_ tests are omitted unless
    /// `include_flaky`.
    fn failed_tests(&self, include_flaky: bool) -> Vec<String>;

    /// Captured output of a failed test.
    fn failure_description(&self, test: &str) -> Vec<String>;

    /// True if the run reached its end and no non-flaky test failed.
    fn completed_without_failure(&self) -> bool;
}

/// Returns the parser matching the kind of test being run.
pub fn parser_for(xctest: bool) -> Box<dyn OutputParser> {
    if xctest {
        Box::new(XCTestParser::new())
    } else {
        Box::new(GTestParser::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Passed,
    Failed,
}

/// Per-test bookkeeping shared by both parsers.
#[derive(Debug, Default)]
struct TestLedger {
    order: Vec<String>,
    results: HashMap<String, (Status, Vec<String>)>,
    current: Option<String>,
    current_lines: Vec<String>,
}

impl TestLedger {
    /// Marks `test` as running. A test that was already running never
    /// finished and is recorded as incomplete.
    fn start(&mut self, test: &str) {
        if let Some(previous) = self.current.take() {
            let mut lines = std::mem::take(&mut self.current_lines);
            lines.push(INCOMPLETE_MARKER.to_string());
            self.record(previous, Status::Failed, lines);
        }
        self.current = Some(test.to_string());
        self.current_lines.clear();
    }

    fn finish(&mut self, test: &str, status: Status) {
        let lines = if self.current.as_deref() == Some(test) {
            self.current = None;
            std::mem::take(&mut self.current_lines)
        } else {
            Vec::new()
        };
        self.record(test.to_string(), status, lines);
    }

    /// Attaches an output line to the running test, if any.
    fn note(&mut self, line: &str) {
        if self.current.is_some() {
            self.current_lines.push(line.to_string());
        }
    }

    fn record(&mut self, test: String, status: Status, lines: Vec<String>) {
        if !self.results.contains_key(&test) {
            self.order.push(test.clone());
        }
        self.results.insert(test, (status, lines));
    }

    fn contains(&self, test: &str) -> bool {
        self.results.contains_key(test)
    }

    fn with_status(&self, status: Status, include_flaky: bool) -> Vec<String> {
        self.order
            .iter()
            .filter(|test| self.results.get(*test).is_some_and(|(s, _)| *s == status))
            .filter(|test| include_flaky || !is_flaky(test))
            .cloned()
            .collect()
    }

    fn passed(&self, include_flaky: bool) -> Vec<String> {
        self.with_status(Status::Passed, include_flaky)
    }

    fn failed(&self, include_flaky: bool) -> Vec<String> {
        let mut failed = self.with_status(Status::Failed, include_flaky);
        if let Some(running) = &self.current {
            if include_flaky || !is_flaky(running) {
                failed.push(running.clone());
            }
        }
        failed
    }

    fn description(&self, test: &str) -> Vec<String> {
        if self.current.as_deref() == Some(test) {
            let mut lines = self.current_lines.clone();
            lines.push(INCOMPLETE_MARKER.to_string());
            return lines;
        }
        self.results
            .get(test)
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default()
    }
}
