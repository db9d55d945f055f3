//! The outcome of a single test process run.

use crate::logs::LogBundle;

/// Line a parser appends to the output of a test that never finished.
pub const INCOMPLETE_MARKER: &str = "Did not complete.";

/// Result of running the test binary once.
///
/// Produced by [`TestRunner::run_once`](crate::runner::TestRunner::run_once)
/// and merged across sub-runs by the launch protocol.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// The exact command that was run.
    pub command: Vec<String>,
    /// Tests that passed, in the order they were reported.
    pub passed_tests: Vec<String>,
    /// Failed tests mapped to their captured output.
    pub failed_tests: LogBundle,
    /// Failed tests carrying the flaky marker, mapped to their captured output.
    pub flaked_tests: LogBundle,
    /// Whether the process crashed.
    pub crashed: bool,
    /// The test that was running when the process crashed, if known.
    pub crashed_test: Option<String>,
    /// The parser's verdict, independent of the exit code.
    ///
    /// The simulator wrapper can exit non-zero even when every test passed,
    /// so the exit code is recorded but never trusted.
    pub completed_without_failure: bool,
    /// Exit code of the process, if it exited normally.
    pub return_code: Option<i32>,
}

impl ExecutionResult {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    /// Fills in crash information once all tests have been collected.
    ///
    /// A run that did not complete cleanly but has no failed tests crashed
    /// before any test began. A test whose output ends in
    /// [`INCOMPLETE_MARKER`] crashed the process; at most one test is blamed.
    pub fn finalize(&mut self, return_code: Option<i32>, completed_without_failure: bool) {
        self.return_code = return_code;
        self.completed_without_failure = completed_without_failure;

        if !completed_without_failure && self.failed_tests.is_empty() {
            self.crashed = true;
        }

        for (test, lines) in self.failed_tests.iter().chain(self.flaked_tests.iter()) {
            if lines.iter().any(|line| line == INCOMPLETE_MARKER) {
                self.crashed = true;
                self.crashed_test = Some(test.to_string());
            }
        }
    }

    /// True if the process crashed before any identifiable test.
    pub fn crashed_on_startup(&self) -> bool {
        self.crashed && self.crashed_test.is_none()
    }

    /// True if the process crashed while a specific test was running.
    pub fn crashed_during_test(&self) -> bool {
        self.crashed && self.crashed_test.is_some()
    }
}
