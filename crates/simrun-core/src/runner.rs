//! The launch protocol shared by every runner.
//!
//! A runner is anything implementing [`TestRunner`]: it supplies the
//! platform-specific pieces (set-up, tear-down, how to build the launch
//! command) and inherits [`TestRunner::launch`], which implements crash
//! handling once for all platforms:
//!
//! 1. The test binary is run unfiltered.
//! 2. If it crashed before any test started, it is run once more. A second
//!    startup crash is fatal ([`RunnerError::LaunchFailed`]).
//! 3. If it crashed during a test, it is re-run with an inverted filter that
//!    skips every test seen so far, until a run finishes without a
//!    mid-test crash. XCTest sessions are never resumed.
//! 4. Results of all runs are merged into the runner's [`LogBundle`].
//!
//! Tear-down runs exactly once per launch, whatever happens.

use std::collections::HashMap;
use std::io::Write;

use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::filter::is_flaky;
use crate::logs::{LogBundle, PASSED_TESTS};
use crate::parser::parser_for;
use crate::process::{ensure_command_fits, stream_lines};
use crate::result::ExecutionResult;
use crate::session::Session;

/// A platform that can run a test session.
pub trait TestRunner {
    /// The validated session this runner was built for.
    fn session(&self) -> &Session;

    /// Settings the runner was built with.
    fn config(&self) -> &RunnerConfig;

    /// Logs accumulated so far.
    fn logs(&self) -> &LogBundle;

    /// Mutable access to the logs, used by the launch protocol and by
    /// tear-down to record results and artifacts.
    fn logs_mut(&mut self) -> &mut LogBundle;

    /// Prepares the platform before the first run.
    fn set_up(&mut self) -> Result<(), RunnerError>;

    /// Collects artifacts and resets the platform. Must be safe to call more
    /// than once.
    fn tear_down(&mut self) -> Result<(), RunnerError>;

    /// Builds the command that runs the tests.
    ///
    /// `test_filter` restricts the run to the given tests, or with `invert`
    /// to every test except them. `None` runs everything.
    fn launch_command(&self, test_filter: Option<&[String]>, invert: bool) -> Vec<String>;

    /// The environment the test command runs with.
    fn launch_env(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }

    /// Runs `command` once and classifies its output.
    fn run_once(&mut self, command: &[String]) -> Result<ExecutionResult, RunnerError> {
        run_test_command(command, &self.launch_env(), self.session().is_xctest())
    }

    /// Builds the command that resumes a crashed run, skipping `completed`.
    ///
    /// # Errors
    ///
    /// [`RunnerError::ArgumentListTooLong`] if the command plus its
    /// environment exceed [`RunnerConfig::max_command_bytes`].
    fn resume_command(&self, completed: &[String]) -> Result<Vec<String>, RunnerError> {
        let command = self.launch_command(Some(completed), true);
        ensure_command_fits(&command, &self.launch_env(), self.config().max_command_bytes)?;
        Ok(command)
    }

    /// Runs the session and returns whether every test passed.
    ///
    /// Tear-down runs exactly once, including when set-up or a run fails.
    /// If both the run and tear-down fail, the run's error is returned.
    fn launch(&mut self) -> Result<bool, RunnerError> {
        let outcome = match self.set_up() {
            Ok(()) => run_with_recovery(self),
            Err(e) => Err(e),
        };

        let torn_down = self.tear_down();
        match (outcome, torn_down) {
            (Ok(success), Ok(())) => Ok(success),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_error)) => {
                warn!(error = %teardown_error, "tear-down failed after an earlier error");
                Err(e)
            }
        }
    }
}

fn run_with_recovery<R: TestRunner + ?Sized>(runner: &mut R) -> Result<bool, RunnerError> {
    let command = runner.launch_command(None, false);
    let mut result = runner.run_once(&command)?;

    if result.crashed_on_startup() {
        // Assume the app crashed before the first test case. Try once more.
        warn!("Crashed on startup, retrying...");
        result = runner.run_once(&command)?;
    }

    if result.crashed_on_startup() {
        return Err(RunnerError::LaunchFailed);
    }

    let mut passed = std::mem::take(&mut result.passed_tests);
    let mut failed = std::mem::take(&mut result.failed_tests);
    let mut flaked = std::mem::take(&mut result.flaked_tests);

    while !runner.session().is_xctest() && result.crashed_during_test() {
        info!(
            test = result.crashed_test.as_deref().unwrap_or_default(),
            "Crashed during test, resuming..."
        );

        let completed: Vec<String> = passed
            .iter()
            .cloned()
            .chain(failed.labels().map(String::from))
            .chain(flaked.labels().map(String::from))
            .collect();

        let resumed = match runner.resume_command(&completed) {
            Ok(command) => runner.run_once(&command),
            Err(e) => Err(e),
        };
        result = match resumed {
            Ok(result) => result,
            Err(RunnerError::ArgumentListTooLong { .. }) => {
                warn!(completed = completed.len(), "Too many test cases to resume.");
                break;
            }
            Err(e) => return Err(e),
        };

        passed.append(&mut result.passed_tests);
        failed.merge(&result.failed_tests);
        flaked.merge(&result.flaked_tests);
    }

    let logs = runner.logs_mut();
    logs.insert(PASSED_TESTS, passed);
    logs.merge(&failed);
    logs.merge(&flaked);

    Ok(failed.is_empty())
}

/// Runs a test command, echoing its output to stdout while parsing it.
///
/// The XCTest parser is used when `xctest` is set, the GTest parser
/// otherwise. Failed tests carrying the flaky marker are reported as flaked.
pub fn run_test_command(
    command: &[String],
    env: &HashMap<String, String>,
    xctest: bool,
) -> Result<ExecutionResult, RunnerError> {
    info!(command = %command.join(" "), "launching tests");

    let mut parser = parser_for(xctest);
    let stdout = std::io::stdout();
    let return_code = stream_lines(command, env, |line| {
        parser.process_line(line);
        let mut out = stdout.lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    })?;

    let mut result = ExecutionResult::new(command.to_vec());
    for test in parser.failed_tests(true) {
        let description = parser.failure_description(&test);
        if is_flaky(&test) {
            result.flaked_tests.insert(test, description);
        } else {
            result.failed_tests.insert(test, description);
        }
    }
    result.passed_tests = parser.passed_tests(true);

    // The exit code is logged but not trusted: iossim can exit non-zero after
    // a clean run.
    info!(
        program = command.first().map(String::as_str).unwrap_or_default(),
        return_code = ?return_code,
        "test process exited"
    );
    result.finalize(return_code, parser.completed_without_failure());
    Ok(result)
}
