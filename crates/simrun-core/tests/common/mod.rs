//! Shared test helpers for simrun-core integration tests.
//!
//! [`ScriptedRunner`] replays canned [`ExecutionResult`]s instead of spawning
//! processes, so the launch protocol can be driven through crashes, retries
//! and resumptions deterministically.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use simrun_core::config::RunnerConfig;
use simrun_core::error::RunnerError;
use simrun_core::filter::build_gtest_filter;
use simrun_core::logs::LogBundle;
use simrun_core::result::{ExecutionResult, INCOMPLETE_MARKER};
use simrun_core::runner::TestRunner;
use simrun_core::session::{Session, SessionOptions};
use simrun_core::toolchain::Toolchain;
use tracing_subscriber::fmt::MakeWriter;

pub const FAKE_APP: &str = "fake-app";

// ---------------------------------------------------------------------------
// Toolchain and session fixtures
// ---------------------------------------------------------------------------

/// A toolchain that never touches the host.
pub struct FakeToolchain {
    pub installed: bool,
}

impl Toolchain for FakeToolchain {
    fn select(&self, _version: &str) -> Result<bool, RunnerError> {
        Ok(self.installed)
    }

    fn plist_value(&self, _plist: &Path, _key: &str) -> Result<String, RunnerError> {
        Ok("org.chromium.gtest.fake-unittests".to_string())
    }
}

/// Create a unique scratch directory for one test.
pub fn unique_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "simrun_it_{}",
        uuid::Uuid::new_v4().to_string().replace('-', "")[..8].to_string()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Options for a `fake_unittests.app` created under `root`.
pub fn fake_app(root: &Path, xctest: bool) -> SessionOptions {
    let app = root.join("fake_unittests.app");
    std::fs::create_dir_all(&app).unwrap();
    if xctest {
        std::fs::create_dir_all(app.join("PlugIns").join("fake_module.xctest")).unwrap();
    }
    SessionOptions {
        app_path: app,
        xcode_version: "8.0".to_string(),
        out_dir: root.join("out"),
        xctest,
        ..Default::default()
    }
}

pub fn fake_session(xctest: bool) -> Session {
    let root = unique_dir();
    Session::resolve(fake_app(&root, xctest), &FakeToolchain { installed: true }).unwrap()
}

// ---------------------------------------------------------------------------
// Canned run outcomes
// ---------------------------------------------------------------------------

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The app died before any test started.
pub fn startup_crash() -> ExecutionResult {
    let mut result = ExecutionResult::new(Vec::new());
    result.finalize(Some(134), false);
    result
}

/// `passed` ran, then the process died while `crashed` was running.
pub fn crash_during(passed: &[&str], crashed: &str) -> ExecutionResult {
    let mut result = ExecutionResult::new(Vec::new());
    result.passed_tests = strings(passed);
    result
        .failed_tests
        .insert(crashed, strings(&["Received signal 11", INCOMPLETE_MARKER]));
    result.finalize(None, false);
    result
}

/// Every test finished; `failed` and `flaked` failed with a short message.
pub fn completed(passed: &[&str], failed: &[&str], flaked: &[&str]) -> ExecutionResult {
    let mut result = ExecutionResult::new(Vec::new());
    result.passed_tests = strings(passed);
    for test in failed {
        result.failed_tests.insert(*test, strings(&["Expected: true"]));
    }
    for test in flaked {
        result.flaked_tests.insert(*test, strings(&["timed out"]));
    }
    result.finalize(Some(i32::from(!failed.is_empty())), failed.is_empty());
    result
}

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

/// A runner that hands out pre-built results in order and records every
/// command it was asked to run.
pub struct ScriptedRunner {
    session: Session,
    config: RunnerConfig,
    logs: LogBundle,
    script: VecDeque<ExecutionResult>,
    pub commands: Vec<Vec<String>>,
    pub set_ups: usize,
    pub tear_downs: usize,
    pub fail_set_up: bool,
    pub fail_tear_down: bool,
}

impl ScriptedRunner {
    pub fn new(xctest: bool, script: Vec<ExecutionResult>) -> Self {
        Self::with_config(xctest, script, RunnerConfig::default())
    }

    pub fn with_config(xctest: bool, script: Vec<ExecutionResult>, config: RunnerConfig) -> Self {
        Self {
            session: fake_session(xctest),
            config,
            logs: LogBundle::new(),
            script: script.into(),
            commands: Vec::new(),
            set_ups: 0,
            tear_downs: 0,
            fail_set_up: false,
            fail_tear_down: false,
        }
    }

    /// Runs left unplayed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl TestRunner for ScriptedRunner {
    fn session(&self) -> &Session {
        &self.session
    }

    fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn logs(&self) -> &LogBundle {
        &self.logs
    }

    fn logs_mut(&mut self) -> &mut LogBundle {
        &mut self.logs
    }

    fn set_up(&mut self) -> Result<(), RunnerError> {
        self.set_ups += 1;
        if self.fail_set_up {
            return Err(RunnerError::CommandFailed {
                command: "ideviceinstaller".to_string(),
                message: "Could not connect to lockdownd".to_string(),
            });
        }
        Ok(())
    }

    fn tear_down(&mut self) -> Result<(), RunnerError> {
        self.tear_downs += 1;
        if self.fail_tear_down {
            return Err(RunnerError::CommandFailed {
                command: "screencapture".to_string(),
                message: "could not create image from display".to_string(),
            });
        }
        Ok(())
    }

    fn launch_command(&self, test_filter: Option<&[String]>, invert: bool) -> Vec<String> {
        let mut cmd = vec![FAKE_APP.to_string()];
        if let Some(tests) = test_filter.filter(|tests| !tests.is_empty()) {
            cmd.push(format!("--gtest_filter={}", build_gtest_filter(tests, invert)));
        }
        cmd
    }

    fn run_once(&mut self, command: &[String]) -> Result<ExecutionResult, RunnerError> {
        self.commands.push(command.to_vec());
        let mut result = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected run: {:?}", command));
        result.command = command.to_vec();
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// An in-memory sink for formatted tracing output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with tracing output captured on the current thread.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    use tracing_subscriber::util::SubscriberInitExt;

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let value = {
        let _guard = subscriber.set_default();
        f()
    };
    (value, logs.contents())
}
