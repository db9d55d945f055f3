//! Running tests on the iOS Simulator through `iossim`.
//!
//! Every launch starts from a wiped simulator. After the run, the app's
//! `Documents` directory and any crash reports written since set-up are
//! collected, a desktop screenshot is taken, and the simulator is wiped again.
//!
//! # Example
//!
//! ```no_run
//! use simrun_core::config::RunnerConfig;
//! use simrun_core::runner::TestRunner;
//! use simrun_core::session::SessionOptions;
//! use simrun_core::simulator::{SimulatorOptions, SimulatorRunner};
//! use simrun_core::toolchain::Xcode;
//!
//! let mut runner = SimulatorRunner::new(
//!     SessionOptions {
//!         app_path: "out/Debug-iphonesimulator/base_unittests.app".into(),
//!         xcode_version: "8.0".into(),
//!         out_dir: "results".into(),
//!         ..Default::default()
//!     },
//!     SimulatorOptions {
//!         iossim_path: "out/Debug/iossim".into(),
//!         platform: "iPhone 5s".into(),
//!         version: "9.3".into(),
//!     },
//!     Box::new(Xcode::default()),
//!     RunnerConfig::load(),
//! )
//! .unwrap();
//!
//! let passed = runner.launch().unwrap();
//! println!("passed: {}", passed);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::filter::{build_gtest_filter, build_name_filter};
use crate::logs::LogBundle;
use crate::process::{call, check_call, check_output, screenshot_desktop};
use crate::runner::TestRunner;
use crate::session::{Session, SessionOptions};
use crate::toolchain::Toolchain;

/// Process names the simulator has had across Xcode releases.
pub const SIMULATOR_PROCESSES: [&str; 4] = [
    "iPhone Simulator", // Xcode 5
    "iOS Simulator",    // Xcode 6
    "Simulator",        // Xcode 7+
    "simctl",
];

/// Format of the timestamp embedded in crash report file names.
pub const CRASH_REPORT_TIME_FORMAT: &str = "%Y-%m-%d-%H%M%S";

const CONTAINER_METADATA: &str = ".com.apple.mobile_container_manager.metadata.plist";

/// Which simulator to run on.
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    /// Path to the `iossim` binary.
    pub iossim_path: PathBuf,
    /// Device to simulate, e.g. `iPhone 5s`. See `iossim -l`.
    pub platform: String,
    /// iOS version to simulate, e.g. `9.3`.
    pub version: String,
}

/// Runs a test session on the iOS Simulator.
pub struct SimulatorRunner {
    session: Session,
    config: RunnerConfig,
    toolchain: Box<dyn Toolchain>,
    logs: LogBundle,
    iossim_path: PathBuf,
    platform: String,
    version: String,
    homedir: Option<PathBuf>,
    start_time: Option<String>,
}

impl SimulatorRunner {
    /// Creates a runner after checking every precondition.
    ///
    /// # Errors
    ///
    /// - Any error from [`Session::resolve`]
    /// - [`RunnerError::SimulatorNotFound`] if `iossim` does not exist
    pub fn new(
        options: SessionOptions,
        simulator: SimulatorOptions,
        toolchain: Box<dyn Toolchain>,
        config: RunnerConfig,
    ) -> Result<Self, RunnerError> {
        let session = Session::resolve(options, toolchain.as_ref())?;

        let iossim_path = std::path::absolute(&simulator.iossim_path)?;
        if !iossim_path.exists() {
            return Err(RunnerError::SimulatorNotFound(iossim_path));
        }

        Ok(Self {
            session,
            config,
            toolchain,
            logs: LogBundle::new(),
            iossim_path,
            platform: simulator.platform,
            version: simulator.version,
            homedir: None,
            start_time: None,
        })
    }

    /// The simulator's home directory, once set-up has run.
    pub fn homedir(&self) -> Option<&Path> {
        self.homedir.as_deref()
    }

    /// Force-kills every running simulator.
    pub fn kill_simulators(&self) -> Result<(), RunnerError> {
        let mut args = vec!["-9", "-x"];
        args.extend(SIMULATOR_PROCESSES);
        match call("pkill", args)? {
            Some(0) => {
                // A signal was sent; give the simulators time to die.
                std::thread::sleep(Duration::from_secs(self.config.kill_settle_secs));
                Ok(())
            }
            // Nothing matched.
            Some(1) => Ok(()),
            code => Err(RunnerError::CommandFailed {
                command: "pkill".to_string(),
                message: format!("exited with {:?}", code),
            }),
        }
    }

    /// Erases the simulator's content and settings.
    pub fn wipe_simulator(&self) -> Result<(), RunnerError> {
        check_call(
            &self.iossim_path,
            ["-d", self.platform.as_str(), "-s", self.version.as_str(), "-w"],
        )
    }

    fn home_directory(&self) -> Result<PathBuf, RunnerError> {
        check_output(
            &self.iossim_path,
            ["-d", self.platform.as_str(), "-p", "-s", self.version.as_str()],
        )
        .map(PathBuf::from)
    }

    /// Copies the app's `Documents` directory into the output directory.
    fn extract_test_data(&self) -> Result<(), RunnerError> {
        let Some(homedir) = &self.homedir else {
            return Ok(());
        };
        let found = find_app_documents(homedir, self.session.bundle_id(), self.toolchain.as_ref())?;
        if let Some(docs_dir) = found {
            let target = self.session.out_dir().join("Documents");
            info!(from = %docs_dir.display(), to = %target.display(), "copying test data");
            copy_tree(&docs_dir, &target)?;
        }
        Ok(())
    }

    /// Adds every crash report written since set-up to the logs.
    fn retrieve_crash_reports(&mut self) -> Result<(), RunnerError> {
        let Some(start_time) = &self.start_time else {
            return Ok(());
        };
        let reports = crash_reports_since(
            &self.config.crash_reports_dir(),
            self.session.app_name(),
            start_time,
        )?;
        for (report_time, path) in reports {
            info!(path = %path.display(), "collecting crash report");
            let bytes = std::fs::read(&path)?;
            let contents = String::from_utf8_lossy(&bytes);
            self.logs.insert(
                format!("crash report ({})", report_time),
                contents.lines().map(String::from).collect(),
            );
        }
        Ok(())
    }
}

impl TestRunner for SimulatorRunner {
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
        self.kill_simulators()?;
        self.wipe_simulator()?;
        let homedir = self.home_directory()?;
        debug!(homedir = %homedir.display(), "simulator home");
        self.homedir = Some(homedir);
        // Recorded in the same format as crash report names so the two can be
        // compared as strings later on.
        self.start_time = Some(chrono::Local::now().format(CRASH_REPORT_TIME_FORMAT).to_string());
        Ok(())
    }

    fn tear_down(&mut self) -> Result<(), RunnerError> {
        self.extract_test_data()?;
        self.retrieve_crash_reports()?;
        screenshot_desktop(self.session.out_dir())?;
        self.kill_simulators()?;
        self.wipe_simulator()?;
        if let Some(homedir) = self.homedir.take() {
            if let Err(e) = std::fs::remove_dir_all(&homedir) {
                warn!(homedir = %homedir.display(), error = %e, "could not remove simulator home");
            }
        }
        Ok(())
    }

    fn launch_command(&self, test_filter: Option<&[String]>, invert: bool) -> Vec<String> {
        let mut cmd = vec![
            self.iossim_path.to_string_lossy().into_owned(),
            "-d".to_string(),
            self.platform.clone(),
            "-s".to_string(),
            self.version.clone(),
        ];

        if let Some(tests) = test_filter.filter(|tests| !tests.is_empty()) {
            let kif_filter = build_name_filter(tests, invert);
            let gtest_filter = build_gtest_filter(tests, invert);
            cmd.extend(["-e".to_string(), format!("GKIF_SCENARIO_FILTER={}", kif_filter)]);
            cmd.extend(["-c".to_string(), format!("--gtest_filter={}", gtest_filter)]);
        }

        for env_var in self.session.env_vars() {
            cmd.extend(["-e".to_string(), env_var.clone()]);
        }

        for test_arg in self.session.test_args() {
            cmd.extend(["-c".to_string(), test_arg.clone()]);
        }

        cmd.push(self.session.app_path().to_string_lossy().into_owned());
        if let Some(xctest_path) = self.session.xctest_path() {
            cmd.push(xctest_path.to_string_lossy().into_owned());
        }
        cmd
    }

    fn launch_env(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        if self.session.is_xctest() {
            env.insert("NSUnbufferedIO".to_string(), "YES".to_string());
        }
        env
    }
}

/// Finds the `Documents` directory of the app with `bundle_id` under a
/// simulator home directory.
///
/// Data container names are random, so every container's metadata is
/// checked for a matching `MCMMetadataIdentifier`.
pub fn find_app_documents(
    homedir: &Path,
    bundle_id: &str,
    toolchain: &dyn Toolchain,
) -> Result<Option<PathBuf>, RunnerError> {
    let apps_dir = homedir.join("Containers").join("Data").join("Application");
    if !apps_dir.is_dir() {
        return Ok(None);
    }

    let mut containers: Vec<PathBuf> = std::fs::read_dir(&apps_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    containers.sort();

    for container in containers {
        let docs_dir = container.join("Documents");
        let metadata = container.join(CONTAINER_METADATA);
        if !docs_dir.exists() || !metadata.exists() {
            continue;
        }
        if toolchain.plist_value(&metadata, "MCMMetadataIdentifier")? == bundle_id {
            return Ok(Some(docs_dir));
        }
    }
    Ok(None)
}

/// Lists crash reports for `app_name` newer than `start_time`, as
/// (timestamp, path) pairs sorted by timestamp.
///
/// Reports are named `<app>_<timestamp>_<host>.crash`, e.g.
/// `net_unittests_2014-05-13-150900_vm1-a1.crash`. The timestamp is
/// fixed-width and big-endian, so string order is chronological order.
pub fn crash_reports_since(
    reports_dir: &Path,
    app_name: &str,
    start_time: &str,
) -> Result<Vec<(String, PathBuf)>, RunnerError> {
    if !reports_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut reports = Vec::new();
    for entry in std::fs::read_dir(reports_dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "crash") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let Some(rest) = stem.strip_prefix(app_name).and_then(|rest| rest.strip_prefix('_')) else {
            continue;
        };
        let report_time = rest.split('_').next().unwrap_or_default();
        // Reports of another app whose name extends this one have no
        // timestamp in this position.
        if report_time.starts_with(|c: char| c.is_ascii_digit()) && report_time > start_time {
            reports.push((report_time.to_string(), path.clone()));
        }
    }
    reports.sort();
    Ok(reports)
}

/// Recursively copies `src` into `dst`, creating `dst` as needed.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), RunnerError> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
