//! Running tests on a physical iOS device through libimobiledevice.
//!
//! Exactly one device must be attached. Every launch starts by uninstalling
//! all apps from it and installing the app under test.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::filter::{build_gtest_filter, build_name_filter};
use crate::logs::LogBundle;
use crate::process::{check_call, check_output, screenshot_desktop};
use crate::runner::TestRunner;
use crate::session::{Session, SessionOptions};
use crate::toolchain::Toolchain;

/// Runs a test session on the single attached iOS device.
pub struct DeviceRunner {
    session: Session,
    config: RunnerConfig,
    logs: LogBundle,
    udid: String,
}

impl DeviceRunner {
    /// Creates a runner for the only device `idevice_id` reports.
    ///
    /// # Errors
    ///
    /// - Any error from [`Session::resolve`]
    /// - [`RunnerError::DeviceDetection`] if zero or several devices are attached
    pub fn new(
        options: SessionOptions,
        toolchain: &dyn Toolchain,
        config: RunnerConfig,
    ) -> Result<Self, RunnerError> {
        let session = Session::resolve(options, toolchain)?;
        let udid = parse_device_ids(&check_output("idevice_id", ["--list"])?)?;
        info!(udid, "using device");
        Ok(Self::with_udid(session, udid, config))
    }

    /// Creates a runner for a known device.
    pub fn with_udid(session: Session, udid: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            session,
            config,
            logs: LogBundle::new(),
            udid: udid.into(),
        }
    }

    pub fn udid(&self) -> &str {
        &self.udid
    }

    /// Uninstalls every app found on the device.
    pub fn uninstall_apps(&self) -> Result<(), RunnerError> {
        let listing = check_output("idevicefs", ["--udid", self.udid.as_str(), "ls", "@"])?;
        for app in listing.lines().filter(|line| !line.is_empty()) {
            debug!(app, "uninstalling");
            check_call(
                "ideviceinstaller",
                ["--udid", self.udid.as_str(), "--uninstall", app],
            )?;
        }
        Ok(())
    }

    pub fn install_app(&self) -> Result<(), RunnerError> {
        check_call(
            "ideviceinstaller",
            [
                OsStr::new("--udid"),
                OsStr::new(&self.udid),
                OsStr::new("--install"),
                self.session.app_path().as_os_str(),
            ],
        )
    }

    fn extract_test_data(&self) -> Result<(), RunnerError> {
        let source = format!("@{}/Documents", self.session.bundle_id());
        let target = self.session.out_dir().join("Documents");
        check_call(
            "idevicefs",
            [
                OsStr::new("--udid"),
                OsStr::new(&self.udid),
                OsStr::new("pull"),
                OsStr::new(&source),
                target.as_os_str(),
            ],
        )
    }

    fn retrieve_crash_reports(&self) -> Result<(), RunnerError> {
        let logs_dir = self.session.out_dir().join("Logs");
        std::fs::create_dir_all(&logs_dir)?;
        check_call(
            "idevicecrashreport",
            [
                OsStr::new("--extract"),
                OsStr::new("--udid"),
                OsStr::new(&self.udid),
                logs_dir.as_os_str(),
            ],
        )
    }

    fn xcodebuild_command(&self) -> Vec<String> {
        let built_products = self
            .session
            .app_path()
            .parent()
            .unwrap_or(Path::new("/"))
            .to_string_lossy()
            .into_owned();
        vec![
            "xcodebuild".to_string(),
            "test-without-building".to_string(),
            format!("BUILT_PRODUCTS_DIR={}", built_products),
            "-destination".to_string(),
            format!("id={}", self.udid),
            "-project".to_string(),
            self.config.xctest_project.to_string_lossy().into_owned(),
            "-scheme".to_string(),
            self.config.xctest_scheme.clone(),
        ]
    }
}

impl TestRunner for DeviceRunner {
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
        self.uninstall_apps()?;
        self.install_app()
    }

    fn tear_down(&mut self) -> Result<(), RunnerError> {
        self.extract_test_data()?;
        self.retrieve_crash_reports()?;
        screenshot_desktop(self.session.out_dir())?;
        self.uninstall_apps()
    }

    fn launch_command(&self, test_filter: Option<&[String]>, invert: bool) -> Vec<String> {
        if self.session.is_xctest() {
            return self.xcodebuild_command();
        }

        let mut cmd = vec![
            "idevice-app-runner".to_string(),
            "--udid".to_string(),
            self.udid.clone(),
            "--start".to_string(),
            self.session.bundle_id().to_string(),
        ];
        let mut args = Vec::new();

        if let Some(tests) = test_filter.filter(|tests| !tests.is_empty()) {
            let kif_filter = build_name_filter(tests, invert);
            let gtest_filter = build_gtest_filter(tests, invert);
            cmd.extend(["-D".to_string(), format!("GKIF_SCENARIO_FILTER={}", kif_filter)]);
            args.push(format!("--gtest-filter={}", gtest_filter));
        }

        for env_var in self.session.env_vars() {
            cmd.extend(["-D".to_string(), env_var.clone()]);
        }

        if !args.is_empty() || !self.session.test_args().is_empty() {
            cmd.push("--args".to_string());
            cmd.extend(self.session.test_args().iter().cloned());
            cmd.extend(args);
        }
        cmd
    }

    fn launch_env(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        if self.session.is_xctest() {
            let app_name = self.session.app_name();
            env.insert("NSUnbufferedIO".to_string(), "YES".to_string());
            // e.g. ios_web_shell_egtests and ios_web_shell_egtests_module
            env.insert("APP_TARGET_NAME".to_string(), app_name.to_string());
            env.insert("TEST_TARGET_NAME".to_string(), format!("{}_module", app_name));
        }
        env
    }
}

/// Extracts the single device id from `idevice_id --list` output.
///
/// # Errors
///
/// [`RunnerError::DeviceDetection`] unless exactly one id is listed.
pub fn parse_device_ids(listing: &str) -> Result<String, RunnerError> {
    let ids: Vec<String> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    match ids.as_slice() {
        [udid] => Ok(udid.clone()),
        _ => Err(RunnerError::DeviceDetection(ids)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scratch_dir, session};

    const UDID: &str = "0123456789abcdef0123456789abcdef01234567";

    fn runner(name: &str, xctest: bool) -> DeviceRunner {
        let root = scratch_dir(name);
        DeviceRunner::with_udid(session(&root, xctest), UDID, RunnerConfig::default())
    }

    #[test]
    fn single_device() {
        assert_eq!(parse_device_ids(&format!("{}\n", UDID)).unwrap(), UDID);
    }

    #[test]
    fn no_device() {
        match parse_device_ids("") {
            Err(RunnerError::DeviceDetection(ids)) => assert!(ids.is_empty()),
            other => panic!("Expected DeviceDetection, got: {:?}", other),
        }
    }

    #[test]
    fn several_devices() {
        let err = parse_device_ids("aaaa\nbbbb\n").unwrap_err();
        assert_eq!(err.to_string(), "Expected one device, found 2:\naaaa\nbbbb");
    }

    #[test]
    fn unfiltered_launch_command() {
        let runner = runner("device_cmd", false);
        assert_eq!(
            runner.launch_command(None, false),
            vec![
                "idevice-app-runner",
                "--udid",
                UDID,
                "--start",
                "org.chromium.gtest.base-unittests",
                "-D",
                "KEY=value",
                "--args",
                "--enable-pixel-output",
            ]
        );
    }

    #[test]
    fn filtered_launch_command() {
        let runner = runner("device_cmd_filter", false);
        let tests = vec!["Net.a".to_string(), "Net.b".to_string()];
        let cmd = runner.launch_command(Some(&tests), true);
        assert_eq!(
            &cmd[5..],
            [
                "-D",
                "GKIF_SCENARIO_FILTER=-NAME:a|b",
                "-D",
                "KEY=value",
                "--args",
                "--enable-pixel-output",
                "--gtest-filter=-Net.a:Net.b",
            ]
        );
    }

    #[test]
    fn no_args_without_filter_or_test_args() {
        let root = scratch_dir("device_cmd_bare");
        let mut options = crate::test_support::app_options(&root, false);
        options.test_args.clear();
        let session =
            Session::resolve(options, &crate::test_support::StubToolchain::default()).unwrap();
        let runner = DeviceRunner::with_udid(session, UDID, RunnerConfig::default());

        let cmd = runner.launch_command(None, false);
        assert!(!cmd.contains(&"--args".to_string()));
        assert_eq!(cmd.last().map(String::as_str), Some("KEY=value"));
    }

    #[test]
    fn xctest_runs_through_xcodebuild() {
        let runner = runner("device_cmd_xctest", true);
        let tests = vec!["Login.testSignIn".to_string()];
        let cmd = runner.launch_command(Some(&tests), true);

        assert_eq!(cmd[0], "xcodebuild");
        assert_eq!(cmd[1], "test-without-building");
        assert!(cmd[2].starts_with("BUILT_PRODUCTS_DIR="));
        assert!(!cmd[2].ends_with(".app"));
        assert_eq!(
            &cmd[3..],
            [
                "-destination".to_string(),
                format!("id={}", UDID),
                "-project".to_string(),
                "TestProject/TestProject.xcodeproj".to_string(),
                "-scheme".to_string(),
                "TestProject".to_string(),
            ]
        );
    }

    #[test]
    fn xctest_env_names_targets() {
        let env = runner("device_env_xctest", true).launch_env();
        assert_eq!(env.get("NSUnbufferedIO").map(String::as_str), Some("YES"));
        assert_eq!(env.get("APP_TARGET_NAME").map(String::as_str), Some("base_unittests"));
        assert_eq!(
            env.get("TEST_TARGET_NAME").map(String::as_str),
            Some("base_unittests_module")
        );
    }

    #[test]
    fn gtest_env_has_no_target_names() {
        let env = runner("device_env_gtest", false).launch_env();
        assert!(!env.contains_key("APP_TARGET_NAME"));
        assert!(!env.contains_key("NSUnbufferedIO"));
    }
}
