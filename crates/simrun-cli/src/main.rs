//! Command-line front end for simrun.
//!
//! Runs an iOS test app on the simulator (when `--iossim`, `--platform` and
//! `--version` are all given) or on the attached device, echoes the test
//! output to stdout, and writes `<out_dir>/summary.json`.
//!
//! # Usage
//!
//! ```bash
//! # Simulator
//! simrun -a out/Debug-iphonesimulator/base_unittests.app -o results -x 8.0 \
//!     -i out/Debug/iossim -p "iPhone 5s" -v 9.3
//!
//! # Device, with an env var and extra test arguments
//! simrun -a out/Release-iphoneos/net_unittests.app -o results -x 8.0 \
//!     -e NET_LOG=1 -- --gtest_repeat=2
//! ```
//!
//! Exit codes: 0 when every test passed, 1 when tests failed, 2 when the run
//! could not be carried out.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use simrun_core::config::RunnerConfig;
use simrun_core::device::DeviceRunner;
use simrun_core::error::RunnerError;
use simrun_core::logs::LogBundle;
use simrun_core::runner::TestRunner;
use simrun_core::session::SessionOptions;
use simrun_core::simulator::{SimulatorOptions, SimulatorRunner};
use simrun_core::toolchain::Xcode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const SUMMARY_FILENAME: &str = "summary.json";
const LOG_FILENAME: &str = "simrun.log";

/// Run iOS test apps on a simulator or device.
#[derive(Parser, Debug)]
#[command(name = "simrun")]
#[command(about = "Run an iOS test app on a simulator or device and summarize the results")]
struct Cli {
    /// Compiled .app to run
    #[arg(short, long = "app", value_name = "APP")]
    app: PathBuf,

    /// Directory to store test data, crash reports and the summary in
    #[arg(short, long, value_name = "DIR", env = "SIMRUN_OUT_DIR")]
    out_dir: PathBuf,

    /// Xcode version to run the tests with
    #[arg(short = 'x', long, value_name = "VERSION", env = "SIMRUN_XCODE_VERSION")]
    xcode_version: String,

    /// Path to the iossim binary (simulator runs only)
    #[arg(short, long, value_name = "PATH")]
    iossim: Option<PathBuf>,

    /// Simulated device, e.g. "iPhone 5s" (simulator runs only)
    #[arg(short, long)]
    platform: Option<String>,

    /// Simulated iOS version, e.g. 9.3 (simulator runs only)
    #[arg(short, long)]
    version: Option<String>,

    /// Environment variable to pass to the test, as NAME=value. Repeatable.
    #[arg(short, long = "env-var", value_name = "NAME=VALUE")]
    env_vars: Vec<String>,

    /// The app hosts an XCTest bundle
    #[arg(long)]
    xctest: bool,

    /// Config file to use instead of ~/.simrun/config.json
    #[arg(long, value_name = "FILE", env = "SIMRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Arguments passed to the test app
    #[arg(last = true, value_name = "TEST_ARGS")]
    test_args: Vec<String>,
}

impl Cli {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            app_path: self.app.clone(),
            xcode_version: self.xcode_version.clone(),
            out_dir: self.out_dir.clone(),
            env_vars: self.env_vars.clone(),
            test_args: self.test_args.clone(),
            xctest: self.xctest,
        }
    }

    fn simulator_options(&self) -> Option<SimulatorOptions> {
        match (&self.iossim, &self.platform, &self.version) {
            (Some(iossim), Some(platform), Some(version)) => Some(SimulatorOptions {
                iossim_path: iossim.clone(),
                platform: platform.clone(),
                version: version.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    logs: &'a LogBundle,
    step_text: String,
    success: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(&cli.out_dir);

    let config = match &cli.config {
        Some(path) => RunnerConfig::load_from(path),
        None => RunnerConfig::load(),
    };

    let (outcome, logs) = run(&cli, config);

    let (step_text, code) = match &outcome {
        Ok(true) => (String::new(), ExitCode::SUCCESS),
        Ok(false) => (String::new(), ExitCode::from(1)),
        Err(e) => {
            error!(error = %e, "test run failed");
            eprintln!("Error: {}", e);
            (e.to_string(), ExitCode::from(2))
        }
    };

    let summary = Summary {
        logs: &logs,
        step_text,
        success: matches!(outcome, Ok(true)),
    };
    if let Err(e) = write_summary(&cli.out_dir, &summary) {
        eprintln!("Error: failed to write summary: {}", e);
        return ExitCode::from(2);
    }
    code
}

/// Builds the runner and launches it. The logs gathered so far are returned
/// even when the launch fails.
fn run(cli: &Cli, config: RunnerConfig) -> (Result<bool, RunnerError>, LogBundle) {
    let mut runner = match build_runner(cli, config) {
        Ok(runner) => runner,
        Err(e) => return (Err(e), LogBundle::new()),
    };
    let outcome = runner.launch();
    (outcome, runner.logs().clone())
}

fn build_runner(cli: &Cli, config: RunnerConfig) -> Result<Box<dyn TestRunner>, RunnerError> {
    let xcode = Xcode::new(&config.applications_dir);
    match cli.simulator_options() {
        Some(simulator) => {
            info!(platform = %simulator.platform, version = %simulator.version, "running on simulator");
            let runner =
                SimulatorRunner::new(cli.session_options(), simulator, Box::new(xcode), config)?;
            Ok(Box::new(runner))
        }
        None => {
            if cli.iossim.is_some() || cli.platform.is_some() || cli.version.is_some() {
                warn!("--iossim, --platform and --version must all be given for a simulator run");
            }
            info!("running on device");
            let runner = DeviceRunner::new(cli.session_options(), &xcode, config)?;
            Ok(Box::new(runner))
        }
    }
}

fn write_summary(out_dir: &Path, summary: &Summary<'_>) -> std::io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(out_dir.join(SUMMARY_FILENAME), json)
}

/// Logs to stderr and, when the output directory is writable, to
/// `<out_dir>/simrun.log`. The returned guard flushes the file on drop.
fn init_logging(out_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let appender = std::fs::create_dir_all(out_dir).ok().and_then(|()| {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILENAME)
            .build(out_dir)
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}
