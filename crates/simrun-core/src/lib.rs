//! # simrun-core
//!
//! Crash-resilient driver for iOS test binaries on macOS.
//!
//! A test app is launched on the iOS Simulator or on a physical device, its
//! output is parsed as it streams, and crashes are recovered from: a crash
//! before the first test is retried once, and a crash in the middle of a test
//! resumes the run with every test seen so far filtered out. The results of
//! all runs are merged into one ordered [`logs::LogBundle`].
//!
//! ## Modules
//!
//! - [`session`] - Validated test session inputs
//! - [`runner`] - The shared launch protocol ([`runner::TestRunner`])
//! - [`simulator`] - Runner for the iOS Simulator (`iossim`)
//! - [`device`] - Runner for an attached device (libimobiledevice tools)
//! - [`parser`] - GTest and XCTest output parsers
//! - [`filter`] - Test filter construction
//! - [`result`] - Outcome of a single run
//! - [`logs`] - Ordered log bundle
//! - [`toolchain`] - Xcode selection and plist lookups
//! - [`process`] - Helper command execution
//! - [`config`] - Persistent settings
//! - [`error`] - Error types
//!
//! ## External Dependencies
//!
//! - **Xcode** - `xcode-select`, `xcodebuild` and `PlistBuddy`
//! - **iossim** - for simulator runs
//! - **libimobiledevice** - `idevice_id`, `idevicefs`, `ideviceinstaller`,
//!   `idevicecrashreport` and `idevice-app-runner` for device runs
//!
//! ## Example
//!
//! ```no_run
//! use simrun_core::config::RunnerConfig;
//! use simrun_core::device::DeviceRunner;
//! use simrun_core::runner::TestRunner;
//! use simrun_core::session::SessionOptions;
//! use simrun_core::toolchain::Xcode;
//!
//! let config = RunnerConfig::load();
//! let xcode = Xcode::new(&config.applications_dir);
//! let options = SessionOptions {
//!     app_path: "out/Release-iphoneos/net_unittests.app".into(),
//!     xcode_version: "8.0".into(),
//!     out_dir: "results".into(),
//!     ..Default::default()
//! };
//!
//! let mut runner = DeviceRunner::new(options, &xcode, config).expect("No device");
//! let passed = runner.launch().expect("Launch failed");
//! for (label, lines) in runner.logs().iter() {
//!     println!("{}: {} lines", label, lines.len());
//! }
//! println!("passed: {}", passed);
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod filter;
pub mod logs;
pub mod parser;
pub mod process;
pub mod result;
pub mod runner;
pub mod session;
pub mod simulator;
pub mod toolchain;

#[cfg(test)]
mod test_support;
