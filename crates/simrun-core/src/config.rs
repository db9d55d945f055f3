//! Persistent configuration for simrun.
//!
//! Stores settings in `~/.simrun/config.json`. Every field has a default, so a
//! missing or partial file is fine.
//!
//! # Example
//!
//! ```no_run
//! use simrun_core::config::RunnerConfig;
//!
//! let config = RunnerConfig::load();
//! println!("crash reports: {}", config.crash_reports_dir().display());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILENAME: &str = "config.json";

/// Returns the simrun data directory (`~/.simrun/`).
pub fn simrun_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".simrun")
}

/// Settings shared by all runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Largest command (arguments plus environment) that will be spawned when
    /// resuming a crashed run.
    pub max_command_bytes: usize,

    /// Seconds to wait after killing simulator processes.
    pub kill_settle_secs: u64,

    /// Where the host writes crash reports. Defaults to
    /// `~/Library/Logs/DiagnosticReports`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_reports_dir: Option<PathBuf>,

    /// Directory searched for Xcode installations.
    pub applications_dir: PathBuf,

    /// Xcode project used to host XCTest bundles on devices.
    pub xctest_project: PathBuf,

    /// Scheme of [`Self::xctest_project`].
    pub xctest_scheme: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_command_bytes: 256 * 1024,
            kill_settle_secs: 5,
            crash_reports_dir: None,
            applications_dir: PathBuf::from("/Applications"),
            xctest_project: PathBuf::from("TestProject/TestProject.xcodeproj"),
            xctest_scheme: "TestProject".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Load config from `~/.simrun/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&simrun_dir().join(CONFIG_FILENAME))
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to `~/.simrun/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = simrun_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(dir.join(CONFIG_FILENAME), json)
    }

    /// The crash report directory, resolved against the home directory.
    pub fn crash_reports_dir(&self) -> PathBuf {
        self.crash_reports_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join("Library")
                .join("Logs")
                .join("DiagnosticReports")
        })
    }
}
