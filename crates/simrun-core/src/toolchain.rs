//! Xcode discovery and plist lookups.
//!
//! The driver needs two things from the host's Apple tooling: a way to make a
//! given Xcode version the active one, and a way to read values out of
//! property lists (bundle identifiers, container metadata). Both are behind
//! the [`Toolchain`] trait so runners can be exercised without Xcode.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::RunnerError;
use crate::process::{check_call, check_output};

const PLIST_BUDDY: &str = "/usr/libexec/PlistBuddy";

/// Host tooling used by the runners.
pub trait Toolchain {
    /// Makes `version` the active toolchain.
    ///
    /// Returns `Ok(true)` if it is installed and active once this returns.
    fn select(&self, version: &str) -> Result<bool, RunnerError>;

    /// Reads the top-level string `key` from the property list at `plist`.
    fn plist_value(&self, plist: &Path, key: &str) -> Result<String, RunnerError>;
}

/// An Xcode installation found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcodeInstall {
    /// Path to the `Xcode*.app` bundle.
    pub path: PathBuf,
    /// Its `CFBundleShortVersionString`, e.g. `8.0`.
    pub version: String,
}

/// The Xcode toolchain installed on this Mac.
#[derive(Debug, Clone)]
pub struct Xcode {
    applications_dir: PathBuf,
}

impl Xcode {
    pub fn new(applications_dir: impl Into<PathBuf>) -> Self {
        Self {
            applications_dir: applications_dir.into(),
        }
    }

    /// Lists every `Xcode*.app` in the applications directory whose version
    /// can be read.
    pub fn installations(&self) -> Result<Vec<XcodeInstall>, RunnerError> {
        let mut installs = Vec::new();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.applications_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_xcode_bundle(path))
            .collect();
        entries.sort();

        for path in entries {
            let version_plist = path.join("Contents").join("version.plist");
            match self.plist_value(&version_plist, "CFBundleShortVersionString") {
                Ok(version) => installs.push(XcodeInstall { path, version }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable Xcode"),
            }
        }
        Ok(installs)
    }

    /// Path of the developer directory `xcode-select` currently points at.
    pub fn active_developer_dir() -> Result<PathBuf, RunnerError> {
        check_output("xcode-select", ["-p"]).map(PathBuf::from)
    }
}

impl Default for Xcode {
    fn default() -> Self {
        Self::new("/Applications")
    }
}

fn is_xcode_bundle(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("Xcode") && name.ends_with(".app"))
}

/// Picks the installation matching `version` exactly.
pub fn find_installation<'a>(installs: &'a [XcodeInstall], version: &str) -> Option<&'a XcodeInstall> {
    installs.iter().find(|install| install.version == version)
}

impl Toolchain for Xcode {
    fn select(&self, version: &str) -> Result<bool, RunnerError> {
        let installs = match self.installations() {
            Ok(installs) => installs,
            Err(e) => {
                warn!(dir = %self.applications_dir.display(), error = %e, "cannot list Xcode installations");
                return Ok(false);
            }
        };
        let Some(install) = find_installation(&installs, version) else {
            warn!(version, "Xcode version is not installed");
            return Ok(false);
        };

        let active = match Self::active_developer_dir() {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "cannot read the active developer directory");
                return Ok(false);
            }
        };
        if active.starts_with(&install.path) {
            return Ok(true);
        }

        info!(path = %install.path.display(), "switching active Xcode");
        match check_call(
            "sudo",
            [
                OsStr::new("-n"),
                OsStr::new("xcode-select"),
                OsStr::new("-switch"),
                install.path.as_os_str(),
            ],
        ) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "could not activate Xcode");
                Ok(false)
            }
        }
    }

    fn plist_value(&self, plist: &Path, key: &str) -> Result<String, RunnerError> {
        let print = format!("Print:{}", key);
        check_output(
            PLIST_BUDDY,
            [OsStr::new("-c"), OsStr::new(&print), plist.as_os_str()],
        )
    }
}
