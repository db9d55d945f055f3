//! Helpers shared by unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::RunnerError;
use crate::session::{Session, SessionOptions};
use crate::toolchain::Toolchain;

/// A toolchain that is always installed and answers plist lookups from a map.
#[derive(Default)]
pub struct StubToolchain {
    pub values: HashMap<(PathBuf, String), String>,
}

impl StubToolchain {
    pub fn with_value(mut self, plist: impl Into<PathBuf>, key: &str, value: &str) -> Self {
        self.values
            .insert((plist.into(), key.to_string()), value.to_string());
        self
    }
}

impl Toolchain for StubToolchain {
    fn select(&self, _version: &str) -> Result<bool, RunnerError> {
        Ok(true)
    }

    fn plist_value(&self, plist: &Path, key: &str) -> Result<String, RunnerError> {
        if key == "CFBundleIdentifier" {
            return Ok("org.chromium.gtest.base-unittests".to_string());
        }
        self.values
            .get(&(plist.to_path_buf(), key.to_string()))
            .cloned()
            .ok_or_else(|| RunnerError::CommandFailed {
                command: "PlistBuddy".to_string(),
                message: format!("Print: Entry, \":{}\", Does Not Exist", key),
            })
    }
}

/// Creates an empty scratch directory unique to this test process.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("simrun_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Creates `<root>/base_unittests.app` (with an `.xctest` plug-in when
/// `xctest` is set) and returns options pointing at it.
pub fn app_options(root: &Path, xctest: bool) -> SessionOptions {
    let app = root.join("base_unittests.app");
    std::fs::create_dir_all(&app).expect("create app");
    if xctest {
        std::fs::create_dir_all(app.join("PlugIns").join("base_module.xctest"))
            .expect("create xctest");
    }
    SessionOptions {
        app_path: app,
        xcode_version: "8.0".to_string(),
        out_dir: root.join("out"),
        env_vars: vec!["KEY=value".to_string()],
        test_args: vec!["--enable-pixel-output".to_string()],
        xctest,
    }
}

pub fn session(root: &Path, xctest: bool) -> Session {
    Session::resolve(app_options(root, xctest), &StubToolchain::default()).expect("resolve session")
}
