//! Test session inputs and their validation.
//!
//! [`SessionOptions`] carries what the caller asked for. [`Session::resolve`]
//! checks every precondition once and produces an immutable [`Session`]
//! that the runners use for the rest of their life.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::RunnerError;
use crate::toolchain::Toolchain;

const PLUGINS_DIR: &str = "PlugIns";
const XCTEST_EXTENSION: &str = "xctest";

/// Inputs describing one test invocation.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Path to the compiled `.app` to run.
    pub app_path: PathBuf,
    /// Xcode version to run the test with.
    pub xcode_version: String,
    /// Directory that receives test data, crash logs and screenshots.
    pub out_dir: PathBuf,
    /// `NAME=value` assignments passed to the test's environment.
    pub env_vars: Vec<String>,
    /// Extra arguments passed to the test when launching.
    pub test_args: Vec<String>,
    /// Whether the app hosts an XCTest bundle.
    pub xctest: bool,
}

/// A validated test invocation.
#[derive(Debug, Clone)]
pub struct Session {
    app_path: PathBuf,
    app_name: String,
    bundle_id: String,
    xcode_version: String,
    out_dir: PathBuf,
    env_vars: Vec<String>,
    test_args: Vec<String>,
    xctest_path: Option<PathBuf>,
}

impl Session {
    /// Validates `options` and resolves the app's bundle identifier.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// - [`RunnerError::AppNotFound`] if the app does not exist
    /// - [`RunnerError::ToolchainVersionNotFound`] if the Xcode version cannot be activated
    /// - [`RunnerError::PlugInsDirectoryNotFound`] if an XCTest app has no `PlugIns` directory
    /// - [`RunnerError::PlugInNotFound`] if that directory holds no `.xctest` bundle
    ///
    /// Failures creating the output directory or reading `Info.plist` are
    /// propagated as they occur.
    pub fn resolve(options: SessionOptions, toolchain: &dyn Toolchain) -> Result<Self, RunnerError> {
        let app_path = std::path::absolute(&options.app_path)?;
        if !app_path.exists() {
            return Err(RunnerError::AppNotFound(app_path));
        }

        if !toolchain.select(&options.xcode_version)? {
            return Err(RunnerError::ToolchainVersionNotFound(options.xcode_version));
        }

        std::fs::create_dir_all(&options.out_dir)?;

        let xctest_path = if options.xctest {
            Some(find_xctest(&app_path)?)
        } else {
            None
        };

        let bundle_id = toolchain.plist_value(&app_path.join("Info.plist"), "CFBundleIdentifier")?;
        let app_name = app_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(app = %app_path.display(), bundle_id, "resolved session");

        Ok(Self {
            app_path,
            app_name,
            bundle_id,
            xcode_version: options.xcode_version,
            out_dir: options.out_dir,
            env_vars: options.env_vars,
            test_args: options.test_args,
            xctest_path,
        })
    }

    /// Absolute path to the `.app`.
    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    /// The app's file name without extension, e.g. `net_unittests`.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// `CFBundleIdentifier` read from the app's `Info.plist`.
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn xcode_version(&self) -> &str {
        &self.xcode_version
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn env_vars(&self) -> &[String] {
        &self.env_vars
    }

    pub fn test_args(&self) -> &[String] {
        &self.test_args
    }

    /// The `.xctest` bundle, present only for XCTest sessions.
    pub fn xctest_path(&self) -> Option<&Path> {
        self.xctest_path.as_deref()
    }

    /// XCTest sessions run inside a UI test host and cannot be resumed
    /// part-way through.
    pub fn is_xctest(&self) -> bool {
        self.xctest_path.is_some()
    }
}

fn find_xctest(app_path: &Path) -> Result<PathBuf, RunnerError> {
    let plugins_dir = app_path.join(PLUGINS_DIR);
    if !plugins_dir.is_dir() {
        return Err(RunnerError::PlugInsDirectoryNotFound(plugins_dir));
    }

    let mut bundles: Vec<PathBuf> = std::fs::read_dir(&plugins_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == XCTEST_EXTENSION))
        .collect();
    bundles.sort();

    bundles
        .into_iter()
        .next()
        .ok_or(RunnerError::PlugInNotFound(plugins_dir))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct StubToolchain {
        installed: bool,
        selects: Cell<usize>,
    }

    impl StubToolchain {
        fn new(installed: bool) -> Self {
            Self {
                installed,
                selects: Cell::new(0),
            }
        }
    }

    impl Toolchain for StubToolchain {
        fn select(&self, _version: &str) -> Result<bool, RunnerError> {
            self.selects.set(self.selects.get() + 1);
            Ok(self.installed)
        }

        fn plist_value(&self, _plist: &Path, key: &str) -> Result<String, RunnerError> {
            assert_eq!(key, "CFBundleIdentifier");
            Ok("org.chromium.gtest.net-unittests".to_string())
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "simrun_session_{}_{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn options(root: &Path, xctest: bool) -> SessionOptions {
        SessionOptions {
            app_path: root.join("net_unittests.app"),
            xcode_version: "8.0".to_string(),
            out_dir: root.join("out"),
            env_vars: vec!["A=1".to_string()],
            test_args: vec!["--verbose".to_string()],
            xctest,
        }
    }

    #[test]
    fn missing_app_fails_before_anything_else() {
        let root = scratch_dir("missing_app");
        let toolchain = StubToolchain::new(false);

        let err = Session::resolve(options(&root, true), &toolchain).unwrap_err();
        assert!(matches!(err, RunnerError::AppNotFound(_)));
        assert_eq!(toolchain.selects.get(), 0);
        assert!(!root.join("out").exists());
    }

    #[test]
    fn unavailable_xcode_version() {
        let root = scratch_dir("no_xcode");
        std::fs::create_dir_all(root.join("net_unittests.app")).unwrap();

        let err = Session::resolve(options(&root, false), &StubToolchain::new(false)).unwrap_err();
        match err {
            RunnerError::ToolchainVersionNotFound(version) => assert_eq!(version, "8.0"),
            other => panic!("Expected ToolchainVersionNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn xctest_requires_plugins_dir() {
        let root = scratch_dir("no_plugins");
        std::fs::create_dir_all(root.join("net_unittests.app")).unwrap();

        let err = Session::resolve(options(&root, true), &StubToolchain::new(true)).unwrap_err();
        match err {
            RunnerError::PlugInsDirectoryNotFound(path) => assert!(path.ends_with("PlugIns")),
            other => panic!("Expected PlugInsDirectoryNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn xctest_requires_xctest_bundle() {
        let root = scratch_dir("no_xctest");
        std::fs::create_dir_all(root.join("net_unittests.app/PlugIns/Other.appex")).unwrap();

        let err = Session::resolve(options(&root, true), &StubToolchain::new(true)).unwrap_err();
        assert!(matches!(err, RunnerError::PlugInNotFound(_)));
    }

    #[test]
    fn resolves_xctest_session() {
        let root = scratch_dir("xctest");
        std::fs::create_dir_all(root.join("net_unittests.app/PlugIns/net_module.xctest")).unwrap();

        let session = Session::resolve(options(&root, true), &StubToolchain::new(true)).unwrap();
        assert!(session.is_xctest());
        assert!(session
            .xctest_path()
            .unwrap()
            .ends_with("PlugIns/net_module.xctest"));
        assert_eq!(session.app_name(), "net_unittests");
        assert_eq!(session.bundle_id(), "org.chromium.gtest.net-unittests");
        assert!(root.join("out").is_dir());
    }

    #[test]
    fn resolves_gtest_session() {
        let root = scratch_dir("gtest");
        std::fs::create_dir_all(root.join("net_unittests.app")).unwrap();

        let session = Session::resolve(options(&root, false), &StubToolchain::new(true)).unwrap();
        assert!(!session.is_xctest());
        assert!(session.xctest_path().is_none());
        assert!(session.app_path().is_absolute());
        assert_eq!(session.env_vars().to_vec(), vec!["A=1"]);
        assert_eq!(session.test_args().to_vec(), vec!["--verbose"]);
        assert_eq!(session.xcode_version(), "8.0");
    }
}
