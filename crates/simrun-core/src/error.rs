//! Error type shared by every runner.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while constructing or launching a test runner.
///
/// Precondition variants are only ever raised during construction. Of the
/// remaining variants, [`RunnerError::ArgumentListTooLong`] is the one the
/// launch protocol recovers from on its own.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The app bundle does not exist.
    #[error("App does not exist: {0}")]
    AppNotFound(PathBuf),

    /// The requested Xcode version is not installed or could not be activated.
    #[error("Xcode version not found: {0}")]
    ToolchainVersionNotFound(String),

    /// The app has no `PlugIns` directory although an XCTest run was requested.
    #[error("PlugIns directory does not exist: {0}")]
    PlugInsDirectoryNotFound(PathBuf),

    /// No `.xctest` bundle was found inside the `PlugIns` directory.
    #[error("XCTest not found in: {0}")]
    PlugInNotFound(PathBuf),

    /// The simulator binary does not exist.
    #[error("Simulator does not exist: {0}")]
    SimulatorNotFound(PathBuf),

    /// Zero or several physical devices are attached.
    #[error("Expected one device, found {}:\n{}", .0.len(), .0.join("\n"))]
    DeviceDetection(Vec<String>),

    /// The app crashed on startup twice in a row.
    #[error("The app failed to launch")]
    LaunchFailed,

    /// The command and its environment exceed what the platform accepts.
    #[error("Argument list too long ({size} bytes, limit {limit})")]
    ArgumentListTooLong {
        /// Size of the rejected command in bytes, or 0 when the OS rejected it.
        size: usize,
        /// The configured limit.
        limit: usize,
    },

    /// A helper command exited unsuccessfully.
    #[error("Command `{command}` failed: {message}")]
    CommandFailed {
        /// The program that was run.
        command: String,
        /// Its stderr, or a description of the exit status.
        message: String,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Whether this error was raised by a failed precondition at construction.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RunnerError::AppNotFound(_)
                | RunnerError::ToolchainVersionNotFound(_)
                | RunnerError::PlugInsDirectoryNotFound(_)
                | RunnerError::PlugInNotFound(_)
                | RunnerError::SimulatorNotFound(_)
                | RunnerError::DeviceDetection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_detection_lists_udids() {
        let err = RunnerError::DeviceDetection(vec!["aaa".into(), "bbb".into()]);
        assert_eq!(err.to_string(), "Expected one device, found 2:\naaa\nbbb");
    }

    #[test]
    fn device_detection_with_no_devices() {
        let err = RunnerError::DeviceDetection(Vec::new());
        assert_eq!(err.to_string(), "Expected one device, found 0:\n");
    }

    #[test]
    fn app_not_found_display() {
        let err = RunnerError::AppNotFound(PathBuf::from("/missing/Foo.app"));
        assert_eq!(err.to_string(), "App does not exist: /missing/Foo.app");
    }

    #[test]
    fn precondition_classification() {
        assert!(RunnerError::AppNotFound(PathBuf::new()).is_precondition());
        assert!(RunnerError::ToolchainVersionNotFound("8.0".into()).is_precondition());
        assert!(!RunnerError::LaunchFailed.is_precondition());
        assert!(!RunnerError::ArgumentListTooLong { size: 1, limit: 0 }.is_precondition());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RunnerError = io_err.into();
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("gone"));
    }
}
