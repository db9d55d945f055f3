//! Subprocess helpers.
//!
//! Short-lived helper tools (`pkill`, `iossim -w`, `ideviceinstaller`, ...)
//! are run with [`check_call`] / [`check_output`], which turn an unsuccessful
//! exit into [`RunnerError::CommandFailed`]. The test process itself is run
//! with [`stream_lines`], which merges stderr into stdout and hands every line
//! to a callback as it arrives.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Output};

use tracing::debug;

use crate::error::RunnerError;

fn program_name(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}

fn run<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Output, RunnerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let mut command = Command::new(program);
    command.args(args);
    debug!(command = ?command, "running");
    Ok(command.output()?)
}

fn failure(program: &OsStr, output: &Output) -> RunnerError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    RunnerError::CommandFailed {
        command: program_name(program),
        message: if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        },
    }
}

/// Runs a command and fails if it exits unsuccessfully.
pub fn check_call<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<(), RunnerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program.as_ref(), args)?;
    if !output.status.success() {
        return Err(failure(program.as_ref(), &output));
    }
    Ok(())
}

/// Runs a command and returns its stdout without trailing whitespace.
pub fn check_output<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<String, RunnerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program.as_ref(), args)?;
    if !output.status.success() {
        return Err(failure(program.as_ref(), &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Runs a command and returns its exit code, or `None` if it was killed by a
/// signal. A non-zero exit is not an error.
pub fn call<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Option<i32>, RunnerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Ok(run(program, args)?.status.code())
}

/// Bytes the OS needs to pass `command` and `env` to a new process: every
/// argument and every `KEY=value` pair plus a terminating NUL.
pub fn command_size(command: &[String], env: &HashMap<String, String>) -> usize {
    let args: usize = command.iter().map(|arg| arg.len() + 1).sum();
    let vars: usize = env.iter().map(|(key, value)| key.len() + value.len() + 2).sum();
    args + vars
}

/// Fails with [`RunnerError::ArgumentListTooLong`] if the command would not fit.
pub fn ensure_command_fits(
    command: &[String],
    env: &HashMap<String, String>,
    limit: usize,
) -> Result<(), RunnerError> {
    let size = command_size(command, env);
    if size > limit {
        return Err(RunnerError::ArgumentListTooLong { size, limit });
    }
    Ok(())
}

/// Runs `command` with exactly `env`, passing every line of its combined
/// stdout and stderr to `on_line` (without the line terminator).
///
/// Returns the exit code once the output is exhausted and the process has
/// exited, or `None` if it was killed by a signal.
pub fn stream_lines(
    command: &[String],
    env: &HashMap<String, String>,
    mut on_line: impl FnMut(&str),
) -> Result<Option<i32>, RunnerError> {
    let (program, args) = command.split_first().ok_or_else(|| RunnerError::CommandFailed {
        command: String::new(),
        message: "empty command".to_string(),
    })?;

    let reader = duct::cmd(program.as_str(), args)
        .full_env(env)
        .stderr_to_stdout()
        .unchecked()
        .reader()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::ArgumentListTooLong => RunnerError::ArgumentListTooLong {
                size: 0,
                limit: 0,
            },
            _ => RunnerError::Io(e),
        })?;

    let mut lines = BufReader::new(&reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if lines.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\n', '\r']));
    }

    let code = reader.try_wait()?.and_then(|output| output.status.code());
    Ok(code)
}

/// Saves a screenshot of the host desktop into `out_dir`.
pub fn screenshot_desktop(out_dir: &Path) -> Result<(), RunnerError> {
    let name = format!("desktop_{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S%.3f"));
    check_call("screencapture", [out_dir.join(name)])
}
