//! External command execution utilities.
//!
//! Provides macros and functions for running commands (`git`, `python3`)
//! with output handling and error reporting.

use crate::log;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    ffi::OsString,
    path::Path,
    process::{Child, ChildStdin, ChildStdout, Command, Output, Stdio},
    sync::OnceLock,
};

// ============================================================================
// Macros
// ============================================================================

/// Run an external command with arguments.
///
/// Supports optional `ok` (accepted exit codes, default `[0]`) and `filter`
/// arguments.
///
/// # Examples
/// ```ignore
/// exec!(root; ["git"]; "rev-parse", "HEAD")?;
///
/// // `git diff --no-index` exits 1 when files differ
/// exec!(ok=&[0, 1]; filter=&GIT_FILTER; dir; ["git"]; "diff", "--no-index", a, b)?;
/// ```
#[macro_export]
macro_rules! exec {
    ($($tt:tt)*) => {
        $crate::exec_internal!(@parse_ok $($tt)*)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! exec_internal {
    // Parse accepted exit codes
    (@parse_ok ok=$ok:expr; $($rest:tt)*) => {
        $crate::exec_internal!(@parse_filter $ok; $($rest)*)
    };
    (@parse_ok $($rest:tt)*) => {
        $crate::exec_internal!(@parse_filter &[0]; $($rest)*)
    };

    // Parse filter argument
    (@parse_filter $ok:expr; filter=$filter:expr; $($rest:tt)*) => {
        $crate::exec_internal!(@parse_root $ok; $filter; $($rest)*)
    };
    (@parse_filter $ok:expr; $($rest:tt)*) => {
        $crate::exec_internal!(@parse_root $ok; &$crate::utils::exec::EMPTY_FILTER; $($rest)*)
    };

    // Parse root and command (with root)
    (@parse_root $ok:expr; $filter:expr; $root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            Some($root),
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $filter,
            $ok,
        )
    };
    // Parse command (without root)
    (@parse_root $ok:expr; $filter:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            None,
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $filter,
            $ok,
        )
    };
}

/// Spawn a long-running command with piped stdin/stdout.
///
/// # Examples
/// ```ignore
/// let mut proc = exec_piped!(dir; &command; "-u", "-c", DRIVER)?;
/// let stdout = proc.take_stdout();
/// ```
#[macro_export]
macro_rules! exec_piped {
    ($root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::spawn_piped(
            Some($root),
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
        )
    };
}

// ============================================================================
// Argument Conversion
// ============================================================================

#[doc(hidden)]
#[allow(clippy::wildcard_imports)] // Needed for macro internal module
pub mod internal {
    use super::*;

    #[inline]
    pub fn to_os<S: Into<OsString>>(s: S) -> OsString {
        s.into()
    }

    /// Trait for converting to command vector.
    pub trait ToCmd {
        fn to_cmd(self) -> Vec<OsString>;
    }

    impl<const N: usize> ToCmd for [&str; N] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.into_iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &[String] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &Vec<String> {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    #[inline]
    pub fn to_cmd_vec<C: ToCmd>(cmd: C) -> Vec<OsString> {
        cmd.to_cmd()
    }

    /// Filter out empty args.
    #[inline]
    pub fn filter_args(args: &[OsString]) -> Vec<OsString> {
        args.iter().filter(|a| !a.is_empty()).cloned().collect()
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command and capture its output.
///
/// # Errors
/// Returns error if the command fails to start or exits with a code not in `ok`.
pub fn exec(
    root: Option<&Path>,
    cmd: &[OsString],
    args: &[OsString],
    filter: &'static FilterRule,
    ok: &[i32],
) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    log_output(&name, &output, filter, ok)?;
    Ok(output)
}

/// Spawn a command with stdin and stdout piped, stderr discarded.
///
/// # Errors
/// Returns error if the command fails to spawn.
pub fn spawn_piped(
    root: Option<&Path>,
    cmd: &[OsString],
    args: &[OsString],
) -> Result<RunningProcess> {
    let (name, mut command) = prepare(root, cmd, args)?;

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child: Child = command
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    let stdin = child.stdin.take().context("Failed to acquire stdin")?;
    let stdout = child.stdout.take().context("Failed to acquire stdout")?;
    Ok(RunningProcess {
        child,
        stdin: Some(stdin),
        stdout: Some(stdout),
        name,
    })
}

/// A running child process with piped stdin and stdout.
///
/// The process is killed when the handle is dropped.
pub struct RunningProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    name: String,
}

impl RunningProcess {
    pub const fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Take the stdout pipe, typically to hand it to a reader thread.
    pub const fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close stdin and kill the process.
    pub fn kill(&mut self) {
        drop(self.stdin.take());
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<(String, Command)> {
    let name = cmd
        .first()
        .and_then(|s| s.to_str())
        .context("Empty command")?
        .to_owned();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).args(args);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Filter rule for skipping known noise in command output.
pub struct FilterRule {
    /// Prefixes to match at the start of output lines.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    /// Empty output, or output starting with a skip prefix.
    fn should_skip(&self, output: &str) -> bool {
        output.is_empty() || self.skip_prefixes.iter().any(|p| output.starts_with(p))
    }

    /// Log lines that survive the filter.
    fn log(&self, name: &str, output: &str) {
        let valid_lines: Vec<_> = output
            .lines()
            .filter(|line| {
                let plain = strip_ansi(line);
                let trimmed = plain.trim();
                !trimmed.is_empty() && !self.should_skip(trimmed)
            })
            .collect();

        if !valid_lines.is_empty() {
            log!(name; "{}", valid_lines.join("\n"));
        }
    }
}

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

/// Git chatter that is not worth showing (line ending notices, hints).
pub const GIT_FILTER: FilterRule = FilterRule::new(&["warning:", "hint:"]);

/// Log command output, filtering known noise.
fn log_output(name: &str, output: &Output, filter: &'static FilterRule, ok: &[i32]) -> Result<()> {
    let accepted = output.status.code().is_some_and(|code| ok.contains(&code));
    if !accepted {
        anyhow::bail!(format_error(name, output, filter));
    }

    // On success, only log stderr (warnings) to reduce noise
    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());

    Ok(())
}

/// Format command error message with filtering.
fn format_error(name: &str, output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let error_msg = filter
        .skip_prefixes
        .iter()
        .fold(stderr.trim(), |s, p| s.trim_start_matches(p).trim_start());

    let mut msg = format!("Command `{name}` failed with {}\n", output.status);
    if !error_msg.is_empty() {
        msg.push_str(error_msg);
    }

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::internal::*;
    use std::io::{BufRead, BufReader, Write};

    #[test]
    fn test_to_cmd_vec() {
        let cmd = to_cmd_vec(["git", "status"]);
        assert_eq!(cmd, vec![OsString::from("git"), OsString::from("status")]);

        let v = vec!["python3".to_string(), "-u".to_string()];
        assert_eq!(to_cmd_vec(&v).len(), 2);
    }

    #[test]
    fn test_filter_args() {
        let args = [OsString::from("a"), OsString::from(""), OsString::from("b")];
        assert_eq!(filter_args(&args), vec![OsString::from("a"), OsString::from("b")]);
    }

    #[test]
    fn test_prepare_empty() {
        assert!(prepare(None, &[], &[]).is_err());
    }

    #[test]
    fn test_filter_rule() {
        assert!(GIT_FILTER.should_skip("warning: LF will be replaced"));
        assert!(GIT_FILTER.should_skip(""));
        assert!(!GIT_FILTER.should_skip("fatal: bad revision"));
    }

    #[test]
    fn test_accepted_exit_codes() {
        if which::which("false").is_err() {
            return;
        }
        let dir = std::env::temp_dir();
        assert!(exec!(dir.as_path(); ["false"];).is_err());
        assert!(exec!(ok=&[0, 1]; dir.as_path(); ["false"];).is_ok());
    }

    #[test]
    fn test_format_error() {
        let Ok(status) = Command::new("false").status() else {
            return;
        };
        static TEST_FILTER: FilterRule = FilterRule::new(&["Ignored:"]);
        let output = Output {
            status,
            stdout: b"partial".to_vec(),
            stderr: b"Ignored: warning\nFatal error".to_vec(),
        };
        let msg = format_error("test", &output, &TEST_FILTER);
        assert!(msg.contains("Command `test` failed"));
        assert!(msg.contains("Fatal error"));
        assert!(msg.contains("Stdout:\npartial"));
    }

    #[test]
    fn test_spawn_piped_echo() {
        if which::which("cat").is_err() {
            return;
        }
        let dir = std::env::temp_dir();
        let mut proc = exec_piped!(dir.as_path(); ["cat"];).unwrap();
        assert_eq!(proc.name(), "cat");

        let stdout = proc.take_stdout().unwrap();
        proc.stdin().unwrap().write_all(b"hello\n").unwrap();
        proc.stdin().unwrap().flush().unwrap();

        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).unwrap();
        assert_eq!(line, "hello\n");
        proc.kill();
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_ansi("Plain text"), "Plain text");
    }
}
