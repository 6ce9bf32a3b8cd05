//! External command execution utilities.
//!
//! Runs the page loader and the formatter as child processes, optionally
//! feeding stdin and enforcing a deadline, with stderr noise filtering.

use crate::log;
use regex::Regex;
use std::{
    ffi::OsString,
    io::{self, Read, Write},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    sync::OnceLock,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;

/// How often a command with a deadline is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to execute `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while talking to `{name}`")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{message}")]
    Failed { name: String, message: String },

    #[error("`{name}` did not finish within {}s", timeout.as_secs_f32())]
    TimedOut { name: String, timeout: Duration },
}

/// A command line ready to run: program + fixed arguments.
#[derive(Debug, Clone)]
pub struct CommandLine {
    cmd: Vec<OsString>,
    filter: &'static FilterRule,
}

impl CommandLine {
    pub fn new<S: AsRef<str>>(cmd: &[S]) -> Self {
        Self {
            cmd: cmd.iter().map(|s| OsString::from(s.as_ref())).collect(),
            filter: &EMPTY_FILTER,
        }
    }

    pub const fn with_filter(mut self, filter: &'static FilterRule) -> Self {
        self.filter = filter;
        self
    }

    /// Program name used in logs and error messages.
    pub fn name(&self) -> String {
        self.cmd
            .first()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Run with extra `args` in `root`, returning stdout.
    ///
    /// `input` is written to stdin when given; otherwise stdin is null.
    /// With a `timeout` the child leads its own process group, and the whole
    /// group is killed once the deadline passes, so wrappers like `npx`
    /// cannot leave a grandchild holding the output pipes.
    ///
    /// # Errors
    /// Returns error if the command cannot be spawned, exits non-zero, or
    /// outlives its deadline.
    pub fn run(
        &self,
        root: &Path,
        args: &[OsString],
        input: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<String, ExecError> {
        let name = self.name();
        let mut command = prepare(Some(root), &self.cmd, args)?;
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if timeout.is_some() {
                command.process_group(0);
            }
        }

        command
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            name: name.clone(),
            source,
        })?;

        // stdin/stdout/stderr are pumped on their own threads so a child that
        // writes a lot before reading all input cannot deadlock us
        let writer = input.map(|bytes| {
            let bytes = bytes.to_vec();
            let stdin = child.stdin.take();
            thread::spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&bytes),
                None => Ok(()),
            })
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait(&mut child, timeout).map_err(|source| ExecError::Io {
            name: name.clone(),
            source,
        })?;

        let Some(status) = status else {
            kill_tree(&mut child);
            return Err(ExecError::TimedOut {
                name,
                timeout: timeout.unwrap_or_default(),
            });
        };

        if let Some(writer) = writer {
            // A child that exits without reading stdin closes the pipe; only
            // its exit status matters then.
            let _ = writer.join();
        }
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            return Err(ExecError::Failed {
                message: format_error(&name, status, &stdout, &stderr, self.filter),
                name,
            });
        }

        self.filter.log(&name, stderr.trim());
        Ok(stdout)
    }
}

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<Command, ExecError> {
    let (program, fixed) = cmd.split_first().ok_or(ExecError::EmptyCommand)?;

    let mut command = Command::new(program);
    command.args(fixed).args(args);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok(command)
}

/// Kill `child` along with its process group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    child.kill().ok();
    child.wait().ok();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Wait for the child, giving up at the deadline. `Ok(None)` means timed out.
fn wait(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ansi regex"));
    re.replace_all(s, "")
}

/// Filter rule for skipping known noise in command stderr.
#[derive(Debug)]
pub struct FilterRule {
    /// Prefixes to match at the start of output lines.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    /// Returns true if output is empty or starts with any of the skip prefixes.
    fn should_skip(&self, output: &str) -> bool {
        output.is_empty() || self.skip_prefixes.iter().any(|p| output.starts_with(p))
    }

    /// Log the lines that survive filtering under the command's name.
    fn log(&self, name: &str, output: &str) {
        let lines: Vec<_> = output
            .lines()
            .filter(|line| !self.should_skip(strip_ansi(line).trim()))
            .collect();

        if !lines.is_empty() {
            log!(name; "{}", lines.join("\n"));
        }
    }
}

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

/// Format command error message with filtering.
fn format_error(
    name: &str,
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
    filter: &FilterRule,
) -> String {
    let error_msg = stderr
        .lines()
        .filter(|line| !filter.should_skip(strip_ansi(line).trim()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut msg = format!("Command `{name}` failed with {status}");
    if !error_msg.trim().is_empty() {
        msg.push('\n');
        msg.push_str(error_msg.trim());
    }

    let stdout = stdout.trim();
    if !stdout.is_empty() && error_msg.trim().is_empty() {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
