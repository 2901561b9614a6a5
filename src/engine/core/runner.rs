//! Process plumbing for the external engine.
//!
//! Everything that touches ffmpeg goes through the [`Engine`] trait so the
//! scheduler and the tools can be exercised against a fake in tests.

use super::error::EngineError;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a deadline-bound wait checks on the child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on `ffmpeg -encoders`, which should answer almost instantly.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(15);

/// Captured outcome of one engine process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Exit code; `None` when the process was terminated by a signal
    /// (including our own kill on deadline expiry).
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }

    /// Last `lines` lines of stderr, which is where ffmpeg puts the reason.
    pub fn stderr_tail(&self, lines: usize) -> String {
        tail_lines(&self.stderr, lines)
    }

    pub fn status_label(&self) -> String {
        match (self.timed_out, self.code) {
            (true, _) => "timed out".to_string(),
            (false, Some(code)) => format!("exit code {}", code),
            (false, None) => "terminated by signal".to_string(),
        }
    }
}

/// Capability interface over the external encode/decode engine.
pub trait Engine: Send + Sync {
    /// Run the encoder capability listing (`ffmpeg -encoders`), killed like
    /// [`Engine::run`] once `deadline` passes.
    fn list_encoders(&self, deadline: Option<Instant>) -> Result<EngineOutput, EngineError>;

    /// Run one invocation with the given arguments. When `deadline` passes
    /// before the process exits it is killed and `timed_out` is set.
    fn run(&self, args: &[OsString], deadline: Option<Instant>)
    -> Result<EngineOutput, EngineError>;

    /// Program name used in log lines and dry-run output.
    fn program(&self) -> &Path;
}

/// The real engine: an ffmpeg binary on disk or in PATH.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Engine for FfmpegEngine {
    fn list_encoders(&self, deadline: Option<Instant>) -> Result<EngineOutput, EngineError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-encoders"]);
        run_command(cmd, Some(listing_deadline(deadline)))
    }

    fn run(
        &self,
        args: &[OsString],
        deadline: Option<Instant>,
    ) -> Result<EngineOutput, EngineError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(args);
        run_command(cmd, deadline)
    }

    fn program(&self) -> &Path {
        &self.ffmpeg
    }
}

/// The caller's deadline, capped at [`LISTING_TIMEOUT`] from now.
pub fn listing_deadline(deadline: Option<Instant>) -> Instant {
    let bound = Instant::now() + LISTING_TIMEOUT;
    deadline.map_or(bound, |d| d.min(bound))
}

/// Spawn `cmd` with piped output, wait for it (optionally bounded by a
/// deadline) and collect stdout/stderr.
pub fn run_command(mut cmd: Command, deadline: Option<Instant>) -> Result<EngineOutput, EngineError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Both pipes are drained on their own threads so a chatty child can't
    // block on a full pipe while we wait on it.
    let stdout_reader = child.stdout.take().map(|out| thread::spawn(move || read_all(out)));
    let stderr_reader = child.stderr.take().map(|err| thread::spawn(move || read_all(err)));

    let waited = match deadline {
        Some(deadline) => wait_until(&mut child, deadline),
        None => child.wait().map(|status| (status, false)),
    };
    let (status, timed_out) = waited.map_err(|source| EngineError::Wait { program, source })?;

    Ok(EngineOutput {
        code: status.code(),
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
        timed_out,
    })
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<(ExitStatus, bool)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            // The child may exit between try_wait and kill; wait() reaps it either way.
            let _ = child.kill();
            return Ok((child.wait()?, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn read_all<R: Read>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_else(|_| "Failed to capture output".to_string()))
        .unwrap_or_default()
}

pub(crate) fn tail_lines(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Render a program and its arguments as a shell-pasteable line.
pub fn format_command(program: &Path, args: &[OsString]) -> String {
    let words: Vec<String> = std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|w| w.to_string_lossy().into_owned())
        .collect();

    shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
}
