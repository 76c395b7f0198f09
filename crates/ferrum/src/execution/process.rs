//! Running processes: capture, wait, and exit-code validation

use std::fs::File;
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ferrum_core::{FerrumError, Result};

use crate::execution::watchdog::Watchdog;

/// How captured output bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    /// UTF-8, replacing invalid sequences.
    #[default]
    Utf8Lossy,
    /// UTF-8, failing on invalid sequences.
    Utf8Strict,
}

impl OutputEncoding {
    pub(crate) fn decode(self, bytes: Vec<u8>) -> Result<String> {
        match self {
            OutputEncoding::Utf8Lossy => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            OutputEncoding::Utf8Strict => String::from_utf8(bytes).map_err(|e| {
                FerrumError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("output is not valid UTF-8: {}", e),
                ))
            }),
        }
    }
}

/// Exit codes accepted by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitExpectation {
    /// Exactly this code.
    Code(i32),
    /// Any of these codes.
    OneOf(Vec<i32>),
    /// Skip the check entirely.
    Any,
}

impl ExitExpectation {
    pub fn accepts(&self, code: i32) -> bool {
        match self {
            ExitExpectation::Code(expected) => code == *expected,
            ExitExpectation::OneOf(set) => set.contains(&code),
            ExitExpectation::Any => true,
        }
    }
}

impl Default for ExitExpectation {
    fn default() -> Self {
        ExitExpectation::Code(0)
    }
}

impl From<i32> for ExitExpectation {
    fn from(code: i32) -> Self {
        ExitExpectation::Code(code)
    }
}

impl From<Vec<i32>> for ExitExpectation {
    fn from(codes: Vec<i32>) -> Self {
        ExitExpectation::OneOf(codes)
    }
}

impl From<&[i32]> for ExitExpectation {
    fn from(codes: &[i32]) -> Self {
        ExitExpectation::OneOf(codes.to_vec())
    }
}

/// Options for running a command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub expect: ExitExpectation,
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a different exit outcome than plain success.
    pub fn expecting(mut self, expect: impl Into<ExitExpectation>) -> Self {
        self.expect = expect.into();
        self
    }

    /// Kill the process if it runs longer than this.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a validated run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Raw outcome before validation.
#[derive(Debug, Clone)]
pub(crate) struct Completed {
    pub(crate) exit_code: i32,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    pub(crate) timed_out: bool,
}

/// Check a completed process against the caller's expectations.
///
/// A timeout kill wins over any exit-code mismatch.
pub(crate) fn validate(
    completed: &Completed,
    opts: &RunOptions,
    argv: &[String],
) -> Result<RunOutput> {
    if completed.timed_out {
        return Err(FerrumError::Timeout {
            argv: argv.to_vec(),
            timeout: opts.timeout.unwrap_or_default(),
        });
    }
    if !opts.expect.accepts(completed.exit_code) {
        return Err(FerrumError::ProcessExecution {
            argv: argv.to_vec(),
            code: completed.exit_code,
            stdout: completed.stdout.clone(),
            stderr: completed.stderr.clone(),
        });
    }
    Ok(RunOutput {
        exit_code: completed.exit_code,
        stdout: completed.stdout.clone(),
        stderr: completed.stderr.clone(),
    })
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    // signal deaths report as negative codes
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}

/// A spawned child process with its capture pipes and spawn metadata.
pub struct RunningProcess {
    pub(crate) child: Child,
    pub(crate) stdout_pipe: Option<File>,
    pub(crate) stderr_pipe: Option<File>,
    pub(crate) argv: Vec<String>,
    pub(crate) encoding: OutputEncoding,
    pub(crate) started_at: Instant,
    pub(crate) timed_out: Arc<AtomicBool>,
    pub(crate) upstream: Option<Box<RunningProcess>>,
    pub(crate) watchdog: Arc<Watchdog>,
}

impl RunningProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// The argument vector this process was spawned with, kept for
    /// diagnostics.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Force-kill the process. Already-exited processes are not an error.
    pub fn kill(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Non-blocking exit probe: `None` while running, the exit code once
    /// finished.
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(status_code))
    }

    /// Register this process with its watchdog.
    pub(crate) fn schedule_timeout(&self, timeout: Duration) {
        self.watchdog
            .enqueue(self.child.id(), timeout, self.timed_out.clone());
    }

    /// Block until exit, draining both capture pipes.
    ///
    /// Stderr is drained on a helper thread while stdout is read here, so a
    /// child filling both pipes cannot deadlock.
    pub(crate) fn wait_raw(mut self) -> Result<Completed> {
        let stderr_reader = self.stderr_pipe.take().map(|pipe| {
            thread::spawn(move || {
                let mut pipe = pipe;
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });
        let mut stdout_bytes = Vec::new();
        if let Some(mut pipe) = self.stdout_pipe.take() {
            let _ = pipe.read_to_end(&mut stdout_bytes);
        }
        let status = self.child.wait()?;
        let stderr_bytes = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if let Some(upstream) = self.upstream.take() {
            upstream.reap();
        }
        Ok(Completed {
            exit_code: status_code(status),
            stdout: self.encoding.decode(stdout_bytes)?,
            stderr: self.encoding.decode(stderr_bytes)?,
            timed_out: self.timed_out.load(Ordering::SeqCst),
        })
    }

    /// Wait for exit and validate the outcome per `opts`.
    pub fn wait(self, opts: &RunOptions) -> Result<RunOutput> {
        if let Some(timeout) = opts.timeout {
            self.schedule_timeout(timeout);
        }
        let argv = self.argv.clone();
        let completed = self.wait_raw()?;
        validate(&completed, opts, &argv)
    }

    /// Reap an already-finished upstream; a source that outlives its
    /// destination is left running (it will see a broken pipe on its next
    /// write).
    fn reap(mut self) {
        let _ = self.child.try_wait();
        if let Some(upstream) = self.upstream.take() {
            upstream.reap();
        }
    }
}
