//! Deferred results for background runs

use std::io;

use ferrum_core::{FerrumError, Result};

use crate::execution::process::{validate, Completed, RunOptions, RunOutput, RunningProcess};

/// The pending-or-finished result of a background run.
///
/// Blocking is explicit: [`RunFuture::wait`] performs the wait step exactly
/// once and caches the raw outcome; [`RunFuture::poll`] reports completion
/// without blocking. Validation re-runs from the cached outcome, so repeated
/// calls after completion are deterministic and cheap.
pub struct RunFuture {
    proc: Option<RunningProcess>,
    done: Option<Completed>,
    opts: RunOptions,
    argv: Vec<String>,
}

impl RunFuture {
    pub(crate) fn new(proc: RunningProcess, opts: RunOptions) -> Self {
        let argv = proc.argv().to_vec();
        Self {
            proc: Some(proc),
            done: None,
            opts,
            argv,
        }
    }

    /// Pid of the underlying process while it has not been waited on.
    pub fn pid(&self) -> Option<u32> {
        self.proc.as_ref().map(|p| p.pid())
    }

    /// The argument vector of the underlying process.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// True once the process has been waited for.
    pub fn is_finished(&self) -> bool {
        self.done.is_some()
    }

    /// Block until the process exits, then validate the outcome.
    pub fn wait(&mut self) -> Result<RunOutput> {
        if let Some(proc) = self.proc.take() {
            if let Some(timeout) = self.opts.timeout {
                proc.schedule_timeout(timeout);
            }
            self.done = Some(proc.wait_raw()?);
        }
        match &self.done {
            Some(completed) => validate(completed, &self.opts, &self.argv),
            None => Err(FerrumError::Io(io::Error::other(
                "process outcome was lost by an earlier failed wait",
            ))),
        }
    }

    /// Non-blocking completion probe. `Ok(false)` while the process runs;
    /// once it has exited, the outcome is collected and validated, so a
    /// failed run surfaces its error here as well.
    pub fn poll(&mut self) -> Result<bool> {
        if self.done.is_none() {
            match self.proc.as_mut() {
                Some(proc) => {
                    if proc.try_wait()?.is_none() {
                        return Ok(false);
                    }
                }
                None => {
                    return Err(FerrumError::Io(io::Error::other(
                        "process outcome was lost by an earlier failed wait",
                    )))
                }
            }
        }
        self.wait().map(|_| true)
    }

    /// Kill the underlying process if it is still attached.
    pub fn kill(&mut self) -> Result<()> {
        match self.proc.as_mut() {
            Some(proc) => proc.kill(),
            None => Ok(()),
        }
    }

    /// Wait and take ownership of the validated outcome.
    pub fn into_output(mut self) -> Result<RunOutput> {
        self.wait()
    }
}
