//! Stream wiring and process spawning for command values
//!
//! The spawn walk assembles a [`SpawnSpec`] from the outside in: each
//! redirection claims its stream slot (failing if it is already spoken for)
//! and the innermost bound command turns the spec into an actual child
//! process.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use ferrum_core::{FerrumError, Result};

use crate::command::grammar::{BoundCommand, Cmd, RedirectTarget};
use crate::execution::future::RunFuture;
use crate::execution::process::{RunOptions, RunOutput, RunningProcess};

/// Stdin-data is buffered to a temp file in chunks of this size.
const CHUNK_SIZE: usize = 16_000;

/// What one standard stream of a spawn is wired to.
pub(crate) enum Slot {
    /// Capture through a pipe (the default).
    Piped,
    /// Inherit the parent's stream.
    Inherit,
    /// An open file; the child inherits a duplicate.
    Handle(File),
    /// Merge into stdout (stderr only).
    Merge,
}

impl Slot {
    fn is_default(&self) -> bool {
        matches!(self, Slot::Piped)
    }
}

pub(crate) struct SpawnSpec {
    pub(crate) stdin: Slot,
    pub(crate) stdout: Slot,
    pub(crate) stderr: Slot,
}

impl SpawnSpec {
    pub(crate) fn piped() -> Self {
        Self {
            stdin: Slot::Piped,
            stdout: Slot::Piped,
            stderr: Slot::Piped,
        }
    }

    pub(crate) fn inherited() -> Self {
        Self {
            stdin: Slot::Inherit,
            stdout: Slot::Inherit,
            stderr: Slot::Inherit,
        }
    }
}

fn nix_err(e: nix::Error) -> FerrumError {
    FerrumError::Io(io::Error::from_raw_os_error(e as i32))
}

/// Open a redirect target for the child. Path targets stay open only for
/// the duration of the spawn; handle targets are duplicated.
fn open_target(target: &RedirectTarget, write: bool) -> Result<File> {
    match target {
        RedirectTarget::Path(p) => {
            let file = if write {
                File::create(p.as_str())?
            } else {
                File::open(p.as_str())?
            };
            Ok(file)
        }
        RedirectTarget::Handle(f) => Ok(f.try_clone()?),
        RedirectTarget::MergeWithStdout => Err(FerrumError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "only stderr can merge with stdout",
        ))),
    }
}

impl Cmd {
    /// Spawn this command with all three standard streams captured.
    pub fn spawn(&self) -> Result<RunningProcess> {
        let mut proc = self.spawn_spec(SpawnSpec::piped())?;
        // diagnostics describe the whole composite, not just the innermost
        // spawn; a pipeline decodes with its source's encoding
        proc.argv = self.formulate(0);
        proc.encoding = self.encoding();
        Ok(proc)
    }

    pub(crate) fn spawn_spec(&self, mut spec: SpawnSpec) -> Result<RunningProcess> {
        match self {
            Cmd::Bound(bound) => bound.spawn(spec),

            Cmd::Pipeline { src, dst } => {
                let SpawnSpec {
                    stdin,
                    stdout,
                    stderr,
                } = spec;
                let src_spec = SpawnSpec {
                    stdin,
                    stdout: Slot::Piped,
                    stderr: Slot::Piped,
                };
                let mut src_proc = src.spawn_spec(src_spec)?;
                let src_out = src_proc.stdout_pipe.take().ok_or_else(|| {
                    FerrumError::Io(io::Error::other("pipeline source has no stdout pipe"))
                })?;
                let dst_spec = SpawnSpec {
                    stdin: Slot::Handle(src_out),
                    stdout,
                    stderr,
                };
                let mut dst_proc = match dst.spawn_spec(dst_spec) {
                    Ok(p) => p,
                    Err(e) => {
                        let _ = src_proc.kill();
                        return Err(e);
                    }
                };
                // drop our copy of the source's stderr so the source sees a
                // broken pipe if the destination exits first
                drop(src_proc.stderr_pipe.take());
                dst_proc.upstream = Some(Box::new(src_proc));
                Ok(dst_proc)
            }

            Cmd::StdoutRedirect(r) => {
                if !spec.stdout.is_default() {
                    return Err(FerrumError::Redirection { stream: "stdout" });
                }
                spec.stdout = Slot::Handle(open_target(&r.target, true)?);
                r.inner.spawn_spec(spec)
            }

            Cmd::StderrRedirect(r) => {
                if !spec.stderr.is_default() {
                    return Err(FerrumError::Redirection { stream: "stderr" });
                }
                spec.stderr = match &r.target {
                    RedirectTarget::MergeWithStdout => Slot::Merge,
                    other => Slot::Handle(open_target(other, true)?),
                };
                r.inner.spawn_spec(spec)
            }

            Cmd::StdinRedirect(r) => {
                if !spec.stdin.is_default() {
                    return Err(FerrumError::Redirection { stream: "stdin" });
                }
                spec.stdin = Slot::Handle(open_target(&r.target, false)?);
                r.inner.spawn_spec(spec)
            }

            Cmd::StdinDataRedirect(s) => {
                if !spec.stdin.is_default() {
                    return Err(FerrumError::Redirection { stream: "stdin" });
                }
                let mut buffer = tempfile::tempfile()?;
                for chunk in s.data.chunks(CHUNK_SIZE) {
                    buffer.write_all(chunk)?;
                }
                buffer.seek(SeekFrom::Start(0))?;
                spec.stdin = Slot::Handle(buffer);
                s.inner.spawn_spec(spec)
            }
        }
    }

    /// Spawn, wait, and validate with default options (exit code 0, no
    /// timeout).
    pub fn run(&self) -> Result<RunOutput> {
        self.run_with(RunOptions::new())
    }

    /// Spawn, wait, and validate.
    pub fn run_with(&self, opts: RunOptions) -> Result<RunOutput> {
        self.spawn()?.wait(&opts)
    }

    /// Run and return captured stdout.
    pub fn read(&self) -> Result<String> {
        Ok(self.run()?.stdout)
    }

    /// Spawn without waiting; the returned future collects the outcome.
    pub fn run_in_background(&self) -> Result<RunFuture> {
        self.run_in_background_with(RunOptions::new())
    }

    pub fn run_in_background_with(&self, opts: RunOptions) -> Result<RunFuture> {
        Ok(RunFuture::new(self.spawn()?, opts))
    }

    /// Run attached to the parent's stdin/stdout/stderr, for interactive
    /// programs. Nothing is captured.
    pub fn run_in_foreground(&self) -> Result<()> {
        self.run_in_foreground_with(RunOptions::new())
    }

    pub fn run_in_foreground_with(&self, opts: RunOptions) -> Result<()> {
        let mut proc = self.spawn_spec(SpawnSpec::inherited())?;
        proc.argv = self.formulate(0);
        proc.encoding = self.encoding();
        proc.wait(&opts).map(|_| ())
    }
}

impl BoundCommand {
    fn spawn(&self, spec: SpawnSpec) -> Result<RunningProcess> {
        let argv = self.formulate(0);
        let program = &self.program;
        let cwd = program
            .cwd
            .clone()
            .unwrap_or_else(|| program.machine.cwd.read().clone());
        let mut env = program.machine.env.read().clone();
        if let Some(overrides) = &program.env {
            env.update(overrides.iter().cloned());
        }

        log::debug!("running {:?}", argv);
        let mut command = std::process::Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(cwd.as_str())
            .env_clear()
            .envs(env.iter());

        match spec.stdin {
            Slot::Piped => command.stdin(Stdio::piped()),
            Slot::Inherit => command.stdin(Stdio::inherit()),
            Slot::Handle(f) => command.stdin(Stdio::from(f)),
            Slot::Merge => {
                return Err(FerrumError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "stdin cannot merge with stdout",
                )))
            }
        };

        let mut merge_reader: Option<File> = None;
        match (spec.stdout, spec.stderr) {
            (out_slot, Slot::Merge) => match out_slot {
                Slot::Piped => {
                    // one pipe, write end duplicated into both streams
                    let (read_end, write_end) = nix::unistd::pipe().map_err(nix_err)?;
                    let write_dup: OwnedFd = write_end.try_clone()?;
                    command.stdout(Stdio::from(write_end));
                    command.stderr(Stdio::from(write_dup));
                    merge_reader = Some(File::from(read_end));
                }
                Slot::Handle(f) => {
                    let dup = f.try_clone()?;
                    command.stdout(Stdio::from(f));
                    command.stderr(Stdio::from(dup));
                }
                Slot::Inherit | Slot::Merge => {
                    command.stdout(Stdio::inherit());
                    command.stderr(Stdio::inherit());
                }
            },
            (out_slot, err_slot) => {
                match out_slot {
                    Slot::Piped => command.stdout(Stdio::piped()),
                    Slot::Inherit => command.stdout(Stdio::inherit()),
                    Slot::Handle(f) => command.stdout(Stdio::from(f)),
                    Slot::Merge => command.stdout(Stdio::piped()),
                };
                match err_slot {
                    Slot::Piped => command.stderr(Stdio::piped()),
                    Slot::Inherit => command.stderr(Stdio::inherit()),
                    Slot::Handle(f) => command.stderr(Stdio::from(f)),
                    Slot::Merge => command.stderr(Stdio::piped()),
                };
            }
        }

        let mut child = command.spawn().map_err(|e| {
            FerrumError::Io(io::Error::new(
                e.kind(),
                format!("failed to spawn {:?}: {}", argv[0], e),
            ))
        })?;
        // nothing feeds a default stdin pipe; close it so the child sees EOF
        drop(child.stdin.take());

        let stdout_pipe = merge_reader.or_else(|| child.stdout.take().map(child_pipe));
        let stderr_pipe = child.stderr.take().map(child_err_pipe);

        Ok(RunningProcess {
            child,
            stdout_pipe,
            stderr_pipe,
            argv,
            encoding: program.encoding,
            started_at: Instant::now(),
            timed_out: Arc::new(AtomicBool::new(false)),
            upstream: None,
            watchdog: program.machine.watchdog.clone(),
        })
    }
}

fn child_pipe(stdout: std::process::ChildStdout) -> File {
    File::from(OwnedFd::from(stdout))
}

fn child_err_pipe(stderr: std::process::ChildStderr) -> File {
    File::from(OwnedFd::from(stderr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::LocalMachine;

    #[test]
    fn double_stdout_redirect_fails_before_spawning() {
        let machine = LocalMachine::new();
        let tmp = machine.tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        let cmd = machine
            .command_at("/bin/echo")
            .arg("x")
            .redirect_stdout(a.to_string_lossy().as_ref())
            .redirect_stdout(b.to_string_lossy().as_ref());
        match cmd.run() {
            Err(FerrumError::Redirection { stream }) => assert_eq!(stream, "stdout"),
            other => panic!("expected redirection error, got {:?}", other.map(|o| o.exit_code)),
        }
    }

    #[test]
    fn double_stdin_redirect_fails_even_with_data() {
        let machine = LocalMachine::new();
        let tmp = machine.tempdir().unwrap();
        let f = tmp.path().join("input");
        std::fs::write(&f, "x").unwrap();
        let cmd = machine
            .command_at("/bin/cat")
            .redirect_stdin(f.to_string_lossy().as_ref())
            .with_stdin_data("y");
        assert!(matches!(
            cmd.run(),
            Err(FerrumError::Redirection { stream: "stdin" })
        ));
    }

    #[test]
    fn stdin_data_buffers_large_payloads() {
        // larger than one buffering chunk
        let payload = "z".repeat(CHUNK_SIZE * 2 + 17);
        let machine = LocalMachine::new();
        let out = machine
            .command_at("/bin/cat")
            .with_stdin_data(payload.as_bytes())
            .run()
            .unwrap();
        assert_eq!(out.stdout.len(), payload.len());
    }
}
