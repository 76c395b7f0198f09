//! Entry point to the local machine: spawn-time defaults and program lookup
//!
//! A [`LocalMachine`] owns the environment and working-directory defaults
//! that commands read when they spawn. The defaults are machine-local
//! state, not the real process environment, so scoped overrides cannot leak
//! into unrelated code.

use std::path::Path;
use std::sync::Arc;

use ferrum_core::{FerrumError, Result};
use ferrum_path::LocalPath;
use parking_lot::RwLock;

use crate::command::grammar::Cmd;
use crate::env::Environment;
use crate::execution::process::OutputEncoding;
use crate::execution::watchdog::Watchdog;

/// Shared machine state read by commands at spawn time.
pub(crate) struct MachineState {
    pub(crate) env: RwLock<Environment>,
    pub(crate) cwd: RwLock<LocalPath>,
    pub(crate) encoding: OutputEncoding,
    pub(crate) watchdog: Arc<Watchdog>,
}

/// The local machine.
#[derive(Clone)]
pub struct LocalMachine {
    pub(crate) state: Arc<MachineState>,
}

impl LocalMachine {
    /// A machine using the process-wide shared watchdog.
    pub fn new() -> Self {
        Self::with_watchdog(Watchdog::shared())
    }

    /// A machine with an explicitly provided watchdog (tests inject a fake
    /// clock this way).
    pub fn with_watchdog(watchdog: Arc<Watchdog>) -> Self {
        let cwd = std::env::current_dir()
            .map(LocalPath::from)
            .unwrap_or_else(|_| LocalPath::new("/"));
        Self {
            state: Arc::new(MachineState {
                env: RwLock::new(Environment::from_process()),
                cwd: RwLock::new(cwd),
                encoding: OutputEncoding::default(),
                watchdog,
            }),
        }
    }

    /// A command for `program`: looked up on the search path, unless the
    /// name contains a separator, in which case it is taken as a path.
    pub fn command(&self, program: impl AsRef<str>) -> Result<Cmd> {
        let program = program.as_ref();
        let path = if program.contains('/') {
            LocalPath::new(program)
        } else {
            self.which(program)?
        };
        Ok(self.command_at(path))
    }

    /// A command for an explicit executable path, with no lookup.
    pub fn command_at(&self, path: impl Into<LocalPath>) -> Cmd {
        Cmd::for_program(self.state.clone(), path.into())
    }

    /// Look up a program on the search path.
    ///
    /// If the exact name is not found and contains underscores, it is
    /// retried with underscores replaced by hyphens.
    pub fn which(&self, progname: &str) -> Result<LocalPath> {
        let env = self.state.env.read().clone();
        let dirs = env.path();
        let mut alternatives = vec![progname.to_string()];
        if progname.contains('_') {
            alternatives.push(progname.replace('_', "-"));
        }
        for candidate in &alternatives {
            for dir in &dirs {
                if let Some(found) = lookup_in_dir(dir, candidate, &env) {
                    return Ok(found);
                }
            }
        }
        Err(FerrumError::CommandNotFound {
            program: progname.to_string(),
            path: dirs.iter().map(|d| d.to_path_buf()).collect(),
        })
    }

    /// Snapshot of the machine environment.
    pub fn env(&self) -> Environment {
        self.state.env.read().clone()
    }

    pub fn get_env(&self, name: &str) -> Option<String> {
        self.state.env.read().get(name).map(|v| v.to_string())
    }

    pub fn set_env(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state.env.write().set(name, value);
    }

    pub fn unset_env(&self, name: &str) {
        self.state.env.write().unset(name);
    }

    /// Put a directory at the front of the machine's search path.
    pub fn prepend_path(&self, entry: impl Into<LocalPath>) {
        self.state.env.write().prepend_path(entry);
    }

    /// Expand `~` and `$VAR`/`${VAR}` against the machine environment.
    pub fn expand(&self, text: &str) -> String {
        self.state.env.read().expand(text)
    }

    /// Temporarily override environment variables. The previous environment
    /// is restored when the guard drops, on every exit path.
    pub fn with_env<I, K, V>(&self, vars: I) -> EnvGuard
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = self.state.env.write();
        let saved = env.clone();
        env.update(vars);
        EnvGuard {
            state: self.state.clone(),
            saved: Some(saved),
        }
    }

    /// The machine's working-directory default.
    pub fn cwd(&self) -> LocalPath {
        self.state.cwd.read().clone()
    }

    /// Change the working-directory default. Relative paths resolve against
    /// the current default.
    pub fn set_cwd(&self, dir: impl Into<LocalPath>) -> Result<()> {
        let dir = dir.into();
        let resolved = if dir.is_absolute() {
            dir
        } else {
            self.cwd().join([dir.as_str()])
        };
        if !resolved.is_dir() {
            return Err(FerrumError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such directory: {}", resolved),
            )));
        }
        *self.state.cwd.write() = resolved;
        Ok(())
    }

    /// Temporarily change the working-directory default; restored when the
    /// guard drops.
    pub fn with_cwd(&self, dir: impl Into<LocalPath>) -> Result<CwdGuard> {
        let saved = self.cwd();
        self.set_cwd(dir)?;
        Ok(CwdGuard {
            state: self.state.clone(),
            saved: Some(saved),
        })
    }

    /// A temporary directory, removed when the returned value drops.
    pub fn tempdir(&self) -> Result<tempfile::TempDir> {
        Ok(tempfile::tempdir()?)
    }
}

impl Default for LocalMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn lookup_in_dir(dir: &LocalPath, name: &str, _env: &Environment) -> Option<LocalPath> {
    use nix::unistd::{access, AccessFlags};
    let entry = dir.join([name]);
    if entry.is_file() && access(AsRef::<Path>::as_ref(&entry), AccessFlags::X_OK).is_ok() {
        Some(entry)
    } else {
        None
    }
}

#[cfg(windows)]
fn lookup_in_dir(dir: &LocalPath, name: &str, env: &Environment) -> Option<LocalPath> {
    // case-insensitive probe with PATHEXT extensions
    let pathext = env.get("PATHEXT").unwrap_or(".EXE;.BAT;.CMD");
    let wanted: Vec<String> = std::iter::once(String::new())
        .chain(pathext.split(';').map(|e| e.to_lowercase()))
        .map(|ext| format!("{}{}", name.to_lowercase(), ext))
        .collect();
    let entries = std::fs::read_dir(dir.as_str()).ok()?;
    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().to_lowercase();
        if wanted.iter().any(|w| *w == file_name) {
            return Some(dir.join([entry.file_name().to_string_lossy()]));
        }
    }
    None
}

/// Restores the machine environment on drop.
pub struct EnvGuard {
    state: Arc<MachineState>,
    saved: Option<Environment>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.state.env.write() = saved;
        }
    }
}

/// Restores the machine working directory on drop.
pub struct CwdGuard {
    state: Arc<MachineState>,
    saved: Option<LocalPath>,
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.state.cwd.write() = saved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_snapshots_the_process_environment() {
        let machine = LocalMachine::new();
        assert!(machine.get_env("PATH").is_some());
        assert!(machine.get_env("FERRUM_NOT_SET_72").is_none());
    }

    #[test]
    fn set_env_does_not_touch_the_process_environment() {
        let machine = LocalMachine::new();
        machine.set_env("FERRUM_MACHINE_ONLY", "1");
        assert_eq!(
            machine.get_env("FERRUM_MACHINE_ONLY").as_deref(),
            Some("1")
        );
        assert!(std::env::var("FERRUM_MACHINE_ONLY").is_err());
    }

    #[test]
    fn with_env_restores_on_drop_and_nests() {
        let machine = LocalMachine::new();
        {
            let _outer = machine.with_env([("FERRUM_SCOPED", "1889")]);
            assert_eq!(machine.get_env("FERRUM_SCOPED").as_deref(), Some("1889"));
            {
                let _inner = machine.with_env([("FERRUM_SCOPED", "1778")]);
                assert_eq!(machine.get_env("FERRUM_SCOPED").as_deref(), Some("1778"));
            }
            assert_eq!(machine.get_env("FERRUM_SCOPED").as_deref(), Some("1889"));
        }
        assert!(machine.get_env("FERRUM_SCOPED").is_none());
    }

    #[test]
    fn with_cwd_restores_on_drop() {
        let machine = LocalMachine::new();
        let before = machine.cwd();
        {
            let _guard = machine.with_cwd("/").unwrap();
            assert_eq!(machine.cwd(), "/");
        }
        assert_eq!(machine.cwd(), before);
    }

    #[test]
    fn set_cwd_rejects_missing_directories() {
        let machine = LocalMachine::new();
        assert!(machine.set_cwd("/does/not/exist/72").is_err());
    }

    #[test]
    fn which_finds_sh() {
        let machine = LocalMachine::new();
        let sh = machine.which("sh").unwrap();
        assert_eq!(sh.basename(), "sh");
        assert!(sh.is_absolute());
    }

    #[test]
    fn which_reports_name_and_search_path() {
        let machine = LocalMachine::new();
        match machine.which("definitely-missing-program-5Qx9") {
            Err(FerrumError::CommandNotFound { program, path }) => {
                assert_eq!(program, "definitely-missing-program-5Qx9");
                assert!(!path.is_empty());
            }
            other => panic!("expected CommandNotFound, got {:?}", other.map(|p| p.to_string())),
        }
    }

    #[test]
    fn which_requires_the_executable_bit() {
        let machine = LocalMachine::new();
        let tmp = machine.tempdir().unwrap();
        let dir = LocalPath::from(tmp.path());
        dir.join(["not-runnable"]).write("#!/bin/sh\n").unwrap();
        let _guard = machine.with_env([("PATH", dir.as_str())]);
        assert!(machine.which("not-runnable").is_err());
    }

    #[test]
    fn which_retries_underscores_as_hyphens() {
        let machine = LocalMachine::new();
        let tmp = machine.tempdir().unwrap();
        let dir = LocalPath::from(tmp.path());
        let tool = dir.join(["my-tool"]);
        tool.write("#!/bin/sh\nexit 0\n").unwrap();
        tool.chmod(0o755, false).unwrap();

        let _guard = machine.with_env([("PATH", dir.as_str())]);
        assert_eq!(machine.which("my_tool").unwrap(), tool);
        assert_eq!(machine.which("my-tool").unwrap(), tool);
    }

    #[test]
    fn command_resolves_names_and_keeps_paths() {
        let machine = LocalMachine::new();
        let sh = machine.command("sh").unwrap();
        assert!(sh.formulate(0)[0].ends_with("/sh"));
        let explicit = machine.command("/bin/sh").unwrap();
        assert_eq!(explicit.formulate(0)[0], "/bin/sh");
        assert!(machine.command("definitely-missing-program-5Qx9").is_err());
    }

    #[test]
    fn expand_uses_the_machine_environment() {
        let machine = LocalMachine::new();
        let _guard = machine.with_env([("FERRUM_EXPAND", "butter")]);
        assert_eq!(machine.expand("foo$FERRUM_EXPAND"), "foobutter");
    }
}
