//! Error types for command and path operations

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type used across the ferrum crates
pub type Result<T> = std::result::Result<T, FerrumError>;

/// Errors surfaced by command execution and path manipulation
#[derive(Error, Debug)]
pub enum FerrumError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A program name could not be resolved against the search path.
    #[error("command not found: {program} (searched {path:?})")]
    CommandNotFound { program: String, path: Vec<PathBuf> },

    /// A process terminated with an exit code outside the accepted set.
    #[error(
        "process exited with code {code}\ncommand line: {argv:?}\nstdout:\n{stdout}\nstderr:\n{stderr}"
    )]
    ProcessExecution {
        argv: Vec<String>,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// A process was killed because its wall-clock budget elapsed.
    #[error("process did not terminate within {timeout:?}\ncommand line: {argv:?}")]
    Timeout { argv: Vec<String>, timeout: Duration },

    /// A standard stream was assigned twice.
    #[error("{stream} is already redirected")]
    Redirection { stream: &'static str },
}

impl FerrumError {
    /// Exit code carried by a [`FerrumError::ProcessExecution`] failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FerrumError::ProcessExecution { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Argument vector carried by execution and timeout failures, if any.
    pub fn argv(&self) -> Option<&[String]> {
        match self {
            FerrumError::ProcessExecution { argv, .. } | FerrumError::Timeout { argv, .. } => {
                Some(argv)
            }
            _ => None,
        }
    }
}
