//! ferrum: run external programs with composable pipelines and redirections
//!
//! Commands are immutable values built from a [`LocalMachine`]: compose them
//! with `args`, `pipe` and the `redirect_*` builders, then `run` them (or
//! spawn them in the background and collect a [`RunFuture`]). Exit codes are
//! validated against an [`ExitExpectation`], wall-clock timeouts are
//! enforced by a shared background [`Watchdog`], and errors carry enough
//! structure to reconstruct a diagnostic without re-running anything.
//!
//! # Example
//!
//! ```no_run
//! use ferrum::LocalMachine;
//!
//! # fn main() -> ferrum::Result<()> {
//! let machine = LocalMachine::new();
//! let ls = machine.command("ls")?;
//! let grep = machine.command("grep")?;
//!
//! let out = ls.pipe(grep.arg("toml")).run()?;
//! println!("{}", out.stdout);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod env;
pub mod execution;
pub mod machine;

pub use command::{Cmd, RedirectTarget, Token, QUOTE_LEVEL};
pub use env::Environment;
pub use execution::{
    Clock, ExitExpectation, OutputEncoding, RunFuture, RunOptions, RunOutput, RunningProcess,
    SystemClock, Watchdog,
};
pub use machine::{CwdGuard, EnvGuard, LocalMachine};

pub use ferrum_core::{sh_quote, sh_quote_list, FerrumError, Result};
pub use ferrum_path::LocalPath;
