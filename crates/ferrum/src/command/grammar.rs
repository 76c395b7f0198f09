//! Command grammar: immutable, composable command values
//!
//! A [`Cmd`] is a tagged union over the shapes a command line can take:
//! a bound program, a two-command pipeline, and the stream redirections.
//! Builder methods return new values; nothing is mutated in place, so a
//! partially composed command can be reused freely.

use std::fmt;
use std::fs::File;
use std::sync::Arc;

use ferrum_core::{sh_quote, sh_quote_list};
use ferrum_path::LocalPath;

use crate::execution::process::OutputEncoding;
use crate::machine::MachineState;

/// Nesting depth at which rendered tokens become shell-quoted: a command
/// that deep is a string some sub-shell will re-parse.
pub const QUOTE_LEVEL: usize = 2;

/// An executable plus its spawn configuration.
#[derive(Clone)]
pub struct Program {
    pub(crate) path: LocalPath,
    pub(crate) encoding: OutputEncoding,
    pub(crate) cwd: Option<LocalPath>,
    pub(crate) env: Option<Vec<(String, String)>>,
    pub(crate) machine: Arc<MachineState>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program({:?})", self.path.as_str())
    }
}

/// One argument slot of a bound command.
#[derive(Clone, Debug)]
pub enum Token {
    Str(String),
    Path(LocalPath),
    /// A nested command used as an argument to another command.
    Cmd(Cmd),
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Str(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::Str(s)
    }
}

impl From<&String> for Token {
    fn from(s: &String) -> Self {
        Token::Str(s.clone())
    }
}

impl From<LocalPath> for Token {
    fn from(p: LocalPath) -> Self {
        Token::Path(p)
    }
}

impl From<&LocalPath> for Token {
    fn from(p: &LocalPath) -> Self {
        Token::Path(p.clone())
    }
}

impl From<Cmd> for Token {
    fn from(c: Cmd) -> Self {
        Token::Cmd(c)
    }
}

/// A program with its bound arguments.
#[derive(Clone, Debug)]
pub struct BoundCommand {
    pub(crate) program: Program,
    pub(crate) args: Vec<Token>,
}

/// Where a redirected stream goes to (or comes from).
#[derive(Clone, Debug)]
pub enum RedirectTarget {
    /// A file path, opened in the mode the redirection implies.
    Path(LocalPath),
    /// An already-open handle; duplicated for the child.
    Handle(Arc<File>),
    /// Merge stderr into whatever stdout is (the `2>&1` sentinel).
    MergeWithStdout,
}

impl From<&str> for RedirectTarget {
    fn from(s: &str) -> Self {
        RedirectTarget::Path(LocalPath::new(s))
    }
}

impl From<String> for RedirectTarget {
    fn from(s: String) -> Self {
        RedirectTarget::Path(LocalPath::new(s))
    }
}

impl From<LocalPath> for RedirectTarget {
    fn from(p: LocalPath) -> Self {
        RedirectTarget::Path(p)
    }
}

impl From<&LocalPath> for RedirectTarget {
    fn from(p: &LocalPath) -> Self {
        RedirectTarget::Path(p.clone())
    }
}

impl From<File> for RedirectTarget {
    fn from(f: File) -> Self {
        RedirectTarget::Handle(Arc::new(f))
    }
}

/// A redirection of one standard stream of `inner`.
#[derive(Clone, Debug)]
pub struct Redirection {
    pub(crate) inner: Box<Cmd>,
    pub(crate) target: RedirectTarget,
}

/// Literal data fed to `inner`'s stdin.
#[derive(Clone, Debug)]
pub struct StdinData {
    pub(crate) inner: Box<Cmd>,
    pub(crate) data: Vec<u8>,
}

/// A composable command value.
#[derive(Clone, Debug)]
pub enum Cmd {
    Bound(BoundCommand),
    Pipeline { src: Box<Cmd>, dst: Box<Cmd> },
    StdoutRedirect(Redirection),
    StderrRedirect(Redirection),
    StdinRedirect(Redirection),
    StdinDataRedirect(StdinData),
}

impl Cmd {
    /// An argument-less command for a program (machines call this).
    pub(crate) fn for_program(machine: Arc<MachineState>, path: LocalPath) -> Cmd {
        let encoding = machine.encoding;
        Cmd::Bound(BoundCommand {
            program: Program {
                path,
                encoding,
                cwd: None,
                env: None,
                machine,
            },
            args: Vec::new(),
        })
    }

    /// Append one argument. On a pipeline the argument goes to the
    /// destination command; on a redirection, to the command inside it.
    pub fn arg(self, token: impl Into<Token>) -> Cmd {
        self.args([token.into()])
    }

    /// Append arguments. `cmd.args([a]).args([b])` is the same command as
    /// `cmd.args([a, b])`.
    pub fn args<I, T>(self, tokens: I) -> Cmd
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        match self {
            Cmd::Bound(mut bound) => {
                bound.args.extend(tokens.into_iter().map(Into::into));
                Cmd::Bound(bound)
            }
            Cmd::Pipeline { src, dst } => Cmd::Pipeline {
                src,
                dst: Box::new(dst.args(tokens)),
            },
            Cmd::StdoutRedirect(r) => Cmd::StdoutRedirect(r.map_inner(|c| c.args(tokens))),
            Cmd::StderrRedirect(r) => Cmd::StderrRedirect(r.map_inner(|c| c.args(tokens))),
            Cmd::StdinRedirect(r) => Cmd::StdinRedirect(r.map_inner(|c| c.args(tokens))),
            Cmd::StdinDataRedirect(s) => Cmd::StdinDataRedirect(StdinData {
                inner: Box::new(s.inner.args(tokens)),
                data: s.data,
            }),
        }
    }

    /// Pipe this command's stdout into `dst`'s stdin.
    pub fn pipe(self, dst: Cmd) -> Cmd {
        Cmd::Pipeline {
            src: Box::new(self),
            dst: Box::new(dst),
        }
    }

    /// Send stdout to a file or handle.
    pub fn redirect_stdout(self, target: impl Into<RedirectTarget>) -> Cmd {
        Cmd::StdoutRedirect(Redirection {
            inner: Box::new(self),
            target: target.into(),
        })
    }

    /// Send stderr to a file or handle.
    pub fn redirect_stderr(self, target: impl Into<RedirectTarget>) -> Cmd {
        Cmd::StderrRedirect(Redirection {
            inner: Box::new(self),
            target: target.into(),
        })
    }

    /// Merge stderr into stdout (`2>&1`).
    pub fn redirect_stderr_to_stdout(self) -> Cmd {
        Cmd::StderrRedirect(Redirection {
            inner: Box::new(self),
            target: RedirectTarget::MergeWithStdout,
        })
    }

    /// Read stdin from a file or handle.
    pub fn redirect_stdin(self, target: impl Into<RedirectTarget>) -> Cmd {
        Cmd::StdinRedirect(Redirection {
            inner: Box::new(self),
            target: target.into(),
        })
    }

    /// Feed literal data to stdin.
    pub fn with_stdin_data(self, data: impl Into<Vec<u8>>) -> Cmd {
        Cmd::StdinDataRedirect(StdinData {
            inner: Box::new(self),
            data: data.into(),
        })
    }

    /// Override the working directory for every program in this command.
    pub fn with_cwd(self, cwd: impl Into<LocalPath>) -> Cmd {
        let cwd = cwd.into();
        self.map_programs(&|p| p.cwd = Some(cwd.clone()))
    }

    /// Add an environment override for every program in this command,
    /// layered over the machine defaults at spawn time.
    pub fn with_env(self, name: impl Into<String>, value: impl Into<String>) -> Cmd {
        let pair = (name.into(), value.into());
        self.map_programs(&|p| p.env.get_or_insert_with(Vec::new).push(pair.clone()))
    }

    /// Override the output encoding for every program in this command.
    pub fn with_encoding(self, encoding: OutputEncoding) -> Cmd {
        self.map_programs(&|p| p.encoding = encoding)
    }

    fn map_programs(self, apply: &dyn Fn(&mut Program)) -> Cmd {
        match self {
            Cmd::Bound(mut bound) => {
                apply(&mut bound.program);
                let args = bound
                    .args
                    .into_iter()
                    .map(|t| match t {
                        Token::Cmd(c) => Token::Cmd(c.map_programs(apply)),
                        other => other,
                    })
                    .collect();
                bound.args = args;
                Cmd::Bound(bound)
            }
            Cmd::Pipeline { src, dst } => Cmd::Pipeline {
                src: Box::new(src.map_programs(apply)),
                dst: Box::new(dst.map_programs(apply)),
            },
            Cmd::StdoutRedirect(r) => Cmd::StdoutRedirect(r.map_inner(|c| c.map_programs(apply))),
            Cmd::StderrRedirect(r) => Cmd::StderrRedirect(r.map_inner(|c| c.map_programs(apply))),
            Cmd::StdinRedirect(r) => Cmd::StdinRedirect(r.map_inner(|c| c.map_programs(apply))),
            Cmd::StdinDataRedirect(s) => Cmd::StdinDataRedirect(StdinData {
                inner: Box::new(s.inner.map_programs(apply)),
                data: s.data,
            }),
        }
    }

    /// Render this command into an argument vector.
    ///
    /// At level 0 tokens come out raw, ready to hand to the OS spawn call.
    /// From [`QUOTE_LEVEL`] on, tokens are shell-quoted because the rendered
    /// text stands in for a string a sub-shell would re-parse.
    pub fn formulate(&self, level: usize) -> Vec<String> {
        match self {
            Cmd::Bound(bound) => bound.formulate(level),
            Cmd::Pipeline { src, dst } => {
                let mut argv = src.formulate(level + 1);
                argv.push("|".to_string());
                argv.extend(dst.formulate(level + 1));
                argv
            }
            Cmd::StdoutRedirect(r) => r.formulate(level, ">"),
            Cmd::StderrRedirect(r) => r.formulate(level, "2>"),
            Cmd::StdinRedirect(r) => r.formulate(level, "<"),
            Cmd::StdinDataRedirect(s) => {
                let mut argv = vec![
                    "echo".to_string(),
                    sh_quote(&String::from_utf8_lossy(&s.data)),
                    "|".to_string(),
                ];
                argv.extend(s.inner.formulate(level + 1));
                argv
            }
        }
    }

    /// The output encoding for a run of this command; a pipeline reports its
    /// source's encoding.
    pub(crate) fn encoding(&self) -> OutputEncoding {
        match self {
            Cmd::Bound(bound) => bound.program.encoding,
            Cmd::Pipeline { src, .. } => src.encoding(),
            Cmd::StdoutRedirect(r) | Cmd::StderrRedirect(r) | Cmd::StdinRedirect(r) => {
                r.inner.encoding()
            }
            Cmd::StdinDataRedirect(s) => s.inner.encoding(),
        }
    }
}

impl BoundCommand {
    pub(crate) fn formulate(&self, level: usize) -> Vec<String> {
        // arguments render one level deeper than the command itself
        let level = level + 1;
        let mut argv = vec![self.program.path.to_string()];
        for token in &self.args {
            match token {
                Token::Str(s) => {
                    if s.is_empty() {
                        continue;
                    }
                    if level >= QUOTE_LEVEL {
                        argv.push(sh_quote(s));
                    } else {
                        argv.push(s.clone());
                    }
                }
                Token::Path(p) => {
                    if p.is_empty() {
                        continue;
                    }
                    if level >= QUOTE_LEVEL {
                        argv.push(sh_quote(p.as_str()));
                    } else {
                        argv.push(p.to_string());
                    }
                }
                Token::Cmd(c) => {
                    let nested = c.formulate(level);
                    if level >= QUOTE_LEVEL {
                        argv.extend(sh_quote_list(nested));
                    } else {
                        argv.extend(nested);
                    }
                }
            }
        }
        argv
    }
}

impl Redirection {
    fn map_inner(self, f: impl FnOnce(Cmd) -> Cmd) -> Redirection {
        Redirection {
            inner: Box::new(f(*self.inner)),
            target: self.target,
        }
    }

    fn formulate(&self, level: usize, sym: &str) -> Vec<String> {
        let mut argv = self.inner.formulate(level + 1);
        argv.push(sym.to_string());
        argv.push(match &self.target {
            RedirectTarget::Path(p) => sh_quote(p.as_str()),
            RedirectTarget::Handle(_) => "<handle>".to_string(),
            RedirectTarget::MergeWithStdout => "&1".to_string(),
        });
        argv
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formulate(0).join(" "))
    }
}
