//! Command composition: building argument vectors and spawn configuration
//! without executing anything until asked

pub mod grammar;
pub mod spawn;

pub use grammar::{BoundCommand, Cmd, Program, RedirectTarget, Redirection, StdinData, Token, QUOTE_LEVEL};
