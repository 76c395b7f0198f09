//! ferrum-core: shared types for the ferrum crates
//!
//! This crate provides the foundation used by the other ferrum crates:
//! - Error types and Result alias
//! - Shell quoting for rendering argument vectors as `sh`-like command lines

pub mod error;
pub mod quote;

pub use error::{FerrumError, Result};
pub use quote::{sh_quote, sh_quote_list};
