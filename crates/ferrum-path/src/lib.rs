//! ferrum-path: filesystem paths with predictable semantics
//!
//! [`LocalPath`] wraps a textual path and keeps it normalized: redundant
//! separators and `.`/`..` segments collapse on construction, empty paths
//! stay empty, and a meaningful trailing slash is preserved. Joining never
//! resets to the root when a later segment starts with a separator.
//!
//! The metadata surface (ownership, permissions, timestamps) and the
//! traversal surface (glob, walk) live in separate modules but all hang off
//! [`LocalPath`].

pub mod meta;
pub mod path;
pub mod walk;

pub use path::{LocalPath, SEP};
