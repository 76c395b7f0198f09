//! Textual paths with normalization that avoids the usual surprises
//!
//! Invariants maintained by [`LocalPath`]:
//! - empty stays empty (it is never rewritten to `.`)
//! - redundant separators and `.`/`..` segments collapse on construction
//! - a trailing separator is preserved (unless constructed with
//!   `keep_trailing_slash = false`), and is significant for equality
//! - joining strips leading separators from every segment after the first,
//!   so `join` never silently resets to the filesystem root

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};

use ferrum_core::Result;

/// Path separator. The supported platform family is Unix, as with the
/// process-spawning side of ferrum.
pub const SEP: char = '/';

/// A normalized textual path.
#[derive(Clone, Debug)]
pub struct LocalPath {
    inner: String,
    keep_trailing: bool,
}

fn normalize(raw: &str, keep_trailing: bool) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let absolute = raw.starts_with(SEP);
    let trailing = keep_trailing && raw.ends_with(SEP);
    let mut stack: Vec<&str> = Vec::new();
    for part in raw.split(SEP) {
        match part {
            "" | "." => {}
            ".." => {
                if absolute {
                    stack.pop();
                } else if stack.is_empty() || stack.last() == Some(&"..") {
                    stack.push("..");
                } else {
                    stack.pop();
                }
            }
            other => stack.push(other),
        }
    }
    let mut out = if absolute {
        format!("{}{}", SEP, stack.join("/"))
    } else {
        stack.join("/")
    };
    if out.is_empty() {
        out.push('.');
    }
    if trailing && out != "/" {
        out.push(SEP);
    }
    out
}

impl LocalPath {
    /// Create a path, normalizing it and preserving any trailing slash.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self::with_options(path, true)
    }

    /// Create a path, choosing whether a trailing slash survives
    /// normalization.
    pub fn with_options(path: impl AsRef<str>, keep_trailing_slash: bool) -> Self {
        Self {
            inner: normalize(path.as_ref(), keep_trailing_slash),
            keep_trailing: keep_trailing_slash,
        }
    }

    /// Build a sibling value carrying over the trailing-slash policy.
    pub(crate) fn like(&self, path: impl AsRef<str>) -> Self {
        Self::with_options(path, self.keep_trailing)
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.inner.starts_with(SEP)
    }

    pub fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    /// Join any number of path segments onto this path.
    ///
    /// Empty segments are dropped; leading separators on later segments are
    /// stripped rather than resetting the result to the root.
    pub fn join<I, S>(&self, bits: I) -> LocalPath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let good: Vec<String> = bits
            .into_iter()
            .map(|b| b.as_ref().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        let (head, tail) = if !self.inner.is_empty() {
            (self.inner.clone(), &good[..])
        } else if !good.is_empty() {
            (good[0].clone(), &good[1..])
        } else {
            return self.like("");
        };
        let mut joined = head;
        for bit in tail {
            joined.push(SEP);
            joined.push_str(bit.trim_start_matches(SEP));
        }
        self.like(joined)
    }

    /// Go up `count` directories.
    pub fn up(&self, count: usize) -> LocalPath {
        self.join(["../".repeat(count)])
    }

    /// Parent directory (one step up).
    pub fn parent(&self) -> LocalPath {
        self.up(1)
    }

    /// The component after the last separator; empty for a trailing slash.
    pub fn basename(&self) -> &str {
        match self.inner.rfind(SEP) {
            Some(i) => &self.inner[i + 1..],
            None => &self.inner,
        }
    }

    /// Everything before the last separator, keeping the root slash.
    pub fn dirname(&self) -> LocalPath {
        let head = match self.inner.rfind(SEP) {
            Some(i) => &self.inner[..i],
            None => "",
        };
        if head.is_empty() && self.is_absolute() {
            return self.like("/");
        }
        self.like(head)
    }

    /// Absolute form of this path, resolved against the current directory.
    /// The empty path stays empty.
    pub fn abs(&self) -> Result<LocalPath> {
        if self.is_empty() || self.is_absolute() {
            return Ok(self.clone());
        }
        let cwd = std::env::current_dir()?;
        Ok(self
            .like(cwd.to_string_lossy())
            .join([self.inner.as_str()]))
    }

    /// Path components; an absolute path starts with a `/` component.
    pub fn split(&self) -> Vec<LocalPath> {
        let mut parts: Vec<LocalPath> = Vec::new();
        if self.is_absolute() {
            parts.push(self.like("/"));
        }
        parts.extend(
            self.inner
                .split(SEP)
                .filter(|p| !p.is_empty())
                .map(|p| self.like(p)),
        );
        parts
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.inner).exists()
    }

    pub fn is_dir(&self) -> bool {
        Path::new(&self.inner).is_dir()
    }

    pub fn is_file(&self) -> bool {
        Path::new(&self.inner).is_file()
    }

    /// Entries of this directory, or the path itself if it is a file.
    pub fn list(&self) -> Result<Vec<LocalPath>> {
        if self.is_file() {
            return Ok(vec![self.clone()]);
        }
        let mut entries: Vec<LocalPath> = Vec::new();
        for entry in fs::read_dir(&self.inner)? {
            let entry = entry?;
            entries.push(self.join([entry.file_name().to_string_lossy()]));
        }
        entries.sort();
        Ok(entries)
    }

    /// Contents of this file as a string.
    pub fn read(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.inner)?)
    }

    /// Write data to this file, truncating it.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<()> {
        fs::write(&self.inner, data)?;
        Ok(())
    }

    /// Open this path for reading.
    pub fn open(&self) -> Result<impl Read> {
        Ok(fs::File::open(&self.inner)?)
    }

    /// Create this directory (and parents); an existing directory is fine.
    pub fn mkdir(&self) -> Result<()> {
        fs::create_dir_all(&self.inner)?;
        Ok(())
    }

    /// Delete this path, recursively for directories. Missing paths are
    /// ignored.
    pub fn delete(&self) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        if self.is_dir() {
            fs::remove_dir_all(&self.inner)?;
        } else {
            fs::remove_file(&self.inner)?;
        }
        Ok(())
    }

    /// Move this path to `dest`, replacing it when `force` is set.
    pub fn move_to(&self, dest: impl Into<LocalPath>, force: bool) -> Result<LocalPath> {
        let dest = dest.into();
        if force {
            dest.delete()?;
        }
        match fs::rename(&self.inner, dest.as_str()) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(nix::errno::Errno::EXDEV as i32) => {
                self.copy_to(dest.clone(), false)?;
                self.delete()?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(dest)
    }

    /// Copy this path to `dest`, recursively for directories.
    pub fn copy_to(&self, dest: impl Into<LocalPath>, force: bool) -> Result<LocalPath> {
        let dest = dest.into();
        if force {
            dest.delete()?;
        }
        if self.is_dir() {
            dest.mkdir()?;
            for entry in fs::read_dir(&self.inner)? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                self.join([name.as_ref()])
                    .copy_to(dest.join([name.as_ref()]), false)?;
            }
        } else {
            fs::copy(&self.inner, dest.as_str())?;
        }
        Ok(dest)
    }

    /// Rename the leaf component, keeping the parent directory.
    pub fn rename(&self, new_name: impl AsRef<str>) -> Result<LocalPath> {
        self.move_to(self.up(1).join([new_name.as_ref()]), false)
    }
}

impl fmt::Display for LocalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl PartialEq for LocalPath {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for LocalPath {}

impl PartialEq<str> for LocalPath {
    fn eq(&self, other: &str) -> bool {
        self.inner == other
    }
}

impl PartialEq<&str> for LocalPath {
    fn eq(&self, other: &&str) -> bool {
        self.inner == *other
    }
}

impl PartialEq<String> for LocalPath {
    fn eq(&self, other: &String) -> bool {
        &self.inner == other
    }
}

impl Hash for LocalPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl PartialOrd for LocalPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.inner.cmp(&other.inner)
    }
}

impl AsRef<str> for LocalPath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl AsRef<Path> for LocalPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl From<&str> for LocalPath {
    fn from(s: &str) -> Self {
        LocalPath::new(s)
    }
}

impl From<String> for LocalPath {
    fn from(s: String) -> Self {
        LocalPath::new(s)
    }
}

impl From<&Path> for LocalPath {
    fn from(p: &Path) -> Self {
        LocalPath::new(p.to_string_lossy())
    }
}

impl From<PathBuf> for LocalPath {
    fn from(p: PathBuf) -> Self {
        LocalPath::new(p.to_string_lossy())
    }
}

impl From<&LocalPath> for LocalPath {
    fn from(p: &LocalPath) -> Self {
        p.clone()
    }
}
