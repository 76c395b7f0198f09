//! Metadata accessors: ownership, permissions, timestamps, links
//!
//! Ownership and permission changes use native syscalls (`chown(2)`,
//! `chmod(2)`) rather than shelling out to the external programs.

use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ferrum_core::{FerrumError, Result};
use nix::sys::stat::Mode;
use nix::sys::time::TimeVal;
use nix::unistd::{self, Gid, Group, Uid, User};

use crate::path::LocalPath;

fn nix_err(e: nix::Error) -> FerrumError {
    FerrumError::Io(io::Error::from_raw_os_error(e as i32))
}

/// Resolve an owner spec (a user name or a numeric uid) to a uid.
fn resolve_uid(owner: &str) -> Result<Uid> {
    if let Ok(n) = owner.parse::<u32>() {
        return Ok(Uid::from_raw(n));
    }
    match User::from_name(owner).map_err(nix_err)? {
        Some(user) => Ok(user.uid),
        None => Err(FerrumError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such user: {}", owner),
        ))),
    }
}

fn resolve_gid(group: &str) -> Result<Gid> {
    if let Ok(n) = group.parse::<u32>() {
        return Ok(Gid::from_raw(n));
    }
    match Group::from_name(group).map_err(nix_err)? {
        Some(g) => Ok(g.gid),
        None => Err(FerrumError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such group: {}", group),
        ))),
    }
}

impl LocalPath {
    /// File metadata, following symlinks.
    pub fn stat(&self) -> Result<fs::Metadata> {
        Ok(fs::metadata(self.as_str())?)
    }

    /// File metadata of the path itself, not following symlinks.
    pub fn lstat(&self) -> Result<fs::Metadata> {
        Ok(fs::symlink_metadata(self.as_str())?)
    }

    pub fn is_symlink(&self) -> bool {
        self.lstat().map(|m| m.file_type().is_symlink()).unwrap_or(false)
    }

    /// True when this path is a mount point: its device differs from its
    /// parent's, or it resolves to the same file as its parent (the root).
    pub fn is_mount(&self) -> bool {
        let stat = match self.stat() {
            Ok(s) => s,
            Err(_) => return false,
        };
        let parent = match self.join([".."]).stat() {
            Ok(s) => s,
            Err(_) => return false,
        };
        stat.dev() != parent.dev() || stat.ino() == parent.ino()
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.stat()?.len())
    }

    pub fn atime(&self) -> Result<SystemTime> {
        Ok(self.stat()?.accessed()?)
    }

    pub fn mtime(&self) -> Result<SystemTime> {
        Ok(self.stat()?.modified()?)
    }

    /// Inode change time (there is no portable accessor on Metadata).
    pub fn ctime(&self) -> Result<SystemTime> {
        let stat = self.stat()?;
        let secs = Duration::new(stat.ctime() as u64, stat.ctime_nsec() as u32);
        Ok(UNIX_EPOCH + secs)
    }

    /// Permission bits of this path.
    pub fn mode(&self) -> Result<u32> {
        Ok(self.stat()?.permissions().mode() & 0o7777)
    }

    /// Name of the owning user.
    pub fn owner(&self) -> Result<String> {
        let uid = Uid::from_raw(self.stat()?.uid());
        match User::from_uid(uid).map_err(nix_err)? {
            Some(user) => Ok(user.name),
            None => Ok(uid.to_string()),
        }
    }

    /// Name of the owning group.
    pub fn group(&self) -> Result<String> {
        let gid = Gid::from_raw(self.stat()?.gid());
        match Group::from_gid(gid).map_err(nix_err)? {
            Some(group) => Ok(group.name),
            None => Ok(gid.to_string()),
        }
    }

    /// Change ownership. `owner` and `group` each accept a name or a numeric
    /// id; pass `None` to leave that half untouched.
    pub fn chown(&self, owner: Option<&str>, group: Option<&str>, recursive: bool) -> Result<()> {
        let uid = owner.map(resolve_uid).transpose()?;
        let gid = group.map(resolve_gid).transpose()?;
        log::debug!("chown {:?} to {:?}:{:?}", self.as_str(), uid, gid);
        unistd::chown(AsRef::<Path>::as_ref(self), uid, gid).map_err(nix_err)?;
        if recursive && self.is_dir() {
            for entry in self.list()? {
                entry.chown(owner, group, true)?;
            }
        }
        Ok(())
    }

    pub fn set_owner(&self, owner: &str) -> Result<()> {
        self.chown(Some(owner), None, false)
    }

    pub fn set_group(&self, group: &str) -> Result<()> {
        self.chown(None, Some(group), false)
    }

    /// Change permission bits.
    pub fn chmod(&self, mode: u32, recursive: bool) -> Result<()> {
        log::debug!("chmod {:?} to {:o}", self.as_str(), mode);
        fs::set_permissions(self.as_str(), fs::Permissions::from_mode(mode))?;
        if recursive && self.is_dir() {
            for entry in self.list()? {
                entry.chmod(mode, true)?;
            }
        }
        Ok(())
    }

    /// Create a hard link at `dest` pointing to this path.
    pub fn hardlink(&self, dest: impl Into<LocalPath>, force: bool) -> Result<LocalPath> {
        let dest = dest.into();
        if force {
            dest.delete()?;
        }
        fs::hard_link(self.as_str(), dest.as_str())?;
        Ok(dest)
    }

    /// Create a symlink at `dest` pointing to this path.
    pub fn symlink(&self, dest: impl Into<LocalPath>, force: bool) -> Result<LocalPath> {
        let dest = dest.into();
        if force {
            dest.delete()?;
        }
        std::os::unix::fs::symlink(self.as_str(), dest.as_str())?;
        Ok(dest)
    }

    /// Target of this symlink.
    pub fn readlink(&self) -> Result<LocalPath> {
        Ok(LocalPath::from(fs::read_link(self.as_str())?))
    }

    /// Create a named pipe at this path.
    pub fn mkfifo(&self) -> Result<()> {
        unistd::mkfifo(AsRef::<Path>::as_ref(self), Mode::from_bits_truncate(0o644))
            .map_err(nix_err)
    }

    /// Create this file if needed and set both timestamps to now.
    pub fn touch(&self) -> Result<()> {
        self.touch_at(SystemTime::now(), true, true)
    }

    /// Create this file if needed and set its timestamps to `stamp`.
    /// Only the selected timestamps change; the other keeps its value.
    pub fn touch_at(&self, stamp: SystemTime, set_atime: bool, set_mtime: bool) -> Result<()> {
        if !self.exists() {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.as_str())?;
        }
        let stat = self.stat()?;
        let stamp_secs = stamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as i64;
        let atime = if set_atime { stamp_secs } else { stat.atime() };
        let mtime = if set_mtime { stamp_secs } else { stat.mtime() };
        nix::sys::stat::utimes(
            AsRef::<Path>::as_ref(self),
            &TimeVal::new(atime, 0),
            &TimeVal::new(mtime, 0),
        )
        .map_err(nix_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_uid_accepts_numeric_ids() {
        assert_eq!(resolve_uid("0").unwrap(), Uid::from_raw(0));
        assert_eq!(resolve_gid("0").unwrap(), Gid::from_raw(0));
    }

    #[test]
    fn resolve_uid_rejects_unknown_names() {
        assert!(resolve_uid("no-such-user-5Qx9").is_err());
        assert!(resolve_gid("no-such-group-5Qx9").is_err());
    }

    #[test]
    fn root_is_a_mount_point_files_are_not() {
        assert!(LocalPath::new("/").is_mount());
        assert!(!LocalPath::new("/etc/passwd").is_mount());
        assert!(!LocalPath::new("/does/not/exist").is_mount());
    }
}
