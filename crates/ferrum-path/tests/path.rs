//! Filesystem-backed tests for the path facade
//!
//! These exercise real metadata calls against a temporary directory.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ferrum_path::LocalPath;
use tempfile::tempdir;

fn fixture() -> (tempfile::TempDir, LocalPath) {
    let tmp = tempdir().unwrap();
    let root = LocalPath::from(tmp.path());
    (tmp, root)
}

#[test]
fn write_read_roundtrip_and_size() {
    let (_tmp, root) = fixture();
    let file = root.join(["hello.txt"]);
    file.write("hello world").unwrap();
    assert_eq!(file.read().unwrap(), "hello world");
    assert_eq!(file.size().unwrap(), 11);
    assert!(file.is_file());
    assert!(!file.is_dir());
}

#[test]
fn mkdir_is_idempotent() {
    let (_tmp, root) = fixture();
    let dir = root.join(["a", "b", "c"]);
    dir.mkdir().unwrap();
    dir.mkdir().unwrap();
    assert!(dir.is_dir());
}

#[test]
fn list_returns_sorted_entries_and_self_for_files() {
    let (_tmp, root) = fixture();
    root.join(["b.txt"]).write("b").unwrap();
    root.join(["a.txt"]).write("a").unwrap();
    let names: Vec<String> = root
        .list()
        .unwrap()
        .iter()
        .map(|p| p.basename().to_string())
        .collect();
    assert_eq!(names, ["a.txt", "b.txt"]);

    let single = root.join(["a.txt"]);
    assert_eq!(single.list().unwrap(), vec![single.clone()]);
}

#[test]
fn list_fails_on_missing_directory() {
    let (_tmp, root) = fixture();
    assert!(root.join(["nope"]).list().is_err());
}

#[test]
fn glob_matches_under_root() {
    let (_tmp, root) = fixture();
    let sub = root.join(["sub"]);
    sub.mkdir().unwrap();
    sub.join(["one.py"]).write("").unwrap();
    sub.join(["two.py"]).write("").unwrap();
    sub.join(["three.txt"]).write("").unwrap();

    let matched = root.glob("*/*.py").unwrap();
    assert_eq!(matched.len(), 2);
    assert!(matched.iter().all(|p| p.basename().ends_with(".py")));
}

#[test]
fn walk_respects_filter_and_recurses() {
    let (_tmp, root) = fixture();
    root.join(["top.txt"]).write("").unwrap();
    let sub = root.join(["sub"]);
    sub.mkdir().unwrap();
    sub.join(["inner.txt"]).write("").unwrap();

    let everything = root.walk(|_| true).unwrap();
    let names: Vec<&str> = everything.iter().map(|p| p.basename()).collect();
    assert!(names.contains(&"top.txt"));
    assert!(names.contains(&"sub"));
    assert!(names.contains(&"inner.txt"));

    let only_files = root.walk(|p| !p.is_dir()).unwrap();
    assert!(only_files.iter().all(|p| p.is_file()));
    assert!(!only_files.iter().any(|p| p.basename() == "inner.txt"));
}

#[test]
fn move_copy_delete_roundtrip() {
    let (_tmp, root) = fixture();
    let a = root.join(["a.txt"]);
    a.write("payload").unwrap();

    let b = a.copy_to(root.join(["b.txt"]), false).unwrap();
    assert_eq!(b.read().unwrap(), "payload");
    assert!(a.exists());

    let c = b.move_to(root.join(["c.txt"]), false).unwrap();
    assert!(!root.join(["b.txt"]).exists());
    assert_eq!(c.read().unwrap(), "payload");

    c.delete().unwrap();
    assert!(!c.exists());
    // deleting again is fine
    c.delete().unwrap();
}

#[test]
fn copy_to_recurses_into_directories() {
    let (_tmp, root) = fixture();
    let src = root.join(["src"]);
    src.join(["nested"]).mkdir().unwrap();
    src.join(["nested", "f.txt"]).write("deep").unwrap();

    let dst = src.copy_to(root.join(["dst"]), false).unwrap();
    assert_eq!(dst.join(["nested", "f.txt"]).read().unwrap(), "deep");
}

#[test]
fn rename_changes_only_the_leaf() {
    let (_tmp, root) = fixture();
    let a = root.join(["old.txt"]);
    a.write("x").unwrap();
    let renamed = a.rename("new.txt").unwrap();
    assert_eq!(renamed.basename(), "new.txt");
    assert_eq!(renamed.dirname(), a.dirname());
    assert!(renamed.exists());
    assert!(!a.exists());
}

#[test]
fn links_point_back_to_the_original() {
    let (_tmp, root) = fixture();
    let target = root.join(["target.txt"]);
    target.write("linked").unwrap();

    let hard = target.hardlink(root.join(["hard.txt"]), false).unwrap();
    assert_eq!(hard.read().unwrap(), "linked");
    // force replaces an existing destination
    target.hardlink(root.join(["hard.txt"]), true).unwrap();

    let soft = target.symlink(root.join(["soft.txt"]), false).unwrap();
    assert!(soft.is_symlink());
    assert_eq!(soft.readlink().unwrap(), target);
    assert_eq!(soft.read().unwrap(), "linked");
}

#[test]
fn readlink_fails_on_regular_paths() {
    let (_tmp, root) = fixture();
    let plain = root.join(["plain.txt"]);
    plain.write("").unwrap();
    assert!(plain.readlink().is_err());
}

#[test]
fn touch_creates_and_stamps() {
    let (_tmp, root) = fixture();
    let f = root.join(["stamped"]);
    assert!(!f.exists());
    f.touch().unwrap();
    assert!(f.exists());

    let stamp = UNIX_EPOCH + Duration::from_secs(1970);
    f.touch_at(stamp, true, true).unwrap();
    assert_eq!(f.atime().unwrap(), stamp);
    assert_eq!(f.mtime().unwrap(), stamp);

    let newer = UNIX_EPOCH + Duration::from_secs(12_000);
    f.touch_at(newer, true, false).unwrap();
    assert_eq!(f.atime().unwrap(), newer);
    assert_eq!(f.mtime().unwrap(), stamp);

    f.touch().unwrap();
    assert!(f.mtime().unwrap() > stamp);
}

#[test]
fn mode_and_chmod() {
    let (_tmp, root) = fixture();
    let f = root.join(["perms"]);
    f.write("").unwrap();
    f.chmod(0o600, false).unwrap();
    assert_eq!(f.mode().unwrap(), 0o600);
    f.chmod(0o755, false).unwrap();
    assert_eq!(f.mode().unwrap(), 0o755);
}

#[test]
fn chmod_recursive_applies_to_children() {
    let (_tmp, root) = fixture();
    let dir = root.join(["tree"]);
    dir.mkdir().unwrap();
    let inner = dir.join(["f"]);
    inner.write("").unwrap();
    dir.chmod(0o700, true).unwrap();
    assert_eq!(inner.mode().unwrap(), 0o700);
}

#[test]
fn owner_and_group_resolve_to_names() {
    let (_tmp, root) = fixture();
    let f = root.join(["owned"]);
    f.write("").unwrap();

    let uid = nix::unistd::Uid::current();
    let expected = nix::unistd::User::from_uid(uid).unwrap().unwrap().name;
    assert_eq!(f.owner().unwrap(), expected);

    // a no-op chown to ourselves exercises the native call
    f.chown(Some(expected.as_str()), None, false).unwrap();
    f.set_owner(&uid.to_string()).unwrap();
    let _ = f.group().unwrap();
}

#[test]
fn mkfifo_creates_a_named_pipe() {
    let (_tmp, root) = fixture();
    let fifo = root.join(["pipe"]);
    fifo.mkfifo().unwrap();
    use std::os::unix::fs::FileTypeExt;
    assert!(fifo.lstat().unwrap().file_type().is_fifo());
}

#[test]
fn timestamps_are_readable() {
    let (_tmp, root) = fixture();
    let f = root.join(["times"]);
    f.write("").unwrap();
    let now = SystemTime::now();
    assert!(f.atime().unwrap() <= now + Duration::from_secs(5));
    assert!(f.mtime().unwrap() <= now + Duration::from_secs(5));
    assert!(f.ctime().unwrap() <= now + Duration::from_secs(5));
}
