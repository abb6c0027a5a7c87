//! Filesystem classification and comparison helpers.
//!
//! The cache and stage layers never call `std::fs` metadata functions
//! directly; they go through this crate so that the handful of subtle
//! decisions (symlinks are classified without being followed, `ENOENT` is
//! a status rather than an error) live in one place.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Classification of a workspace path.
///
/// Symbolic links are reported as [`FileStatus::Link`] regardless of what
/// they point at; classification never follows links.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// The path does not exist.
    #[default]
    Absent,
    /// A regular file.
    RegularFile,
    /// A symbolic link (possibly dangling).
    Link,
    /// A directory.
    Directory,
    /// Anything else: socket, fifo, device node.
    Other,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::RegularFile => "regular file",
            Self::Link => "link",
            Self::Directory => "directory",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Classify `path` without following symbolic links.
///
/// `ENOENT` maps to [`FileStatus::Absent`]; any other stat error surfaces.
pub fn file_status(path: &Path) -> io::Result<FileStatus> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileStatus::Absent),
        Err(e) => return Err(e),
    };
    let ft = meta.file_type();
    if ft.is_symlink() {
        Ok(FileStatus::Link)
    } else if ft.is_file() {
        Ok(FileStatus::RegularFile)
    } else if ft.is_dir() {
        Ok(FileStatus::Directory)
    } else {
        Ok(FileStatus::Other)
    }
}

/// Test whether `path` exists.
///
/// With `follow_symlinks`, a dangling link reports `false`. `ENOENT` and
/// `ENOTDIR` traversal errors both map to `false`.
pub fn exists(path: &Path, follow_symlinks: bool) -> io::Result<bool> {
    let result = if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    };
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(false),
        Err(e) => Err(e),
    }
}

const COMPARE_CHUNK: usize = 64 * 1024;

/// Byte-wise comparison of two files, short-circuiting on size mismatch.
///
/// Hash-agnostic: this reads both files rather than trusting any recorded
/// checksum.
pub fn same_contents(p1: &Path, p2: &Path) -> io::Result<bool> {
    let m1 = fs::metadata(p1)?;
    let m2 = fs::metadata(p2)?;
    if m1.len() != m2.len() {
        return Ok(false);
    }
    let mut r1 = BufReader::new(File::open(p1)?);
    let mut r2 = BufReader::new(File::open(p2)?);
    let mut b1 = vec![0u8; COMPARE_CHUNK];
    let mut b2 = vec![0u8; COMPARE_CHUNK];
    let mut remaining = m1.len();
    while remaining > 0 {
        let n = remaining.min(COMPARE_CHUNK as u64) as usize;
        r1.read_exact(&mut b1[..n])?;
        r2.read_exact(&mut b2[..n])?;
        if b1[..n] != b2[..n] {
            return Ok(false);
        }
        remaining -= n as u64;
    }
    Ok(true)
}

/// Test whether two paths live on the same filesystem.
///
/// Either path may not exist yet; the device of its nearest existing
/// ancestor is used instead.
pub fn same_filesystem(p1: &Path, p2: &Path) -> io::Result<bool> {
    Ok(device_of(p1)? == device_of(p2)?)
}

fn device_of(path: &Path) -> io::Result<u64> {
    for ancestor in path.ancestors() {
        let candidate = if ancestor.as_os_str().is_empty() {
            Path::new(".")
        } else {
            ancestor
        };
        match fs::symlink_metadata(candidate) {
            Ok(meta) => return Ok(meta.dev()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no existing ancestor of {}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn status_of_absent_path() {
        let dir = tempfile::tempdir().unwrap();
        let status = file_status(&dir.path().join("nope")).unwrap();
        assert_eq!(status, FileStatus::Absent);
    }

    #[test]
    fn status_of_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        fs::write(&path, b"data").unwrap();
        assert_eq!(file_status(&path).unwrap(), FileStatus::RegularFile);
    }

    #[test]
    fn status_of_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_status(dir.path()).unwrap(), FileStatus::Directory);
    }

    #[test]
    fn status_of_link_does_not_follow() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        fs::write(&target, b"data").unwrap();
        let link = dir.path().join("link");
        symlink(&target, &link).unwrap();
        assert_eq!(file_status(&link).unwrap(), FileStatus::Link);
    }

    #[test]
    fn status_of_dangling_link_is_link() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling");
        symlink(dir.path().join("missing"), &link).unwrap();
        assert_eq!(file_status(&link).unwrap(), FileStatus::Link);
    }

    #[test]
    fn exists_maps_enoent_to_false() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!exists(&dir.path().join("missing"), false).unwrap());
        assert!(!exists(&dir.path().join("missing"), true).unwrap());
    }

    #[test]
    fn exists_maps_enotdir_to_false() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        // Traversing through a regular file yields ENOTDIR, not an error.
        assert!(!exists(&file.join("child"), false).unwrap());
    }

    #[test]
    fn exists_dangling_link() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling");
        symlink(dir.path().join("missing"), &link).unwrap();
        assert!(exists(&link, false).unwrap());
        assert!(!exists(&link, true).unwrap());
    }

    #[test]
    fn same_contents_equal_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"identical bytes").unwrap();
        fs::write(&b, b"identical bytes").unwrap();
        assert!(same_contents(&a, &b).unwrap());
    }

    #[test]
    fn same_contents_size_mismatch_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"short").unwrap();
        fs::write(&b, b"rather longer").unwrap();
        assert!(!same_contents(&a, &b).unwrap());
    }

    #[test]
    fn same_contents_same_size_different_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"aaaa").unwrap();
        fs::write(&b, b"aaab").unwrap();
        assert!(!same_contents(&a, &b).unwrap());
    }

    #[test]
    fn same_filesystem_within_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        fs::write(&a, b"x").unwrap();
        assert!(same_filesystem(&a, dir.path()).unwrap());
    }

    #[test]
    fn same_filesystem_uses_nearest_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        // Neither path exists; both resolve to the tempdir's device.
        let a = dir.path().join("not/yet/created");
        let b = dir.path().join("also/missing");
        assert!(same_filesystem(&a, &b).unwrap());
    }
}
