/// Snapshot of a host directory tree.
///
/// Scanning records names, kinds and file lengths only. File contents are
/// read by [`FileNode::load`] when the image writer reaches the file, and
/// dropped once copied. Children are kept in a BTreeMap, which fixes the
/// order entries are written in (byte order of their names) and makes builds
/// reproducible.
use crate::dirent::SHORT_NAME_LEN;
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Deepest directory nesting accepted below the root.
pub const MAX_DEPTH: usize = 128;

enum FileSource {
    Host(PathBuf),
    #[cfg(test)]
    Memory(Vec<u8>),
}

pub struct FileNode {
    pub len: u64,
    source: FileSource,
}

impl FileNode {
    pub fn from_host(path: PathBuf, len: u64) -> Self {
        FileNode {
            len,
            source: FileSource::Host(path),
        }
    }

    /// Read the file contents.
    pub fn load(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Host(path) => fs::read(path),
            #[cfg(test)]
            FileSource::Memory(data) => Ok(data.clone()),
        }
    }
}

pub enum Node {
    File(FileNode),
    Directory(Directory),
}

#[derive(Default)]
pub struct Directory {
    pub entries: BTreeMap<String, Node>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `dir` recursively.
    ///
    /// Names longer than 11 bytes are skipped with a warning. Symlinks and
    /// special files are skipped. Nesting deeper than [`MAX_DEPTH`] is an
    /// error.
    pub fn scan(dir: &Path) -> Result<Self> {
        Self::scan_at(dir, 0)
    }

    fn scan_at(dir: &Path, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            bail!("Directory {dir:?} is nested deeper than {MAX_DEPTH} levels");
        }

        let mut out = Directory::new();
        let read_dir =
            fs::read_dir(dir).with_context(|| format!("Failed to read directory {dir:?}"))?;

        for entry in read_dir {
            let entry = entry.with_context(|| format!("Failed to list {dir:?}"))?;
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping {path:?}: name is not valid UTF-8");
                continue;
            };
            if name.len() > SHORT_NAME_LEN {
                warn!(
                    "Skipping {path:?}: name is {} bytes, at most {SHORT_NAME_LEN} allowed",
                    name.len()
                );
                continue;
            }

            let metadata = fs::symlink_metadata(&path)
                .with_context(|| format!("Failed to stat {path:?}"))?;
            let ft = metadata.file_type();

            if ft.is_dir() {
                out.insert_dir(&name, Self::scan_at(&path, depth + 1)?);
            } else if ft.is_file() {
                out.insert_host_file(&name, path, metadata.len());
            } else {
                debug!("Skipping {path:?}: not a regular file or directory");
            }
        }
        Ok(out)
    }

    pub fn insert_host_file(&mut self, name: &str, path: PathBuf, len: u64) {
        self.entries
            .insert(name.to_string(), Node::File(FileNode::from_host(path, len)));
    }

    #[cfg(test)]
    pub fn insert_file(&mut self, name: &str, data: Vec<u8>) {
        let node = FileNode {
            len: data.len() as u64,
            source: FileSource::Memory(data),
        };
        self.entries.insert(name.to_string(), Node::File(node));
    }

    pub fn insert_dir(&mut self, name: &str, dir: Directory) {
        self.entries.insert(name.to_string(), Node::Directory(dir));
    }

    /// Number of files and directories at any depth.
    pub fn count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                Node::File(_) => 1,
                Node::Directory(d) => 1 + d.count(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scan_sorted_and_nested() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("B.TXT"), b"bee").unwrap();
        fs::write(tmp.path().join("A.TXT"), b"ay").unwrap();
        fs::create_dir(tmp.path().join("SUB")).unwrap();
        fs::write(tmp.path().join("SUB").join("C.BIN"), [0u8; 5]).unwrap();

        let root = Directory::scan(tmp.path()).unwrap();
        let names: Vec<&str> = root.entries.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["A.TXT", "B.TXT", "SUB"]);
        assert_eq!(root.count(), 4);

        match &root.entries["SUB"] {
            Node::Directory(sub) => match &sub.entries["C.BIN"] {
                Node::File(file) => {
                    assert_eq!(file.len, 5);
                    assert_eq!(file.load().unwrap(), vec![0u8; 5]);
                }
                Node::Directory(_) => panic!("C.BIN should be a file"),
            },
            Node::File(_) => panic!("SUB should be a directory"),
        }
    }

    #[test]
    fn test_scan_skips_long_names() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("TWELVECHARSX"), b"x").unwrap();
        fs::write(tmp.path().join("ELEVENCHARS"), b"x").unwrap();
        fs::create_dir(tmp.path().join("LONGDIRECTORY")).unwrap();

        let root = Directory::scan(tmp.path()).unwrap();
        let names: Vec<&str> = root.entries.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ELEVENCHARS"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("REAL"), b"x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("REAL"), tmp.path().join("LINK")).unwrap();

        let root = Directory::scan(tmp.path()).unwrap();
        assert_eq!(root.entries.len(), 1);
        assert!(root.entries.contains_key("REAL"));
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        let tmp = tempdir().unwrap();
        let err = Directory::scan(&tmp.path().join("nope")).err().unwrap();
        assert!(err.to_string().contains("Failed to read directory"));
    }

    #[test]
    fn test_scan_records_length_without_reading() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("HUGE.BIN");
        let file = fs::File::create(&path).unwrap();
        file.set_len(256 * 1024 * 1024).unwrap();

        let root = Directory::scan(tmp.path()).unwrap();
        match &root.entries["HUGE.BIN"] {
            Node::File(file) => assert_eq!(file.len, 256 * 1024 * 1024),
            Node::Directory(_) => panic!("HUGE.BIN should be a file"),
        }

        // Contents are only read on demand, and reflect the file at that time
        fs::write(&path, b"now small").unwrap();
        match &root.entries["HUGE.BIN"] {
            Node::File(file) => assert_eq!(file.load().unwrap(), b"now small"),
            Node::Directory(_) => unreachable!(),
        }
    }

    #[test]
    fn test_scan_depth_limit() {
        let tmp = tempdir().unwrap();
        let mut deepest = tmp.path().to_path_buf();
        for _ in 0..MAX_DEPTH {
            deepest.push("D");
        }
        fs::create_dir_all(&deepest).unwrap();
        assert!(Directory::scan(tmp.path()).is_ok());

        fs::create_dir(deepest.join("D")).unwrap();
        let err = Directory::scan(tmp.path()).err().unwrap();
        assert!(err.to_string().contains("nested deeper than 128 levels"));
    }
}
