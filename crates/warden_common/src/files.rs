//! File Operator
//!
//! Read, write, list and stat files inside the project root. Paths go
//! through the same resolution as the safety policy, so a path the policy
//! accepted names the same file here.

use crate::safety::SafetyPolicy;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File operation errors
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("File too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Cannot decode file (not valid UTF-8): {0}")]
    NotUtf8(String),

    #[error("Path is outside project root: {0}")]
    OutsideRoot(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteReport {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
    /// Files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<DirEntryInfo>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Project-scoped file access
#[derive(Debug, Clone)]
pub struct FileOperator {
    policy: SafetyPolicy,
    max_file_size: u64,
    show_hidden: bool,
}

impl FileOperator {
    pub fn new(policy: SafetyPolicy, max_file_size: u64, show_hidden: bool) -> Self {
        Self {
            policy,
            max_file_size,
            show_hidden,
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FileError> {
        let resolved = self.policy.resolve_path(path).map_err(|e| FileError::Io {
            path: path.to_string(),
            source: e,
        })?;
        if !resolved.starts_with(self.policy.project_root()) {
            return Err(FileError::OutsideRoot(path.to_string()));
        }
        Ok(resolved)
    }

    /// Read a UTF-8 text file
    pub fn read(&self, path: &str) -> Result<FileContent, FileError> {
        let resolved = self.resolve(path)?;
        let shown = display(&resolved);

        if !resolved.exists() {
            return Err(FileError::NotFound(path.to_string()));
        }
        let meta = fs::metadata(&resolved).map_err(|e| io_error(&shown, e))?;
        if !meta.is_file() {
            return Err(FileError::NotAFile(path.to_string()));
        }
        if meta.len() > self.max_file_size {
            return Err(FileError::TooLarge {
                size: meta.len(),
                max: self.max_file_size,
            });
        }

        let bytes = fs::read(&resolved).map_err(|e| io_error(&shown, e))?;
        let content = String::from_utf8(bytes).map_err(|_| FileError::NotUtf8(path.to_string()))?;

        Ok(FileContent {
            path: shown,
            content,
            size: meta.len(),
        })
    }

    /// Write text, creating parent directories
    pub fn write(&self, path: &str, content: &str) -> Result<WriteReport, FileError> {
        let resolved = self.resolve(path)?;
        let shown = display(&resolved);

        if resolved.is_dir() {
            return Err(FileError::NotAFile(path.to_string()));
        }
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(&shown, e))?;
        }
        fs::write(&resolved, content).map_err(|e| io_error(&shown, e))?;

        Ok(WriteReport {
            path: shown,
            size: content.len() as u64,
        })
    }

    /// List a directory: directories first, then by case-insensitive name
    pub fn list(&self, path: &str) -> Result<DirectoryListing, FileError> {
        let resolved = self.resolve(path)?;
        let shown = display(&resolved);

        if !resolved.exists() {
            return Err(FileError::NotFound(path.to_string()));
        }
        if !resolved.is_dir() {
            return Err(FileError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&resolved).map_err(|e| io_error(&shown, e))? {
            let entry = entry.map_err(|e| io_error(&shown, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.show_hidden && name.starts_with('.') {
                continue;
            }

            // Follows symlinks; dangling links are skipped
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(DirEntryInfo {
                name,
                kind,
                size: (kind == EntryKind::File).then(|| meta.len()),
            });
        }

        entries.sort_by(|a, b| {
            let a_dir = a.kind == EntryKind::Directory;
            let b_dir = b.kind == EntryKind::Directory;
            b_dir
                .cmp(&a_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        Ok(DirectoryListing {
            path: shown,
            count: entries.len(),
            entries,
        })
    }

    /// Name, kind, size and modification time
    pub fn info(&self, path: &str) -> Result<FileInfo, FileError> {
        let resolved = self.resolve(path)?;
        let shown = display(&resolved);

        if !resolved.exists() {
            return Err(FileError::NotFound(path.to_string()));
        }
        let meta = fs::metadata(&resolved).map_err(|e| io_error(&shown, e))?;

        Ok(FileInfo {
            name: resolved
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| shown.clone()),
            path: shown,
            kind: if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
        })
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn io_error(path: &str, source: io::Error) -> FileError {
    FileError::Io {
        path: path.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use tempfile::TempDir;

    fn operator(max_file_size: u64, show_hidden: bool) -> (TempDir, FileOperator) {
        let dir = tempfile::tempdir().unwrap();
        let config = SecurityConfig {
            project_root: dir.path().to_path_buf(),
            ..SecurityConfig::default()
        };
        let policy = SafetyPolicy::from_config(&config).unwrap();
        (dir, FileOperator::new(policy, max_file_size, show_hidden))
    }

    #[test]
    fn test_write_then_read() {
        let (dir, files) = operator(1024, false);

        let report = files.write("notes/today.txt", "hello").unwrap();
        assert_eq!(report.size, 5);
        assert!(dir.path().join("notes/today.txt").exists());

        let read = files.read("notes/today.txt").unwrap();
        assert_eq!(read.content, "hello");
        assert_eq!(read.size, 5);
    }

    #[test]
    fn test_read_errors() {
        let (dir, files) = operator(4, false);
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("big.txt"), "too big").unwrap();
        fs::write(dir.path().join("bin.dat"), [0xff, 0xfe]).unwrap();

        assert!(matches!(files.read("missing.txt"), Err(FileError::NotFound(_))));
        assert!(matches!(files.read("sub"), Err(FileError::NotAFile(_))));
        assert!(matches!(files.read("bin.dat"), Err(FileError::NotUtf8(_))));

        let err = files.read("big.txt").unwrap_err();
        assert_eq!(err.to_string(), "File too large: 7 bytes (max: 4)");
    }

    #[test]
    fn test_outside_root_rejected() {
        let (_dir, files) = operator(1024, false);
        assert!(matches!(files.read("../x.txt"), Err(FileError::OutsideRoot(_))));
        assert!(matches!(files.write("/tmp/../etc/x", "y"), Err(FileError::OutsideRoot(_))));
    }

    #[test]
    fn test_list_sorted_and_hidden_skipped() {
        let (dir, files) = operator(1024, false);
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("A.txt"), "a").unwrap();
        fs::write(dir.path().join(".env"), "x").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("Alpha")).unwrap();

        let listing = files.list(".").unwrap();
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "A.txt", "b.txt"]);
        assert_eq!(listing.count, 4);
        assert_eq!(listing.entries[2].size, Some(1));
        assert_eq!(listing.entries[0].size, None);
    }

    #[test]
    fn test_list_show_hidden() {
        let (dir, files) = operator(1024, true);
        fs::write(dir.path().join(".env"), "x").unwrap();
        assert_eq!(files.list(".").unwrap().count, 1);
    }

    #[test]
    fn test_list_not_a_directory() {
        let (dir, files) = operator(1024, false);
        fs::write(dir.path().join("f.txt"), "x").unwrap();
        assert!(matches!(files.list("f.txt"), Err(FileError::NotADirectory(_))));
        assert!(matches!(files.list("nope"), Err(FileError::NotFound(_))));
    }

    #[test]
    fn test_info() {
        let (dir, files) = operator(1024, false);
        fs::write(dir.path().join("f.txt"), "abc").unwrap();

        let info = files.info("f.txt").unwrap();
        assert_eq!(info.name, "f.txt");
        assert_eq!(info.kind, EntryKind::File);
        assert_eq!(info.size, 3);
        assert!(info.modified.is_some());
    }
}
