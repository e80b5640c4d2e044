use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use codesense_core::FileRecord;
use sha2::{Digest, Sha256};

use crate::walker::FileStat;

/// Classification of the current file listing against a previous build.
///
/// Every current path lands in exactly one of `new`, `modified`,
/// `unchanged`. `restamped` is the subset of `unchanged` whose size or
/// mtime moved while the content hash stayed the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    pub restamped: Vec<FileStat>,
}

impl ChangeSet {
    /// A change set that treats every file as new.
    pub fn all_new(current: &[FileStat]) -> Self {
        Self {
            new: current.iter().map(|f| f.path.clone()).collect(),
            ..Self::default()
        }
    }

    /// True when nothing needs to be written.
    pub fn is_noop(&self) -> bool {
        self.new.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.restamped.is_empty()
    }

    /// True when some file content changed or disappeared.
    pub fn has_content_changes(&self) -> bool {
        !(self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty())
    }
}

/// Decides which files changed since their [`FileRecord`]s were written.
///
/// Size and mtime are a fast path: if both match the record exactly the file
/// is unchanged without being read. Otherwise the file is re-hashed and the
/// hash decides.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use codesense_scan::{ChangeDetector, FileStat};
///
/// let detector = ChangeDetector::new("/repo");
/// let current = vec![FileStat { path: "a.py".into(), mtime_ns: 1, size: 3 }];
/// let changes = detector.diff(&BTreeMap::new(), &current);
/// assert_eq!(changes.new, vec!["a.py".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    root: PathBuf,
}

impl ChangeDetector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn diff(&self, previous: &BTreeMap<String, FileRecord>, current: &[FileStat]) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut seen = HashSet::with_capacity(current.len());

        for stat in current {
            seen.insert(stat.path.as_str());
            let Some(record) = previous.get(&stat.path) else {
                changes.new.push(stat.path.clone());
                continue;
            };

            if record.size == stat.size && record.mtime_ns == stat.mtime_ns {
                changes.unchanged.push(stat.path.clone());
                continue;
            }

            match hash_file(&self.root.join(&stat.path)) {
                Ok(hash) if hash == record.content_hash => {
                    log::debug!("{}: touched but content unchanged", stat.path);
                    changes.unchanged.push(stat.path.clone());
                    changes.restamped.push(stat.clone());
                }
                Ok(_) => changes.modified.push(stat.path.clone()),
                Err(e) => {
                    log::debug!("{}: re-hash failed ({e}), treating as modified", stat.path);
                    changes.modified.push(stat.path.clone());
                }
            }
        }

        changes.deleted = previous
            .keys()
            .filter(|path| !seen.contains(path.as_str()))
            .cloned()
            .collect();

        changes
    }
}

/// Lowercase hex SHA-256 of `bytes`.
///
/// # Examples
///
/// ```
/// use codesense_scan::hash_bytes;
///
/// assert_eq!(
///     hash_bytes(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stream a file through SHA-256.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(path: &str, content: &[u8], mtime_ns: i64) -> FileRecord {
        FileRecord {
            file_path: path.into(),
            content_hash: hash_bytes(content),
            mtime_ns,
            size: content.len() as u64,
            chunk_ids: vec![format!("{path}#0")],
        }
    }

    fn stat(path: &str, mtime_ns: i64, size: u64) -> FileStat {
        FileStat {
            path: path.into(),
            mtime_ns,
            size,
        }
    }

    #[test]
    fn classifies_new_deleted_and_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut previous = BTreeMap::new();
        previous.insert("kept.py".to_string(), record("kept.py", b"x = 1\n", 10));
        previous.insert("gone.py".to_string(), record("gone.py", b"y = 2\n", 10));

        let current = vec![stat("kept.py", 10, 6), stat("fresh.py", 11, 4)];
        let changes = ChangeDetector::new(dir.path()).diff(&previous, &current);

        assert_eq!(changes.new, vec!["fresh.py".to_string()]);
        assert_eq!(changes.deleted, vec!["gone.py".to_string()]);
        assert_eq!(changes.unchanged, vec!["kept.py".to_string()]);
        assert!(changes.modified.is_empty());
        assert!(changes.restamped.is_empty());
        assert!(!changes.is_noop());
    }

    #[test]
    fn touch_without_edit_is_unchanged_but_restamped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"x = 1\n").unwrap();

        let mut previous = BTreeMap::new();
        previous.insert("a.py".to_string(), record("a.py", b"x = 1\n", 10));

        let current = vec![stat("a.py", 99, 6)];
        let changes = ChangeDetector::new(dir.path()).diff(&previous, &current);

        assert_eq!(changes.unchanged, vec!["a.py".to_string()]);
        assert_eq!(changes.restamped, vec![stat("a.py", 99, 6)]);
        assert!(changes.modified.is_empty());
        assert!(!changes.has_content_changes());
        assert!(!changes.is_noop());
    }

    #[test]
    fn edited_content_is_modified() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"x = 2\n").unwrap();

        let mut previous = BTreeMap::new();
        previous.insert("a.py".to_string(), record("a.py", b"x = 1\n", 10));

        let changes = ChangeDetector::new(dir.path()).diff(&previous, &[stat("a.py", 20, 6)]);
        assert_eq!(changes.modified, vec!["a.py".to_string()]);
        assert!(changes.unchanged.is_empty());
    }

    #[test]
    fn unreadable_file_with_new_stat_is_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut previous = BTreeMap::new();
        previous.insert("a.py".to_string(), record("a.py", b"x = 1\n", 10));

        let changes = ChangeDetector::new(dir.path()).diff(&previous, &[stat("a.py", 20, 6)]);
        assert_eq!(changes.modified, vec!["a.py".to_string()]);
    }

    #[test]
    fn matching_stat_skips_hashing() {
        // The file does not exist on disk; a matching stat must not try to read it.
        let dir = tempfile::tempdir().unwrap();
        let mut previous = BTreeMap::new();
        previous.insert("a.py".to_string(), record("a.py", b"x = 1\n", 10));

        let changes = ChangeDetector::new(dir.path()).diff(&previous, &[stat("a.py", 10, 6)]);
        assert_eq!(changes.unchanged, vec!["a.py".to_string()]);
        assert!(changes.is_noop());
    }

    #[test]
    fn all_new_lists_every_path() {
        let current = vec![stat("a.py", 1, 1), stat("b.py", 1, 1)];
        let changes = ChangeSet::all_new(&current);
        assert_eq!(changes.new, vec!["a.py".to_string(), "b.py".to_string()]);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content = vec![7u8; 200_000];
        fs::write(&path, &content).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&content));
    }
}
