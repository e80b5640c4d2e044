//! File discovery and change detection.
//!
//! [`walker::scan_tree`] lists indexable files with their size and mtime
//! without reading them. [`change::ChangeDetector`] compares that listing
//! against the file records of a previous build.

pub mod change;
pub mod walker;

pub use change::{hash_bytes, hash_file, ChangeDetector, ChangeSet};
pub use walker::{scan_tree, FileStat, Language, ScanOptions};
