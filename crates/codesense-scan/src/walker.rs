use std::path::{Component, Path};
use std::time::UNIX_EPOCH;

use codesense_core::{CodesenseError, IndexingConfig};

/// A file discovered under the index root, described by cheap metadata only.
///
/// # Examples
///
/// ```
/// use codesense_scan::FileStat;
///
/// let stat = FileStat { path: "src/app.py".into(), mtime_ns: 1, size: 42 };
/// assert_eq!(stat.path, "src/app.py");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// POSIX path relative to the root.
    pub path: String,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    /// Size in bytes.
    pub size: u64,
}

/// Programming language detected from file extension.
///
/// # Examples
///
/// ```
/// use codesense_scan::Language;
///
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_path("web/App.tsx"), Language::Tsx);
/// assert_eq!(Language::from_path("README"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Rust,
    TypeScript,
    Tsx,
    JavaScript,
    Go,
    Java,
    Unknown,
}

impl Language {
    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" | "pyi" => Language::Python,
            "rs" => Language::Rust,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a relative path.
    pub fn from_path(path: &str) -> Self {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::Unknown => "unknown",
        }
    }
}

/// What [`scan_tree`] includes.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Directory names never descended into.
    pub ignored_dirs: Vec<String>,
    /// Skip directories whose name starts with `.`.
    pub skip_hidden_dirs: bool,
    /// Honor `.gitignore` / `.ignore` files.
    pub respect_gitignore: bool,
    /// Extensions to include. Empty means every [`Language`] except `Unknown`.
    pub extensions: Vec<String>,
    /// Larger files are skipped.
    pub max_file_size: u64,
}

impl ScanOptions {
    pub fn from_config(config: &IndexingConfig) -> Self {
        Self {
            ignored_dirs: config.ignored_dirs.clone(),
            skip_hidden_dirs: config.skip_hidden_dirs,
            respect_gitignore: config.respect_gitignore,
            extensions: config.extensions.clone(),
            max_file_size: config.max_file_size,
        }
    }

    fn accepts_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        if self.extensions.is_empty() {
            Language::from_extension(ext) != Language::Unknown
        } else {
            self.extensions
                .iter()
                .any(|allowed| allowed.trim_start_matches('.') == ext)
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&IndexingConfig::default())
    }
}

/// List the indexable files under `root`, sorted by path.
///
/// Only metadata is read. Ignored and (optionally) hidden directories are
/// pruned, oversized files and files with unwanted extensions are skipped.
///
/// # Errors
///
/// Returns [`CodesenseError::FileNotFound`] if `root` is not a directory.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use codesense_scan::{scan_tree, ScanOptions};
///
/// let files = scan_tree(Path::new("."), &ScanOptions::default()).unwrap();
/// for f in &files {
///     println!("{} ({} bytes)", f.path, f.size);
/// }
/// ```
pub fn scan_tree(root: &Path, options: &ScanOptions) -> Result<Vec<FileStat>, CodesenseError> {
    if !root.is_dir() {
        return Err(CodesenseError::FileNotFound(root.to_path_buf()));
    }

    let ignored = options.ignored_dirs.clone();
    let skip_hidden = options.skip_hidden_dirs;
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .ignore(options.respect_gitignore)
        .parents(options.respect_gitignore)
        .require_git(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if skip_hidden && name.starts_with('.') {
                return false;
            }
            !ignored.iter().any(|dir| *dir == name)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        if !options.accepts_extension(path) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::debug!("skipping {}: {e}", path.display());
                continue;
            }
        };
        if metadata.len() > options.max_file_size {
            log::debug!(
                "skipping {}: {} bytes exceeds limit",
                path.display(),
                metadata.len()
            );
            continue;
        }

        let Some(relative) = path.strip_prefix(root).ok().and_then(posix_path) else {
            log::warn!("skipping {}: path is not valid UTF-8", path.display());
            continue;
        };

        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        files.push(FileStat {
            path: relative,
            mtime_ns,
            size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn posix_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn paths(files: &[FileStat]) -> Vec<&str> {
        files.iter().map(|f| f.path.as_str()).collect()
    }

    fn make_temp_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("app/api")).unwrap();
        fs::write(root.join("app/models.py"), "class User: pass\n").unwrap();
        fs::write(root.join("app/api/routes.py"), "def index(): pass\n").unwrap();
        fs::write(root.join("main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("web.ts"), "function run() {}\n").unwrap();
        fs::write(root.join("README.md"), "# Hello\n").unwrap();

        dir
    }

    #[test]
    fn scan_lists_known_languages_sorted() {
        let dir = make_temp_repo();
        let files = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(
            paths(&files),
            vec!["app/api/routes.py", "app/models.py", "main.rs", "web.ts"]
        );
        let models = files.iter().find(|f| f.path == "app/models.py").unwrap();
        assert_eq!(models.size, 17);
        assert!(models.mtime_ns > 0);
    }

    #[test]
    fn scan_prunes_ignored_and_hidden_dirs() {
        let dir = make_temp_repo();
        let root = dir.path();
        for ignored in ["node_modules/pkg", "venv/lib", "__pycache__", ".cache"] {
            fs::create_dir_all(root.join(ignored)).unwrap();
            fs::write(root.join(ignored).join("x.py"), "x = 1\n").unwrap();
        }

        let files = scan_tree(root, &ScanOptions::default()).unwrap();
        for f in &files {
            assert!(f.path.starts_with("app/") || !f.path.contains('/'), "{}", f.path);
        }

        let options = ScanOptions {
            skip_hidden_dirs: false,
            ..ScanOptions::default()
        };
        let files = scan_tree(root, &options).unwrap();
        assert!(paths(&files).contains(&".cache/x.py"));
    }

    #[test]
    fn scan_respects_gitignore() {
        let dir = make_temp_repo();
        let root = dir.path();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("generated/out.py"), "x = 1\n").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        let files = scan_tree(root, &ScanOptions::default()).unwrap();
        assert!(!paths(&files).iter().any(|p| p.starts_with("generated")));

        let options = ScanOptions {
            respect_gitignore: false,
            ..ScanOptions::default()
        };
        let files = scan_tree(root, &options).unwrap();
        assert!(paths(&files).contains(&"generated/out.py"));
    }

    #[test]
    fn scan_honors_extension_list_and_size_limit() {
        let dir = make_temp_repo();
        let root = dir.path();
        fs::write(root.join("huge.py"), "x".repeat(2048)).unwrap();

        let options = ScanOptions {
            extensions: vec!["py".into(), ".md".into()],
            max_file_size: 1024,
            ..ScanOptions::default()
        };
        let files = scan_tree(root, &options).unwrap();
        assert_eq!(
            paths(&files),
            vec!["README.md", "app/api/routes.py", "app/models.py"]
        );
    }

    #[test]
    fn scan_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan_tree(&dir.path().join("nope"), &ScanOptions::default());
        assert!(matches!(result, Err(CodesenseError::FileNotFound(_))));
    }

    #[test]
    fn language_detection() {
        assert_eq!(Language::from_path("a/b.rs"), Language::Rust);
        assert_eq!(Language::from_path("a/b.jsx"), Language::JavaScript);
        assert_eq!(Language::from_path("Main.java"), Language::Java);
        assert_eq!(Language::from_path("Makefile"), Language::Unknown);
        assert_eq!(Language::Go.name(), "go");
    }
}
