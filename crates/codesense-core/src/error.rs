use std::path::PathBuf;

/// Errors that can occur across codesense.
///
/// Library crates return this type directly. The binary turns it into a
/// `miette` report, which renders the `help` text attached to the variants
/// users can act on.
///
/// Extraction failures are not errors: they are collected as
/// [`ExtractionWarning`](crate::ExtractionWarning)s in the build report.
///
/// # Examples
///
/// ```
/// use codesense_core::CodesenseError;
///
/// let err = CodesenseError::IndexNotFound("backend".into());
/// assert!(err.to_string().contains("backend"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CodesenseError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// SQLite failure while reading or writing an index.
    #[error("database error: {0}")]
    Database(String),

    /// Embedding provider failure, including malformed provider output.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file or directory was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// No committed snapshot exists under this index name.
    #[error("index '{0}' not found")]
    #[diagnostic(help(
        "create it with `codesense index <dir> --name <name>`, or run `codesense list` to see existing indexes"
    ))]
    IndexNotFound(String),

    /// Empty query text or a `top_k` of zero.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A vector's length differs from the index dimension.
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    #[diagnostic(help(
        "the embedding model changed since the index was built; rebuild it with `codesense index`"
    ))]
    DimensionMismatch {
        /// Dimension recorded in the snapshot.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },

    /// The configured embedding model differs from the one the index was built with.
    #[error("embedding model mismatch: index was built with '{expected}', current model is '{actual}'")]
    #[diagnostic(help("vectors from different models cannot be mixed; rebuild with `codesense index`"))]
    ModelMismatch {
        /// Model id recorded in the snapshot.
        expected: String,
        /// Model id of the active provider.
        actual: String,
    },

    /// The persisted snapshot failed structural validation.
    #[error("corrupt index snapshot: {0}")]
    #[diagnostic(help("delete the index with `codesense delete` and rebuild it"))]
    CorruptSnapshot(String),

    /// Index names must be usable as a single directory component.
    #[error("invalid index name '{0}': use letters, digits, '.', '_' or '-', not starting with '.'")]
    InvalidIndexName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CodesenseError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = CodesenseError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn dimension_mismatch_names_both_sides() {
        let err = CodesenseError::DimensionMismatch {
            expected: 384,
            actual: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn index_not_found_has_help() {
        use miette::Diagnostic;

        let err = CodesenseError::IndexNotFound("api".into());
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("codesense index"));
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = CodesenseError::FileNotFound(PathBuf::from("/tmp/missing"));
        assert!(err.to_string().contains("/tmp/missing"));
    }
}
