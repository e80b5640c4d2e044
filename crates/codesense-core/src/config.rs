use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CodesenseError;

/// Top-level configuration loaded from `.codesense.toml`.
///
/// Every section and field has a default, so an empty file is valid.
/// Nothing here names a "current" index: index names are always passed
/// explicitly to each operation.
///
/// # Examples
///
/// ```
/// use codesense_core::CodesenseConfig;
///
/// let config = CodesenseConfig::default();
/// assert_eq!(config.search.default_top_k, 5);
/// assert_eq!(config.search.overfetch_factor, 10);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodesenseConfig {
    /// Where indexes are stored.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// File discovery and chunking settings.
    #[serde(default)]
    pub indexing: IndexingConfig,
    /// Query settings.
    #[serde(default)]
    pub search: SearchConfig,
}

impl CodesenseConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::Io`] if the file cannot be read, or
    /// [`CodesenseError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, CodesenseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use codesense_core::CodesenseConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// default_top_k = 10
    /// "#;
    /// let config = CodesenseConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.default_top_k, 10);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CodesenseError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Index storage location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per index.
    /// Defaults to `~/.codesense/indexes`.
    pub index_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the configured index directory, falling back to the home directory default.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::Config`] if no directory is configured and
    /// the home directory cannot be determined.
    pub fn resolve_index_dir(&self) -> Result<PathBuf, CodesenseError> {
        if let Some(dir) = &self.index_dir {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(".codesense").join("indexes"))
            .ok_or_else(|| {
                CodesenseError::Config(
                    "cannot determine home directory: set storage.index_dir in .codesense.toml"
                        .into(),
                )
            })
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Offline feature-hashing embedder. Needs no network or key.
    #[default]
    Hashing,
    /// Voyage AI embeddings API.
    Voyage,
    /// Any OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingProviderKind::Hashing => write!(f, "hashing"),
            EmbeddingProviderKind::Voyage => write!(f, "voyage"),
            EmbeddingProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Embedding provider configuration.
///
/// # Examples
///
/// ```
/// use codesense_core::{EmbeddingConfig, EmbeddingProviderKind};
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, EmbeddingProviderKind::Hashing);
/// assert_eq!(config.model_name(), "hashing-384");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend to use.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Model identifier. Defaults depend on the provider.
    pub model: Option<String>,
    /// API key. Falls back to `VOYAGE_API_KEY` / `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Vector dimension for the hashing provider.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Maximum texts per provider request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    64
}

impl EmbeddingConfig {
    /// The model id this configuration resolves to.
    pub fn model_name(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider {
            EmbeddingProviderKind::Hashing => format!("hashing-{}", self.dimensions),
            EmbeddingProviderKind::Voyage => "voyage-code-3".into(),
            EmbeddingProviderKind::OpenAi => "text-embedding-3-small".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: None,
            api_key: None,
            base_url: None,
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

/// How source files are split into chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingMode {
    /// Functions, classes and methods via tree-sitter.
    #[default]
    Ast,
    /// One chunk per file.
    WholeFile,
}

/// File discovery and chunking configuration.
///
/// # Examples
///
/// ```
/// use codesense_core::IndexingConfig;
///
/// let config = IndexingConfig::default();
/// assert!(config.ignored_dirs.iter().any(|d| d == "node_modules"));
/// assert!(config.skip_hidden_dirs);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Directory names never descended into.
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
    /// Skip directories whose name starts with `.`.
    #[serde(default = "default_true")]
    pub skip_hidden_dirs: bool,
    /// Honor `.gitignore` and `.ignore` files.
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    /// File extensions to index (without the dot). Empty means every supported language.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Files larger than this many bytes are skipped.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Chunking strategy.
    #[serde(default)]
    pub chunking: ChunkingMode,
}

fn default_ignored_dirs() -> Vec<String> {
    [
        ".git",
        ".svn",
        ".hg",
        "__pycache__",
        ".pytest_cache",
        ".mypy_cache",
        "venv",
        ".venv",
        "env",
        ".env",
        "node_modules",
        ".idea",
        ".vscode",
        "target",
        "build",
        "dist",
        ".eggs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    1_048_576
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            ignored_dirs: default_ignored_dirs(),
            skip_hidden_dirs: true,
            respect_gitignore: true,
            extensions: Vec::new(),
            max_file_size: default_max_file_size(),
            chunking: ChunkingMode::default(),
        }
    }
}

/// Query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results returned when `--top-k` is not given.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Candidate pool multiplier used when a filter is active.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    /// Derive a filter from query keywords when none is given.
    #[serde(default = "default_true")]
    pub detect_intent: bool,
    /// Lines of chunk text shown per result in text output.
    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_overfetch_factor() -> usize {
    10
}

fn default_preview_lines() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
            detect_intent: true,
            preview_lines: default_preview_lines(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = CodesenseConfig::default();
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashing);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.indexing.max_file_size, 1_048_576);
        assert_eq!(config.indexing.chunking, ChunkingMode::Ast);
        assert!(config.indexing.respect_gitignore);
        assert!(config.search.detect_intent);
        assert!(config.storage.index_dir.is_none());
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[storage]
index_dir = "/var/lib/codesense"

[embedding]
provider = "voyage"
api_key = "secret"
batch_size = 32

[indexing]
ignored_dirs = ["vendor"]
skip_hidden_dirs = false
extensions = ["py"]
chunking = "whole_file"

[search]
default_top_k = 8
overfetch_factor = 4
detect_intent = false
"#;
        let config = CodesenseConfig::from_toml(toml).unwrap();
        assert_eq!(
            config.storage.resolve_index_dir().unwrap(),
            PathBuf::from("/var/lib/codesense")
        );
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Voyage);
        assert_eq!(config.embedding.model_name(), "voyage-code-3");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.indexing.ignored_dirs, vec!["vendor".to_string()]);
        assert!(!config.indexing.skip_hidden_dirs);
        assert!(config.indexing.respect_gitignore);
        assert_eq!(config.indexing.chunking, ChunkingMode::WholeFile);
        assert_eq!(config.search.default_top_k, 8);
        assert_eq!(config.search.overfetch_factor, 4);
        assert!(!config.search.detect_intent);
        assert_eq!(config.search.preview_lines, 3);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = CodesenseConfig::from_toml("").unwrap();
        assert_eq!(config.search.default_top_k, 5);
        assert_eq!(config.embedding.model_name(), "hashing-384");
    }

    #[test]
    fn explicit_model_wins() {
        let config = CodesenseConfig::from_toml(
            r#"
[embedding]
provider = "openai"
model = "text-embedding-3-large"
"#,
        )
        .unwrap();
        assert_eq!(config.embedding.model_name(), "text-embedding-3-large");
    }

    #[test]
    fn unknown_provider_is_error() {
        let result = CodesenseConfig::from_toml("[embedding]\nprovider = \"magic\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_toml_is_error() {
        let result = CodesenseConfig::from_toml("this is not [valid toml");
        assert!(result.is_err());
    }
}
