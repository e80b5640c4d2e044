//! High-level operations wired from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use codesense_core::{ChunkingMode, CodesenseConfig, CodesenseError, SearchResult};
use codesense_scan::ScanOptions;
use serde::Serialize;

use crate::builder::{BuildReport, BuildRequest, IndexBuilder};
use crate::chunker::{ChunkExtractor, TreeSitterExtractor, WholeFileExtractor};
use crate::embedding::{provider_from_config, EmbeddingProvider};
use crate::intent::detect_intent;
use crate::lock;
use crate::search::{SearchEngine, SearchFilter, SearchQuery};
use crate::store::{IndexInfo, IndexStore};

/// Per-call search settings. Unset fields fall back to the configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub filter: Option<SearchFilter>,
    /// Run an incremental update before searching.
    pub auto_update: bool,
    /// Derive a category filter from the query when no filter is given.
    pub detect_intent: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    /// Report of the auto-update, when one ran and succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<BuildReport>,
    /// Why the auto-update failed. The search still ran on the last
    /// committed snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_intent: Option<String>,
}

/// Indexing and search over the indexes in one directory.
///
/// # Examples
///
/// ```no_run
/// use codesense_core::CodesenseConfig;
/// use codesense_lens::{Codesense, SearchOptions};
///
/// # async fn run() -> Result<(), codesense_core::CodesenseError> {
/// let codesense = Codesense::new(CodesenseConfig::default())?;
/// codesense.index(std::path::Path::new("."), "my-repo", None).await?;
/// let outcome = codesense
///     .search("my-repo", "where are users created", SearchOptions::default())
///     .await?;
/// for hit in outcome.results {
///     println!("{} {}:{}", hit.rank, hit.file_path, hit.chunk.start_line);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Codesense {
    config: CodesenseConfig,
    store: IndexStore,
}

impl Codesense {
    /// # Errors
    ///
    /// Returns [`CodesenseError::Config`] if no index directory is configured
    /// and the home directory cannot be found.
    pub fn new(config: CodesenseConfig) -> Result<Self, CodesenseError> {
        let index_dir = config.storage.resolve_index_dir()?;
        Ok(Self::with_index_dir(config, index_dir))
    }

    pub fn with_index_dir(config: CodesenseConfig, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            store: IndexStore::new(index_dir),
        }
    }

    pub fn config(&self) -> &CodesenseConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    fn extractor(&self) -> Arc<dyn ChunkExtractor> {
        match self.config.indexing.chunking {
            ChunkingMode::Ast => Arc::new(TreeSitterExtractor::new()),
            ChunkingMode::WholeFile => Arc::new(WholeFileExtractor),
        }
    }

    fn embedder(&self, model: Option<&str>) -> Result<Arc<dyn EmbeddingProvider>, CodesenseError> {
        provider_from_config(&self.config.embedding, model)
    }

    fn builder(&self, embedder: Arc<dyn EmbeddingProvider>) -> IndexBuilder {
        IndexBuilder::new(
            self.store.clone(),
            self.extractor(),
            embedder,
            ScanOptions::from_config(&self.config.indexing),
        )
    }

    /// Full build of `root` into index `name`, replacing any previous
    /// contents. `model` overrides the configured embedding model.
    ///
    /// # Errors
    ///
    /// See [`IndexBuilder::build`].
    pub async fn index(
        &self,
        root: &Path,
        name: &str,
        model: Option<&str>,
    ) -> Result<BuildReport, CodesenseError> {
        let embedder = self.embedder(model)?;
        self.builder(embedder)
            .build(&BuildRequest::full(name, root))
            .await
    }

    /// Incremental update of index `name` with the model it was built with.
    ///
    /// # Errors
    ///
    /// See [`IndexBuilder::build`].
    pub async fn update(&self, name: &str) -> Result<BuildReport, CodesenseError> {
        let model = self.store.model_id(name)?;
        let embedder = self.embedder(Some(&model))?;
        self.builder(embedder)
            .build(&BuildRequest::incremental(name))
            .await
    }

    /// Search index `name`.
    ///
    /// An explicit filter always wins over intent detection. A failed
    /// auto-update is reported in the outcome and the search proceeds on the
    /// last committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::InvalidQuery`] before touching the index,
    /// [`CodesenseError::IndexNotFound`] for unknown names, and any error
    /// from [`SearchEngine::search`].
    pub async fn search(
        &self,
        name: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchOutcome, CodesenseError> {
        let top_k = options.top_k.unwrap_or(self.config.search.default_top_k);
        let mut search_query = SearchQuery::new(query, top_k);
        search_query.validate()?;

        let model = self.store.model_id(name)?;
        let embedder = self.embedder(Some(&model))?;
        let mut engine = SearchEngine::open(self.store.clone(), name, Arc::clone(&embedder))?
            .with_overfetch(self.config.search.overfetch_factor);

        let (update, update_error) = if options.auto_update {
            match self
                .builder(Arc::clone(&embedder))
                .build(&BuildRequest::incremental(name))
                .await
            {
                Ok(report) => {
                    engine.refresh()?;
                    (Some(report), None)
                }
                Err(e) => {
                    log::warn!("auto-update of '{name}' failed, searching the last committed snapshot: {e}");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        let explicit = options.filter.filter(|f| !f.is_empty());
        let detected = match explicit {
            None if options.detect_intent.unwrap_or(self.config.search.detect_intent) => {
                detect_intent(query)
            }
            _ => None,
        };
        if let Some(category) = detected {
            log::debug!("query intent: {category}");
        }
        search_query.filter = explicit.or_else(|| detected.map(SearchFilter::category));

        let results = engine.search(&search_query).await?;
        Ok(SearchOutcome {
            results,
            update,
            update_error,
            detected_intent: detected.map(String::from),
        })
    }

    /// # Errors
    ///
    /// See [`IndexStore::info`].
    pub fn info(&self, name: &str) -> Result<IndexInfo, CodesenseError> {
        self.store.info(name)
    }

    /// Delete index `name`, waiting for any running build to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::IndexNotFound`] for unknown names.
    pub async fn delete(&self, name: &str) -> Result<(), CodesenseError> {
        if !self.store.exists(name)? {
            return Err(CodesenseError::IndexNotFound(name.to_string()));
        }
        let _lock = lock::acquire(&self.store.lock_path(name)?).await?;
        self.store.delete(name)?;
        log::info!("deleted index '{name}'");
        Ok(())
    }

    /// # Errors
    ///
    /// See [`IndexStore::list`].
    pub fn list_indexes(&self) -> Result<Vec<String>, CodesenseError> {
        self.store.list()
    }
}
