//! Nearest-neighbor search over a committed snapshot.

use std::sync::Arc;

use codesense_core::{Chunk, ChunkKind, CodesenseError, SearchResult};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::framework::{
    DJANGO_MODEL, DJANGO_SERIALIZER, DJANGO_VIEW, FASTAPI_ROUTE, FLASK_BLUEPRINT, FLASK_ROUTE,
    PYDANTIC_MODEL,
};
use crate::snapshot::IndexSnapshot;
use crate::store::IndexStore;

/// Candidates examined per requested result when a filter is active.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 10;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub top_k: usize,
    pub filter: Option<SearchFilter>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// # Errors
    ///
    /// Returns [`CodesenseError::InvalidQuery`] for a blank query or a zero `top_k`.
    pub fn validate(&self) -> Result<(), CodesenseError> {
        if self.text.trim().is_empty() {
            return Err(CodesenseError::InvalidQuery("query must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(CodesenseError::InvalidQuery("top_k must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Restricts results by category, kind and name. All set fields must match.
///
/// # Examples
///
/// ```
/// use codesense_core::{Callable, Chunk, Entity};
/// use codesense_lens::SearchFilter;
///
/// let chunk = Chunk {
///     id: "api.py#0".into(),
///     file_path: "api.py".into(),
///     start_line: 1,
///     end_line: 2,
///     framework_tag: Some("fastapi_route".into()),
///     text: "@app.get('/users')\ndef list_users(): ...".into(),
///     entity: Entity::Function(Callable { name: "list_users".into(), ..Callable::default() }),
/// };
///
/// assert!(SearchFilter::category("route").matches(&chunk));
/// assert!(SearchFilter::category("fastapi").matches(&chunk));
/// assert!(!SearchFilter::category("model").matches(&chunk));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// A category (`model`, `route`, `django`, ...), a framework tag, or a
    /// chunk kind.
    pub category: Option<String>,
    pub kind: Option<ChunkKind>,
    /// Case-insensitive substring of the chunk's name or text.
    pub name_contains: Option<String>,
}

impl SearchFilter {
    pub fn category(category: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            ..Self::default()
        }
    }

    /// True when no field constrains anything.
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.category) && self.kind.is_none() && blank(&self.name_contains)
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(category) = self.category.as_deref().filter(|c| !c.trim().is_empty()) {
            if !category_matches(category, chunk) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if chunk.kind() != kind {
                return false;
            }
        }
        if let Some(needle) = self.name_contains.as_deref().filter(|n| !n.trim().is_empty()) {
            let needle = needle.to_lowercase();
            let in_name = chunk
                .name()
                .is_some_and(|name| name.to_lowercase().contains(&needle));
            if !in_name && !chunk.text.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

fn category_matches(category: &str, chunk: &Chunk) -> bool {
    let category = category.trim().to_lowercase();
    let tag = chunk.framework_tag.as_deref().unwrap_or("");
    let kind = chunk.kind().as_str();

    let allowed: &[&str] = match category.as_str() {
        "model" => &[DJANGO_MODEL, PYDANTIC_MODEL],
        "route" => &[FASTAPI_ROUTE, FLASK_ROUTE],
        "view" => &[DJANGO_VIEW],
        "serializer" => &[DJANGO_SERIALIZER],
        "function" => &["function"],
        "class" => &["class"],
        "method" => &["method"],
        "django" => &[DJANGO_MODEL, DJANGO_VIEW, DJANGO_SERIALIZER],
        "fastapi" => &[FASTAPI_ROUTE, PYDANTIC_MODEL],
        "flask" => &[FLASK_ROUTE, FLASK_BLUEPRINT],
        _ => &[],
    };
    if !allowed.is_empty() {
        return allowed.contains(&tag) || allowed.contains(&kind);
    }

    // Tags and partial names, e.g. "pydantic" or "django_view".
    tag.contains(category.as_str()) || kind.contains(category.as_str())
}

/// Answers queries against one index.
///
/// The engine holds an immutable snapshot. [`SearchEngine::refresh`] swaps
/// in a newer committed generation when one exists.
pub struct SearchEngine {
    store: IndexStore,
    name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    snapshot: Arc<IndexSnapshot>,
    overfetch_factor: usize,
}

impl SearchEngine {
    /// Load index `name` for searching with `embedder`.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::IndexNotFound`], a load error, or
    /// [`CodesenseError::ModelMismatch`] if the index was built with a
    /// different model.
    pub fn open(
        store: IndexStore,
        name: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, CodesenseError> {
        let snapshot = store.load(name)?;
        check_model(&snapshot, embedder.as_ref())?;
        Ok(Self {
            store,
            name: name.to_string(),
            embedder,
            snapshot: Arc::new(snapshot),
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
        })
    }

    pub fn with_overfetch(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.snapshot
    }

    /// Reload the snapshot if a newer generation was committed. Returns
    /// whether anything changed.
    ///
    /// # Errors
    ///
    /// Same as [`SearchEngine::open`].
    pub fn refresh(&mut self) -> Result<bool, CodesenseError> {
        if self.store.generation(&self.name)? == self.snapshot.generation {
            return Ok(false);
        }
        let snapshot = self.store.load(&self.name)?;
        check_model(&snapshot, self.embedder.as_ref())?;
        log::debug!(
            "index '{}' refreshed to generation {}",
            self.name,
            snapshot.generation
        );
        self.snapshot = Arc::new(snapshot);
        Ok(true)
    }

    /// Rank chunks by squared L2 distance to the embedded query.
    ///
    /// Equal distances keep `row_index` order. `top_k` is clamped to the
    /// number of rows. With a filter, the `top_k * overfetch_factor` nearest
    /// rows are filtered and the first `top_k` survivors returned, so fewer
    /// than `top_k` results are possible.
    ///
    /// # Errors
    ///
    /// - [`CodesenseError::InvalidQuery`] for a blank query or zero `top_k`.
    /// - [`CodesenseError::DimensionMismatch`] if the query vector has the
    ///   wrong length.
    /// - Provider errors from embedding the query.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, CodesenseError> {
        query.validate()?;
        let snapshot = Arc::clone(&self.snapshot);
        if snapshot.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(&query.text).await?;
        if let Some(expected) = snapshot.dimension {
            if vector.len() != expected {
                return Err(CodesenseError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let rows = snapshot.vectors.len();
        let top_k = query.top_k.min(rows);
        let filter = query.filter.as_ref().filter(|f| !f.is_empty());
        let pool = match filter {
            Some(_) => query.top_k.saturating_mul(self.overfetch_factor).min(rows),
            None => top_k,
        };

        let mut results = Vec::with_capacity(top_k);
        for (row, distance) in snapshot.vectors.nearest(&vector, pool) {
            let chunk_id = &snapshot.vectors.rows()[row].chunk_id;
            let Some(chunk) = snapshot.chunks.get(chunk_id) else {
                continue;
            };
            if filter.is_some_and(|f| !f.matches(chunk)) {
                continue;
            }
            results.push(SearchResult {
                rank: results.len() + 1,
                file_path: chunk.file_path.clone(),
                score: distance,
                content_hash: snapshot
                    .files
                    .get(&chunk.file_path)
                    .map(|r| r.content_hash.clone())
                    .unwrap_or_default(),
                chunk: chunk.clone(),
            });
            if results.len() == top_k {
                break;
            }
        }
        Ok(results)
    }
}

fn check_model(
    snapshot: &IndexSnapshot,
    embedder: &dyn EmbeddingProvider,
) -> Result<(), CodesenseError> {
    if snapshot.model_id != embedder.model_id() {
        return Err(CodesenseError::ModelMismatch {
            expected: snapshot.model_id.clone(),
            actual: embedder.model_id().to_string(),
        });
    }
    Ok(())
}
