//! Incremental index builds.
//!
//! A build loads the committed snapshot (or starts from nothing), reconciles
//! it with the files on disk, embeds only new and modified chunks in a single
//! provider call, and commits the result atomically. Any error before the
//! commit leaves the previous snapshot exactly as it was.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use codesense_core::{chunk_id, Chunk, CodesenseError, ExtractionWarning, FileRecord};
use codesense_scan::{hash_bytes, scan_tree, ChangeDetector, ChangeSet, FileStat, ScanOptions};
use serde::Serialize;

use crate::chunker::{ChunkExtractor, ChunkSpan};
use crate::embedding::EmbeddingProvider;
use crate::lock;
use crate::snapshot::{IndexSnapshot, VectorRow};
use crate::store::IndexStore;

/// Bytes inspected for NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Treat every file as new and replace any previous snapshot.
    Full,
    /// Reconcile with the committed snapshot, which must exist.
    Incremental,
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub index_name: String,
    /// Required for full builds. Incremental builds default to the
    /// snapshot's root.
    pub root_directory: Option<PathBuf>,
    pub mode: BuildMode,
}

impl BuildRequest {
    pub fn full(index_name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            index_name: index_name.to_string(),
            root_directory: Some(root.into()),
            mode: BuildMode::Full,
        }
    }

    pub fn incremental(index_name: &str) -> Self {
        Self {
            index_name: index_name.to_string(),
            root_directory: None,
            mode: BuildMode::Incremental,
        }
    }
}

/// What a build did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub index_name: String,
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
    pub restamped: usize,
    pub total_chunks: usize,
    pub total_files: usize,
    pub embedded_chunks: usize,
    pub warnings: Vec<ExtractionWarning>,
    /// False when an incremental build found nothing to write.
    pub committed: bool,
    pub generation: u64,
}

impl BuildReport {
    pub fn is_noop(&self) -> bool {
        !self.committed
    }
}

/// Builds and updates indexes in one [`IndexStore`].
pub struct IndexBuilder {
    store: IndexStore,
    extractor: Arc<dyn ChunkExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    scan: ScanOptions,
}

impl IndexBuilder {
    pub fn new(
        store: IndexStore,
        extractor: Arc<dyn ChunkExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        scan: ScanOptions,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            scan,
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Run one build under the index's writer lock.
    ///
    /// # Errors
    ///
    /// - [`CodesenseError::IndexNotFound`] for an incremental build of a
    ///   missing index.
    /// - [`CodesenseError::ModelMismatch`] when the embedder's model differs
    ///   from the snapshot's.
    /// - [`CodesenseError::DimensionMismatch`] or [`CodesenseError::Embedding`]
    ///   when the provider returns inconsistent vectors.
    /// - Storage errors from loading or committing.
    ///
    /// Per-file problems never fail a build; they become warnings.
    pub async fn build(&self, request: &BuildRequest) -> Result<BuildReport, CodesenseError> {
        let name = request.index_name.as_str();
        let lock_path = self.store.lock_path(name)?;
        if request.mode == BuildMode::Incremental && !self.store.exists(name)? {
            return Err(CodesenseError::IndexNotFound(name.to_string()));
        }

        let _lock = lock::acquire(&lock_path).await?;

        let mut snapshot = match request.mode {
            BuildMode::Full => self.fresh_snapshot(request)?,
            BuildMode::Incremental => self.load_for_update(request)?,
        };
        let root = snapshot.root.clone();

        let current = scan_tree(&root, &self.scan)?;
        let changes = match request.mode {
            BuildMode::Full => ChangeSet::all_new(&current),
            BuildMode::Incremental => ChangeDetector::new(&root).diff(&snapshot.files, &current),
        };
        log::debug!(
            "index '{name}': {} new, {} modified, {} deleted, {} unchanged ({} restamped)",
            changes.new.len(),
            changes.modified.len(),
            changes.deleted.len(),
            changes.unchanged.len(),
            changes.restamped.len()
        );

        if request.mode == BuildMode::Incremental && changes.is_noop() {
            log::info!("index '{name}' is up to date");
            return Ok(report(name, &snapshot, changes, 0, Vec::new(), false));
        }

        for path in changes.deleted.iter().chain(&changes.modified) {
            snapshot.remove_file(path);
        }
        for stat in &changes.restamped {
            if let Some(record) = snapshot.files.get_mut(&stat.path) {
                record.mtime_ns = stat.mtime_ns;
                record.size = stat.size;
            }
        }

        let stats: HashMap<&str, &FileStat> =
            current.iter().map(|s| (s.path.as_str(), s)).collect();
        let mut to_process: Vec<&str> = changes
            .new
            .iter()
            .chain(&changes.modified)
            .map(String::as_str)
            .collect();
        to_process.sort_unstable();

        let mut warnings = Vec::new();
        let mut pending: Vec<Chunk> = Vec::new();
        for path in to_process {
            let Some(stat) = stats.get(path) else {
                continue;
            };
            let (record, chunks) = self.process_file(&root, stat, &mut warnings);
            snapshot.files.insert(record.file_path.clone(), record);
            pending.extend(chunks);
        }

        let embedded = self.embed_pending(&mut snapshot, pending).await?;

        snapshot.generation += 1;
        snapshot.updated_at = Utc::now();
        self.store.commit(&snapshot)?;

        log::info!(
            "index '{name}' generation {}: {} files, {} chunks ({} embedded, {} warnings)",
            snapshot.generation,
            snapshot.files.len(),
            snapshot.total_chunks(),
            embedded,
            warnings.len()
        );
        Ok(report(name, &snapshot, changes, embedded, warnings, true))
    }

    fn fresh_snapshot(&self, request: &BuildRequest) -> Result<IndexSnapshot, CodesenseError> {
        let name = request.index_name.as_str();
        let root = request.root_directory.as_deref().ok_or_else(|| {
            CodesenseError::Config("a full build needs a root directory".into())
        })?;
        let root = canonical_root(root)?;

        let previous_generation = if self.store.exists(name)? {
            self.store.generation(name).unwrap_or_else(|e| {
                log::warn!("index '{name}': replacing unreadable snapshot ({e})");
                0
            })
        } else {
            0
        };

        let mut snapshot = IndexSnapshot::new(name, root, self.embedder.model_id());
        snapshot.generation = previous_generation;
        Ok(snapshot)
    }

    fn load_for_update(&self, request: &BuildRequest) -> Result<IndexSnapshot, CodesenseError> {
        let mut snapshot = self.store.load(&request.index_name)?;
        if snapshot.model_id != self.embedder.model_id() {
            return Err(CodesenseError::ModelMismatch {
                expected: snapshot.model_id,
                actual: self.embedder.model_id().to_string(),
            });
        }
        if let Some(root) = request.root_directory.as_deref() {
            snapshot.root = canonical_root(root)?;
        }
        Ok(snapshot)
    }

    /// Read, hash and chunk one file. Problems become warnings and a record
    /// with zero chunks.
    fn process_file(
        &self,
        root: &Path,
        stat: &FileStat,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> (FileRecord, Vec<Chunk>) {
        let path = stat.path.as_str();
        let mut warn = |message: String| {
            log::warn!("{path}: {message}");
            warnings.push(ExtractionWarning {
                file_path: path.to_string(),
                message,
            });
        };

        let bytes = match std::fs::read(root.join(path)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn(format!("failed to read file: {e}"));
                // An empty hash never matches, so the next update retries the file.
                return (
                    FileRecord {
                        file_path: path.to_string(),
                        content_hash: String::new(),
                        mtime_ns: 0,
                        size: 0,
                        chunk_ids: Vec::new(),
                    },
                    Vec::new(),
                );
            }
        };

        let mut record = FileRecord {
            file_path: path.to_string(),
            content_hash: hash_bytes(&bytes),
            mtime_ns: stat.mtime_ns,
            size: stat.size,
            chunk_ids: Vec::new(),
        };

        if bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) {
            warn("binary file skipped".to_string());
            return (record, Vec::new());
        }
        let content = match std::str::from_utf8(&bytes) {
            Ok(content) => content,
            Err(e) => {
                warn(format!("not valid UTF-8: {e}"));
                return (record, Vec::new());
            }
        };

        let spans = match self.extractor.extract(path, content) {
            Ok(spans) => spans,
            Err(e) => {
                warn(format!("extraction failed: {e}"));
                return (record, Vec::new());
            }
        };

        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let mut chunks = Vec::with_capacity(spans.len());
        for (ordinal, span) in spans.into_iter().enumerate() {
            let text = match slice_span(&lines, &span) {
                Ok(text) => text,
                Err(message) => {
                    warn(message);
                    return (record, Vec::new());
                }
            };
            chunks.push(Chunk {
                id: chunk_id(path, ordinal),
                file_path: path.to_string(),
                start_line: span.start_line,
                end_line: span.end_line,
                framework_tag: span.framework_tag,
                text,
                entity: span.entity,
            });
        }

        record.chunk_ids = chunks.iter().map(|c| c.id.clone()).collect();
        (record, chunks)
    }

    /// Embed every pending chunk in one call and add chunks and rows to the
    /// snapshot. Returns the number of chunks embedded.
    async fn embed_pending(
        &self,
        snapshot: &mut IndexSnapshot,
        chunks: Vec<Chunk>,
    ) -> Result<usize, CodesenseError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(CodesenseError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let expected = match snapshot.dimension {
            Some(dimension) => dimension,
            None => vectors.first().map(Vec::len).unwrap_or_default(),
        };
        if expected == 0 {
            return Err(CodesenseError::Embedding("provider returned empty vectors".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(CodesenseError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        snapshot.dimension = Some(expected);

        let embedded = chunks.len();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            snapshot.vectors.push(VectorRow {
                chunk_id: chunk.id.clone(),
                vector,
            })?;
            snapshot.chunks.insert(chunk.id.clone(), chunk);
        }
        Ok(embedded)
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, CodesenseError> {
    let canonical =
        std::fs::canonicalize(root).map_err(|_| CodesenseError::FileNotFound(root.to_path_buf()))?;
    if !canonical.is_dir() {
        return Err(CodesenseError::FileNotFound(root.to_path_buf()));
    }
    Ok(canonical)
}

/// Lines `start_line..=end_line` of a file exactly as written, minus the
/// terminator of the last line. `lines` keep their terminators.
fn slice_span(lines: &[&str], span: &ChunkSpan) -> Result<String, String> {
    let (start, end) = (span.start_line as usize, span.end_line as usize);
    if start == 0 || start > end || end > lines.len() {
        return Err(format!(
            "chunk span {start}..{end} is outside the file's {} lines",
            lines.len()
        ));
    }
    let text = lines[start - 1..end].concat();
    let text = match text.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => text.as_str(),
    };
    Ok(text.to_string())
}

fn report(
    name: &str,
    snapshot: &IndexSnapshot,
    changes: ChangeSet,
    embedded_chunks: usize,
    warnings: Vec<ExtractionWarning>,
    committed: bool,
) -> BuildReport {
    BuildReport {
        index_name: name.to_string(),
        added: changes.new,
        changed: changes.modified,
        deleted: changes.deleted,
        unchanged: changes.unchanged.len(),
        restamped: changes.restamped.len(),
        total_chunks: snapshot.total_chunks(),
        total_files: snapshot.files.len(),
        embedded_chunks,
        warnings,
        committed,
        generation: snapshot.generation,
    }
}
