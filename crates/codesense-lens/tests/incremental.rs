use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use codesense_core::{Callable, CodesenseError, Entity};
use codesense_lens::{
    BuildRequest, ChunkExtractor, ChunkSpan, EmbeddingProvider, ExtractError, HashingEmbedder,
    IndexBuilder, IndexSnapshot, IndexStore, SearchEngine, SearchFilter, SearchQuery,
};
use codesense_scan::ScanOptions;

const INDEX: &str = "demo";

/// One chunk per `## name` line, running to the line before the next marker.
struct MarkerExtractor;

impl ChunkExtractor for MarkerExtractor {
    fn extract(&self, _file_path: &str, content: &str) -> Result<Vec<ChunkSpan>, ExtractError> {
        if content.contains("## !error") {
            return Err(ExtractError("unbalanced marker".into()));
        }
        let lines: Vec<&str> = content.lines().collect();
        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with("## "))
            .map(|(i, _)| i)
            .collect();
        Ok(starts
            .iter()
            .enumerate()
            .map(|(n, &start)| {
                let end = starts.get(n + 1).copied().unwrap_or(lines.len());
                ChunkSpan {
                    entity: Entity::Function(Callable {
                        name: lines[start][3..].trim().to_string(),
                        ..Callable::default()
                    }),
                    start_line: start as u32 + 1,
                    end_line: end as u32,
                    framework_tag: None,
                }
            })
            .collect())
    }
}

/// Hashing embedder that counts calls and texts.
struct Counting {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl Counting {
    fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(8),
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for Counting {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

/// Same model id as the default, but always fails.
struct Failing;

#[async_trait]
impl EmbeddingProvider for Failing {
    fn model_id(&self) -> &str {
        "hashing-8"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError> {
        Err(CodesenseError::Embedding("provider unavailable".into()))
    }
}

/// Same model id as the default, but returns 5-dimensional vectors.
struct WrongDimension;

#[async_trait]
impl EmbeddingProvider for WrongDimension {
    fn model_id(&self) -> &str {
        "hashing-8"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError> {
        Ok(texts.iter().map(|_| vec![0.5; 5]).collect())
    }
}

/// Returns one vector too few.
struct ShortBatch;

#[async_trait]
impl EmbeddingProvider for ShortBatch {
    fn model_id(&self) -> &str {
        "hashing-8"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CodesenseError> {
        Ok(texts.iter().skip(1).map(|_| vec![0.5; 8]).collect())
    }
}

fn builder_with(index_dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> IndexBuilder {
    IndexBuilder::new(
        IndexStore::new(index_dir),
        Arc::new(MarkerExtractor),
        embedder,
        ScanOptions::default(),
    )
}

fn builder(index_dir: &Path) -> IndexBuilder {
    builder_with(index_dir, Arc::new(HashingEmbedder::new(8)))
}

/// A file with one marker chunk per name.
fn doc(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("## {name}\nbody of {name}\n"))
        .collect()
}

fn write(root: &Path, path: &str, content: &str) {
    std::fs::write(root.join(path), content).unwrap();
}

fn load(index_dir: &Path) -> IndexSnapshot {
    IndexStore::new(index_dir).load(INDEX).unwrap()
}

fn assert_conserved(snapshot: &IndexSnapshot) {
    let listed: usize = snapshot.files.values().map(|r| r.chunk_ids.len()).sum();
    assert_eq!(snapshot.chunks.len(), listed);
    assert_eq!(snapshot.vectors.len(), listed);
    snapshot.validate().unwrap();
}

fn vector_bits(snapshot: &IndexSnapshot, chunk_id: &str) -> Vec<u32> {
    snapshot
        .vectors
        .get(chunk_id)
        .unwrap()
        .iter()
        .map(|f| f.to_bits())
        .collect()
}

fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

#[tokio::test]
async fn edit_and_delete_scenario() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1", "a2", "a3"]));
    write(repo.path(), "b.py", &doc(&["b1", "b2"]));
    let builder = builder(indexes.path());

    let report = builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();
    assert_eq!(report.total_chunks, 5);
    assert_eq!(report.added, vec!["a.py", "b.py"]);

    write(repo.path(), "a.py", &doc(&["a1", "a2", "a3", "a4-new"]));
    std::fs::remove_file(repo.path().join("b.py")).unwrap();

    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert_eq!(report.changed, vec!["a.py"]);
    assert_eq!(report.deleted, vec!["b.py"]);
    assert!(report.added.is_empty());
    assert_eq!(report.total_chunks, 4);
    assert_eq!(report.embedded_chunks, 4);

    let snapshot = load(indexes.path());
    for id in ["b.py#0", "b.py#1"] {
        assert!(!snapshot.chunks.contains_key(id));
        assert!(snapshot.vectors.get(id).is_none());
    }
    assert_eq!(snapshot.files["a.py"].chunk_ids.len(), 4);
    assert_conserved(&snapshot);
}

#[tokio::test]
async fn update_without_changes_is_idempotent() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1", "a2"]));
    write(repo.path(), "b.py", &doc(&["b1"]));
    let builder = builder(indexes.path());
    builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();
    let before = load(indexes.path());

    for _ in 0..2 {
        let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
        assert!(!report.committed);
        assert!(report.added.is_empty() && report.changed.is_empty() && report.deleted.is_empty());
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.embedded_chunks, 0);
    }

    let after = load(indexes.path());
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.files, before.files);
    assert_eq!(after.chunks, before.chunks);
    assert_eq!(after.vectors, before.vectors);
}

#[tokio::test]
async fn untouched_files_keep_identical_vectors() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1"]));
    write(repo.path(), "b.py", &doc(&["b1", "b2"]));
    let builder = builder(indexes.path());
    builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();
    let before = load(indexes.path());

    write(repo.path(), "a.py", &doc(&["a1-edited"]));
    write(repo.path(), "c.py", &doc(&["c1"]));
    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert_eq!(report.changed, vec!["a.py"]);
    assert_eq!(report.added, vec!["c.py"]);
    assert_eq!(report.embedded_chunks, 2);

    let after = load(indexes.path());
    for id in ["b.py#0", "b.py#1"] {
        assert_eq!(vector_bits(&after, id), vector_bits(&before, id));
        assert_eq!(after.chunks[id], before.chunks[id]);
    }

    // Retained rows come first, in their previous relative order.
    let order: Vec<&str> = after.vectors.rows().iter().map(|r| r.chunk_id.as_str()).collect();
    assert_eq!(order, vec!["b.py#0", "b.py#1", "a.py#0", "c.py#0"]);
    assert_conserved(&after);
}

#[tokio::test]
async fn deleting_a_file_drops_exactly_its_chunks() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1", "a2", "a3"]));
    write(repo.path(), "b.py", &doc(&["b1"]));
    let builder = builder(indexes.path());
    builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();

    std::fs::remove_file(repo.path().join("a.py")).unwrap();
    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert_eq!(report.total_chunks, 1);
    assert_eq!(report.total_files, 1);
    assert_eq!(report.embedded_chunks, 0);
    assert_conserved(&load(indexes.path()));
}

#[tokio::test]
async fn one_embed_call_per_build() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1", "a2"]));
    write(repo.path(), "b.py", &doc(&["b1"]));
    write(repo.path(), "c.py", &doc(&["c1", "c2", "c3"]));
    let counting = Arc::new(Counting::new());
    let builder = builder_with(indexes.path(), counting.clone());

    builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    assert_eq!(counting.texts.load(Ordering::SeqCst), 6);

    builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1, "no-op update must not embed");

    std::fs::remove_file(repo.path().join("b.py")).unwrap();
    builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1, "deletions need no vectors");
}

#[tokio::test]
async fn failed_embedding_leaves_snapshot_untouched() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1", "a2"]));
    builder(indexes.path())
        .build(&BuildRequest::full(INDEX, repo.path()))
        .await
        .unwrap();
    let before = load(indexes.path());

    write(repo.path(), "a.py", &doc(&["a1", "a2", "a3"]));
    write(repo.path(), "b.py", &doc(&["b1"]));

    let err = builder_with(indexes.path(), Arc::new(Failing))
        .build(&BuildRequest::incremental(INDEX))
        .await
        .unwrap_err();
    assert!(matches!(err, CodesenseError::Embedding(_)));

    let err = builder_with(indexes.path(), Arc::new(ShortBatch))
        .build(&BuildRequest::incremental(INDEX))
        .await
        .unwrap_err();
    assert!(matches!(err, CodesenseError::Embedding(_)));

    let err = builder_with(indexes.path(), Arc::new(WrongDimension))
        .build(&BuildRequest::incremental(INDEX))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CodesenseError::DimensionMismatch {
            expected: 8,
            actual: 5
        }
    ));

    let after = load(indexes.path());
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.files, before.files);
    assert_eq!(after.chunks, before.chunks);
    assert_eq!(after.vectors, before.vectors);

    // The pending changes are picked up once the provider works again.
    let report = builder(indexes.path())
        .build(&BuildRequest::incremental(INDEX))
        .await
        .unwrap();
    assert_eq!(report.changed, vec!["a.py"]);
    assert_eq!(report.added, vec!["b.py"]);
    assert_eq!(report.total_chunks, 4);
}

#[tokio::test]
async fn touch_only_change_restamps_without_embedding() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1"]));
    let counting = Arc::new(Counting::new());
    let builder = builder_with(indexes.path(), counting.clone());
    builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();
    let before = load(indexes.path());

    let later = SystemTime::now() + Duration::from_secs(3600);
    set_mtime(&repo.path().join("a.py"), later);

    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert!(report.committed);
    assert_eq!(report.restamped, 1);
    assert_eq!(report.unchanged, 1);
    assert!(report.changed.is_empty());
    assert_eq!(report.embedded_chunks, 0);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    let after = load(indexes.path());
    assert_eq!(after.generation, before.generation + 1);
    assert_ne!(after.files["a.py"].mtime_ns, before.files["a.py"].mtime_ns);
    assert_eq!(after.files["a.py"].content_hash, before.files["a.py"].content_hash);
    assert_eq!(after.vectors, before.vectors);

    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert!(!report.committed, "restamped stats should make the next update a no-op");
}

#[tokio::test]
async fn extraction_failure_records_file_with_warning() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "good.py", &doc(&["g1"]));
    write(repo.path(), "bad.py", "## !error\n");
    let builder = builder(indexes.path());

    let report = builder.build(&BuildRequest::full(INDEX, repo.path())).await.unwrap();
    assert_eq!(report.total_files, 2);
    assert_eq!(report.total_chunks, 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].file_path, "bad.py");

    let snapshot = load(indexes.path());
    assert!(snapshot.files["bad.py"].chunk_ids.is_empty());
    assert!(!snapshot.files["bad.py"].content_hash.is_empty());

    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert!(!report.committed);

    write(repo.path(), "bad.py", &doc(&["fixed"]));
    let report = builder.build(&BuildRequest::incremental(INDEX)).await.unwrap();
    assert_eq!(report.changed, vec!["bad.py"]);
    assert!(report.warnings.is_empty());
    assert_eq!(report.total_chunks, 2);
}

#[tokio::test]
async fn incremental_build_requires_existing_index() {
    let indexes = tempfile::tempdir().unwrap();
    let err = builder(indexes.path())
        .build(&BuildRequest::incremental("never-built"))
        .await
        .unwrap_err();
    assert!(matches!(err, CodesenseError::IndexNotFound(name) if name == "never-built"));
}

#[tokio::test]
async fn incremental_build_with_other_model_fails() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1"]));
    builder(indexes.path())
        .build(&BuildRequest::full(INDEX, repo.path()))
        .await
        .unwrap();

    let err = builder_with(indexes.path(), Arc::new(HashingEmbedder::new(16)))
        .build(&BuildRequest::incremental(INDEX))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CodesenseError::ModelMismatch { ref expected, ref actual }
            if expected == "hashing-8" && actual == "hashing-16"
    ));

    // A full rebuild may switch models.
    let report = builder_with(indexes.path(), Arc::new(HashingEmbedder::new(16)))
        .build(&BuildRequest::full(INDEX, repo.path()))
        .await
        .unwrap();
    assert_eq!(report.generation, 2);
    let snapshot = load(indexes.path());
    assert_eq!(snapshot.model_id, "hashing-16");
    assert_eq!(snapshot.dimension, Some(16));
}

#[tokio::test]
async fn garbage_database_is_corrupt() {
    let indexes = tempfile::tempdir().unwrap();
    let dir = indexes.path().join(INDEX);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.db"), vec![b'x'; 4096]).unwrap();

    let err = IndexStore::new(indexes.path()).load(INDEX).unwrap_err();
    assert!(matches!(err, CodesenseError::CorruptSnapshot(_)));

    let err = builder(indexes.path())
        .build(&BuildRequest::incremental(INDEX))
        .await
        .unwrap_err();
    assert!(matches!(err, CodesenseError::CorruptSnapshot(_)));
}

#[tokio::test]
async fn search_over_built_index() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", &doc(&["a1", "a2", "a3"]));
    write(repo.path(), "b.py", &doc(&["b1", "b2"]));
    builder(indexes.path())
        .build(&BuildRequest::full(INDEX, repo.path()))
        .await
        .unwrap();

    let engine = SearchEngine::open(
        IndexStore::new(indexes.path()),
        INDEX,
        Arc::new(HashingEmbedder::new(8)),
    )
    .unwrap();

    let results = engine.search(&SearchQuery::new("body of a2", 1000)).await.unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.windows(2).all(|w| w[0].score <= w[1].score));
    assert_eq!(
        results.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    let starved = SearchQuery::new("body", 3).with_filter(SearchFilter::category("serializer"));
    assert!(engine.search(&starved).await.unwrap().is_empty());

    let err = engine.search(&SearchQuery::new("", 3)).await.unwrap_err();
    assert!(matches!(err, CodesenseError::InvalidQuery(_)));
}

#[tokio::test]
async fn empty_tree_builds_an_empty_index() {
    let repo = tempfile::tempdir().unwrap();
    let indexes = tempfile::tempdir().unwrap();
    write(repo.path(), "notes.txt", "not indexed");

    let report = builder(indexes.path())
        .build(&BuildRequest::full(INDEX, repo.path()))
        .await
        .unwrap();
    assert!(report.committed);
    assert_eq!(report.total_files, 0);

    let engine = SearchEngine::open(
        IndexStore::new(indexes.path()),
        INDEX,
        Arc::new(HashingEmbedder::new(8)),
    )
    .unwrap();
    assert!(engine
        .search(&SearchQuery::new("anything", 5))
        .await
        .unwrap()
        .is_empty());
}
