//! SQLite persistence for index snapshots.
//!
//! Each index lives in `<index_dir>/<name>/index.db`. Metadata (`meta`,
//! `files`, `chunks`) and the dense vector table (`vectors`) are separate
//! tables but are always replaced together in one transaction, so a reader
//! sees either the whole previous snapshot or the whole new one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use codesense_core::{Chunk, ChunkKind, CodesenseError, Entity, FileRecord};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::snapshot::{IndexSnapshot, VectorRow, VectorTable};

const DB_FILE: &str = "index.db";
const LOCK_DIR: &str = ".locks";

/// Bumped when the table layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// Summary of a committed index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    pub root_directory: PathBuf,
    pub model_id: String,
    pub dimension: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub generation: u64,
    pub num_files: usize,
    pub num_chunks: usize,
    pub num_vectors: usize,
    /// Size of the database and its WAL and shared-memory files on disk.
    pub size_bytes: u64,
}

/// Directory of named indexes.
///
/// # Examples
///
/// ```
/// use codesense_lens::store::IndexStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = IndexStore::new(dir.path());
/// assert!(store.list().unwrap().is_empty());
/// assert!(store.load("missing").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct IndexStore {
    index_dir: PathBuf,
}

impl IndexStore {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Directory of index `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::InvalidIndexName`] for names that are not a
    /// plain directory component.
    pub fn index_path(&self, name: &str) -> Result<PathBuf, CodesenseError> {
        validate_name(name)?;
        Ok(self.index_dir.join(name))
    }

    pub fn db_path(&self, name: &str) -> Result<PathBuf, CodesenseError> {
        Ok(self.index_path(name)?.join(DB_FILE))
    }

    /// Lock file serializing writers of index `name`. Kept outside the
    /// index directory so deleting an index leaves it in place.
    pub fn lock_path(&self, name: &str) -> Result<PathBuf, CodesenseError> {
        validate_name(name)?;
        Ok(self.index_dir.join(LOCK_DIR).join(format!("{name}.lock")))
    }

    pub fn exists(&self, name: &str) -> Result<bool, CodesenseError> {
        Ok(self.db_path(name)?.is_file())
    }

    /// Names of all indexes, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::Io`] if the index directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>, CodesenseError> {
        if !self.index_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.index_dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if validate_name(&name).is_ok() && entry.path().join(DB_FILE).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load and validate the committed snapshot of index `name`.
    ///
    /// Missing optional metadata falls back to documented defaults: the
    /// requested name, a Unix-epoch `created_at`, `updated_at = created_at`,
    /// generation 0, and a dimension inferred from the first vector.
    /// Non-dense `row_index` values are renumbered in order.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::IndexNotFound`] if no database exists and
    /// [`CodesenseError::CorruptSnapshot`] if required metadata is missing
    /// or the tables disagree with each other.
    pub fn load(&self, name: &str) -> Result<IndexSnapshot, CodesenseError> {
        let db = self.db_path(name)?;
        if !db.is_file() {
            return Err(CodesenseError::IndexNotFound(name.to_string()));
        }
        let mut conn = open_existing(&db)?;
        let tx = conn
            .transaction()
            .map_err(corrupt("failed to begin read transaction"))?;

        let meta = read_meta(&tx)?;
        let files = read_files(&tx)?;
        let chunks = read_chunks(&tx)?;
        let rows = read_vectors(&tx)?;
        drop(tx);

        build_snapshot(name, meta, files, chunks, rows)
    }

    /// Generation of the committed snapshot, read without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::IndexNotFound`] if the index does not exist.
    pub fn generation(&self, name: &str) -> Result<u64, CodesenseError> {
        match self.meta_value(name, "generation")? {
            Some(v) => v
                .parse()
                .map_err(|_| CodesenseError::CorruptSnapshot(format!("invalid generation '{v}'"))),
            None => Ok(0),
        }
    }

    /// Embedding model the index was built with, read without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::IndexNotFound`] if the index does not exist
    /// and [`CodesenseError::CorruptSnapshot`] if the model id is missing.
    pub fn model_id(&self, name: &str) -> Result<String, CodesenseError> {
        self.meta_value(name, "embedding_model_id")?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CodesenseError::CorruptSnapshot("missing required metadata 'embedding_model_id'".into())
            })
    }

    fn meta_value(&self, name: &str, key: &str) -> Result<Option<String>, CodesenseError> {
        let db = self.db_path(name)?;
        if !db.is_file() {
            return Err(CodesenseError::IndexNotFound(name.to_string()));
        }
        let conn = open_existing(&db)?;
        conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(corrupt("failed to read metadata"))
    }

    /// Atomically replace the committed snapshot of `snapshot.name`.
    ///
    /// An existing database is rewritten inside one transaction. A new one
    /// is written to a temporary file and renamed into place, so a crash
    /// never leaves a half-written index behind. An existing file that does
    /// not open as an index database is replaced the same way.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::CorruptSnapshot`] if the snapshot violates
    /// its invariants, or [`CodesenseError::Database`] / [`CodesenseError::Io`]
    /// if writing fails. On error the previous snapshot is untouched.
    pub fn commit(&self, snapshot: &IndexSnapshot) -> Result<(), CodesenseError> {
        snapshot.validate()?;
        let dir = self.index_path(&snapshot.name)?;
        std::fs::create_dir_all(&dir)?;
        let db = dir.join(DB_FILE);

        if db.is_file() {
            match open_existing(&db).and_then(|conn| init_schema(&conn).map(|()| conn)) {
                Ok(mut conn) => write_snapshot(&mut conn, snapshot)?,
                Err(e) => {
                    log::warn!(
                        "index '{}': replacing unreadable database ({e})",
                        snapshot.name
                    );
                    replace_database(&db, snapshot)?;
                }
            }
        } else {
            replace_database(&db, snapshot)?;
        }

        log::debug!(
            "committed index '{}' generation {} ({} files, {} chunks)",
            snapshot.name,
            snapshot.generation,
            snapshot.files.len(),
            snapshot.chunks.len()
        );
        Ok(())
    }

    /// Remove index `name` from disk. Callers hold the build lock.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::IndexNotFound`] if the index does not exist.
    pub fn delete(&self, name: &str) -> Result<(), CodesenseError> {
        if !self.exists(name)? {
            return Err(CodesenseError::IndexNotFound(name.to_string()));
        }
        std::fs::remove_dir_all(self.index_path(name)?)?;
        Ok(())
    }

    /// Summary statistics of index `name`.
    ///
    /// # Errors
    ///
    /// Same as [`IndexStore::load`].
    pub fn info(&self, name: &str) -> Result<IndexInfo, CodesenseError> {
        let snapshot = self.load(name)?;
        let db = self.db_path(name)?;
        let size_bytes = [db.clone(), wal_path(&db), shm_path(&db)]
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        Ok(IndexInfo {
            name: snapshot.name,
            root_directory: snapshot.root,
            model_id: snapshot.model_id,
            dimension: snapshot.dimension,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            generation: snapshot.generation,
            num_files: snapshot.files.len(),
            num_chunks: snapshot.chunks.len(),
            num_vectors: snapshot.vectors.len(),
            size_bytes,
        })
    }
}

fn validate_name(name: &str) -> Result<(), CodesenseError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(CodesenseError::InvalidIndexName(name.to_string()))
    }
}

fn wal_path(db: &Path) -> PathBuf {
    PathBuf::from(format!("{}-wal", db.display()))
}

fn shm_path(db: &Path) -> PathBuf {
    PathBuf::from(format!("{}-shm", db.display()))
}

/// Write `snapshot` to a fresh file next to `db` and rename it over `db`.
/// Journal files left by whatever was at `db` are removed first so SQLite
/// never replays them into the new database.
fn replace_database(db: &Path, snapshot: &IndexSnapshot) -> Result<(), CodesenseError> {
    let tmp = PathBuf::from(format!("{}.tmp", db.display()));
    for stale in [tmp.clone(), wal_path(&tmp), shm_path(&tmp)] {
        if stale.exists() {
            std::fs::remove_file(&stale)?;
        }
    }
    let mut conn = Connection::open(&tmp)
        .map_err(|e| CodesenseError::Database(format!("failed to create database: {e}")))?;
    init_schema(&conn)?;
    write_snapshot(&mut conn, snapshot)?;
    conn.close()
        .map_err(|(_, e)| CodesenseError::Database(format!("failed to close database: {e}")))?;

    for stale in [wal_path(db), shm_path(db)] {
        if stale.exists() {
            std::fs::remove_file(&stale)?;
        }
    }
    std::fs::rename(&tmp, db)?;
    Ok(())
}

fn corrupt(context: &'static str) -> impl Fn(rusqlite::Error) -> CodesenseError {
    move |e| CodesenseError::CorruptSnapshot(format!("{context}: {e}"))
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> CodesenseError {
    move |e| CodesenseError::Database(format!("{context}: {e}"))
}

fn open_existing(path: &Path) -> Result<Connection, CodesenseError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(db_err("failed to open database"))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(db_err("failed to set busy timeout"))?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), CodesenseError> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
        .map_err(corrupt("failed to enable WAL"))?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            mtime_ns INTEGER NOT NULL,
            size INTEGER NOT NULL,
            chunk_ids TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            kind TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            framework_tag TEXT,
            entity TEXT NOT NULL,
            text TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vectors (
            row_index INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL UNIQUE,
            embedding BLOB NOT NULL
        );
        ",
    )
    .map_err(db_err("failed to create schema"))?;
    Ok(())
}

fn write_snapshot(conn: &mut Connection, snapshot: &IndexSnapshot) -> Result<(), CodesenseError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(db_err("failed to begin write transaction"))?;

    tx.execute_batch(
        "DELETE FROM vectors; DELETE FROM chunks; DELETE FROM files; DELETE FROM meta;",
    )
    .map_err(db_err("failed to clear previous snapshot"))?;

    {
        let mut meta = tx
            .prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")
            .map_err(db_err("failed to prepare metadata insert"))?;
        let mut entries = vec![
            ("schema_version", SCHEMA_VERSION.to_string()),
            ("index_name", snapshot.name.clone()),
            ("root_directory", snapshot.root.to_string_lossy().to_string()),
            ("embedding_model_id", snapshot.model_id.clone()),
            ("created_at", snapshot.created_at.to_rfc3339()),
            ("updated_at", snapshot.updated_at.to_rfc3339()),
            ("generation", snapshot.generation.to_string()),
        ];
        if let Some(dimension) = snapshot.dimension {
            entries.push(("dimension", dimension.to_string()));
        }
        for (key, value) in &entries {
            meta.execute(params![key, value])
                .map_err(db_err("failed to write metadata"))?;
        }

        let mut files = tx
            .prepare(
                "INSERT INTO files (path, content_hash, mtime_ns, size, chunk_ids)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(db_err("failed to prepare file insert"))?;
        for record in snapshot.files.values() {
            files
                .execute(params![
                    record.file_path,
                    record.content_hash,
                    record.mtime_ns,
                    record.size as i64,
                    serde_json::to_string(&record.chunk_ids)?,
                ])
                .map_err(db_err("failed to write file record"))?;
        }

        let mut chunks = tx
            .prepare(
                "INSERT INTO chunks (id, file_path, kind, start_line, end_line, framework_tag, entity, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(db_err("failed to prepare chunk insert"))?;
        for chunk in snapshot.chunks.values() {
            chunks
                .execute(params![
                    chunk.id,
                    chunk.file_path,
                    chunk.kind().as_str(),
                    chunk.start_line,
                    chunk.end_line,
                    chunk.framework_tag,
                    serde_json::to_string(&chunk.entity)?,
                    chunk.text,
                ])
                .map_err(db_err("failed to write chunk"))?;
        }

        let mut vectors = tx
            .prepare("INSERT INTO vectors (row_index, chunk_id, embedding) VALUES (?1, ?2, ?3)")
            .map_err(db_err("failed to prepare vector insert"))?;
        for (row_index, row) in snapshot.vectors.rows().iter().enumerate() {
            vectors
                .execute(params![
                    row_index as i64,
                    row.chunk_id,
                    floats_to_bytes(&row.vector)
                ])
                .map_err(db_err("failed to write vector"))?;
        }
    }

    tx.commit().map_err(db_err("failed to commit snapshot"))?;
    Ok(())
}

fn read_meta(conn: &Connection) -> Result<HashMap<String, String>, CodesenseError> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM meta")
        .map_err(corrupt("failed to read metadata"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(corrupt("failed to read metadata"))?;
    rows.collect::<Result<HashMap<_, _>, _>>()
        .map_err(corrupt("failed to read metadata row"))
}

fn read_files(conn: &Connection) -> Result<BTreeMap<String, FileRecord>, CodesenseError> {
    let mut stmt = conn
        .prepare("SELECT path, content_hash, mtime_ns, size, chunk_ids FROM files")
        .map_err(corrupt("failed to read file records"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(corrupt("failed to read file records"))?;

    let mut files = BTreeMap::new();
    for row in rows {
        let (path, content_hash, mtime_ns, size, chunk_ids) =
            row.map_err(corrupt("failed to read file record"))?;
        let chunk_ids: Vec<String> = serde_json::from_str(&chunk_ids).map_err(|e| {
            CodesenseError::CorruptSnapshot(format!("unparseable chunk_ids for '{path}': {e}"))
        })?;
        let size = u64::try_from(size).map_err(|_| {
            CodesenseError::CorruptSnapshot(format!("negative size for '{path}'"))
        })?;
        files.insert(
            path.clone(),
            FileRecord {
                file_path: path,
                content_hash,
                mtime_ns,
                size,
                chunk_ids,
            },
        );
    }
    Ok(files)
}

fn read_chunks(conn: &Connection) -> Result<BTreeMap<String, Chunk>, CodesenseError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_path, kind, start_line, end_line, framework_tag, entity, text FROM chunks",
        )
        .map_err(corrupt("failed to read chunks"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })
        .map_err(corrupt("failed to read chunks"))?;

    let mut chunks = BTreeMap::new();
    for row in rows {
        let (id, file_path, kind, start_line, end_line, framework_tag, entity, text) =
            row.map_err(corrupt("failed to read chunk"))?;
        let kind = ChunkKind::from_str(&kind)
            .map_err(|e| CodesenseError::CorruptSnapshot(format!("chunk '{id}': {e}")))?;
        let entity: Entity = serde_json::from_str(&entity).map_err(|e| {
            CodesenseError::CorruptSnapshot(format!("chunk '{id}' has unparseable metadata: {e}"))
        })?;
        if entity.kind() != kind {
            return Err(CodesenseError::CorruptSnapshot(format!(
                "chunk '{id}' is stored as {kind} but its metadata says {}",
                entity.kind()
            )));
        }
        let (start_line, end_line) = match (u32::try_from(start_line), u32::try_from(end_line)) {
            (Ok(start), Ok(end)) if start >= 1 && start <= end => (start, end),
            _ => {
                return Err(CodesenseError::CorruptSnapshot(format!(
                    "chunk '{id}' has invalid line range {start_line}..{end_line}"
                )))
            }
        };
        chunks.insert(
            id.clone(),
            Chunk {
                id,
                file_path,
                start_line,
                end_line,
                framework_tag,
                text,
                entity,
            },
        );
    }
    Ok(chunks)
}

fn read_vectors(conn: &Connection) -> Result<Vec<(i64, String, Vec<u8>)>, CodesenseError> {
    let mut stmt = conn
        .prepare("SELECT row_index, chunk_id, embedding FROM vectors ORDER BY row_index")
        .map_err(corrupt("failed to read vectors"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .map_err(corrupt("failed to read vectors"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(corrupt("failed to read vector row"))
}

fn required(meta: &HashMap<String, String>, key: &str) -> Result<String, CodesenseError> {
    meta.get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| CodesenseError::CorruptSnapshot(format!("missing required metadata '{key}'")))
}

fn parse_timestamp(value: &str, key: &str) -> Result<DateTime<Utc>, CodesenseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CodesenseError::CorruptSnapshot(format!("invalid {key} '{value}': {e}")))
}

fn build_snapshot(
    name: &str,
    meta: HashMap<String, String>,
    files: BTreeMap<String, FileRecord>,
    chunks: BTreeMap<String, Chunk>,
    rows: Vec<(i64, String, Vec<u8>)>,
) -> Result<IndexSnapshot, CodesenseError> {
    let schema_version = match meta.get("schema_version") {
        Some(v) => v.parse::<u32>().map_err(|_| {
            CodesenseError::CorruptSnapshot(format!("invalid schema_version '{v}'"))
        })?,
        None => 1,
    };
    if schema_version > SCHEMA_VERSION {
        return Err(CodesenseError::CorruptSnapshot(format!(
            "schema version {schema_version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    let root = PathBuf::from(required(&meta, "root_directory")?);
    let model_id = required(&meta, "embedding_model_id")?;

    let created_at = match meta.get("created_at") {
        Some(v) => parse_timestamp(v, "created_at")?,
        None => {
            log::warn!("index '{name}' has no created_at, using the Unix epoch");
            DateTime::<Utc>::UNIX_EPOCH
        }
    };
    let updated_at = match meta.get("updated_at") {
        Some(v) => parse_timestamp(v, "updated_at")?,
        None => created_at,
    };
    let generation = match meta.get("generation") {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| CodesenseError::CorruptSnapshot(format!("invalid generation '{v}'")))?,
        None => 0,
    };

    let mut dimension = match meta.get("dimension") {
        Some(v) => Some(v.parse::<usize>().map_err(|_| {
            CodesenseError::CorruptSnapshot(format!("invalid dimension '{v}'"))
        })?),
        None => None,
    };

    let dense = rows
        .iter()
        .enumerate()
        .all(|(i, (row_index, _, _))| *row_index == i as i64);
    if !dense {
        log::warn!("index '{name}' has non-dense row indexes, renumbering");
    }

    let mut vector_rows = Vec::with_capacity(rows.len());
    for (_, chunk_id, blob) in rows {
        if blob.len() % 4 != 0 {
            return Err(CodesenseError::CorruptSnapshot(format!(
                "vector for '{chunk_id}' is {} bytes, not a whole number of f32s",
                blob.len()
            )));
        }
        let expected = *dimension.get_or_insert_with(|| {
            log::debug!("index '{name}' has no dimension, inferring from vectors");
            blob.len() / 4
        });
        if blob.len() / 4 != expected {
            return Err(CodesenseError::CorruptSnapshot(format!(
                "vector for '{chunk_id}' has {} dimensions, expected {expected}",
                blob.len() / 4
            )));
        }
        vector_rows.push(VectorRow {
            chunk_id,
            vector: bytes_to_floats(&blob),
        });
    }

    let snapshot = IndexSnapshot {
        name: name.to_string(),
        root,
        model_id,
        dimension,
        created_at,
        updated_at,
        generation,
        files,
        chunks,
        vectors: VectorTable::from_rows(vector_rows)?,
    };
    snapshot.validate()?;
    Ok(snapshot)
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
