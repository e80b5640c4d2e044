//! In-memory form of a committed index.
//!
//! The vector table is an arena plus an index: rows live densely in a
//! `Vec`, and a `chunk_id -> row_index` map is rebuilt whenever rows move.
//! Row positions are never assumed to survive a build.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use codesense_core::{Chunk, CodesenseError, FileRecord};

/// One embedded chunk. Its `row_index` is its position in the [`VectorTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRow {
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// Dense table of vectors with a chunk-id index.
///
/// # Examples
///
/// ```
/// use codesense_lens::snapshot::{VectorRow, VectorTable};
///
/// let mut table = VectorTable::default();
/// table.push(VectorRow { chunk_id: "a.py#0".into(), vector: vec![0.0, 1.0] }).unwrap();
/// table.push(VectorRow { chunk_id: "b.py#0".into(), vector: vec![1.0, 0.0] }).unwrap();
///
/// let hits = table.nearest(&[0.9, 0.1], 1);
/// assert_eq!(table.rows()[hits[0].0].chunk_id, "b.py#0");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorTable {
    rows: Vec<VectorRow>,
    positions: HashMap<String, usize>,
}

impl VectorTable {
    /// Build a table from rows in `row_index` order.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::CorruptSnapshot`] if a chunk id repeats.
    pub fn from_rows(rows: Vec<VectorRow>) -> Result<Self, CodesenseError> {
        let mut table = Self {
            positions: HashMap::with_capacity(rows.len()),
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    /// Append a row at the next `row_index`.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::CorruptSnapshot`] if the chunk already has a row.
    pub fn push(&mut self, row: VectorRow) -> Result<(), CodesenseError> {
        if self.positions.contains_key(&row.chunk_id) {
            return Err(CodesenseError::CorruptSnapshot(format!(
                "duplicate vector row for chunk '{}'",
                row.chunk_id
            )));
        }
        self.positions.insert(row.chunk_id.clone(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    /// Keep the rows whose chunk id satisfies `keep`, preserving their
    /// relative order, and renumber densely. Returns how many rows were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| keep(&row.chunk_id));
        if self.rows.len() != before {
            self.reindex();
        }
        before - self.rows.len()
    }

    fn reindex(&mut self) {
        self.positions = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.chunk_id.clone(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[VectorRow] {
        &self.rows
    }

    pub fn row_index(&self, chunk_id: &str) -> Option<usize> {
        self.positions.get(chunk_id).copied()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&[f32]> {
        self.row_index(chunk_id)
            .map(|i| self.rows[i].vector.as_slice())
    }

    /// Exact nearest neighbors by squared L2 distance, ascending.
    ///
    /// Returns at most `k` `(row_index, distance)` pairs. The sort is
    /// stable, so equal distances keep `row_index` order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, squared_l2(query, &row.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        scored
    }
}

/// Squared Euclidean distance. Lower means more similar.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Everything one committed index holds.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub name: String,
    /// Absolute directory the file paths are relative to.
    pub root: PathBuf,
    pub model_id: String,
    /// Set by the first build that embeds anything.
    pub dimension: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every commit.
    pub generation: u64,
    pub files: BTreeMap<String, FileRecord>,
    pub chunks: BTreeMap<String, Chunk>,
    pub vectors: VectorTable,
}

impl IndexSnapshot {
    /// An empty snapshot, not yet committed.
    pub fn new(name: &str, root: PathBuf, model_id: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            root,
            model_id: model_id.to_string(),
            dimension: None,
            created_at: now,
            updated_at: now,
            generation: 0,
            files: BTreeMap::new(),
            chunks: BTreeMap::new(),
            vectors: VectorTable::default(),
        }
    }

    /// Drop a file's record, chunks and vector rows. Returns the number of chunks removed.
    pub fn remove_file(&mut self, file_path: &str) -> usize {
        let Some(record) = self.files.remove(file_path) else {
            return 0;
        };
        for id in &record.chunk_ids {
            self.chunks.remove(id);
        }
        let ids: std::collections::HashSet<&str> =
            record.chunk_ids.iter().map(String::as_str).collect();
        self.vectors.retain(|id| !ids.contains(id));
        record.chunk_ids.len()
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Check the cross-table invariants: every listed chunk exists and
    /// belongs to its file, every chunk is listed exactly once, and there
    /// is exactly one correctly sized vector per chunk.
    ///
    /// # Errors
    ///
    /// Returns [`CodesenseError::CorruptSnapshot`] describing the first violation.
    pub fn validate(&self) -> Result<(), CodesenseError> {
        let corrupt = |msg: String| Err(CodesenseError::CorruptSnapshot(msg));

        let mut listed = 0usize;
        for (path, record) in &self.files {
            if record.file_path != *path {
                return corrupt(format!("file record key '{path}' names '{}'", record.file_path));
            }
            for id in &record.chunk_ids {
                match self.chunks.get(id) {
                    Some(chunk) if chunk.file_path == *path => {}
                    Some(chunk) => {
                        return corrupt(format!(
                            "chunk '{id}' is listed by '{path}' but belongs to '{}'",
                            chunk.file_path
                        ))
                    }
                    None => return corrupt(format!("file '{path}' lists missing chunk '{id}'")),
                }
            }
            listed += record.chunk_ids.len();
        }
        if listed != self.chunks.len() {
            return corrupt(format!(
                "{} chunks stored but {listed} listed by file records",
                self.chunks.len()
            ));
        }

        if self.vectors.len() != self.chunks.len() {
            return corrupt(format!(
                "{} vector rows for {} chunks",
                self.vectors.len(),
                self.chunks.len()
            ));
        }
        for row in self.vectors.rows() {
            if !self.chunks.contains_key(&row.chunk_id) {
                return corrupt(format!("vector row for missing chunk '{}'", row.chunk_id));
            }
            if let Some(dimension) = self.dimension {
                if row.vector.len() != dimension {
                    return corrupt(format!(
                        "vector for '{}' has {} dimensions, expected {dimension}",
                        row.chunk_id,
                        row.vector.len()
                    ));
                }
            }
        }
        Ok(())
    }
}
