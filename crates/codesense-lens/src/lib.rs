//! Incremental semantic indexing and search.
//!
//! The pipeline is: [`chunker`] turns files into chunk spans, [`embedding`]
//! turns chunk text into vectors, [`builder::IndexBuilder`] reconciles a
//! previous [`snapshot::IndexSnapshot`] with the files on disk and commits
//! the result through [`store::IndexStore`], and [`search::SearchEngine`]
//! answers nearest-neighbor queries over the committed vectors.
//! [`service::Codesense`] wires all of it from a [`codesense_core::CodesenseConfig`].

pub mod builder;
pub mod chunker;
pub mod embedding;
pub mod framework;
pub mod intent;
pub mod lock;
pub mod search;
pub mod service;
pub mod snapshot;
pub mod store;

pub use builder::{BuildMode, BuildReport, BuildRequest, IndexBuilder};
pub use chunker::{ChunkExtractor, ChunkSpan, ExtractError, TreeSitterExtractor, WholeFileExtractor};
pub use embedding::{EmbeddingProvider, HashingEmbedder, HttpEmbeddingClient};
pub use search::{SearchEngine, SearchFilter, SearchQuery};
pub use service::{Codesense, SearchOptions, SearchOutcome};
pub use snapshot::{IndexSnapshot, VectorRow, VectorTable};
pub use store::{IndexInfo, IndexStore};
