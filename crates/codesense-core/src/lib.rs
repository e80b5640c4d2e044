//! Core types, configuration, and error handling for codesense.
//!
//! This crate provides the shared foundation used by the other codesense crates:
//! - [`CodesenseError`]: unified error type using `thiserror` and `miette`
//! - [`CodesenseConfig`]: configuration loaded from `.codesense.toml`
//! - Shared types: [`Chunk`], [`Entity`], [`FileRecord`], [`SearchResult`],
//!   [`ExtractionWarning`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    ChunkingMode, CodesenseConfig, EmbeddingConfig, EmbeddingProviderKind, IndexingConfig,
    SearchConfig, StorageConfig,
};
pub use error::CodesenseError;
pub use types::{
    chunk_id, Callable, Chunk, ChunkKind, ClassInfo, Entity, ExtractionWarning, FileRecord,
    HttpRoute, OutputFormat, SearchResult,
};

/// A convenience `Result` type for codesense operations.
pub type Result<T> = std::result::Result<T, CodesenseError>;
