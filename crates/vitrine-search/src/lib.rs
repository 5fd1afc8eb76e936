#![forbid(unsafe_code)]
//! vitrine-search library.
//!
//! The query path is `validate -> embed -> retrieve (vector + lexical,
//! concurrently) -> fuse -> truncate -> hydrate`, driven by
//! [`HybridSearch`]. Every collaborator is injected behind a trait so each
//! stage can be exercised without live backends.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for backend plumbing; `thiserror` enums at
//!   the typed seams ([`EmbeddingError`], [`SearchError`]).
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod embed;
pub mod fusion;
pub mod hydrate;
pub mod indexer;
pub mod retrieve;
pub mod search;

pub use embed::{EmbeddingError, EmbeddingGateway, Encoder, HttpEncoder, QueryVector};
pub use fusion::{FusedCandidate, FusedRanking, fuse};
pub use hydrate::{Hydrated, Hydrator, RecordStore, SqliteRecordStore};
pub use retrieve::{
    LexicalIndex, LexicalRetriever, RetrievalStatus, Retrieved, Retriever, SqliteVectorIndex,
    TantivyLexicalIndex, VectorIndex, VectorRetriever,
};
pub use search::{Component, HybridSearch, SearchError, SearchRequest, SearchResponse};
