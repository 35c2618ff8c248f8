//! Passage retrieval over a local document corpus.
//!
//! Documents are chunked, embedded with [`TextEmbedder`] and ranked by
//! cosine similarity. The index is built once up front and implements the
//! [`crate::ports::PassageRetriever`] port.

pub mod chunker;
pub mod embedding;
pub mod index;

pub use chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use embedding::{cosine_similarity, TextEmbedder};
pub use index::{DocumentIndex, IndexOptions, IndexStats, DEFAULT_SIMILARITY_THRESHOLD};
