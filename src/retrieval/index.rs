//! In-memory document index over a directory of text files.

use std::cmp::Reverse;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use ndarray::{Array1, Array2};
use ordered_float::OrderedFloat;
use serde::Serialize;
use walkdir::WalkDir;

use super::chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use super::embedding::TextEmbedder;
use crate::error::RetrievalError;
use crate::ports::{Passage, PassageRetriever};

/// Default minimum cosine similarity for a chunk to be returned.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.05;

/// File extensions picked up when scanning a document directory.
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Options controlling how an index is built and searched.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub similarity_threshold: f64,
    pub dimension: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            dimension: super::embedding::DEFAULT_DIMENSION,
        }
    }
}

impl IndexOptions {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    source_id: String,
    content: String,
}

/// Summary of an index, reported by the `index` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub sources: Vec<String>,
    pub skipped: Vec<String>,
}

/// Immutable chunk index with one embedding row per chunk.
///
/// Built once during setup and then shared read-only between runs.
pub struct DocumentIndex {
    chunks: Vec<Chunk>,
    embeddings: Array2<f64>,
    embedder: TextEmbedder,
    threshold: f64,
    stats: IndexStats,
}

impl DocumentIndex {
    /// An index with nothing in it. Every search returns no passages.
    pub fn empty() -> Self {
        let options = IndexOptions::default();
        Self::from_documents(Vec::new(), &options)
    }

    /// Scans `dir` recursively for text documents and indexes them.
    ///
    /// Unreadable files are logged and skipped. A missing directory is an
    /// error; an existing directory with no documents yields an empty index.
    pub fn build(dir: &Path, options: &IndexOptions) -> Result<Self, RetrievalError> {
        if !dir.is_dir() {
            return Err(RetrievalError::MissingCorpus(dir.display().to_string()));
        }

        let mut paths: Vec<_> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_document(path))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();
        for path in &paths {
            match load_document(path) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping document");
                    skipped.push(path.display().to_string());
                }
            }
        }

        let mut index = Self::from_documents(documents, options);
        index.stats.skipped = skipped;
        tracing::info!(
            documents = index.stats.documents,
            chunks = index.stats.chunks,
            dir = %dir.display(),
            "Document index built"
        );
        Ok(index)
    }

    /// Indexes `(source_id, text)` pairs directly.
    pub fn from_documents(documents: Vec<(String, String)>, options: &IndexOptions) -> Self {
        let embedder = TextEmbedder::new(options.dimension);
        let mut sources = Vec::with_capacity(documents.len());
        let mut chunks = Vec::new();

        for (source_id, text) in documents {
            for content in chunk_text(&text, options.chunk_size, options.chunk_overlap) {
                chunks.push(Chunk {
                    source_id: source_id.clone(),
                    content,
                });
            }
            sources.push(source_id);
        }

        let mut embeddings = Array2::zeros((chunks.len(), embedder.dimension()));
        for (i, chunk) in chunks.iter().enumerate() {
            embeddings.row_mut(i).assign(&embedder.embed(&chunk.content));
        }

        let stats = IndexStats {
            documents: sources.len(),
            chunks: chunks.len(),
            sources,
            skipped: Vec::new(),
        };

        Self {
            chunks,
            embeddings,
            embedder,
            threshold: options.similarity_threshold,
            stats,
        }
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns the `k` chunks most similar to `query` whose similarity is
    /// above the threshold, most similar first. Ties keep index order.
    pub fn search(&self, query: &str, k: usize) -> Vec<Passage> {
        if self.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        let query_vec: Array1<f64> = self.embedder.embed(query);
        // Rows and the query are unit length, so the dot product is the cosine.
        let scores = self.embeddings.dot(&query_vec);

        let mut ranked: Vec<(usize, f64)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| *score > self.threshold)
            .collect();
        ranked.sort_by_key(|(_, score)| Reverse(OrderedFloat(*score)));

        ranked
            .into_iter()
            .take(k)
            .map(|(i, score)| Passage {
                source_id: self.chunks[i].source_id.clone(),
                excerpt: self.chunks[i].content.clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl PassageRetriever for DocumentIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let passages = self.search(query, k);
        tracing::debug!(query, hits = passages.len(), "Document search");
        Ok(passages)
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reads one document; its source id is the file name.
fn load_document(path: &Path) -> Result<(String, String), RetrievalError> {
    let text = fs::read_to_string(path).map_err(|e| RetrievalError::ReadFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let source_id = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((source_id, text))
}
