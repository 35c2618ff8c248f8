//! Hash-based text embeddings.
//!
//! Words and character trigrams are hashed into fixed buckets, plus a few
//! length statistics, then L2-normalized. No model is involved, so the
//! index can be built offline and is fully deterministic.

use ndarray::Array1;
use sha2::{Digest, Sha256};

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 256;

/// Generator for text embeddings.
#[derive(Debug, Clone)]
pub struct TextEmbedder {
    dimension: usize,
}

impl Default for TextEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl TextEmbedder {
    /// Creates an embedder. Dimensions below 8 are raised to 8.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds `text` into a unit-length vector (all zeros for empty text).
    ///
    /// Layout: word buckets in the first half, character trigram buckets in
    /// the next quarter, text statistics in the rest.
    pub fn embed(&self, text: &str) -> Array1<f64> {
        let mut embedding = Array1::zeros(self.dimension);

        if text.trim().is_empty() {
            return embedding;
        }

        let text_lower = text.to_lowercase();

        let words: Vec<&str> = text_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let word_dim = self.dimension / 2;
        for word in &words {
            let pos = hash_to_index(word, word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        let offset = word_dim;
        let trigram_dim = self.dimension / 4;
        let chars: Vec<char> = text_lower.chars().collect();
        let trigram_count = chars.len().saturating_sub(2).max(1) as f64;
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let pos = offset + hash_to_index(&trigram, trigram_dim);
            embedding[pos] += 1.0 / trigram_count;
        }

        let stats_offset = offset + trigram_dim;
        embedding[stats_offset] = (text.len() as f64 / 1000.0).min(1.0) * 0.1;
        embedding[stats_offset + 1] = (words.len() as f64 / 200.0).min(1.0) * 0.1;

        normalize(&mut embedding);
        embedding
    }
}

/// Hashes a string to an index in `[0, max_index)`.
fn hash_to_index(input: &str, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash_bytes = hasher.finalize();
    let hash_val = u32::from_be_bytes([hash_bytes[0], hash_bytes[1], hash_bytes[2], hash_bytes[3]]);
    hash_val as usize % max_index
}

/// Normalizes a vector to unit length (L2 norm).
fn normalize(v: &mut Array1<f64>) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    }
}

/// Cosine similarity in `[-1, 1]`; zero when either vector is zero or the
/// lengths differ.
pub fn cosine_similarity(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot_product = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
