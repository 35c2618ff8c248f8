//! Splits documents into overlapping character windows.

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Splits `text` into chunks of at most `chunk_size` characters, each
/// starting `chunk_overlap` characters before the previous one ended.
///
/// A chunk boundary is moved back to the nearest whitespace in the second
/// half of the window so words are not cut in two. Whitespace-only chunks
/// are dropped.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();

    let mut start = 0;
    while start < len {
        let mut end = (start + chunk_size).min(len);
        if end < len {
            let earliest = (start + chunk_size / 2).max(start + 1);
            if let Some(pos) = (earliest..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = pos;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= len {
            break;
        }
        let next = end.saturating_sub(chunk_overlap);
        start = if next > start { next } else { end };
    }

    chunks
}
