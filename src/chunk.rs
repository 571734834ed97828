//! Whitespace-token text chunker with overlap.
//!
//! Splits extracted text into chunks that respect a character budget.
//! Tokens are accumulated greedily; when the next token would overflow the
//! budget the chunk is emitted and a short suffix of its tokens seeds the
//! next one so that context survives the boundary.
//!
//! Each chunk receives a deterministic id derived from its source file and
//! ordinal, plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};

use crate::extract::Segment;
use crate::models::{chunk_id, Chunk, ChunkMetadata, ContentKind};

/// Approximate characters per word (including the joining space), used to
/// turn the character overlap budget into a token count.
const CHARS_PER_WORD: usize = 6;

/// Split text into chunks of at most `size` characters, carrying roughly
/// `overlap` characters of trailing tokens into the following chunk.
///
/// A single token longer than `size` becomes a chunk of its own. Empty or
/// whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let carry = overlap_word_count(overlap);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in words {
        let word_len = word.chars().count();
        let would_be = current_len + word_len + usize::from(!current.is_empty());

        if would_be > size && !current.is_empty() {
            chunks.push(current.join(" "));
            current = seed_overlap(&current, carry, word_len, size);
            current_len = joined_len(&current);
        }

        current_len += word_len + usize::from(!current.is_empty());
        current.push(word);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

fn overlap_word_count(overlap: usize) -> usize {
    if overlap == 0 {
        0
    } else {
        (overlap / CHARS_PER_WORD).max(1)
    }
}

/// Trailing tokens of the emitted chunk that start the next one. Never the
/// whole chunk, and trimmed from the front until the next token still fits.
fn seed_overlap<'a>(emitted: &[&'a str], carry: usize, next_len: usize, size: usize) -> Vec<&'a str> {
    let keep = carry.min(emitted.len().saturating_sub(1));
    let mut seed: Vec<&'a str> = emitted[emitted.len() - keep..].to_vec();
    while !seed.is_empty() && joined_len(&seed) + 1 + next_len > size {
        seed.remove(0);
    }
    seed
}

fn joined_len(words: &[&str]) -> usize {
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|w| w.chars().count()).sum::<usize>() + words.len() - 1
}

/// Turn extracted segments of one file into ordered chunks.
///
/// Prose segments go through [`chunk_text`]; table segments are kept whole.
/// Ordinals run across the whole file so ids stay unique per source.
pub fn chunk_segments(source: &str, segments: &[Segment], size: usize, overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for segment in segments {
        let pieces = match segment.kind {
            ContentKind::Text => chunk_text(&segment.text, size, overlap),
            ContentKind::Table => {
                let trimmed = segment.text.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed.to_string()]
                }
            }
        };

        for piece in pieces {
            let ordinal = chunks.len();
            chunks.push(make_chunk(source, ordinal, segment.page, segment.kind, piece));
        }
    }

    chunks
}

fn make_chunk(source: &str, ordinal: usize, page: u32, kind: ContentKind, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(source, ordinal),
        ordinal,
        text,
        hash,
        metadata: ChunkMetadata {
            source: source.to_string(),
            page,
            kind,
        },
    }
}
