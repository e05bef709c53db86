//! Paragraph-first text splitter with tail overlap.
//!
//! Splits source text into [`Chunk`]s bounded by a character budget.
//! Splitting prefers paragraph boundaries (`\n\n`), falling back to
//! word boundaries for oversized paragraphs. Consecutive chunks share a
//! configurable overlap so retrieval does not lose sentences that
//! straddle a cut.
//!
//! Every produced chunk carries the base metadata of its source plus
//! `chunk_seq` / `total_chunks` stamps.

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMetadata};

/// Split `content` into chunks of at most `chunk_chars` characters.
///
/// Whitespace-only input produces no chunks (stored chunks must have
/// non-empty content). Input within the budget produces exactly one.
pub fn split_text(content: &str, base: &ChunkMetadata, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let texts = if trimmed.len() <= cfg.chunk_chars {
        vec![trimmed.to_string()]
    } else {
        // Pack to a reduced budget so prepending the overlap tail keeps
        // every chunk within chunk_chars.
        let budget = cfg.chunk_chars.saturating_sub(cfg.overlap_chars).max(1);
        let pieces = pack_pieces(trimmed, budget);
        apply_overlap(pieces, cfg.overlap_chars)
    };

    let total = texts.len() as i64;
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut metadata = base.clone();
            metadata.chunk_seq = Some(i as i64);
            metadata.total_chunks = Some(total);
            Chunk {
                id: Uuid::new_v4().to_string(),
                content: text,
                metadata,
            }
        })
        .collect()
}

/// Pack paragraphs into pieces of at most `budget` characters, word-
/// splitting paragraphs that alone exceed it.
fn pack_pieces(text: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };

        if would_be > budget && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > budget {
            let tail = split_long_paragraph(para, budget, &mut pieces);
            buf.push_str(tail);
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }
    }

    if !buf.trim().is_empty() {
        pieces.push(buf.trim().to_string());
    }

    pieces
}

/// Word-boundary hard split. Emits full pieces and returns the final
/// under-budget remainder so it can pack with following paragraphs.
fn split_long_paragraph<'a>(para: &'a str, budget: usize, pieces: &mut Vec<String>) -> &'a str {
    let mut remaining = para;
    while remaining.len() > budget {
        let mut hard = floor_char_boundary(remaining, budget);
        if hard == 0 {
            // First char is wider than the budget; take it whole.
            hard = remaining
                .chars()
                .next()
                .map(|c| c.len_utf8())
                .unwrap_or(remaining.len());
        }
        let split_at = remaining[..hard]
            .rfind(char::is_whitespace)
            .filter(|&pos| pos > 0)
            .unwrap_or(hard);

        pieces.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start();
    }
    remaining
}

/// Prepend each piece (after the first) with the word-aligned tail of
/// its predecessor.
fn apply_overlap(pieces: Vec<String>, overlap_chars: usize) -> Vec<String> {
    if overlap_chars == 0 || pieces.len() < 2 {
        return pieces;
    }

    let mut texts = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            texts.push(piece.clone());
            continue;
        }
        let tail = tail_overlap(&pieces[i - 1], overlap_chars.saturating_sub(1));
        if tail.is_empty() {
            texts.push(piece.clone());
        } else {
            texts.push(format!("{} {}", tail, piece));
        }
    }
    texts
}

/// Largest index `<= at` that falls on a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut idx = at;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Tail of `text` at most `overlap` characters long, starting at a
/// word boundary. Empty when no word boundary falls in the window.
fn tail_overlap(text: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    if text.len() <= overlap {
        return text;
    }
    let start = floor_char_boundary(text, text.len() - overlap);
    match text[start..].find(char::is_whitespace) {
        Some(ws) => text[start + ws..].trim_start(),
        None => "",
    }
}
