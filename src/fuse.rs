//! Knowledge fusion: one weighted, size-bounded context from local
//! retrieval output and fetched web documents.
//!
//! Policy, in order:
//! - a side with weight <= 0 is omitted entirely — content and sources
//!   both, regardless of what was available;
//! - local content always precedes web content (fixed design choice,
//!   not query-dependent);
//! - each web document contributes a bounded preview, and documents
//!   beyond the configured count are dropped;
//! - the sources list mirrors exactly what went into the text — no
//!   orphan citations;
//! - the final text is capped at `max_length`, cutting at a sentence
//!   boundary when one exists within the lookback window, at a word
//!   boundary otherwise, and appending a readable notice either way.

use crate::config::FusionConfig;
use crate::models::{FusedContext, SourceRecord, WebDocument};

/// Appended whenever the fused context is cut at the length cap.
pub const CONTEXT_TRUNCATION_NOTICE: &str =
    "...\n[context truncated - prioritizing most relevant information]";

/// Appended to a web document preview that was cut short.
pub const PREVIEW_TRUNCATION_NOTE: &str = "...\n[see full documentation at source URL]";

/// How far back from the hard limit to look for a sentence end.
const SENTENCE_LOOKBACK: usize = 1000;

/// Weighting and size policy for one fusion call.
#[derive(Debug, Clone)]
pub struct FusionPolicy {
    pub local_weight: f64,
    pub web_weight: f64,
    pub max_length: usize,
    pub web_preview_chars: usize,
    pub max_web_documents: usize,
}

impl From<&FusionConfig> for FusionPolicy {
    fn from(config: &FusionConfig) -> Self {
        Self {
            local_weight: config.local_weight,
            web_weight: config.web_weight,
            max_length: config.max_context_chars,
            web_preview_chars: config.web_preview_chars,
            max_web_documents: config.max_web_documents,
        }
    }
}

/// Merge local answer text and web documents into one [`FusedContext`].
///
/// Each call allocates a fresh result; nothing is shared with the
/// inputs or between calls.
pub fn fuse(
    local_answer: &str,
    local_sources: &[SourceRecord],
    web_documents: &[WebDocument],
    policy: &FusionPolicy,
) -> FusedContext {
    let mut parts: Vec<String> = Vec::new();
    let mut sources: Vec<SourceRecord> = Vec::new();

    let include_local = policy.local_weight > 0.0 && !local_answer.trim().is_empty();
    if include_local {
        parts.push(local_answer.trim().to_string());
        sources.extend(local_sources.iter().cloned());
    }

    let shown_web: &[WebDocument] = if policy.web_weight > 0.0 {
        &web_documents[..web_documents.len().min(policy.max_web_documents)]
    } else {
        &[]
    };
    let include_web = !shown_web.is_empty();
    if include_web {
        let mut web_context = String::new();
        for doc in shown_web {
            web_context.push_str(&doc.title);
            web_context.push_str(":\n");
            web_context.push_str(&preview(&doc.content, policy.web_preview_chars));
            web_context.push_str("\n\n");

            sources.push(SourceRecord::Web {
                title: doc.title.clone(),
                url: doc.url.clone(),
                doc_type: doc.doc_type.clone(),
            });
        }
        parts.push(web_context.trim_end().to_string());
    }

    let mut text = parts.join("\n\n");
    if text.len() > policy.max_length {
        text = format!(
            "{}{}",
            truncate_at_boundary(&text, policy.max_length),
            CONTEXT_TRUNCATION_NOTICE
        );
    }

    FusedContext {
        text,
        sources,
        has_local: include_local,
        has_web: include_web,
    }
}

/// Bounded preview of a web document's content.
fn preview(content: &str, max: usize) -> String {
    if content.len() <= max {
        content.to_string()
    } else {
        let cut = floor_char_boundary(content, max);
        format!("{}{}", &content[..cut], PREVIEW_TRUNCATION_NOTE)
    }
}

/// Cut `text` to at most `limit` bytes, preferring the last sentence
/// end within the lookback window, then the last word boundary, then
/// the hard limit. Never cuts mid-word when any boundary exists.
fn truncate_at_boundary(text: &str, limit: usize) -> String {
    debug_assert!(text.len() > limit);

    let hard = floor_char_boundary(text, limit);
    let window_start = floor_char_boundary(text, limit.saturating_sub(SENTENCE_LOOKBACK));
    let window = &text[window_start..hard];

    let mut sentence_cut = None;
    let mut chars = window.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let ends_sentence = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            };
            if ends_sentence {
                sentence_cut = Some(window_start + i + c.len_utf8());
            }
        }
    }

    let cut = sentence_cut
        .or_else(|| window.rfind(char::is_whitespace).map(|i| window_start + i))
        .unwrap_or(hard);

    text[..cut].trim_end().to_string()
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
