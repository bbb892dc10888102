//! Word-budget chunker for long articles.
//!
//! Articles above the chunking threshold are split into target-size
//! segments with a fixed word overlap, preferring paragraph boundaries so
//! each chunk stays coherent. Chunk indices are contiguous from 0 and each
//! chunk records an approximate start offset into the parent body.
//!
//! Title weighting happens at embed time, not here: [`title_weighted`]
//! prepends the title N times, and the indexer applies it to whole articles
//! and to chunk 0 only. Later chunks are pure content so the title signal
//! cannot produce spurious per-chunk matches.

use crate::config::ChunkingConfig;
use crate::models::ArticleChunk;

pub fn count_words(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

/// Whether an article body crosses the chunking threshold.
pub fn should_chunk(word_count: i64, config: &ChunkingConfig) -> bool {
    word_count > config.threshold_words as i64
}

/// Build the text actually embedded for a unit: the title prepended
/// `multiplier` times, then the body.
pub fn title_weighted(title: &str, content: &str, multiplier: usize) -> String {
    if multiplier == 0 || title.is_empty() {
        return content.to_string();
    }
    let mut out = String::with_capacity(title.len() * multiplier + content.len() + multiplier);
    for _ in 0..multiplier {
        out.push_str(title);
        out.push(' ');
    }
    out.push_str(content);
    out
}

/// Split a body into overlapping chunks on paragraph boundaries.
///
/// Indices are contiguous from 0. The trailing `overlap_words` of each
/// chunk are carried into the next so a match near a boundary is not lost
/// to either side.
pub fn chunk_text(article_id: i64, text: &str, config: &ChunkingConfig) -> Vec<ArticleChunk> {
    let chunk_size = config.chunk_size_words.max(1);
    let overlap = config.overlap_words.min(chunk_size - 1);

    // Paragraphs with their byte offsets in the original text.
    let mut paragraphs: Vec<(usize, &str)> = Vec::new();
    let mut cursor = 0;
    for paragraph in text.split("\n\n") {
        let trimmed = paragraph.trim();
        if !trimmed.is_empty() {
            let inner = paragraph.len() - paragraph.trim_start().len();
            paragraphs.push((cursor + inner, trimmed));
        }
        cursor += paragraph.len() + 2;
    }

    let mut chunks: Vec<ArticleChunk> = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffer_words: usize = 0;
    let mut buffer_start: usize = 0;
    let mut carry: Vec<String> = Vec::new();

    let flush =
        |buffer: &mut Vec<String>, buffer_words: &mut usize, start: usize, chunks: &mut Vec<ArticleChunk>| {
            if buffer.is_empty() {
                return Vec::new();
            }
            let content = buffer.join("\n\n");
            let words: Vec<&str> = content.split_whitespace().collect();
            let tail_start = words.len().saturating_sub(overlap);
            let tail: Vec<String> = words[tail_start..].iter().map(|w| w.to_string()).collect();

            chunks.push(ArticleChunk {
                article_id,
                chunk_index: chunks.len() as i64,
                word_count: count_words(&content),
                content,
                start_position: start as i64,
            });
            buffer.clear();
            *buffer_words = 0;
            tail
        };

    for (offset, paragraph) in paragraphs {
        let para_words = paragraph.split_whitespace().count();

        // Oversized paragraph: hard-split by words.
        if para_words > chunk_size {
            carry = flush(&mut buffer, &mut buffer_words, buffer_start, &mut chunks);

            let words: Vec<&str> = paragraph.split_whitespace().collect();
            let mut start = 0;
            while start < words.len() {
                let end = (start + chunk_size).min(words.len());
                let mut piece_words: Vec<String> =
                    carry.drain(..).collect();
                piece_words.extend(words[start..end].iter().map(|w| w.to_string()));
                let content = piece_words.join(" ");

                let piece_tokens: Vec<&str> = content.split_whitespace().collect();
                let tail_start = piece_tokens.len().saturating_sub(overlap);
                carry = piece_tokens[tail_start..]
                    .iter()
                    .map(|w| w.to_string())
                    .collect();

                chunks.push(ArticleChunk {
                    article_id,
                    chunk_index: chunks.len() as i64,
                    word_count: count_words(&content),
                    content,
                    start_position: offset as i64,
                });
                start = end;
            }
            buffer_start = offset + paragraph.len();
            continue;
        }

        if buffer_words + para_words > chunk_size && !buffer.is_empty() {
            carry = flush(&mut buffer, &mut buffer_words, buffer_start, &mut chunks);
        }

        if buffer.is_empty() {
            buffer_start = offset;
            if !carry.is_empty() {
                let carried = carry.join(" ");
                buffer_words = carry.len();
                buffer.push(carried);
                carry = Vec::new();
            }
        }

        buffer.push(paragraph.to_string());
        buffer_words += para_words;
    }

    flush(&mut buffer, &mut buffer_words, buffer_start, &mut chunks);

    if chunks.is_empty() && !text.trim().is_empty() {
        chunks.push(ArticleChunk {
            article_id,
            chunk_index: 0,
            word_count: count_words(text),
            content: text.trim().to_string(),
            start_position: 0,
        });
    }

    chunks
}
