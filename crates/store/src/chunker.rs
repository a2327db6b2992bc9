//! Text chunking for ingestion.
//!
//! Splits text into windows of roughly `chunk_size` characters that overlap by
//! `chunk_overlap` characters. Near the end of each window the splitter looks
//! back for sentence punctuation or a newline so chunks end on a boundary.
//! Sizes are counted in chars, not bytes, so Vietnamese text splits safely.

/// How far back from the window end to look for a sentence break.
const BREAK_LOOKBACK: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

fn is_break(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Split `text` into trimmed, non-empty chunks.
pub fn split_text(text: &str, config: ChunkConfig) -> Vec<String> {
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    if n <= size {
        let trimmed = text.trim();
        return if trimmed.is_empty() { Vec::new() } else { vec![trimmed.to_string()] };
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + size).min(n);

        if end < n {
            let floor = end.saturating_sub(BREAK_LOOKBACK).max(start + 1);
            if let Some(i) = (floor..end).rev().find(|&i| is_break(chars[i])) {
                end = i + 1;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= n {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_text("  Honda Civic là sedan hạng C.  ", ChunkConfig::default());
        assert_eq!(chunks, vec!["Honda Civic là sedan hạng C.".to_string()]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_text("   \n ", ChunkConfig::default()).is_empty());
    }

    #[test]
    fn long_text_breaks_on_sentences() {
        let sentence = "Xe điện VinFast có phạm vi hoạt động dài. ";
        let text = sentence.repeat(60);
        let config = ChunkConfig { chunk_size: 300, chunk_overlap: 50 };
        let chunks = split_text(&text, config);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 300);
            assert!(chunk.ends_with('.'));
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text: String = (0..400).map(|i| format!("w{i} ")).collect();
        let config = ChunkConfig { chunk_size: 200, chunk_overlap: 40 };
        let chunks = split_text(&text, config);

        assert!(chunks.len() >= 2);
        let tail: String = chunks[0].chars().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "ô".repeat(2500);
        let chunks = split_text(&text, ChunkConfig::default());
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == 'ô')));
    }
}
