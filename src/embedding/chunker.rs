//! Text Chunking Module
//!
//! PDF 페이지 텍스트를 고정 크기 문자 윈도우로 분할합니다.
//! 추출된 PDF 텍스트는 Markdown 구조가 없어서 구조 인식 대신 슬라이딩 윈도우를 씁니다.

use crate::config::ChunkingConfig;

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SlidingWindowChunker
// ============================================================================

/// 문자 단위 슬라이딩 윈도우 청커
///
/// `chunk_size` 문자 윈도우를 `chunk_size - chunk_overlap` 만큼씩 이동합니다.
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SlidingWindowChunker {
    /// 설정으로 생성
    ///
    /// overlap이 size 이상이면 윈도우가 전진하지 않으므로 size - 1로 제한합니다.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Default for SlidingWindowChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.chunk_size, self.chunk_overlap)
    }

    fn name(&self) -> &'static str {
        "sliding-window"
    }
}

/// 텍스트를 문자 윈도우로 분할 (UTF-8 안전)
///
/// 윈도우가 텍스트 끝에 닿으면 종료하므로 앞 청크에 완전히 포함되는
/// 꼬리 청크는 생기지 않습니다.
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `chunk_size` - 청크 당 문자 수
/// * `overlap` - 청크 간 중첩 문자 수 (`chunk_size`보다 작아야 함)
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());

        if end >= chars.len() {
            break;
        }

        start += step;
    }

    chunks
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_with_overlap() {
        let chunks = chunk_text("abcdefghij", 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_chunk_text_no_overlap() {
        let chunks = chunk_text("abcdefgh", 4, 0);
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_chunk_text_short_and_empty() {
        assert!(chunk_text("", 4, 1).is_empty());
        assert_eq!(chunk_text("abc", 4, 1), vec!["abc"]);
        assert_eq!(chunk_text("abcd", 4, 1), vec!["abcd"]);
    }

    #[test]
    fn test_chunk_text_partial_tail() {
        let chunks = chunk_text("abcdefg", 4, 2);
        assert_eq!(chunks, vec!["abcd", "cdef", "efg"]);
    }

    #[test]
    fn test_chunk_text_unicode_boundaries() {
        let chunks = chunk_text("항공우주공학", 4, 2);
        assert_eq!(chunks, vec!["항공우주", "우주공학"]);
    }

    #[test]
    fn test_default_window_sizes() {
        let chunker = SlidingWindowChunker::default();
        let text = "x".repeat(2500);
        let chunks = chunker.chunk(&text);

        // 0..1000, 800..1800, 1600..2500
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[2].len(), 900);
        assert_eq!(chunker.name(), "sliding-window");
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = SlidingWindowChunker::new(3, 10);
        let chunks = chunker.chunk("abcde");
        assert_eq!(chunks, vec!["abc", "bcd", "cde"]);
    }
}
