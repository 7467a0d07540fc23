//! Text Chunking Module
//!
//! 문서 텍스트를 공백 단위 단어로 나눠 최대 문자 수 이하의 청크로 묶습니다.
//! 청크를 닫을 때 마지막 단어 몇 개를 다음 청크의 시작으로 넘겨(오버랩)
//! 문맥이 청크 경계에서 끊기지 않게 합니다.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수, 단어 사이 공백 포함)
    pub max_characters: usize,
    /// 다음 청크로 넘기는 끝 단어 수
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 800,
            overlap_words: 100,
        }
    }
}

impl ChunkConfig {
    /// 오버랩 없는 설정
    pub fn without_overlap(max_characters: usize) -> Self {
        Self {
            max_characters,
            overlap_words: 0,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// 문서 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChunk {
    /// 청크 텍스트
    pub text: String,
    /// 문서 내 순서 (0-based)
    pub source_order: usize,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 순서 번호가 붙은 문서 청크로 분할
    fn chunk_document(&self, text: &str) -> Vec<DocumentChunk> {
        self.chunk(text)
            .into_iter()
            .enumerate()
            .map(|(source_order, text)| DocumentChunk { text, source_order })
            .collect()
    }
}

// ============================================================================
// WordWindowChunker
// ============================================================================

/// 단어 누적 + 끝 단어 오버랩 청커
///
/// - 다음 단어를 붙이면 최대 길이를 넘는 순간 청크를 닫음
/// - 닫힌 청크의 끝 `overlap_words`개 단어로 다음 청크를 시작
/// - 오버랩만으로 다음 단어가 들어가지 않으면 오버랩을 앞에서부터 줄임
/// - 최대 길이보다 긴 단어는 문자 단위로 잘라 한 단어처럼 다룸
pub struct WordWindowChunker {
    config: ChunkConfig,
}

impl WordWindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 공백 분리 + 과대 단어 분할
    fn split_words(&self, text: &str) -> Vec<String> {
        let max = self.config.max_characters.max(1);
        let mut words = Vec::new();

        for word in text.split_whitespace() {
            if word.chars().count() <= max {
                words.push(word.to_string());
                continue;
            }
            let chars: Vec<char> = word.chars().collect();
            words.extend(chars.chunks(max).map(|piece| piece.iter().collect::<String>()));
        }

        words
    }
}

/// 공백 하나로 이었을 때의 문자 수
fn joined_len(words: &VecDeque<String>) -> usize {
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|w| w.chars().count()).sum::<usize>() + words.len() - 1
}

fn join_words(words: &VecDeque<String>) -> String {
    words.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

impl Chunker for WordWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let max = self.config.max_characters.max(1);
        let overlap = self.config.overlap_words;

        let mut chunks = Vec::new();
        let mut current: VecDeque<String> = VecDeque::new();
        let mut current_len = 0usize;
        // 오버랩 이후 새로 들어온 단어 수
        let mut fresh = 0usize;

        for word in self.split_words(text) {
            let word_len = word.chars().count();

            loop {
                let needed = if current.is_empty() {
                    word_len
                } else {
                    current_len + 1 + word_len
                };

                if needed <= max {
                    current.push_back(word);
                    current_len = needed;
                    fresh += 1;
                    break;
                }

                if fresh > 0 {
                    chunks.push(join_words(&current));
                    let keep = overlap.min(current.len());
                    current = current.split_off(current.len() - keep);
                    current_len = joined_len(&current);
                    fresh = 0;
                } else {
                    // 오버랩만 남았는데도 안 들어감
                    current.pop_front();
                    current_len = joined_len(&current);
                }
            }
        }

        if fresh > 0 {
            chunks.push(join_words(&current));
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "WordWindowChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WordWindowChunker::with_defaults())
}

/// 설정 지정 청커 생성
pub fn word_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(WordWindowChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_characters: usize, overlap_words: usize) -> WordWindowChunker {
        WordWindowChunker::new(ChunkConfig {
            max_characters,
            overlap_words,
        })
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = WordWindowChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\t ").is_empty());
    }

    #[test]
    fn test_chunker_small_text_single_chunk() {
        let chunker = WordWindowChunker::with_defaults();
        let chunks = chunker.chunk("Short   paragraph\nwith  spacing.");
        assert_eq!(chunks, vec!["Short paragraph with spacing."]);
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let chunks = chunker(7, 1).chunk("a b c d e f g h i j");
        assert_eq!(chunks, vec!["a b c d", "d e f g", "g h i j"]);
    }

    #[test]
    fn test_no_overlap() {
        let chunks = chunker(7, 0).chunk("a b c d e f g h");
        assert_eq!(chunks, vec!["a b c d", "e f g h"]);
    }

    #[test]
    fn test_final_partial_chunk_emitted() {
        let chunks = chunker(7, 0).chunk("a b c d e");
        assert_eq!(chunks, vec!["a b c d", "e"]);
    }

    #[test]
    fn test_oversized_overlap_is_trimmed() {
        // 오버랩 3단어("ccc ddd eee")에 다음 단어가 안 들어가면 앞에서부터 버림
        let chunks = chunker(11, 3).chunk("ccc ddd eee fffff");
        assert_eq!(chunks, vec!["ccc ddd eee", "eee fffff"]);
    }

    #[test]
    fn test_long_word_is_split() {
        let chunks = chunker(4, 0).chunk("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunks_never_exceed_max() {
        let text = "The quick brown fox jumps over the lazy dog while seventeen \
                    extraordinarily long-winded sentences wander aimlessly across pages";
        for (max, overlap) in [(10, 0), (16, 2), (25, 5), (40, 100)] {
            for chunk in chunker(max, overlap).chunk(text) {
                assert!(
                    chunk.chars().count() <= max,
                    "chunk {:?} exceeds {}",
                    chunk,
                    max
                );
            }
        }
    }

    #[test]
    fn test_rechunking_concatenated_output_is_stable() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunker = chunker(14, 0);
        let first = chunker.chunk(text);
        let second = chunker.chunk(&first.join(" "));
        assert_eq!(first, second);
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let chunks = chunker(5, 0).chunk("안녕 세계 하나 둘");
        assert_eq!(chunks, vec!["안녕 세계", "하나 둘"]);
    }

    #[test]
    fn test_chunk_document_orders() {
        let chunks = chunker(3, 0).chunk_document("a b c d");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_order, 0);
        assert_eq!(chunks[1].text, "c d");
        assert_eq!(chunks[1].source_order, 1);
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: ChunkConfig = serde_json::from_str(r#"{"overlap_words": 5}"#).unwrap();
        assert_eq!(config.max_characters, 800);
        assert_eq!(config.overlap_words, 5);
        assert_eq!(ChunkConfig::without_overlap(10).overlap_words, 0);
    }
}
