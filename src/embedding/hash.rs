//! 로컬 해시 임베딩
//!
//! 토큰을 SHA-256으로 해시해 고정 차원 벡터에 누적하는 결정적 임베딩입니다.
//! 의미 검색 품질은 모델 임베딩보다 낮지만 외부 모델/네트워크 없이 동작하고,
//! 플랫폼과 무관하게 같은 입력에 같은 벡터를 돌려줍니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 해시 임베딩 차원 범위
const MIN_DIMENSION: usize = 8;
const MAX_DIMENSION: usize = 4096;

/// SHA-256 기반 해시 임베딩
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    /// 차원을 지정하여 생성
    pub fn new(dimension: usize) -> Result<Self> {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be between {} and {}",
                dimension,
                MIN_DIMENSION,
                MAX_DIMENSION
            );
        }
        Ok(Self { dimension })
    }

    /// 토큰 → (버킷 인덱스, 부호)
    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// 동기 임베딩 (L2 정규화)
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let (index, sign) = self.bucket(&token);
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

/// 소문자 영숫자 토큰 분리
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "sha256-hash"
    }
}

// ============================================================================
// Tests
// ============================================================================
