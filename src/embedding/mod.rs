//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 청크와 질의를 같은 고정 길이 벡터 공간으로 변환합니다.
//! - `HashEmbedding`: 로컬 해시 임베딩 (기본값, 네트워크 불필요)
//! - `GeminiEmbedding`: Gemini 임베딩 API
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hash;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{AssistConfig, EmbedderKind};

pub use gemini::{get_api_key, has_api_key, GeminiEmbedding};
pub use hash::HashEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &AssistConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedder {
        EmbedderKind::Hash => Arc::new(HashEmbedding::new(config.embedding_dimension)?),
        EmbedderKind::Gemini => Arc::new(GeminiEmbedding::from_env()?),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Test Doubles
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// 실패 스위치가 달린 해시 임베딩
    pub struct FlakyEmbedding {
        inner: HashEmbedding,
        fail: AtomicBool,
    }

    impl FlakyEmbedding {
        pub fn new(dimension: usize) -> Self {
            Self {
                inner: HashEmbedding::new(dimension).unwrap(),
                fail: AtomicBool::new(false),
            }
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("embedding backend down");
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }
}
