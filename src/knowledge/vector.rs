//! Vector Index - 정확한(브루트포스) 최근접 이웃 검색
//!
//! 청크 텍스트와 임베딩을 나란히 보관하고, 질의 벡터와의 유클리드 거리로
//! 전체 벡터를 비교합니다. 근사 검색은 사용하지 않습니다.

use std::cmp::Ordering;

use crate::error::AssistError;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// 인덱스 내 위치
    pub position: usize,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 질의와의 유클리드 거리 (작을수록 가까움)
    pub distance: f32,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 트레이트
pub trait VectorIndex: Send + Sync {
    /// 가까운 순으로 최대 `limit`개 반환 (`limit`은 코퍼스 크기로 제한)
    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>, AssistError>;

    /// 저장된 벡터 개수
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 벡터 차원 (비어 있으면 0)
    fn dimension(&self) -> usize;
}

// ============================================================================
// FlatL2Index
// ============================================================================

/// 평면 L2 인덱스 (청크 텍스트 + 임베딩 병렬 배열)
#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl FlatL2Index {
    /// 텍스트/임베딩 쌍으로 인덱스 생성
    ///
    /// 두 배열의 길이가 다르거나 벡터 차원이 섞여 있으면 에러입니다.
    pub fn build(texts: Vec<String>, vectors: Vec<Vec<f32>>) -> Result<Self, AssistError> {
        if texts.len() != vectors.len() {
            return Err(AssistError::embedding(format!(
                "{} chunks but {} embeddings",
                texts.len(),
                vectors.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(AssistError::embedding(format!(
                "embedding {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dimension
            )));
        }

        Ok(Self {
            texts,
            vectors,
            dimension,
        })
    }

    /// 저장된 청크 텍스트
    pub fn texts(&self) -> &[String] {
        &self.texts
    }
}

impl VectorIndex for FlatL2Index {
    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>, AssistError> {
        if self.vectors.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension {
            return Err(AssistError::embedding(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, euclidean_distance(query, v)))
            .collect();

        // 거리 오름차순, 같으면 삽입 순서
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit.min(self.vectors.len()));

        Ok(scored
            .into_iter()
            .map(|(position, distance)| SearchHit {
                position,
                chunk_text: self.texts[position].clone(),
                distance,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 유클리드(L2) 거리
///
/// 길이가 다르면 짧은 쪽 기준으로 비교합니다. 호출자는 차원을 먼저 검증합니다.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// Tests
// ============================================================================
