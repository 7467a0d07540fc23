//! 에러 타입 정의
//!
//! 라우터/리트리벌 파이프라인이 구분해서 다뤄야 하는 실패 조건들입니다.
//! 상위 레이어(CLI, 서비스)는 `anyhow`로 감싸서 전파합니다.

use thiserror::Error;

/// 어시스턴트 코어 에러
#[derive(Debug, Error)]
pub enum AssistError {
    /// 완성(completion) 백엔드 호출 실패 (네트워크, 타임아웃, 비정상 응답)
    #[error("completion capability failed: {0}")]
    CapabilityFailure(String),

    /// 분류기 출력이 JSON이 아니거나 허용되지 않은 값을 포함
    #[error("malformed classifier output: {0}")]
    MalformedClassifierOutput(String),

    /// 문서 경로가 존재하지 않음
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// 지원하지 않는 확장자
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// 텍스트 추출 실패 (깨진 PDF 등)
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// 임베딩 실패 또는 차원 불일치
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// 설정 값 오류
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AssistError {
    pub fn capability(msg: impl Into<String>) -> Self {
        Self::CapabilityFailure(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedClassifierOutput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::DocumentNotFound(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// 라우터 폴백 로그에 남길 짧은 분류명
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapabilityFailure(_) => "capability_failure",
            Self::MalformedClassifierOutput(_) => "malformed_output",
            Self::DocumentNotFound(_) => "document_not_found",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Extraction(_) => "extraction",
            Self::Embedding(_) => "embedding",
            Self::Config(_) => "config",
        }
    }
}
