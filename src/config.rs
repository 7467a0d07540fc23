//! 설정 모듈
//!
//! 기본값 → JSON 설정 파일(선택) → 환경변수 순서로 덮어씁니다.
//!
//! ## 환경변수
//! - `ASSIST_MAX_CHUNK_CHARS`, `ASSIST_CHUNK_OVERLAP_WORDS`
//! - `ASSIST_MEMORY_CAP`, `ASSIST_TOP_K`, `ASSIST_CONFIDENCE_THRESHOLD`
//! - `ASSIST_RECORD_REFUSALS`, `ASSIST_EMBEDDER`, `ASSIST_RETRIEVAL_DOMAINS`
//! - `ASSIST_MAX_SESSIONS`, `ASSIST_UPLOAD_DIR`

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::AssistError;
use crate::knowledge::ChunkConfig;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.palank-assist/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".palank-assist")
}

// ============================================================================
// Types
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// 로컬 해시 임베딩 (네트워크 불필요)
    Hash,
    /// Gemini 임베딩 API
    Gemini,
}

impl FromStr for EmbedderKind {
    type Err = AssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(EmbedderKind::Hash),
            "gemini" => Ok(EmbedderKind::Gemini),
            other => Err(AssistError::config(format!("unknown embedder: {}", other))),
        }
    }
}

/// 어시스턴트 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 대화 메모리 최대 엔트리 수 (짝수)
    pub memory_cap: usize,
    /// 리트리벌 결과 개수
    pub top_k: usize,
    /// 사용자 선택 도메인을 무시할 라우터 신뢰도 기준
    pub confidence_threshold: f32,
    /// 도메인 불일치 거절 응답도 메모리에 기록할지 여부
    pub record_refusals: bool,
    /// 분류 호출 출력 토큰 한도
    pub router_max_tokens: u32,
    /// 생성 호출 출력 토큰 한도
    pub generation_max_tokens: u32,
    /// 생성 temperature
    pub temperature: f32,
    /// 임베딩 프로바이더
    pub embedder: EmbedderKind,
    /// 해시 임베딩 차원
    pub embedding_dimension: usize,
    /// 리트리벌을 사용하는 도메인
    pub retrieval_domains: Vec<Domain>,
    /// 업로드 원본 저장 디렉토리 (None이면 데이터 디렉토리 아래 `uploads/`)
    pub upload_dir: Option<PathBuf>,
    /// 동시에 유지할 최대 세션 수 (넘치면 가장 오래 쓰지 않은 세션부터 정리)
    pub max_sessions: usize,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            memory_cap: 12,
            top_k: 5,
            confidence_threshold: 0.75,
            record_refusals: false,
            router_max_tokens: 120,
            generation_max_tokens: 512,
            temperature: 0.3,
            embedder: EmbedderKind::Hash,
            embedding_dimension: 384,
            retrieval_domains: vec![Domain::Education, Domain::Medical, Domain::Legal],
            upload_dir: None,
            max_sessions: 256,
        }
    }
}

impl AssistConfig {
    /// 설정 로드 (파일 + 환경변수)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// JSON 설정 파일 읽기
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// 환경변수 덮어쓰기
    ///
    /// 테스트에서 프로세스 환경을 건드리지 않도록 조회 함수를 주입받습니다.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AssistError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ASSIST_MAX_CHUNK_CHARS") {
            self.chunk.max_characters = parse_env("ASSIST_MAX_CHUNK_CHARS", &v)?;
        }
        if let Some(v) = lookup("ASSIST_CHUNK_OVERLAP_WORDS") {
            self.chunk.overlap_words = parse_env("ASSIST_CHUNK_OVERLAP_WORDS", &v)?;
        }
        if let Some(v) = lookup("ASSIST_MEMORY_CAP") {
            self.memory_cap = parse_env("ASSIST_MEMORY_CAP", &v)?;
        }
        if let Some(v) = lookup("ASSIST_TOP_K") {
            self.top_k = parse_env("ASSIST_TOP_K", &v)?;
        }
        if let Some(v) = lookup("ASSIST_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_env("ASSIST_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ASSIST_RECORD_REFUSALS") {
            self.record_refusals = parse_env("ASSIST_RECORD_REFUSALS", &v)?;
        }
        if let Some(v) = lookup("ASSIST_EMBEDDER") {
            self.embedder = v.parse()?;
        }
        if let Some(v) = lookup("ASSIST_RETRIEVAL_DOMAINS") {
            self.retrieval_domains = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<Domain>().map_err(|_| {
                        AssistError::config(format!(
                            "ASSIST_RETRIEVAL_DOMAINS: unknown domain {}",
                            s
                        ))
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = lookup("ASSIST_MAX_SESSIONS") {
            self.max_sessions = parse_env("ASSIST_MAX_SESSIONS", &v)?;
        }
        if let Some(v) = lookup("ASSIST_UPLOAD_DIR") {
            self.upload_dir = Some(PathBuf::from(v.trim()));
        }
        Ok(())
    }

    /// 값 검증
    pub fn validate(&self) -> Result<(), AssistError> {
        if self.chunk.max_characters == 0 {
            return Err(AssistError::config("chunk.max_characters must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AssistError::config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(AssistError::config("top_k must be > 0"));
        }
        if self.embedding_dimension == 0 {
            return Err(AssistError::config("embedding_dimension must be > 0"));
        }
        if self.max_sessions == 0 {
            return Err(AssistError::config("max_sessions must be > 0"));
        }
        Ok(())
    }

    /// 업로드 저장 디렉토리 (설정이 없으면 `get_data_dir()/uploads`)
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| get_data_dir().join("uploads"))
    }

    /// 해당 도메인이 리트리벌을 사용하는지
    pub fn retrieval_enabled(&self, domain: Domain) -> bool {
        self.retrieval_domains.contains(&domain)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, AssistError> {
    value
        .trim()
        .parse()
        .map_err(|_| AssistError::config(format!("{}: invalid value {:?}", key, value)))
}

// ============================================================================
// Tests
// ============================================================================
