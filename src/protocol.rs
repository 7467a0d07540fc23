//! 전송 계층 프로토콜
//!
//! 오케스트레이터와 전송 계층 사이의 텍스트 포맷입니다.
//! 첫 줄은 `[domain=<domain> confidence=<0.00>]` 헤더, 나머지는 본문입니다.
//! 전송 계층은 헤더에서 도메인/신뢰도를 읽고 사용자에게는 본문만 보여줍니다.

use base64::{engine::general_purpose::STANDARD, Engine};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::knowledge::IngestReport;

/// 스트리밍 종료 마커
pub const END_MARKER: &str = "[[END]]";

/// 헤더를 해석할 수 없을 때의 도메인
pub const UNKNOWN_DOMAIN: &str = "unknown";

const HEADER_PREFIX: &str = "[domain=";

// ============================================================================
// Reply Header
// ============================================================================

/// 파싱된 헤더
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyHeader {
    pub domain: String,
    pub confidence: f32,
}

impl ReplyHeader {
    fn unknown() -> Self {
        Self {
            domain: UNKNOWN_DOMAIN.to_string(),
            confidence: 0.0,
        }
    }
}

/// 헤더 + 본문 인코딩
pub fn encode_reply(domain: &str, confidence: f32, body: &str) -> String {
    format!("[domain={} confidence={:.2}]\n{}", domain, confidence, body)
}

/// 첫 줄 헤더 파싱 (없거나 깨졌으면 unknown / 0.0)
pub fn parse_header(text: &str) -> ReplyHeader {
    let header = text.lines().next().unwrap_or("").trim();
    parse_header_line(header).unwrap_or_else(ReplyHeader::unknown)
}

fn parse_header_line(header: &str) -> Option<ReplyHeader> {
    let rest = header.strip_prefix(HEADER_PREFIX)?;
    let domain = rest.split(' ').next()?.trim_end_matches(']');
    if domain.is_empty() {
        return None;
    }

    let (_, after) = rest.split_once("confidence=")?;
    let (value, _) = after.split_once(']')?;
    let confidence = value.trim().parse::<f32>().ok()?;
    if !confidence.is_finite() {
        return None;
    }

    Some(ReplyHeader {
        domain: domain.to_string(),
        confidence,
    })
}

/// 헤더 줄 제거 후 본문만 반환 (앞뒤 공백 제거)
pub fn strip_header(text: &str) -> String {
    match text.split_once('\n') {
        Some((first, body)) if first.starts_with(HEADER_PREFIX) => body.trim().to_string(),
        None if text.starts_with(HEADER_PREFIX) => String::new(),
        _ => text.trim().to_string(),
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// 본문을 줄 단위 스트림으로 (빈 줄 제외, 마지막에 `[[END]]`)
pub fn stream_lines(text: &str) -> impl Stream<Item = String> {
    let lines: Vec<String> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .chain(std::iter::once(END_MARKER.to_string()))
        .collect();
    stream::iter(lines)
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// 채팅 요청
///
/// `session_id`가 비어 있으면 서비스가 새 세션을 발급해 응답에 담아 돌려줍니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_domain: Option<String>,
}

/// 채팅 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub domain: String,
    pub confidence: f32,
}

impl ChatResponse {
    /// 인코딩된 응답 텍스트에서 생성
    pub fn from_encoded(session_id: impl Into<String>, encoded: &str) -> Self {
        let header = parse_header(encoded);
        Self {
            session_id: session_id.into(),
            response: strip_header(encoded),
            domain: header.domain,
            confidence: header.confidence,
        }
    }
}

/// 업로드 파일 (본문은 base64)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFile {
    pub filename: String,
    pub content_base64: String,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            content_base64: STANDARD.encode(bytes),
        }
    }

    /// 디코딩된 (파일 이름, 바이트)
    pub fn decode(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let bytes = STANDARD
            .decode(self.content_base64.trim())
            .map_err(|e| anyhow::anyhow!("Invalid base64 payload for {}: {}", self.filename, e))?;
        Ok((self.filename.clone(), bytes))
    }
}

/// JSON-lines 전송 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceRequest {
    /// 단건 응답
    Chat(ChatRequest),
    /// 줄 단위 스트리밍 응답
    Stream(ChatRequest),
    /// 문서 업로드
    Upload { files: Vec<UploadFile> },
    /// 상태 확인
    Health,
    /// 세션 종료 (메모리 폐기)
    End { session_id: String },
}

/// JSON-lines 전송 응답
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceResponse {
    Chat(ChatResponse),
    Line { text: String },
    Upload(IngestReport),
    Health(HealthStatus),
    Ended { session_id: String, existed: bool },
    Error { message: String },
}

/// 상태 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub sessions: usize,
    pub retrieval_ready: bool,
    pub chunk_count: usize,
}

// ============================================================================
// Tests
// ============================================================================
