//! 텍스트 완성(Completion) 모듈
//!
//! 라우터와 도메인 에이전트가 사용하는 `complete(prompt) -> text` 능력입니다.
//! Groq / OpenAI 모두 OpenAI 호환 chat completions 프로토콜을 사용합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let llm = create_completion_provider(0.3)?;
//! let text = llm.complete("Hello", 64).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AssistError;

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 텍스트 완성 프로바이더 트레이트
///
/// 실패 시 `AssistError::CapabilityFailure`를 담은 에러를 반환합니다.
/// 이 레이어에서는 재시도하지 않습니다.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 프롬프트 완성
    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Provider Selection
// ============================================================================

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// HTTP 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 완성 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    OpenAi,
}

impl ProviderKind {
    fn endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Groq => GROQ_CHAT_URL,
            ProviderKind::OpenAi => OPENAI_CHAT_URL,
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn model_var(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_MODEL",
            ProviderKind::OpenAi => "OPENAI_MODEL",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Groq => DEFAULT_GROQ_MODEL,
            ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// 사용 가능한 프로바이더 감지
///
/// 우선순위:
/// 1. `GROQ_API_KEY` 환경변수
/// 2. `OPENAI_API_KEY` 환경변수
pub fn detect_provider() -> Option<ProviderKind> {
    [ProviderKind::Groq, ProviderKind::OpenAi]
        .into_iter()
        .find(|kind| non_empty_var(kind.key_var()).is_some())
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    detect_provider().is_some()
}

// ============================================================================
// OpenAI-compatible Chat Completions
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 호환 완성 클라이언트 (Groq, OpenAI)
#[derive(Debug)]
pub struct OpenAiCompatible {
    kind: ProviderKind,
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatible {
    /// 새 클라이언트 생성
    pub fn new(
        kind: ProviderKind,
        api_key: String,
        model: String,
        temperature: f32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            kind,
            client,
            api_key,
            model,
            temperature,
        })
    }

    /// 환경변수에서 생성
    pub fn from_env(kind: ProviderKind, temperature: f32) -> Result<Self> {
        let api_key = non_empty_var(kind.key_var())
            .ok_or_else(|| anyhow::anyhow!("{} is not set", kind.key_var()))?;
        let model =
            non_empty_var(kind.model_var()).unwrap_or_else(|| kind.default_model().to_string());
        Self::new(kind, api_key, model, temperature)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatible {
    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: max_output_tokens,
        };

        tracing::debug!(
            provider = ?self.kind,
            model = %self.model,
            prompt_chars = prompt.len(),
            max_output_tokens,
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.kind.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistError::capability(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AssistError::capability(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(AssistError::capability(format!(
                "{} returned {}: {}",
                self.name(),
                status,
                body
            ))
            .into());
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AssistError::capability(format!("unexpected response body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AssistError::capability("response contained no choices"))?;

        Ok(content.trim().to_string())
    }

    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::Groq => "groq",
            ProviderKind::OpenAi => "openai",
        }
    }
}

// ============================================================================
// Offline Provider
// ============================================================================

/// 오프라인 프로바이더 (항상 실패)
///
/// API 키 없이 실행할 때 사용합니다. 라우터는 키워드 폴백으로,
/// 에이전트는 에러 문구로 응답합니다.
#[derive(Debug, Default)]
pub struct OfflineCompletion;

#[async_trait]
impl CompletionProvider for OfflineCompletion {
    async fn complete(&self, _prompt: &str, _max_output_tokens: u32) -> Result<String> {
        Err(AssistError::capability("offline mode: no completion backend configured").into())
    }

    fn name(&self) -> &str {
        "offline"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 완성 프로바이더 생성
///
/// 환경변수에서 Groq → OpenAI 순으로 키를 찾습니다.
pub fn create_completion_provider(temperature: f32) -> Result<Arc<dyn CompletionProvider>> {
    let kind = detect_provider().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key found. Set GROQ_API_KEY or OPENAI_API_KEY, or run with --offline."
        )
    })?;

    let provider = OpenAiCompatible::from_env(kind, temperature)?;
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "Using completion provider"
    );
    Ok(Arc::new(provider))
}

// ============================================================================
// Test Doubles
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
