//! 도메인 라우터
//!
//! 자유 텍스트 질의를 고정된 도메인 중 하나로 분류합니다.
//! 분류는 두 단계입니다.
//! 1. `try_classify_via_model`: LLM에 엄격한 JSON 출력을 요구하고 검증
//! 2. `classify_via_keywords`: 1단계의 어떤 실패든 결정적 키워드 규칙으로 대체
//!
//! `classify`는 절대 실패하지 않으며 허용 목록 밖의 도메인을 반환하지 않습니다.

mod keywords;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::domain::Domain;
use crate::error::AssistError;
use crate::llm::CompletionProvider;

pub use keywords::{classify_via_keywords, DEFAULT_REASON, KEYWORD_REASON, KEYWORD_RULES};

/// 분류 호출 기본 출력 토큰 한도
pub const DEFAULT_ROUTER_MAX_TOKENS: u32 = 120;

/// 모델 출력에 reason이 없을 때의 기본값
const MODEL_REASON: &str = "LLM output";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You classify user messages. \
     Respond ONLY in strict JSON with keys: domain, confidence, reason. \
     Never include anything outside the JSON.";

const WORKED_EXAMPLE: &str = "Example:\n\
     User: 'How do I use BFS?'\n\
     JSON: {\"domain\": \"education\", \"confidence\": 0.95, \
     \"reason\": \"algorithm explanation\"}";

// ============================================================================
// Types
// ============================================================================

/// 분류 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingResult {
    pub domain: Domain,
    /// 0.0 ~ 1.0
    pub confidence: f32,
    pub reason: String,
}

/// 분류 경로가 드러나는 결과
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// 모델 분류 성공
    Model(RoutingResult),
    /// 키워드 폴백 사용 (cause: 모델 단계의 실패 사유)
    Fallback { result: RoutingResult, cause: String },
}

impl RouteOutcome {
    pub fn result(&self) -> &RoutingResult {
        match self {
            RouteOutcome::Model(result) | RouteOutcome::Fallback { result, .. } => result,
        }
    }

    pub fn into_result(self) -> RoutingResult {
        match self {
            RouteOutcome::Model(result) | RouteOutcome::Fallback { result, .. } => result,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RouteOutcome::Fallback { .. })
    }
}

// ============================================================================
// DomainRouter
// ============================================================================

/// LLM 기반 도메인 라우터
pub struct DomainRouter {
    llm: Arc<dyn CompletionProvider>,
    domains: Vec<Domain>,
    system_instruction: String,
    max_tokens: u32,
}

impl DomainRouter {
    /// 전체 도메인을 대상으로 생성
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            llm,
            domains: Domain::ALL.to_vec(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            max_tokens: DEFAULT_ROUTER_MAX_TOKENS,
        }
    }

    /// 기본 허용 도메인 지정 (빈 목록이면 전체)
    pub fn with_domains(mut self, domains: Vec<Domain>) -> Self {
        self.domains = if domains.is_empty() {
            Domain::ALL.to_vec()
        } else {
            domains
        };
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// 기본 허용 도메인으로 분류
    pub async fn route(&self, query: &str) -> RoutingResult {
        self.classify(query, &self.domains).await
    }

    /// 허용 도메인 안에서 분류 (절대 실패하지 않음)
    pub async fn classify(&self, query: &str, allowed: &[Domain]) -> RoutingResult {
        self.classify_outcome(query, allowed).await.into_result()
    }

    /// 분류 + 폴백 여부
    pub async fn classify_outcome(&self, query: &str, allowed: &[Domain]) -> RouteOutcome {
        match self.try_classify_via_model(query, allowed).await {
            Ok(result) => {
                tracing::debug!(
                    domain = %result.domain,
                    confidence = result.confidence,
                    "Router classified via model"
                );
                RouteOutcome::Model(result)
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "Router fallback triggered: {}", e);
                RouteOutcome::Fallback {
                    result: classify_via_keywords(query, allowed),
                    cause: e.to_string(),
                }
            }
        }
    }

    /// 모델 분류 단계
    pub async fn try_classify_via_model(
        &self,
        query: &str,
        allowed: &[Domain],
    ) -> Result<RoutingResult, AssistError> {
        let allowed = effective_domains(allowed);
        let prompt = self.build_prompt(query, allowed);

        let raw = self
            .llm
            .complete(&prompt, self.max_tokens)
            .await
            .map_err(|e| match e.downcast::<AssistError>() {
                Ok(err) => err,
                Err(other) => AssistError::capability(format!("{:#}", other)),
            })?;

        parse_classification(&raw, allowed)
    }

    /// 분류 프롬프트 (지시문 + 허용 도메인 + 예시 1개 + 질의)
    pub fn build_prompt(&self, query: &str, allowed: &[Domain]) -> String {
        let allowed = effective_domains(allowed)
            .iter()
            .map(Domain::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{}\n\nAllowed domains: {}\n\n{}\n\nUser: '{}'\nJSON:",
            self.system_instruction, allowed, WORKED_EXAMPLE, query
        )
    }
}

fn effective_domains(allowed: &[Domain]) -> &[Domain] {
    if allowed.is_empty() {
        &Domain::ALL
    } else {
        allowed
    }
}

// ============================================================================
// Output Parsing
// ============================================================================

/// 모델 출력 파싱 및 검증
///
/// 가장 바깥 `{...}` 구간을 JSON으로 디코딩한 뒤
/// domain(대소문자 무시, 허용 목록 확인), confidence(숫자 또는 숫자 문자열),
/// reason(문자열)을 꺼냅니다.
pub fn parse_classification(raw: &str, allowed: &[Domain]) -> Result<RoutingResult, AssistError> {
    let allowed = effective_domains(allowed);

    let start = raw.find('{');
    let end = raw.rfind('}');
    let span = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(AssistError::malformed("no JSON object found in output")),
    };

    let value: Value = serde_json::from_str(span)
        .map_err(|e| AssistError::malformed(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AssistError::malformed("JSON is not an object"))?;

    let domain_label = match object.get("domain") {
        Some(Value::String(s)) => s.trim().to_lowercase(),
        Some(Value::Null) | None => String::new(),
        Some(other) => {
            return Err(AssistError::malformed(format!("domain is not a string: {}", other)))
        }
    };
    let domain = Domain::parse_loose(&domain_label)
        .filter(|d| allowed.contains(d))
        .ok_or_else(|| AssistError::malformed(format!("invalid domain: {:?}", domain_label)))?;

    let confidence = match object.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| AssistError::malformed(format!("non-numeric confidence: {:?}", s)))?,
        Some(Value::Null) | None => 0.0,
        Some(other) => {
            return Err(AssistError::malformed(format!("non-numeric confidence: {}", other)))
        }
    };
    if !confidence.is_finite() {
        return Err(AssistError::malformed("confidence is not finite"));
    }

    let reason = match object.get("reason") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => MODEL_REASON.to_string(),
        Some(other) => other.to_string(),
    };

    Ok(RoutingResult {
        domain,
        confidence: confidence.clamp(0.0, 1.0) as f32,
        reason,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{FailingCompletion, ScriptedCompletion};

    fn router_with(reply: &str) -> (DomainRouter, Arc<ScriptedCompletion>) {
        let llm = Arc::new(ScriptedCompletion::new([reply]));
        (DomainRouter::new(llm.clone()), llm)
    }

    #[test]
    fn test_prompt_contains_all_parts() {
        let router = DomainRouter::new(Arc::new(FailingCompletion::default()));
        let prompt =
            router.build_prompt("why is my loop slow?", &[Domain::Coding, Domain::General]);

        assert!(prompt.starts_with("You classify user messages."));
        assert!(prompt.contains("Allowed domains: coding, general"));
        assert!(prompt.contains("How do I use BFS?"));
        assert!(prompt.ends_with("User: 'why is my loop slow?'\nJSON:"));
    }

    #[test]
    fn test_parse_wrapped_json() {
        let raw = "Sure! Here you go:\n```json\n\
                   {\"domain\": \"Medical\", \"confidence\": 0.82, \"reason\": \"symptoms\"}\n```";
        let result = parse_classification(raw, &Domain::ALL).unwrap();
        assert_eq!(result.domain, Domain::Medical);
        assert!((result.confidence - 0.82).abs() < 1e-6);
        assert_eq!(result.reason, "symptoms");
    }

    #[test]
    fn test_parse_defaults_and_coercion() {
        let result = parse_classification(r#"{"domain": "legal"}"#, &Domain::ALL).unwrap();
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reason, "LLM output");

        let result =
            parse_classification(r#"{"domain": "coding", "confidence": "0.6"}"#, &Domain::ALL)
                .unwrap();
        assert!((result.confidence - 0.6).abs() < 1e-6);

        let result =
            parse_classification(r#"{"domain": "coding", "confidence": 7}"#, &Domain::ALL).unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let cases = [
            "",
            "no json here",
            "} backwards {",
            "{not json}",
            "[1, 2, 3]",
            r#"{"confidence": 0.9}"#,
            r#"{"domain": "finance", "confidence": 0.9}"#,
            r#"{"domain": 3, "confidence": 0.9}"#,
            r#"{"domain": "coding", "confidence": "high"}"#,
            r#"{"domain": "coding", "confidence": [0.9]}"#,
        ];
        for raw in cases {
            let err = parse_classification(raw, &Domain::ALL).unwrap_err();
            assert!(
                matches!(err, AssistError::MalformedClassifierOutput(_)),
                "expected malformed for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_parse_rejects_domain_outside_allowed() {
        let err = parse_classification(r#"{"domain": "coding"}"#, &[Domain::Medical]).unwrap_err();
        assert!(err.to_string().contains("invalid domain"));
    }

    #[tokio::test]
    async fn test_classify_via_model() {
        let (router, llm) =
            router_with(r#"{"domain": "education", "confidence": 0.91, "reason": "concept"}"#);
        let outcome = router.classify_outcome("what is recursion", &Domain::ALL).await;

        assert!(!outcome.is_fallback());
        assert_eq!(outcome.result().domain, Domain::Education);
        assert_eq!(llm.prompts.lock().unwrap()[0].1, DEFAULT_ROUTER_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_capability_failure_falls_back() {
        let router = DomainRouter::new(Arc::new(FailingCompletion::default()));
        let outcome = router
            .classify_outcome("my code throws an error", &Domain::ALL)
            .await;

        match outcome {
            RouteOutcome::Fallback { result, cause } => {
                assert_eq!(result.domain, Domain::Coding);
                assert_eq!(result.confidence, 0.0);
                assert_eq!(result.reason, KEYWORD_REASON);
                assert!(cause.contains("completion capability failed"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_domain_falls_back_to_default() {
        let (router, _) = router_with(r#"{"domain": "astrology", "confidence": 0.99}"#);
        let result = router.route("tell me something nice").await;
        assert_eq!(result.domain, Domain::General);
        assert_eq!(result.reason, DEFAULT_REASON);
    }

    #[tokio::test]
    async fn test_classify_never_escapes_allowed_set() {
        let garbage = [
            "",
            "I think this is about medicine",
            r#"{"domain": "medical"}"#,
            r#"{"domain": "general", "confidence": -3}"#,
            r#"{"domain": "GENERAL", "confidence": 1e308}"#,
            "{{{{",
            "\u{0000}\u{FFFD}{\"domain\":",
        ];
        let allowed = [Domain::Legal, Domain::General];

        for raw in garbage {
            let (router, _) = router_with(raw);
            for query in ["fever and pain", "contract dispute", "", "debug this"] {
                let result = router.classify(query, &allowed).await;
                assert!(allowed.contains(&result.domain), "{:?} -> {:?}", raw, result);
                assert!((0.0..=1.0).contains(&result.confidence));
            }
        }
    }

    #[tokio::test]
    async fn test_custom_domains_and_budget() {
        let llm = Arc::new(ScriptedCompletion::new([r#"{"domain": "legal", "confidence": 0.8}"#]));
        let router = DomainRouter::new(llm.clone())
            .with_domains(vec![Domain::Legal, Domain::General])
            .with_max_tokens(32);

        let result = router.route("can my landlord do this").await;
        assert_eq!(result.domain, Domain::Legal);
        assert!(llm.last_prompt().unwrap().contains("Allowed domains: legal, general"));
        assert_eq!(llm.prompts.lock().unwrap()[0].1, 32);
    }
}
