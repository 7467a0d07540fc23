//! 오케스트레이터 (Assistant)
//!
//! 라우터 → 도메인 판정 → 생성기 → 메모리 기록을 한 번의 `ask` 호출로 묶습니다.
//!
//! ## 도메인 판정
//! - 사용자 선택 없음: 라우터 예측 사용
//! - 선택 있음 + 신뢰도 ≥ 임계값: 예측과 같으면 진행, 다르면 거절(system 응답)
//! - 선택 있음 + 신뢰도 < 임계값: 사용자 선택 우선

use std::sync::Arc;

use serde::Serialize;

use crate::agents::{GenerationContext, GeneratorRegistry};
use crate::config::AssistConfig;
use crate::domain::{Domain, Responder};
use crate::memory::ConversationMemory;
use crate::protocol::encode_reply;
use crate::router::{DomainRouter, RoutingResult};

/// 기본 고신뢰 임계값
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;

// ============================================================================
// Types
// ============================================================================

/// 어시스턴트 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    /// 응답한 도메인 (거절이면 system)
    pub responder: Responder,
    pub confidence: f32,
    pub text: String,
    /// 라우터 판단 근거
    pub reason: String,
}

impl AssistantReply {
    /// 헤더 포함 텍스트
    pub fn encode(&self) -> String {
        encode_reply(self.responder.as_str(), self.confidence, &self.text)
    }

    pub fn is_refusal(&self) -> bool {
        self.responder == Responder::System
    }
}

/// 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Proceed(Domain),
    Refuse { predicted: Domain, selected: Domain },
}

// ============================================================================
// Assistant
// ============================================================================

/// 멀티 도메인 어시스턴트
pub struct Assistant {
    router: Arc<DomainRouter>,
    generators: Arc<GeneratorRegistry>,
    memory: Arc<ConversationMemory>,
    threshold: f32,
    record_refusals: bool,
}

impl Assistant {
    pub fn new(
        router: Arc<DomainRouter>,
        generators: Arc<GeneratorRegistry>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        Self {
            router,
            generators,
            memory,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            record_refusals: false,
        }
    }

    /// 설정값(임계값, 메모리 상한, 거절 기록)으로 생성
    pub fn from_config(
        router: Arc<DomainRouter>,
        generators: Arc<GeneratorRegistry>,
        config: &AssistConfig,
    ) -> Self {
        Self::new(
            router,
            generators,
            Arc::new(ConversationMemory::new(config.memory_cap)),
        )
        .with_threshold(config.confidence_threshold)
        .with_record_refusals(config.record_refusals)
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_record_refusals(mut self, record: bool) -> Self {
        self.record_refusals = record;
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// 질의 처리
    ///
    /// `selected`는 대소문자/공백을 무시하고 파싱하며, 해석할 수 없으면 무시합니다.
    pub async fn ask(&self, query: &str, selected: Option<&str>) -> AssistantReply {
        let selected = parse_selection(selected);
        let routing = self.router.route(query).await;

        tracing::info!(
            predicted = %routing.domain,
            confidence = routing.confidence,
            selected = selected.as_ref().map(Domain::as_str).unwrap_or("-"),
            "Routed query"
        );

        match self.resolve(&routing, selected) {
            Resolution::Refuse {
                predicted,
                selected,
            } => self.refuse(query, predicted, selected, &routing),
            Resolution::Proceed(domain) => self.dispatch(query, domain, routing).await,
        }
    }

    fn resolve(&self, routing: &RoutingResult, selected: Option<Domain>) -> Resolution {
        match selected {
            None => Resolution::Proceed(routing.domain),
            Some(selected) if routing.confidence >= self.threshold => {
                if routing.domain == selected {
                    Resolution::Proceed(selected)
                } else {
                    Resolution::Refuse {
                        predicted: routing.domain,
                        selected,
                    }
                }
            }
            // 낮은 신뢰도는 사용자 선택을 따름
            Some(selected) => Resolution::Proceed(selected),
        }
    }

    fn refuse(
        &self,
        query: &str,
        predicted: Domain,
        selected: Domain,
        routing: &RoutingResult,
    ) -> AssistantReply {
        let predicted_label = predicted.as_str().to_uppercase();
        let text = format!(
            "This question looks like a {} question, but the {} assistant is selected.\n\
             Please switch to {} and ask again.\n\
             Reason: {}",
            predicted_label,
            selected.as_str().to_uppercase(),
            predicted_label,
            routing.reason
        );

        tracing::info!(%predicted, %selected, "Refused mismatched domain");
        if self.record_refusals {
            self.memory.record(query, &text);
        }

        AssistantReply {
            responder: Responder::System,
            confidence: 1.0,
            text,
            reason: routing.reason.clone(),
        }
    }

    async fn dispatch(
        &self,
        query: &str,
        domain: Domain,
        routing: RoutingResult,
    ) -> AssistantReply {
        let reply = |text: String| AssistantReply {
            responder: Responder::Domain(domain),
            confidence: routing.confidence,
            text,
            reason: routing.reason.clone(),
        };

        let generator = match self.generators.resolve(domain) {
            Some(generator) => generator,
            None => {
                tracing::warn!(%domain, "No generator registered");
                return reply(format!(
                    "[error] No assistant is available for the {} domain.",
                    domain
                ));
            }
        };

        let context = GenerationContext {
            memory: self.memory.snapshot(),
        };

        match generator.run(query, &context).await {
            Ok(text) => {
                self.memory.record(query, &text);
                reply(text)
            }
            Err(e) => {
                tracing::warn!(%domain, "Generation failed: {:#}", e);
                reply(format!(
                    "[error] The {} assistant could not reach the language model: {:#}",
                    domain, e
                ))
            }
        }
    }
}

fn parse_selection(selected: Option<&str>) -> Option<Domain> {
    let raw = selected?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<Domain>() {
        Ok(domain) => Some(domain),
        Err(_) => {
            tracing::warn!("Ignoring unknown domain selection: {:?}", raw);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
