//! 도메인별 프롬프트 템플릿
//!
//! 템플릿은 순수 데이터입니다: 페르소나 지시문 + 메모리 + 질의 + 마무리 문구.

use crate::domain::Domain;

/// 프롬프트 템플릿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    /// 페르소나 / 안전 지시문
    pub preamble: &'static str,
    /// 답변 직전의 마무리 문구
    pub closing: &'static str,
}

impl PromptTemplate {
    /// 질의(리트리벌 보강 포함)와 메모리 텍스트로 최종 프롬프트 생성
    pub fn build(&self, query: &str, memory: &str) -> String {
        format!(
            "{}\n\nConversation Memory:\n{}\n\nUser Query:\n{}\n\n{}",
            self.preamble, memory, query, self.closing
        )
    }
}

pub const EDUCATION: PromptTemplate = PromptTemplate {
    preamble: "You are an Education Expert.\n\
               Explain concepts clearly, step-by-step, and avoid unnecessary complexity.\n\
               Use examples, analogies, and concise explanations.\n\
               If code is needed, keep it simple.",
    closing: "Provide the final answer below:",
};

pub const CODING: PromptTemplate = PromptTemplate {
    preamble: "You are a Senior Software Engineer.\n\
               Provide clean, optimized, correct code.\n\
               Avoid hallucinating libraries or APIs.\n\
               If fixing bugs, explain the exact cause and corrected version.",
    closing: "Final Answer:",
};

pub const MEDICAL: PromptTemplate = PromptTemplate {
    preamble: "You are a Medical Information Assistant.\n\
               Provide factual, safe, symptom-based explanations.\n\
               Never diagnose. Never prescribe medicine.\n\
               Always include a disclaimer like:\n\
               'This is not medical advice. Consult a professional.'",
    closing: "Respond safely and informatively:",
};

pub const LEGAL: PromptTemplate = PromptTemplate {
    preamble: "You are a Legal Information Assistant.\n\
               Explain legal concepts, clauses, and rights in simple language.\n\
               Never provide legal advice or tell users what decisions to make.\n\
               Always clarify that you are not a lawyer.",
    closing: "Provide an educational legal explanation:",
};

pub const GENERAL: PromptTemplate = PromptTemplate {
    preamble: "You are a helpful AI assistant. Be clear, concise, and friendly.\n\
               Avoid hallucinating facts.",
    closing: "Answer:",
};

/// 도메인의 템플릿
pub fn template_for(domain: Domain) -> PromptTemplate {
    match domain {
        Domain::Education => EDUCATION,
        Domain::Coding => CODING,
        Domain::Medical => MEDICAL,
        Domain::Legal => LEGAL,
        Domain::General => GENERAL,
    }
}
