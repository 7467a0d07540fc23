//! 키워드 폴백 분류
//!
//! 모델 분류가 실패했을 때 쓰는 결정적 규칙입니다.
//! 규칙은 고정 순서(coding → legal → medical → education)로 검사하며
//! 먼저 맞는 규칙이 이깁니다. 순서를 바꾸면 재현성이 깨집니다.

use crate::domain::Domain;

use super::RoutingResult;

/// 키워드 폴백 결과의 reason
pub const KEYWORD_REASON: &str = "keyword fallback";
/// 아무 규칙도 맞지 않았을 때의 reason
pub const DEFAULT_REASON: &str = "fallback default";

/// (도메인, 키워드) 규칙 - 순서 중요
pub const KEYWORD_RULES: [(Domain, &[&str]); 4] = [
    (Domain::Coding, &["error", "bug", "debug", "code", "compile"]),
    (Domain::Legal, &["contract", "legal", "law", "court", "ipc"]),
    (Domain::Medical, &["fever", "symptom", "disease", "bp", "pain"]),
    (Domain::Education, &["explain", "learn", "study", "homework"]),
];

/// 키워드로 도메인 결정 (신뢰도 0.0)
///
/// 키워드는 소문자 질의에 대한 부분 문자열 일치로 검사합니다.
/// 허용되지 않은 도메인의 규칙은 건너뛰고, `general`이 허용되지 않았다면
/// 허용 목록의 첫 도메인을 기본값으로 씁니다. 빈 허용 목록은 전체 도메인입니다.
pub fn classify_via_keywords(query: &str, allowed: &[Domain]) -> RoutingResult {
    let allowed: &[Domain] = if allowed.is_empty() {
        &Domain::ALL
    } else {
        allowed
    };
    let q = query.to_lowercase();

    for (domain, words) in KEYWORD_RULES.iter() {
        if !allowed.contains(domain) {
            continue;
        }
        if words.iter().any(|w| q.contains(w)) {
            return RoutingResult {
                domain: *domain,
                confidence: 0.0,
                reason: KEYWORD_REASON.to_string(),
            };
        }
    }

    let domain = if allowed.contains(&Domain::General) {
        Domain::General
    } else {
        allowed[0]
    };

    RoutingResult {
        domain,
        confidence: 0.0,
        reason: DEFAULT_REASON.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_of(query: &str) -> Domain {
        classify_via_keywords(query, &Domain::ALL).domain
    }

    #[test]
    fn test_each_rule() {
        assert_eq!(domain_of("My code will not COMPILE"), Domain::Coding);
        assert_eq!(domain_of("Is this contract enforceable?"), Domain::Legal);
        assert_eq!(domain_of("I have a high fever"), Domain::Medical);
        assert_eq!(domain_of("Help me study for finals"), Domain::Education);
    }

    #[test]
    fn test_legal_checked_before_medical() {
        let result =
            classify_via_keywords("I have a fever and a legal contract issue", &Domain::ALL);
        assert_eq!(result.domain, Domain::Legal);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reason, KEYWORD_REASON);
    }

    #[test]
    fn test_coding_checked_before_education() {
        assert_eq!(domain_of("explain this bug to me"), Domain::Coding);
    }

    #[test]
    fn test_substring_matching() {
        // "bp"는 단어 경계 없이 일치
        assert_eq!(domain_of("check my bpm"), Domain::Medical);
        // "law"는 "lawn" 안에서도 일치
        assert_eq!(domain_of("mow the lawn"), Domain::Legal);
    }

    #[test]
    fn test_default_general() {
        let result = classify_via_keywords("what a lovely day", &Domain::ALL);
        assert_eq!(result.domain, Domain::General);
        assert_eq!(result.reason, DEFAULT_REASON);
    }

    #[test]
    fn test_respects_allowed_set() {
        let allowed = [Domain::Medical, Domain::Education];
        let result = classify_via_keywords("legal question about fever", &allowed);
        assert_eq!(result.domain, Domain::Medical);

        let result = classify_via_keywords("nothing matches", &allowed);
        assert_eq!(result.domain, Domain::Medical);
        assert_eq!(result.reason, DEFAULT_REASON);
    }

    #[test]
    fn test_empty_allowed_means_all() {
        assert_eq!(classify_via_keywords("debug", &[]).domain, Domain::Coding);
        assert_eq!(classify_via_keywords("hello", &[]).domain, Domain::General);
    }
}
