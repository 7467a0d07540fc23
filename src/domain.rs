//! 도메인 정의
//!
//! 질의가 라우팅될 수 있는 고정된 도메인 집합입니다.
//! 새 도메인 추가는 데이터가 아니라 코드 변경으로 이루어집니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::AssistError;

/// 질의 도메인
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Education,
    Coding,
    Medical,
    Legal,
    General,
}

impl Domain {
    /// 전체 도메인 (분류 프롬프트에 나열되는 순서)
    pub const ALL: [Domain; 5] = [
        Domain::Education,
        Domain::Coding,
        Domain::Medical,
        Domain::Legal,
        Domain::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Education => "education",
            Domain::Coding => "coding",
            Domain::Medical => "medical",
            Domain::Legal => "legal",
            Domain::General => "general",
        }
    }

    /// 대소문자/공백을 무시하고 파싱 (실패 시 None)
    pub fn parse_loose(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| AssistError::malformed(format!("unknown domain: {:?}", s)))
    }
}

/// 응답을 만든 주체
///
/// 도메인 불일치로 답변을 거절한 경우 `System`이 됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Responder {
    Domain(Domain),
    System,
}

impl Responder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Responder::Domain(domain) => domain.as_str(),
            Responder::System => "system",
        }
    }
}

impl fmt::Display for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Responder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<Domain> for Responder {
    fn from(domain: Domain) -> Self {
        Responder::Domain(domain)
    }
}
