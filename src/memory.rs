//! 대화 메모리
//!
//! 최근 N개 항목만 유지하는 롤링 로그입니다. 한 턴마다 (user, assistant) 두 항목을
//! 넣고, 상한을 넘으면 가장 오래된 항목부터 버립니다(FIFO).
//! 읽기(`snapshot`, `render`)는 상태를 바꾸지 않습니다.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::AssistError;

/// 기본 유지 항목 수 (6턴)
pub const DEFAULT_MEMORY_CAP: usize = 12;

// ============================================================================
// Types
// ============================================================================

/// 발화 주체
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// 프롬프트용 라벨
    fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// 메모리 항목
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

/// 내보내기 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
}

impl FromStr for ExportFormat {
    type Err = AssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(AssistError::config(format!("unknown export format: {}", other))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Txt => f.write_str("txt"),
        }
    }
}

// ============================================================================
// ConversationMemory
// ============================================================================

/// 상한이 있는 대화 메모리
///
/// 동시 요청에서 공유될 수 있으므로 내부 상태는 뮤텍스로 보호합니다.
#[derive(Debug)]
pub struct ConversationMemory {
    cap: usize,
    entries: Mutex<VecDeque<MemoryEntry>>,
}

impl ConversationMemory {
    /// 상한 지정 (홀수는 다음 짝수로 올림, 0이면 기록하지 않음)
    pub fn new(cap: usize) -> Self {
        let cap = cap + cap % 2;
        Self {
            cap,
            entries: Mutex::new(VecDeque::with_capacity(cap)),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// 한 턴 기록 (user → assistant 순)
    pub fn record(&self, user_text: &str, assistant_text: &str) {
        if self.cap == 0 {
            return;
        }

        let now = Local::now();
        let mut entries = self.lock();
        entries.push_back(MemoryEntry {
            role: Role::User,
            text: user_text.to_string(),
            timestamp: now,
        });
        entries.push_back(MemoryEntry {
            role: Role::Assistant,
            text: assistant_text.to_string(),
            timestamp: now,
        });

        while entries.len() > self.cap {
            entries.pop_front();
        }
    }

    /// 현재 항목 복사본 (오래된 순)
    pub fn snapshot(&self) -> Vec<MemoryEntry> {
        self.lock().iter().cloned().collect()
    }

    /// 프롬프트용 텍스트 (`User: ...` / `Assistant: ...` 줄)
    pub fn render(&self) -> String {
        render_entries(&self.snapshot())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 대화 내보내기
    ///
    /// - json: role/text/timestamp 배열 (들여쓰기 포함)
    /// - txt: `[HH:MM:SS] USER: text` 줄
    pub fn export(&self, format: ExportFormat) -> Result<String, AssistError> {
        let entries = self.snapshot();
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&entries)
                .map_err(|e| AssistError::config(format!("failed to serialize memory: {}", e))),
            ExportFormat::Txt => Ok(entries
                .iter()
                .map(|e| {
                    format!(
                        "[{}] {}: {}",
                        e.timestamp.format("%H:%M:%S"),
                        e.role.as_str().to_uppercase(),
                        e.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// 포이즌된 락도 복구해서 사용
    fn lock(&self) -> MutexGuard<'_, VecDeque<MemoryEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAP)
    }
}

/// 항목 목록을 프롬프트용 텍스트로
pub fn render_entries(entries: &[MemoryEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.role.label(), e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================
