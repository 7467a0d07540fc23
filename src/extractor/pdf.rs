//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::Regex;

use crate::error::AssistError;

/// PDF 바이트에서 페이지별 텍스트 추출
///
/// 텍스트가 없는 페이지(스캔 문서 등)는 빈 문자열로 남기지 않고 제외합니다.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, AssistError> {
    // pdf-extract는 일부 손상된 입력에서 panic하므로 에러로 변환
    let text = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| AssistError::extraction("PDF parser panicked on malformed input"))?
        .map_err(|e| AssistError::extraction(e.to_string()))?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(Vec::new());
    }

    Ok(split_pdf_pages(&text))
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)로 페이지 분리 시도
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // "--- Page 3 ---" 같은 구분자 줄
    if let Ok(page_pattern) =
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
    {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================
