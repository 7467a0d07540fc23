//! 콘텐츠 추출 모듈
//!
//! 문서 바이트에서 텍스트를 추출합니다.
//! - 텍스트/마크다운: 손실 허용 UTF-8 디코딩 (깨진 바이트는 U+FFFD로 대체)
//! - PDF: pdf-extract로 페이지별 텍스트 추출 후 줄바꿈으로 연결

pub mod pdf;

use std::path::Path;

use crate::error::AssistError;

// ============================================================================
// Document Format
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Text,
    Markdown,
}

impl DocumentFormat {
    /// 확장자로 형식 결정 (대소문자 무시)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "txt" => Some(DocumentFormat::Text),
            "md" => Some(DocumentFormat::Markdown),
            _ => None,
        }
    }

    /// 파일 이름/경로에서 형식 결정
    ///
    /// 지원하지 않는 확장자는 `UnsupportedFormat` 에러입니다.
    pub fn from_path(path: &Path) -> Result<Self, AssistError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        Self::from_extension(ext).ok_or_else(|| {
            let shown = if ext.is_empty() { "<none>" } else { ext };
            AssistError::unsupported(format!("{} ({})", shown, path.display()))
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Text => "TXT",
            DocumentFormat::Markdown => "MD",
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// 바이트에서 텍스트 추출
///
/// PDF 추출은 CPU 바운드이므로 비동기 컨텍스트에서는 `spawn_blocking`으로 호출합니다.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String, AssistError> {
    match format {
        DocumentFormat::Text | DocumentFormat::Markdown => Ok(decode_lossy(bytes)),
        DocumentFormat::Pdf => {
            let pages = pdf::extract_pages(bytes)?;
            Ok(pages.join("\n"))
        }
    }
}

/// 손실 허용 UTF-8 디코딩
fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("md"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("Txt"), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_extension("docx"), None);
    }

    #[test]
    fn test_format_from_path_unsupported() {
        let err = DocumentFormat::from_path(Path::new("notes.docx")).unwrap_err();
        assert!(matches!(err, AssistError::UnsupportedFormat(_)));

        let err = DocumentFormat::from_path(Path::new("README")).unwrap_err();
        assert!(err.to_string().contains("<none>"));
    }

    #[test]
    fn test_text_extraction_is_lossy() {
        let bytes = b"caf\xc3\xa9 \xff\xfe ok";
        let text = extract_text(DocumentFormat::Text, bytes).unwrap();
        assert!(text.starts_with("café"));
        assert!(text.ends_with("ok"));
    }

    #[test]
    fn test_invalid_pdf_is_extraction_error() {
        let err = extract_text(DocumentFormat::Pdf, b"not a pdf").unwrap_err();
        assert!(matches!(err, AssistError::Extraction(_)));
    }
}
