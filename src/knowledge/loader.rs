//! Document Loader - 문서 → 청크
//!
//! 경로 또는 (파일 이름, 바이트) 쌍을 받아 형식별로 텍스트를 추출하고 청킹합니다.

use std::path::Path;

use crate::error::AssistError;
use crate::extractor::{extract_text, DocumentFormat};

use super::chunker::{default_chunker, Chunker, DocumentChunk};

/// 문서 로더
pub struct DocumentLoader {
    chunker: Box<dyn Chunker>,
}

impl DocumentLoader {
    /// 청커를 지정하여 생성
    pub fn new(chunker: Box<dyn Chunker>) -> Self {
        Self { chunker }
    }

    /// 기본 청커로 생성
    pub fn with_defaults() -> Self {
        Self::new(default_chunker())
    }

    /// 파일 경로에서 로드
    ///
    /// 존재하지 않으면 `DocumentNotFound`, 확장자가 지원되지 않으면 `UnsupportedFormat`.
    pub async fn load(&self, path: &Path) -> Result<Vec<DocumentChunk>, AssistError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(AssistError::not_found(path.display().to_string()));
        }

        let format = DocumentFormat::from_path(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AssistError::extraction(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Loading {}: {}", format.label(), path.display());
        self.chunk_bytes(format, bytes).await
    }

    /// 업로드된 바이트에서 로드 (파일 이름으로 형식 결정)
    pub async fn load_bytes(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<DocumentChunk>, AssistError> {
        let format = DocumentFormat::from_path(Path::new(filename))?;
        tracing::info!("Loading uploaded {}: {}", format.label(), filename);
        self.chunk_bytes(format, bytes).await
    }

    async fn chunk_bytes(
        &self,
        format: DocumentFormat,
        bytes: Vec<u8>,
    ) -> Result<Vec<DocumentChunk>, AssistError> {
        let text = match format {
            DocumentFormat::Pdf => tokio::task::spawn_blocking(move || extract_text(format, &bytes))
                .await
                .map_err(|e| {
                    AssistError::extraction(format!("PDF extraction task failed: {}", e))
                })??,
            _ => extract_text(format, &bytes)?,
        };

        let chunks = self.chunker.chunk_document(&text);
        tracing::debug!("{} chunks from {} chars", chunks.len(), text.len());
        Ok(chunks)
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::{word_chunker, ChunkConfig};

    fn small_loader() -> DocumentLoader {
        DocumentLoader::new(word_chunker(ChunkConfig::without_overlap(12)))
    }

    #[tokio::test]
    async fn test_load_missing_path() {
        let err = small_loader()
            .load(Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_load_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        std::fs::write(&path, "hello").unwrap();

        let err = small_loader().load(&path).await.unwrap_err();
        assert!(matches!(err, AssistError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_load_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.MD");
        std::fs::write(&path, "# Title\n\nalpha beta gamma delta").unwrap();

        let chunks = small_loader().load(&path).await.unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["# Title", "alpha beta", "gamma delta"]);
        assert_eq!(chunks[2].source_order, 2);
    }

    #[tokio::test]
    async fn test_load_bytes_tolerates_invalid_utf8() {
        let chunks = small_loader()
            .load_bytes("raw.txt", b"ok \xff\xfe fine".to_vec())
            .await
            .unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks[0].text.starts_with("ok"));
    }

    #[tokio::test]
    async fn test_blank_document_has_no_chunks() {
        let chunks = small_loader()
            .load_bytes("blank.txt", b"   \n\n ".to_vec())
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }
}
