//! 파일 수집 모듈
//!
//! CLI 인자로 받은 파일/폴더를 인제스트할 문서 경로 목록으로 펼칩니다.
//! 폴더는 .gitignore 패턴을 존중하며 지원 확장자(pdf, txt, md)만 수집합니다.
//! 파일 인자는 그대로 통과시켜 파이프라인이 문서별 실패를 보고하게 합니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

use crate::extractor::DocumentFormat;

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// PDF 파일 건너뛰기
    pub skip_pdfs: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
            skip_pdfs: false,
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 인자 목록을 문서 경로로 펼침 (입력 순서 유지)
    pub fn expand(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for input in inputs {
            if input.is_dir() {
                paths.extend(self.collect_directory(input)?);
            } else {
                paths.push(input.clone());
            }
        }

        Ok(paths)
    }

    /// 폴더 재귀 수집 (경로 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut files = Vec::new();

        // ignore 크레이트로 .gitignore 지원
        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if self.should_include(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();
        tracing::info!("Collected {} documents from {:?}", files.len(), path);
        Ok(files)
    }

    /// 폴더 안 파일의 필터 조건
    fn should_include(&self, path: &Path) -> bool {
        let format = match DocumentFormat::from_path(path) {
            Ok(format) => format,
            Err(_) => return false,
        };

        if self.config.skip_pdfs && format == DocumentFormat::Pdf {
            return false;
        }

        if self.config.max_file_size > 0 {
            if let Ok(meta) = std::fs::metadata(path) {
                if meta.len() > self.config.max_file_size {
                    tracing::debug!("Skipping large file: {:?} ({} bytes)", path, meta.len());
                    return false;
                }
            }
        }

        true
    }
}

// ============================================================================
// Tests
// ============================================================================
