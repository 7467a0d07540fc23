//! 리트리벌 파이프라인 - 로드 → 청킹 → 임베딩 → 인덱스 → 검색
//!
//! 인제스트할 때마다 전체 코퍼스를 새로 만들어 통째로 교체합니다 (증분 갱신 없음).
//! 청크가 하나도 없으면 not-ready 상태가 되고 이전 인덱스는 버립니다.
//!
//! 동시성:
//! - 인제스트끼리는 `ingest_lock`으로 직렬화
//! - 새 인덱스는 락 밖에서 만든 뒤 쓰기 락 아래에서 교체
//! - 질의는 읽기 락으로 현재 인덱스의 `Arc`만 잡고 바로 놓음

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::embedding::EmbeddingProvider;
use crate::error::AssistError;

use super::loader::DocumentLoader;
use super::vector::{FlatL2Index, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 문서별 인제스트 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IngestOutcome {
    Indexed {
        filename: String,
        chunks: usize,
        /// 업로드 원본 저장 위치 (저장하지 않았으면 생략)
        #[serde(skip_serializing_if = "Option::is_none")]
        saved_to: Option<PathBuf>,
    },
    Failed { filename: String, error: String },
}

impl IngestOutcome {
    pub fn filename(&self) -> &str {
        match self {
            IngestOutcome::Indexed { filename, .. } | IngestOutcome::Failed { filename, .. } => {
                filename
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, IngestOutcome::Indexed { .. })
    }
}

/// 인제스트 배치 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
    pub total_chunks: usize,
    pub ready: bool,
}

/// 파이프라인 상태
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub ready: bool,
    pub chunk_count: usize,
    pub dimension: usize,
}

// ============================================================================
// RetrievalPipeline
// ============================================================================

/// 리트리벌 파이프라인
pub struct RetrievalPipeline {
    loader: DocumentLoader,
    embedder: Arc<dyn EmbeddingProvider>,
    /// None = not-ready
    corpus: RwLock<Option<Arc<FlatL2Index>>>,
    ingest_lock: Mutex<()>,
    upload_dir: Option<PathBuf>,
}

impl RetrievalPipeline {
    /// 새 파이프라인 생성 (not-ready 상태)
    pub fn new(loader: DocumentLoader, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            loader,
            embedder,
            corpus: RwLock::new(None),
            ingest_lock: Mutex::new(()),
            upload_dir: None,
        }
    }

    /// 업로드 원본 저장 디렉토리 지정
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    pub fn upload_dir(&self) -> Option<&Path> {
        self.upload_dir.as_deref()
    }

    /// 문서 경로 목록 인제스트
    ///
    /// 개별 문서 실패는 결과에 기록하고 나머지는 계속 처리합니다.
    /// 임베딩 실패 시 에러를 반환하며 이전 코퍼스는 그대로 유지됩니다.
    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;

        let mut outcomes = Vec::with_capacity(paths.len());
        let mut texts = Vec::new();

        for path in paths {
            let filename = display_name(path);
            match self.loader.load(path).await {
                Ok(chunks) => {
                    outcomes.push(IngestOutcome::Indexed {
                        filename,
                        chunks: chunks.len(),
                        saved_to: None,
                    });
                    texts.extend(chunks.into_iter().map(|c| c.text));
                }
                Err(e) => {
                    tracing::warn!(file = %filename, kind = e.kind(), "Skipping document: {}", e);
                    outcomes.push(IngestOutcome::Failed {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.rebuild(texts, outcomes).await
    }

    /// 업로드된 (파일 이름, 바이트) 목록 인제스트
    pub async fn ingest_uploads(&self, files: Vec<(String, Vec<u8>)>) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;

        let mut outcomes = Vec::with_capacity(files.len());
        let mut texts = Vec::new();

        for (filename, bytes) in files {
            let saved_to = match self.upload_dir {
                Some(ref dir) => match persist_upload(dir, &filename, &bytes).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::warn!(file = %filename, "Failed to save upload: {:#}", e);
                        None
                    }
                },
                None => None,
            };

            match self.loader.load_bytes(&filename, bytes).await {
                Ok(chunks) => {
                    outcomes.push(IngestOutcome::Indexed {
                        filename,
                        chunks: chunks.len(),
                        saved_to,
                    });
                    texts.extend(chunks.into_iter().map(|c| c.text));
                }
                Err(e) => {
                    tracing::warn!(file = %filename, kind = e.kind(), "Skipping upload: {}", e);
                    outcomes.push(IngestOutcome::Failed {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.rebuild(texts, outcomes).await
    }

    /// 전체 코퍼스 재구성 후 교체
    async fn rebuild(
        &self,
        texts: Vec<String>,
        outcomes: Vec<IngestOutcome>,
    ) -> Result<IngestReport> {
        let total_chunks = texts.len();

        if texts.is_empty() {
            *self.corpus.write().await = None;
            tracing::warn!("Ingest produced no chunks; retrieval pipeline is not ready");
            return Ok(IngestReport {
                outcomes,
                total_chunks,
                ready: false,
            });
        }

        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed chunks")?;
        let index = FlatL2Index::build(texts, vectors)?;

        *self.corpus.write().await = Some(Arc::new(index));

        tracing::info!(
            "Retrieval index rebuilt: {} chunks from {} documents",
            total_chunks,
            outcomes.iter().filter(|o| o.is_ok()).count()
        );

        Ok(IngestReport {
            outcomes,
            total_chunks,
            ready: true,
        })
    }

    /// 질의와 가장 가까운 청크 반환 (가까운 순)
    ///
    /// not-ready 상태면 빈 목록입니다.
    pub async fn query(&self, question: &str, top_k: usize) -> Result<Vec<String>> {
        let index = match self.corpus.read().await.as_ref() {
            Some(index) => Arc::clone(index),
            None => return Ok(Vec::new()),
        };

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| AssistError::embedding(format!("{:#}", e)))?;

        let hits = index.search(&query_vector, top_k)?;
        tracing::debug!("Retrieved {} chunks for query", hits.len());

        Ok(hits.into_iter().map(|h| h.chunk_text).collect())
    }

    /// 검색 가능 여부
    pub async fn is_ready(&self) -> bool {
        self.corpus.read().await.is_some()
    }

    /// 상태 조회
    pub async fn stats(&self) -> PipelineStats {
        match self.corpus.read().await.as_ref() {
            Some(index) => PipelineStats {
                ready: true,
                chunk_count: index.len(),
                dimension: index.dimension(),
            },
            None => PipelineStats {
                ready: false,
                chunk_count: 0,
                dimension: 0,
            },
        }
    }

    /// 인덱스 비우기
    pub async fn clear(&self) {
        let _guard = self.ingest_lock.lock().await;
        *self.corpus.write().await = None;
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// 업로드 원본 저장 (경로 구성요소는 버리고 파일 이름만 사용)
async fn persist_upload(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid upload file name: {:?}", filename))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create upload directory: {:?}", dir))?;

    let target = dir.join(name);
    tokio::fs::write(&target, bytes)
        .await
        .with_context(|| format!("Failed to write upload: {:?}", target))?;
    Ok(target)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::FlakyEmbedding;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::chunker::{word_chunker, ChunkConfig};

    fn pipeline() -> RetrievalPipeline {
        let loader = DocumentLoader::new(word_chunker(ChunkConfig::without_overlap(200)));
        RetrievalPipeline::new(loader, Arc::new(HashEmbedding::new(256).unwrap()))
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_query_before_ingest_is_empty() {
        let pipeline = pipeline();
        assert!(!pipeline.is_ready().await);
        assert!(pipeline.query("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_and_query_ranks_relevant_chunk_first() {
        let dir = tempfile::tempdir().unwrap();
        let bio = write(
            dir.path(),
            "bio.txt",
            "Photosynthesis lets plants convert sunlight into chemical energy.",
        );
        let law = write(
            dir.path(),
            "law.md",
            "A contract requires offer acceptance and consideration between parties.",
        );

        let pipeline = pipeline();
        let report = pipeline.ingest(&[bio, law]).await.unwrap();
        assert!(report.ready);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(IngestOutcome::is_ok));

        let results = pipeline
            .query("what does a contract require between parties", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), report.total_chunks);
        assert!(results[0].contains("contract"));
    }

    #[tokio::test]
    async fn test_unsupported_only_leaves_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write(dir.path(), "slides.pptx", "binary-ish");

        let pipeline = pipeline();
        let report = pipeline.ingest(&[doc]).await.unwrap();

        assert!(!report.ready);
        assert_eq!(report.total_chunks, 0);
        match &report.outcomes[0] {
            IngestOutcome::Failed { filename, error } => {
                assert_eq!(filename, "slides.pptx");
                assert!(error.contains("unsupported"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(pipeline.query("slides", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_document_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = write(dir.path(), "good.txt", "fever and headache are common symptoms");
        let missing = dir.path().join("missing.txt");

        let pipeline = pipeline();
        let report = pipeline.ingest(&[missing, good]).await.unwrap();

        assert!(report.ready);
        assert!(!report.outcomes[0].is_ok());
        assert!(report.outcomes[1].is_ok());
        assert_eq!(report.outcomes[1].filename(), "good.txt");
    }

    #[tokio::test]
    async fn test_empty_reingest_clears_stale_index() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write(dir.path(), "a.txt", "stale content that should disappear");
        let blank = write(dir.path(), "blank.txt", "   ");

        let pipeline = pipeline();
        assert!(pipeline.ingest(&[doc]).await.unwrap().ready);
        assert!(!pipeline.query("stale content", 1).await.unwrap().is_empty());

        let report = pipeline.ingest(&[blank]).await.unwrap();
        assert!(!report.ready);
        assert!(pipeline.query("stale content", 1).await.unwrap().is_empty());
        assert_eq!(pipeline.stats().await.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_reingest_replaces_corpus_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "first.txt", "alpha alpha alpha");
        let second = write(dir.path(), "second.txt", "omega omega omega");

        let pipeline = pipeline();
        pipeline.ingest(&[first]).await.unwrap();
        pipeline.ingest(&[second]).await.unwrap();

        let results = pipeline.query("alpha", 10).await.unwrap();
        assert_eq!(results, vec!["omega omega omega".to_string()]);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_previous_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let kept = write(dir.path(), "kept.txt", "kept corpus");
        let next = write(dir.path(), "next.txt", "replacement corpus");

        let embedder = Arc::new(FlakyEmbedding::new(32));
        let pipeline = RetrievalPipeline::new(DocumentLoader::with_defaults(), embedder.clone());
        pipeline.ingest(&[kept]).await.unwrap();

        embedder.set_failing(true);
        assert!(pipeline.ingest(&[next]).await.is_err());
        assert!(pipeline.query("corpus", 1).await.is_err());

        embedder.set_failing(false);
        let results = pipeline.query("corpus", 5).await.unwrap();
        assert_eq!(results, vec!["kept corpus".to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_uploads_persists_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline().with_upload_dir(dir.path().join("uploads"));

        let report = pipeline
            .ingest_uploads(vec![
                ("../notes.txt".to_string(), b"study guide for algebra".to_vec()),
                ("image.png".to_string(), vec![0u8, 1, 2]),
            ])
            .await
            .unwrap();

        assert!(report.ready);
        assert!(report.outcomes[0].is_ok());
        assert!(!report.outcomes[1].is_ok());
        let saved = dir.path().join("uploads").join("notes.txt");
        assert!(saved.exists());
        match &report.outcomes[0] {
            IngestOutcome::Indexed { saved_to, .. } => assert_eq!(saved_to.as_ref(), Some(&saved)),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let json = serde_json::to_value(&report.outcomes).unwrap();
        assert_eq!(json[0]["chunks"], 1);
        assert!(json[0]["saved_to"].is_string());
        assert!(json[1]["error"].is_string());
    }

    #[tokio::test]
    async fn test_uploads_without_dir_are_not_saved() {
        let report = pipeline()
            .ingest_uploads(vec![("notes.txt".to_string(), b"kept in memory".to_vec())])
            .await
            .unwrap();

        let json = serde_json::to_value(&report.outcomes).unwrap();
        assert!(json[0].get("saved_to").is_none());
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write(dir.path(), "a.txt", "something");
        let pipeline = pipeline();
        pipeline.ingest(&[doc]).await.unwrap();

        pipeline.clear().await;
        assert!(!pipeline.stats().await.ready);
    }
}
